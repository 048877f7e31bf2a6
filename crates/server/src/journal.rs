//! Drains run records from the executor into the run journal tables.

use kiln_core::JournalRecord;
use storage::Storage;
use tokio::sync::mpsc;
use tracing::{debug, error};

pub(crate) async fn run_journal(
    storage: Storage,
    mut records: mpsc::UnboundedReceiver<JournalRecord>,
) {
    while let Some(record) = records.recv().await {
        if let Err(error) = write_record(&storage, record).await {
            error!(error = %format!("{error:#}"), "failed to journal run record");
        }
    }
    debug!("journal writer stopped");
}

async fn write_record(storage: &Storage, record: JournalRecord) -> anyhow::Result<()> {
    match record {
        JournalRecord::RunStarted {
            run_id,
            profile,
            mode,
            started_at,
        } => storage.begin_run(run_id, &profile, mode, started_at).await,
        JournalRecord::Entry { run_id, entry } => storage.append_log_entry(run_id, &entry).await,
        JournalRecord::RunFinished {
            run_id,
            state,
            energy_kwh,
            cost,
            finished_at,
        } => {
            storage
                .finish_run(run_id, state, energy_kwh, cost, finished_at)
                .await
        }
    }
}

#[cfg(test)]
#[path = "tests/journal_tests.rs"]
mod tests;
