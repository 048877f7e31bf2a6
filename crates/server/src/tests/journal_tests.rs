use super::*;

use chrono::Utc;
use shared::{
    domain::{Profile, RunId, RunMode, RunState},
    protocol::LogEntry,
};

#[tokio::test]
async fn writes_records_in_order_until_the_channel_closes() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(run_journal(storage.clone(), rx));

    let run_id = RunId::new();
    let profile = Profile::new("glaze", [(0, 20.0), (600, 200.0)]);
    tx.send(JournalRecord::RunStarted {
        run_id,
        profile: profile.clone(),
        mode: RunMode::Run,
        started_at: Utc::now(),
    })
    .expect("send");
    for second in 1..=2 {
        tx.send(JournalRecord::Entry {
            run_id,
            entry: LogEntry {
                time_stamp: second as f64,
                temperature: 21.0,
                target: 22.0,
                heat: 1.0,
            },
        })
        .expect("send");
    }
    tx.send(JournalRecord::RunFinished {
        run_id,
        state: RunState::Complete,
        energy_kwh: 0.002,
        cost: 0.0004,
        finished_at: Utc::now(),
    })
    .expect("send");
    drop(tx);
    writer.await.expect("writer");

    let run = storage.load_run(run_id).await.expect("load").expect("run");
    assert_eq!(run.profile, profile);
    assert_eq!(run.final_state, Some(RunState::Complete));
    assert_eq!(storage.load_run_log(run_id).await.expect("log").len(), 2);
}

#[tokio::test]
async fn a_failed_write_does_not_stop_the_writer() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(run_journal(storage.clone(), rx));

    tx.send(JournalRecord::RunFinished {
        run_id: RunId::new(),
        state: RunState::Aborted,
        energy_kwh: 0.0,
        cost: 0.0,
        finished_at: Utc::now(),
    })
    .expect("send");
    let run_id = RunId::new();
    tx.send(JournalRecord::RunStarted {
        run_id,
        profile: Profile::new("after", [(0, 20.0)]),
        mode: RunMode::Simulate,
        started_at: Utc::now(),
    })
    .expect("send");
    drop(tx);
    writer.await.expect("writer");

    assert!(storage.load_run(run_id).await.expect("load").is_some());
}
