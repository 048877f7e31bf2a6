use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use shared::{
    domain::{Profile, ProfileError, RunId, RunMode, RunState, Waypoint},
    protocol::LogEntry,
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    InvalidProfile(#[from] ProfileError),
    #[error("profile '{name}' already exists")]
    Conflict { name: String },
    #[error("profile '{name}' not found")]
    NotFound { name: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored profile is not valid json: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Header row of a journaled run.
#[derive(Debug, Clone)]
pub struct StoredRun {
    pub id: RunId,
    pub profile: Profile,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub final_state: Option<RunState>,
    pub energy_kwh: Option<f64>,
    pub cost: Option<f64>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to an in-memory database is a separate database.
        let pool_options = if is_in_memory(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn list_profiles(&self) -> Result<Vec<Profile>, StoreError> {
        let rows = sqlx::query("SELECT name, data FROM profiles ORDER BY name COLLATE NOCASE, name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(profile_from_row).collect()
    }

    pub async fn find_profile(&self, name: &str) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query("SELECT name, data FROM profiles WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(profile_from_row).transpose()
    }

    /// Inserts or replaces a profile and returns the updated list.
    ///
    /// An existing profile of the same name is only replaced when `force`
    /// is set; otherwise the write fails with [`StoreError::Conflict`].
    pub async fn put_profile(&self, profile: &Profile, force: bool) -> Result<Vec<Profile>, StoreError> {
        profile.validate()?;
        let data = serde_json::to_string(&profile.data)?;

        let mut tx = self.pool.begin().await?;
        let existing: Option<i64> = sqlx::query_scalar("SELECT 1 FROM profiles WHERE name = ?")
            .bind(&profile.name)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() && !force {
            return Err(StoreError::Conflict {
                name: profile.name.clone(),
            });
        }

        sqlx::query(
            "INSERT INTO profiles (name, data) VALUES (?, ?)
             ON CONFLICT(name) DO UPDATE SET data = excluded.data, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(&profile.name)
        .bind(&data)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(
            profile = %profile.name,
            points = profile.data.len(),
            replaced = existing.is_some(),
            "profile saved"
        );
        self.list_profiles().await
    }

    pub async fn delete_profile(&self, name: &str) -> Result<Vec<Profile>, StoreError> {
        let removed = sqlx::query("DELETE FROM profiles WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(StoreError::NotFound {
                name: name.to_string(),
            });
        }
        info!(profile = %name, "profile deleted");
        self.list_profiles().await
    }

    pub async fn begin_run(
        &self,
        run_id: RunId,
        profile: &Profile,
        mode: RunMode,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO runs (id, profile_name, profile_data, mode, started_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(run_id.0.to_string())
        .bind(&profile.name)
        .bind(serde_json::to_string(&profile.data)?)
        .bind(mode.as_str())
        .bind(started_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to journal start of run {run_id}"))?;
        Ok(())
    }

    pub async fn append_log_entry(&self, run_id: RunId, entry: &LogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO run_log (run_id, time_stamp, temperature, target, heat) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(run_id.0.to_string())
        .bind(entry.time_stamp)
        .bind(entry.temperature)
        .bind(entry.target)
        .bind(entry.heat)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn finish_run(
        &self,
        run_id: RunId,
        final_state: RunState,
        energy_kwh: f64,
        cost: f64,
        finished_at: DateTime<Utc>,
    ) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE runs SET final_state = ?, energy_kwh = ?, cost = ?, finished_at = ? WHERE id = ?",
        )
        .bind(final_state.as_str())
        .bind(energy_kwh)
        .bind(cost)
        .bind(finished_at)
        .bind(run_id.0.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(anyhow!("run {run_id} was never journaled"));
        }
        debug!(%run_id, state = final_state.as_str(), cost, "run journal closed");
        Ok(())
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: u32) -> Result<Vec<StoredRun>> {
        let rows = sqlx::query(
            "SELECT id, profile_name, profile_data, mode, started_at, finished_at, final_state, energy_kwh, cost
             FROM runs
             ORDER BY started_at DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(run_from_row).collect()
    }

    pub async fn load_run(&self, run_id: RunId) -> Result<Option<StoredRun>> {
        let row = sqlx::query(
            "SELECT id, profile_name, profile_data, mode, started_at, finished_at, final_state, energy_kwh, cost
             FROM runs
             WHERE id = ?",
        )
        .bind(run_id.0.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(run_from_row).transpose()
    }

    pub async fn load_run_log(&self, run_id: RunId) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query(
            "SELECT time_stamp, temperature, target, heat FROM run_log WHERE run_id = ? ORDER BY id ASC",
        )
        .bind(run_id.0.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| LogEntry {
                time_stamp: r.get::<f64, _>(0),
                temperature: r.get::<f64, _>(1),
                target: r.get::<f64, _>(2),
                heat: r.get::<f64, _>(3),
            })
            .collect())
    }
}

fn profile_from_row(row: &SqliteRow) -> Result<Profile, StoreError> {
    let data: Vec<Waypoint> = serde_json::from_str(&row.get::<String, _>(1))?;
    Ok(Profile {
        name: row.get::<String, _>(0),
        data,
    })
}

fn run_from_row(row: &SqliteRow) -> Result<StoredRun> {
    let id = row.get::<String, _>(0);
    let mode = row.get::<String, _>(3);
    Ok(StoredRun {
        id: RunId(Uuid::parse_str(&id).with_context(|| format!("invalid run id '{id}'"))?),
        profile: Profile {
            name: row.get::<String, _>(1),
            data: serde_json::from_str(&row.get::<String, _>(2))?,
        },
        mode: RunMode::parse(&mode).ok_or_else(|| anyhow!("unknown run mode '{mode}'"))?,
        started_at: row.get::<DateTime<Utc>, _>(4),
        finished_at: row.get::<Option<DateTime<Utc>>, _>(5),
        final_state: row
            .get::<Option<String>, _>(6)
            .map(|state| RunState::parse(&state).ok_or_else(|| anyhow!("unknown run state '{state}'")))
            .transpose()?,
        energy_kwh: row.get::<Option<f64>, _>(7),
        cost: row.get::<Option<f64>, _>(8),
    })
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_in_memory(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
