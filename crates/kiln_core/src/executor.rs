//! Synchronous run state machine. Owns the active run and advances it one
//! tick at a time; all I/O lives in [`crate::service`].

use chrono::{DateTime, Utc};
use shared::{
    config::{CatchUpConfig, KilnConfig},
    domain::{Profile, ProfileError, RunId, RunMode, RunState},
    protocol::{Backlog, LogEntry, PidStats, RunCompleted, StatusSnapshot},
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    controller::{ControllerMemory, HazardExceeded, HeatingController},
    trajectory::{energy_kwh, target_at},
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutorError {
    #[error("a run is already in progress")]
    Busy,
    #[error(transparent)]
    InvalidProfile(#[from] ProfileError),
    #[error("the executor has shut down")]
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct Run {
    pub id: RunId,
    pub profile: Profile,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub state: RunState,
    pub elapsed_seconds: f64,
    pub total_duration_seconds: u64,
    pub current_temperature: f64,
    pub target_temperature: f64,
    pub heat_fraction: f64,
    pub cumulative_energy_kwh: f64,
    pub cumulative_cost: f64,
    memory: ControllerMemory,
    pid_stats: Option<PidStats>,
    log: Vec<LogEntry>,
}

impl Run {
    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state,
            temperature: self.current_temperature,
            target: self.target_temperature,
            heat: self.heat_fraction,
            time_stamp: self.elapsed_seconds,
            total_time: self.total_duration_seconds,
            cost: self.cumulative_cost,
            is_simulation: self.mode.is_simulation(),
            profile: Some(self.profile.name.clone()),
            pid_stats: self.pid_stats.clone(),
        }
    }
}

/// A run that has just left RUNNING.
#[derive(Debug, Clone, PartialEq)]
pub struct Finished {
    pub run_id: RunId,
    pub snapshot: StatusSnapshot,
    pub notice: RunCompleted,
    pub energy_kwh: f64,
    pub hazard: Option<HazardExceeded>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Idle,
    Running {
        snapshot: StatusSnapshot,
        heat_fraction: f64,
        entry: LogEntry,
    },
    Finished(Finished),
}

pub struct RunExecutor {
    controller: HeatingController,
    heater_power_watts: f64,
    kwh_rate: f64,
    catch_up: CatchUpConfig,
    active: Option<Run>,
    last_run: Option<Backlog>,
    last_temperature: f64,
}

impl RunExecutor {
    pub fn new(config: &KilnConfig) -> Self {
        Self {
            controller: HeatingController::from_config(config),
            heater_power_watts: config.heater_power_watts,
            kwh_rate: config.kwh_rate,
            catch_up: config.catch_up.clone(),
            active: None,
            last_run: None,
            last_temperature: 0.0,
        }
    }

    pub fn state(&self) -> RunState {
        self.active
            .as_ref()
            .map(|run| run.state)
            .unwrap_or(RunState::Idle)
    }

    pub fn active_run(&self) -> Option<&Run> {
        self.active.as_ref()
    }

    /// Begins `profile` from `start_at` seconds into the schedule.
    pub fn start(
        &mut self,
        profile: Profile,
        mode: RunMode,
        start_at: Option<u64>,
    ) -> Result<&Run, ExecutorError> {
        if self.active.is_some() {
            return Err(ExecutorError::Busy);
        }
        profile.validate()?;

        let total = profile.duration_seconds();
        let elapsed = start_at.unwrap_or_default().min(total) as f64;
        let run = Run {
            id: RunId::new(),
            target_temperature: target_at(&profile, elapsed),
            profile,
            mode,
            started_at: Utc::now(),
            state: RunState::Running,
            elapsed_seconds: elapsed,
            total_duration_seconds: total,
            current_temperature: self.last_temperature,
            heat_fraction: 0.0,
            cumulative_energy_kwh: 0.0,
            cumulative_cost: 0.0,
            memory: ControllerMemory::default(),
            pid_stats: None,
            log: Vec::new(),
        };
        info!(
            run_id = %run.id,
            profile = %run.profile.name,
            mode = mode.as_str(),
            start_at = elapsed,
            total_seconds = total,
            "run started"
        );
        self.last_run = None;
        Ok(self.active.insert(run))
    }

    /// Aborts the active run. `None` when already idle.
    pub fn stop(&mut self) -> Option<Finished> {
        self.active.as_ref()?;
        info!("run stopped by request");
        self.finish(RunState::Aborted, None)
    }

    /// Advances the active run by `dt` seconds given the latest reading.
    pub fn tick(&mut self, reading: f64, dt: f64) -> TickOutcome {
        self.last_temperature = reading;
        let Some(run) = self.active.as_mut() else {
            return TickOutcome::Idle;
        };
        run.current_temperature = reading;

        // the hazard cutoff wins over a schedule that ends on this tick
        if let Err(hazard) = self.controller.check_hazard(reading) {
            warn!(%hazard, "hazard temperature exceeded, aborting run");
            return self
                .finish(RunState::Aborted, Some(hazard))
                .map_or(TickOutcome::Idle, TickOutcome::Finished);
        }

        let lagging = self.catch_up.enabled
            && target_at(&run.profile, run.elapsed_seconds) - reading > self.catch_up.pause_window;
        if lagging {
            info!(
                elapsed = run.elapsed_seconds,
                temperature = reading,
                "kiln behind schedule, holding"
            );
        } else {
            run.elapsed_seconds += dt;
        }

        if run.elapsed_seconds >= run.total_duration_seconds as f64 {
            return self.finish(RunState::Complete, None).map_or(TickOutcome::Idle, TickOutcome::Finished);
        }

        let target = target_at(&run.profile, run.elapsed_seconds);
        run.target_temperature = target;
        let regulation = match self.controller.compute_output(target, reading, &run.memory, dt) {
            Ok(regulation) => regulation,
            Err(hazard) => {
                warn!(%hazard, "hazard temperature exceeded, aborting run");
                return self
                    .finish(RunState::Aborted, Some(hazard))
                    .map_or(TickOutcome::Idle, TickOutcome::Finished);
            }
        };

        let heat = regulation.heat_fraction;
        let energy = energy_kwh(self.heater_power_watts, heat, dt);
        run.heat_fraction = heat;
        run.memory = regulation.memory;
        run.pid_stats = Some(regulation.stats);
        run.cumulative_energy_kwh += energy;
        run.cumulative_cost += energy * self.kwh_rate;

        let entry = LogEntry {
            time_stamp: run.elapsed_seconds,
            temperature: reading,
            target,
            heat,
        };
        run.log.push(entry.clone());
        TickOutcome::Running {
            snapshot: run.snapshot(),
            heat_fraction: heat,
            entry,
        }
    }

    /// The active run's snapshot, or an idle one at the last reading.
    pub fn status(&self) -> StatusSnapshot {
        match &self.active {
            Some(run) => run.snapshot(),
            None => StatusSnapshot::idle(self.last_temperature),
        }
    }

    /// Profile and log of the active run, else of the last finished run.
    pub fn backlog(&self) -> Backlog {
        match &self.active {
            Some(run) => Backlog {
                profile: Some(run.profile.clone()),
                log: run.log.clone(),
            },
            None => self.last_run.clone().unwrap_or_default(),
        }
    }

    fn finish(&mut self, state: RunState, hazard: Option<HazardExceeded>) -> Option<Finished> {
        let mut run = self.active.take()?;
        run.state = state;
        run.target_temperature = 0.0;
        run.heat_fraction = 0.0;
        run.pid_stats = None;

        let notice = RunCompleted {
            state,
            mode: run.mode,
            is_simulation: run.mode.is_simulation(),
            message: completion_message(run.mode, state).to_string(),
            cost: run.cumulative_cost,
            time_stamp: run.elapsed_seconds,
        };
        info!(
            run_id = %run.id,
            state = state.as_str(),
            elapsed = run.elapsed_seconds,
            energy_kwh = run.cumulative_energy_kwh,
            cost = run.cumulative_cost,
            "{}",
            notice.message
        );

        let finished = Finished {
            run_id: run.id,
            snapshot: run.snapshot(),
            notice,
            energy_kwh: run.cumulative_energy_kwh,
            hazard,
        };
        self.last_run = Some(Backlog {
            profile: Some(run.profile),
            log: run.log,
        });
        Some(finished)
    }
}

fn completion_message(mode: RunMode, state: RunState) -> &'static str {
    match (mode, state) {
        (RunMode::Simulate, RunState::Complete) => "Simulation Complete",
        (RunMode::Simulate, _) => "Simulation Aborted",
        (RunMode::Run, RunState::Complete) => "Kiln Run Complete",
        (RunMode::Run, _) => "Kiln Run Aborted",
    }
}

#[cfg(test)]
#[path = "tests/executor_tests.rs"]
mod tests;
