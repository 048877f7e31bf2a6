//! Tokio actor that owns the [`RunExecutor`], the hardware and the
//! simulation model, and turns ticks into telemetry and journal records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use shared::{
    config::{KilnConfig, SimulationConfig},
    domain::{Profile, RunId, RunMode, RunState},
    error::{ApiError, ErrorCode},
    protocol::{Backlog, LogEntry, RunCompleted, ServerEvent, StatusSnapshot},
};
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
    time::{interval_at, Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    executor::{ExecutorError, Finished, RunExecutor, TickOutcome},
    hardware::{HeaterOutput, KillSwitch, TemperatureSensor},
    thermal::SimulatedKiln,
};

const MAILBOX_CAPACITY: usize = 32;
const MIN_TICK: Duration = Duration::from_millis(10);

/// What the journal writer persists, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalRecord {
    RunStarted {
        run_id: RunId,
        profile: Profile,
        mode: RunMode,
        started_at: DateTime<Utc>,
    },
    Entry {
        run_id: RunId,
        entry: LogEntry,
    },
    RunFinished {
        run_id: RunId,
        state: RunState,
        energy_kwh: f64,
        cost: f64,
        finished_at: DateTime<Utc>,
    },
}

enum Command {
    Start {
        profile: Profile,
        mode: RunMode,
        start_at: Option<u64>,
        reply: oneshot::Sender<Result<RunId, ExecutorError>>,
    },
    Stop {
        reply: oneshot::Sender<Option<RunCompleted>>,
    },
    Status {
        reply: oneshot::Sender<StatusSnapshot>,
    },
    Backlog {
        reply: oneshot::Sender<Backlog>,
    },
}

/// Cloneable front door to the executor actor.
#[derive(Clone)]
pub struct ExecutorHandle {
    commands: mpsc::Sender<Command>,
}

impl ExecutorHandle {
    pub async fn start(
        &self,
        profile: Profile,
        mode: RunMode,
        start_at: Option<u64>,
    ) -> Result<RunId, ExecutorError> {
        self.request(|reply| Command::Start {
            profile,
            mode,
            start_at,
            reply,
        })
        .await?
    }

    /// Aborts the active run; `None` when nothing was running.
    pub async fn stop(&self) -> Result<Option<RunCompleted>, ExecutorError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn status(&self) -> Result<StatusSnapshot, ExecutorError> {
        self.request(|reply| Command::Status { reply }).await
    }

    pub async fn backlog(&self) -> Result<Backlog, ExecutorError> {
        self.request(|reply| Command::Backlog { reply }).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ExecutorError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| ExecutorError::Unavailable)?;
        response.await.map_err(|_| ExecutorError::Unavailable)
    }
}

struct ExecutorService {
    executor: RunExecutor,
    sensor: Box<dyn TemperatureSensor>,
    heater: Box<dyn HeaterOutput>,
    kill_switch: Option<Box<dyn KillSwitch>>,
    simulation_params: SimulationConfig,
    simulation: SimulatedKiln,
    simulated_heat: f64,
    speedup: f64,
    period: Duration,
    last_reading: f64,
    events: broadcast::Sender<ServerEvent>,
    journal: mpsc::UnboundedSender<JournalRecord>,
}

/// Spawns the executor actor and returns its handle.
///
/// The actor ticks every `config.tick_seconds`, publishes an `oven_update`
/// on `events` each tick, and streams run records to `journal`. A hazard
/// abort also trips `kill_switch` when one is given. It exits when every
/// handle has been dropped.
pub fn spawn_executor(
    config: &KilnConfig,
    sensor: Box<dyn TemperatureSensor>,
    heater: Box<dyn HeaterOutput>,
    kill_switch: Option<Box<dyn KillSwitch>>,
    events: broadcast::Sender<ServerEvent>,
    journal: mpsc::UnboundedSender<JournalRecord>,
) -> (ExecutorHandle, JoinHandle<()>) {
    let (commands, mailbox) = mpsc::channel(MAILBOX_CAPACITY);
    let service = ExecutorService {
        executor: RunExecutor::new(config),
        sensor,
        heater,
        kill_switch,
        simulation_params: config.simulation.clone(),
        simulation: SimulatedKiln::new(config.simulation.clone()),
        simulated_heat: 0.0,
        speedup: config.simulation.speedup.max(f64::EPSILON),
        period: Duration::from_secs_f64(config.tick_seconds.max(0.0)).max(MIN_TICK),
        last_reading: config.simulation.room_temperature,
        events,
        journal,
    };
    let task = tokio::spawn(service.run(mailbox));
    (ExecutorHandle { commands }, task)
}

impl ExecutorService {
    async fn run(mut self, mut mailbox: mpsc::Receiver<Command>) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();
        info!(period = ?self.period, "executor started");

        loop {
            tokio::select! {
                biased;
                command = mailbox.recv() => match command {
                    Some(command) => self.handle(command, &mut ticker, &mut last_tick).await,
                    None => break,
                },
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f64();
                    last_tick = now;
                    self.on_tick(dt).await;
                }
            }
        }

        if let Some(finished) = self.executor.stop() {
            self.conclude(finished).await;
        }
        info!("executor stopped");
    }

    async fn handle(&mut self, command: Command, ticker: &mut Interval, last_tick: &mut Instant) {
        match command {
            Command::Start {
                profile,
                mode,
                start_at,
                reply,
            } => {
                let started = self
                    .executor
                    .start(profile, mode, start_at)
                    .map(|run| (run.id, run.profile.clone(), run.started_at));
                let result = match started {
                    Ok((run_id, profile, started_at)) => {
                        if mode.is_simulation() {
                            self.simulation = SimulatedKiln::new(self.simulation_params.clone());
                            self.simulated_heat = 0.0;
                        }
                        // anchor the tick schedule at the run origin
                        ticker.reset();
                        *last_tick = Instant::now();
                        self.record(JournalRecord::RunStarted {
                            run_id,
                            profile,
                            mode,
                            started_at,
                        });
                        self.publish(ServerEvent::OvenUpdate(self.executor.status()));
                        Ok(run_id)
                    }
                    Err(error) => {
                        debug!(%error, "run request rejected");
                        Err(error)
                    }
                };
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                let notice = match self.executor.stop() {
                    Some(finished) => {
                        let notice = finished.notice.clone();
                        self.conclude(finished).await;
                        Some(notice)
                    }
                    None => None,
                };
                let _ = reply.send(notice);
            }
            Command::Status { reply } => {
                let _ = reply.send(self.executor.status());
            }
            Command::Backlog { reply } => {
                let _ = reply.send(self.executor.backlog());
            }
        }
    }

    async fn on_tick(&mut self, dt: f64) {
        let simulating = self
            .executor
            .active_run()
            .is_some_and(|run| run.mode.is_simulation());

        let (reading, dt) = if simulating {
            let dt = dt * self.speedup;
            self.simulation.advance(self.simulated_heat, dt);
            (self.simulation.temperature(), dt)
        } else {
            match self.sensor.read_temperature().await {
                Ok(reading) => self.last_reading = reading,
                Err(error) => warn!(%error, "temperature read failed, reusing last reading"),
            }
            (self.last_reading, dt)
        };

        match self.executor.tick(reading, dt) {
            TickOutcome::Idle => {
                self.publish(ServerEvent::OvenUpdate(StatusSnapshot::idle(reading)));
            }
            TickOutcome::Running {
                snapshot,
                heat_fraction,
                entry,
            } => {
                if simulating {
                    self.simulated_heat = heat_fraction;
                } else if let Err(error) = self.heater.apply(heat_fraction, self.period).await {
                    warn!(%error, heat_fraction, "heater write failed");
                }
                if let Some(run) = self.executor.active_run() {
                    self.record(JournalRecord::Entry {
                        run_id: run.id,
                        entry,
                    });
                }
                self.publish(ServerEvent::OvenUpdate(snapshot));
            }
            TickOutcome::Finished(finished) => self.conclude(finished).await,
        }
    }

    /// Safe state first, then the terminal snapshot and the one-time notice.
    async fn conclude(&mut self, finished: Finished) {
        self.simulated_heat = 0.0;
        if let Err(error) = self.heater.off().await {
            warn!(%error, "failed to switch heater off");
        }

        if finished.hazard.is_some() {
            if let Some(kill_switch) = self.kill_switch.as_mut() {
                match kill_switch.kill().await {
                    Ok(()) => error!("hazard abort, backup kill switch tripped"),
                    Err(error) => error!(%error, "failed to trip backup kill switch"),
                }
            }
        }

        self.publish(ServerEvent::OvenUpdate(finished.snapshot.clone()));
        if let Some(hazard) = finished.hazard {
            self.publish(ServerEvent::Error(ApiError::new(
                ErrorCode::HazardExceeded,
                hazard.to_string(),
            )));
        }
        self.record(JournalRecord::RunFinished {
            run_id: finished.run_id,
            state: finished.notice.state,
            energy_kwh: finished.energy_kwh,
            cost: finished.notice.cost,
            finished_at: Utc::now(),
        });
        self.publish(ServerEvent::RunCompleted(finished.notice));
    }

    fn publish(&self, event: ServerEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn record(&self, record: JournalRecord) {
        if self.journal.send(record).is_err() {
            warn!("run journal closed, record dropped");
        }
    }
}
