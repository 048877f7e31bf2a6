//! Firing schedule execution: trajectory interpolation, heat regulation,
//! the run state machine and the tokio actor that drives it.

pub mod controller;
pub mod executor;
pub mod hardware;
pub mod service;
pub mod thermal;
pub mod trajectory;

pub use controller::{ControllerMemory, HazardExceeded, HeatingController, Regulation};
pub use executor::{ExecutorError, Finished, Run, RunExecutor, TickOutcome};
pub use hardware::{HeaterOutput, KillSwitch, TemperatureSensor};
pub use service::{spawn_executor, ExecutorHandle, JournalRecord};
