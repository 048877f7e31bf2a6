use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use shared::{
    config::{DriverKind, KilnConfig},
    domain::TempScale,
};
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

use crate::thermal::SimulatedKiln;

#[async_trait]
pub trait TemperatureSensor: Send {
    /// Current chamber temperature in the configured scale.
    async fn read_temperature(&mut self) -> Result<f64>;
}

#[async_trait]
pub trait HeaterOutput: Send {
    /// Holds the element at `heat_fraction` duty over the next `window`.
    async fn apply(&mut self, heat_fraction: f64, window: Duration) -> Result<()>;
    async fn off(&mut self) -> Result<()>;
}

/// Second cutoff, independent of the heater output, for a relay that may
/// have failed closed.
#[async_trait]
pub trait KillSwitch: Send {
    async fn kill(&mut self) -> Result<()>;
}

pub type HardwarePair = (Box<dyn TemperatureSensor>, Box<dyn HeaterOutput>);

/// Builds the sensor/heater pair selected by `config.hardware.driver`.
pub fn build_hardware(config: &KilnConfig) -> HardwarePair {
    match config.hardware.driver {
        DriverKind::Bench => {
            info!("using bench kiln model for hardware I/O");
            let (sensor, heater) = bench_pair(SimulatedKiln::new(config.simulation.clone()));
            (Box::new(sensor), Box::new(heater))
        }
        DriverKind::Linux => {
            info!(
                sensor = %config.hardware.sensor_path,
                heater = %config.hardware.heater_path,
                "using hwmon sensor and gpio heater"
            );
            let sensor = HwmonSensor::new(
                &config.hardware.sensor_path,
                config.temp_scale,
                config.thermocouple_offset,
            );
            (
                Box::new(SmoothedSensor::new(sensor, 12)),
                Box::new(GpioHeater::new(&config.hardware.heater_path)),
            )
        }
    }
}

/// The configured backup cutoff, if any.
pub fn build_kill_switch(config: &KilnConfig) -> Option<Box<dyn KillSwitch>> {
    let path = config.hardware.kill_switch_path.as_ref()?;
    info!(path = %path, "backup kill switch armed");
    Some(Box::new(GpioKillSwitch::new(path)))
}

struct BenchState {
    kiln: SimulatedKiln,
    heat_fraction: f64,
    updated_at: Instant,
}

impl BenchState {
    /// Integrates the duty currently applied up to now.
    fn catch_up(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.updated_at).as_secs_f64();
        self.kiln.advance(self.heat_fraction, elapsed);
        self.updated_at = now;
    }
}

/// Sensor half of the bench driver.
pub struct BenchSensor {
    state: Arc<Mutex<BenchState>>,
}

/// Heater half of the bench driver.
pub struct BenchHeater {
    state: Arc<Mutex<BenchState>>,
}

/// A sensor and heater sharing one thermal model that runs on the tokio clock.
pub fn bench_pair(kiln: SimulatedKiln) -> (BenchSensor, BenchHeater) {
    let state = Arc::new(Mutex::new(BenchState {
        kiln,
        heat_fraction: 0.0,
        updated_at: Instant::now(),
    }));
    (
        BenchSensor {
            state: Arc::clone(&state),
        },
        BenchHeater { state },
    )
}

fn lock_bench(state: &Mutex<BenchState>) -> Result<std::sync::MutexGuard<'_, BenchState>> {
    state
        .lock()
        .map_err(|_| anyhow!("bench kiln state poisoned"))
}

#[async_trait]
impl TemperatureSensor for BenchSensor {
    async fn read_temperature(&mut self) -> Result<f64> {
        let mut state = lock_bench(&self.state)?;
        state.catch_up();
        Ok(state.kiln.temperature())
    }
}

#[async_trait]
impl HeaterOutput for BenchHeater {
    async fn apply(&mut self, heat_fraction: f64, _window: Duration) -> Result<()> {
        let mut state = lock_bench(&self.state)?;
        state.catch_up();
        state.heat_fraction = heat_fraction.clamp(0.0, 1.0);
        Ok(())
    }

    async fn off(&mut self) -> Result<()> {
        self.apply(0.0, Duration::ZERO).await
    }
}

/// Thermocouple exposed through a Linux hwmon `temp*_input` file.
pub struct HwmonSensor {
    path: PathBuf,
    scale: TempScale,
    offset: f64,
}

impl HwmonSensor {
    pub fn new(path: impl Into<PathBuf>, scale: TempScale, offset: f64) -> Self {
        Self {
            path: path.into(),
            scale,
            offset,
        }
    }
}

#[async_trait]
impl TemperatureSensor for HwmonSensor {
    async fn read_temperature(&mut self) -> Result<f64> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read thermocouple at {}", self.path.display()))?;
        let millidegrees: i64 = raw
            .trim()
            .parse()
            .with_context(|| format!("unexpected thermocouple value '{}'", raw.trim()))?;
        Ok(self.scale.from_celsius(millidegrees as f64 / 1000.0) + self.offset)
    }
}

/// Trimmed moving average over the last `capacity` good readings.
///
/// The lowest and highest fifth of the window are discarded before
/// averaging, which rejects single-sample thermocouple glitches.
pub struct SmoothedSensor<S> {
    inner: S,
    window: VecDeque<f64>,
    capacity: usize,
}

impl<S> SmoothedSensor<S> {
    pub fn new(inner: S, capacity: usize) -> Self {
        Self {
            inner,
            window: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    fn trimmed_mean(&self) -> Option<f64> {
        let mut samples: Vec<f64> = self.window.iter().copied().collect();
        samples.sort_by(f64::total_cmp);
        let chop = samples.len() / 5;
        let kept = &samples[chop..samples.len() - chop];
        (!kept.is_empty()).then(|| kept.iter().sum::<f64>() / kept.len() as f64)
    }
}

#[async_trait]
impl<S: TemperatureSensor> TemperatureSensor for SmoothedSensor<S> {
    async fn read_temperature(&mut self) -> Result<f64> {
        let sample = self.inner.read_temperature().await?;
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(sample);
        self.trimmed_mean()
            .ok_or_else(|| anyhow!("no thermocouple samples yet"))
    }
}

/// Relay on a sysfs GPIO `value` file, switched on for `fraction × window`
/// then off again.
pub struct GpioHeater {
    path: PathBuf,
    cycle: Option<JoinHandle<()>>,
}

impl GpioHeater {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cycle: None,
        }
    }

    fn cancel_cycle(&mut self) {
        if let Some(cycle) = self.cycle.take() {
            cycle.abort();
        }
    }
}

async fn write_level(path: &Path, on: bool) -> Result<()> {
    tokio::fs::write(path, if on { "1" } else { "0" })
        .await
        .with_context(|| format!("failed to switch heater at {}", path.display()))
}

#[async_trait]
impl HeaterOutput for GpioHeater {
    async fn apply(&mut self, heat_fraction: f64, window: Duration) -> Result<()> {
        self.cancel_cycle();
        let heat_fraction = heat_fraction.clamp(0.0, 1.0);
        if heat_fraction <= 0.0 {
            return write_level(&self.path, false).await;
        }
        write_level(&self.path, true).await?;
        if heat_fraction >= 1.0 {
            return Ok(());
        }

        let on_for = window.mul_f64(heat_fraction);
        debug!(?on_for, ?window, "heater cycle");
        let path = self.path.clone();
        self.cycle = Some(tokio::spawn(async move {
            tokio::time::sleep(on_for).await;
            if let Err(error) = write_level(&path, false).await {
                warn!(%error, "failed to end heater cycle");
            }
        }));
        Ok(())
    }

    async fn off(&mut self) -> Result<()> {
        self.cancel_cycle();
        write_level(&self.path, false).await
    }
}

/// Trip line of a backup contactor on a sysfs GPIO `value` file.
pub struct GpioKillSwitch {
    path: PathBuf,
}

impl GpioKillSwitch {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl KillSwitch for GpioKillSwitch {
    async fn kill(&mut self) -> Result<()> {
        tokio::fs::write(&self.path, "1")
            .await
            .with_context(|| format!("failed to trip kill switch at {}", self.path.display()))
    }
}

#[cfg(test)]
#[path = "tests/hardware_tests.rs"]
mod tests;
