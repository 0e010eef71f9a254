use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use tracing::info;

/// Still-image camera collaborator. The call is synchronous; the dispatcher
/// only ever invokes it from inside a detached blocking task.
pub trait CameraDevice: Send + Sync {
    fn capture_to(&self, path: &Path) -> Result<()>;
}

/// One temperature/humidity reading from the climate sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

/// Temperature/humidity sensor collaborator. Optional capability: when the
/// sensor fails to initialize the poll job is disabled, not retried.
pub trait ClimateSensor: Send + Sync {
    fn read(&self) -> Result<ClimateReading>;
}

/// Cloud destination for rotated journal files. Best-effort: a failed ship
/// is logged and the file stays local.
#[async_trait]
pub trait LogShipper: Send + Sync {
    async fn ship(&self, path: &Path) -> Result<()>;
}

/// Actuator driver that only logs transitions. Stands in for real GPIO
/// drivers on hosts without the hardware.
pub struct LoggingDriver {
    device: &'static str,
}

impl LoggingDriver {
    pub fn new(device: &'static str) -> Box<Self> {
        Box::new(Self { device })
    }
}

impl crate::actuators::ActuatorDriver for LoggingDriver {
    fn set(&self, on: bool) {
        info!(device = self.device, on, "driving actuator");
    }
}

/// Climate sensor that ramps a simulated temperature from 20 to 30 degrees,
/// for running the node without a DHT sensor attached.
pub struct SimulatedClimate {
    next_temp: parking_lot::Mutex<f32>,
}

impl SimulatedClimate {
    pub fn new() -> Self {
        Self {
            next_temp: parking_lot::Mutex::new(20.0),
        }
    }
}

impl Default for SimulatedClimate {
    fn default() -> Self {
        Self::new()
    }
}

impl ClimateSensor for SimulatedClimate {
    fn read(&self) -> Result<ClimateReading> {
        let mut temp = self.next_temp.lock();
        *temp += 0.5;
        if *temp > 30.0 {
            *temp = 20.0;
        }
        Ok(ClimateReading {
            temperature_c: *temp,
            humidity_pct: 45.0,
        })
    }
}
