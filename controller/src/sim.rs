//! Hardware stand-ins so the controller and web layer can be exercised end
//! to end without a Raspberry Pi.

use std::sync::atomic::{AtomicU64, Ordering};

use growbox_common::{
    HardwareError, IndicatorColor, Level, MemoryOutputBank, OutputBank, OutputLine,
    StatusIndicator,
};
use tracing::info;

use crate::sensors::{SensorReadings, SensorSuite, WaterLevel};

/// Mirrors levels in memory and logs every transition.
#[derive(Debug, Default)]
pub struct SimulatedOutputs {
    bank: MemoryOutputBank,
}

impl SimulatedOutputs {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputBank for SimulatedOutputs {
    fn set(&self, line: OutputLine, level: Level) -> Result<(), HardwareError> {
        if self.bank.level(line) != level {
            info!("output {line:?} -> {level:?}");
        }
        self.bank.set(line, level)
    }
}

pub struct SimulatedIndicator;

impl StatusIndicator for SimulatedIndicator {
    fn set(&self, color: IndicatorColor) -> Result<(), HardwareError> {
        info!("indicator -> {color:?} {:?}", color.rgb());
        Ok(())
    }
}

/// Deterministic tick-based wobble in a plausible grow-box range; replaced
/// by the real probes on the Pi.
#[derive(Debug, Default)]
pub struct SimulatedSensors {
    tick: AtomicU64,
}

impl SimulatedSensors {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SensorSuite for SimulatedSensors {
    fn read(&self) -> SensorReadings {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed);

        SensorReadings {
            water_level: Some(WaterLevel::Normal),
            humidity: Some(55.0 + (tick % 6) as f32 * 0.5),
            temperature: Some(22.0 + (tick % 8) as f32 * 0.2),
            water_temp: Some(19.5 + (tick % 4) as f32 * 0.1),
            ec_value: Some(1.1 + (tick % 5) as f32 * 0.02),
            brightness: Some(120 + (tick % 16) as u8),
        }
    }
}
