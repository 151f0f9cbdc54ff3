use std::sync::Arc;

use growbox_common::{Clock, OutputBank, StatusIndicator};

use crate::sensors::SensorSuite;

/// Everything the app wires together at startup. Concrete variants come
/// from `sim` (hardware-less hosts) or `rpi` (real Raspberry Pi I/O).
pub struct Hardware {
    pub outputs: Arc<dyn OutputBank>,
    pub indicator: Arc<dyn StatusIndicator>,
    pub clock: Arc<dyn Clock>,
    pub sensors: Arc<dyn SensorSuite>,
}

#[cfg(not(feature = "rpi"))]
pub fn build() -> anyhow::Result<Hardware> {
    use growbox_common::SystemClock;

    Ok(Hardware {
        outputs: Arc::new(crate::sim::SimulatedOutputs::new()),
        indicator: Arc::new(crate::sim::SimulatedIndicator),
        clock: Arc::new(SystemClock),
        sensors: Arc::new(crate::sim::SimulatedSensors::new()),
    })
}

#[cfg(feature = "rpi")]
pub fn build() -> anyhow::Result<Hardware> {
    crate::rpi::build()
}
