use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WaterLevel {
    Low,
    Normal,
}

/// One snapshot of every ambient reading. Absent values degrade to null in
/// the status payload rather than failing the request.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SensorReadings {
    pub water_level: Option<WaterLevel>,
    pub humidity: Option<f32>,
    pub temperature: Option<f32>,
    pub water_temp: Option<f32>,
    pub ec_value: Option<f32>,
    pub brightness: Option<u8>,
}

/// Ambient sensor collaborator. Owns its bus/device handles; the cycle
/// controller never touches these directly.
pub trait SensorSuite: Send + Sync {
    fn read(&self) -> SensorReadings;
}
