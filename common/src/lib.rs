pub mod cancel;
pub mod config;
pub mod controller;
pub mod hardware;
pub mod types;
pub mod window;

pub use cancel::CancelToken;
pub use config::{ScheduleTime, Settings, SettingsError, SettingsUpdate};
pub use controller::Controller;
pub use hardware::{
    Clock, HardwareError, IndicatorColor, Level, MemoryIndicator, MemoryOutputBank, OutputBank,
    OutputLine, StatusIndicator, SystemClock,
};
pub use types::OperationState;
pub use window::TimeWindow;
