use std::sync::{Mutex, PoisonError};

use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum HardwareError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("spi error: {0}")]
    Spi(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    #[default]
    Low,
    High,
}

/// The four actuator lines driven by the cycle controller. Output1 is the
/// supply/power-enable line, held high for the whole sub-cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLine {
    Output1,
    Output2,
    Output3,
    Output4,
}

impl OutputLine {
    pub const ALL: [OutputLine; 4] = [
        OutputLine::Output1,
        OutputLine::Output2,
        OutputLine::Output3,
        OutputLine::Output4,
    ];

    pub fn index(self) -> usize {
        match self {
            Self::Output1 => 0,
            Self::Output2 => 1,
            Self::Output3 => 2,
            Self::Output4 => 3,
        }
    }
}

/// Four independently addressable binary actuators. The controller depends
/// only on this trait, never on a concrete variant.
pub trait OutputBank: Send + Sync {
    fn set(&self, line: OutputLine, level: Level) -> Result<(), HardwareError>;

    fn all_off(&self) -> Result<(), HardwareError> {
        for line in OutputLine::ALL {
            self.set(line, Level::Low)?;
        }
        Ok(())
    }
}

/// Single-pixel status colors on the 0-50 intensity scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndicatorColor {
    Green,
    Blue,
    Yellow,
    Red,
    Cyan,
    Magenta,
    White,
    #[default]
    Off,
}

impl IndicatorColor {
    pub fn rgb(self) -> (u8, u8, u8) {
        match self {
            Self::Green => (0, 50, 0),
            Self::Blue => (0, 0, 50),
            Self::Yellow => (32, 32, 0),
            Self::Red => (50, 0, 0),
            Self::Cyan => (0, 32, 32),
            Self::Magenta => (32, 0, 32),
            Self::White => (20, 20, 20),
            Self::Off => (0, 0, 0),
        }
    }
}

pub trait StatusIndicator: Send + Sync {
    fn set(&self, color: IndicatorColor) -> Result<(), HardwareError>;
}

/// Wall-clock source. All comparisons use the local clock of the host; the
/// indirection exists so controller tests can pin the time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// In-memory output bank: the test double, also backing hardware-less hosts.
/// Records every write so tests can assert on ordering.
#[derive(Debug, Default)]
pub struct MemoryOutputBank {
    levels: Mutex<[Level; 4]>,
    history: Mutex<Vec<(OutputLine, Level)>>,
}

impl MemoryOutputBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self, line: OutputLine) -> Level {
        self.levels.lock().unwrap_or_else(PoisonError::into_inner)[line.index()]
    }

    pub fn all_low(&self) -> bool {
        self.levels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .all(|level| *level == Level::Low)
    }

    pub fn history(&self) -> Vec<(OutputLine, Level)> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl OutputBank for MemoryOutputBank {
    fn set(&self, line: OutputLine, level: Level) -> Result<(), HardwareError> {
        self.levels.lock().unwrap_or_else(PoisonError::into_inner)[line.index()] = level;
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((line, level));
        Ok(())
    }
}

/// In-memory indicator double.
#[derive(Debug, Default)]
pub struct MemoryIndicator {
    color: Mutex<IndicatorColor>,
}

impl MemoryIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn color(&self) -> IndicatorColor {
        *self.color.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatusIndicator for MemoryIndicator {
    fn set(&self, color: IndicatorColor) -> Result<(), HardwareError> {
        *self.color.lock().unwrap_or_else(PoisonError::into_inner) = color;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn memory_bank_tracks_levels_and_history() {
        let bank = MemoryOutputBank::new();
        assert!(bank.all_low());

        bank.set(OutputLine::Output2, Level::High).unwrap();
        assert_eq!(bank.level(OutputLine::Output2), Level::High);
        assert!(!bank.all_low());

        bank.all_off().unwrap();
        assert!(bank.all_low());
        assert_eq!(
            bank.history().first(),
            Some(&(OutputLine::Output2, Level::High))
        );
    }

    #[test]
    fn palette_matches_operating_states() {
        assert_eq!(IndicatorColor::Green.rgb(), (0, 50, 0));
        assert_eq!(IndicatorColor::Blue.rgb(), (0, 0, 50));
        assert_eq!(IndicatorColor::Off.rgb(), (0, 0, 0));
    }

    #[test]
    fn indicator_double_remembers_last_color() {
        let indicator = MemoryIndicator::new();
        assert_eq!(indicator.color(), IndicatorColor::Off);

        indicator.set(IndicatorColor::Green).unwrap();
        assert_eq!(indicator.color(), IndicatorColor::Green);
    }
}
