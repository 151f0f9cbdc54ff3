//! Raspberry Pi hardware: relay outputs on the header pins, a single-pixel
//! status LED fed over SPI, and the ambient probe suite (DHT11, DS18B20,
//! PCF8591 ADC, water-level switch).

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use growbox_common::{
    HardwareError, IndicatorColor, Level, OutputBank, OutputLine, StatusIndicator, SystemClock,
};
use rppal::gpio::{Gpio, InputPin, IoPin, Level as PinLevel, Mode, OutputPin};
use rppal::i2c::I2c;
use rppal::spi::{Bus, Mode as SpiMode, SlaveSelect, Spi};
use tracing::warn;

use crate::hardware::Hardware;
use crate::sensors::{SensorReadings, SensorSuite, WaterLevel};

const OUTPUT1_PIN: u8 = 6;
const OUTPUT2_PIN: u8 = 19;
const OUTPUT3_PIN: u8 = 20;
const OUTPUT4_PIN: u8 = 26;
const WATER_LEVEL_PIN: u8 = 15;
const DHT11_PIN: u8 = 5;

const DS18B20_DEVICE: &str = "/sys/bus/w1/devices/28-01204c43b99b/w1_slave";
const PCF8591_ADDR: u16 = 0x48;
const EC_CHANNEL: u8 = 0;
const BRIGHTNESS_CHANNEL: u8 = 1;
const VREF: f32 = 3.3;
// EC correction factor; needs per-probe calibration.
const EC_FACTOR: f32 = 1.0;
const SENSOR_RETRY_COUNT: usize = 5;

pub fn build() -> anyhow::Result<Hardware> {
    let gpio = Gpio::new().context("failed to open gpio")?;

    let outputs = Arc::new(RelayBank::new(&gpio)?);
    outputs.all_off()?;

    Ok(Hardware {
        outputs,
        indicator: Arc::new(NeoPixelIndicator::new()?),
        clock: Arc::new(SystemClock),
        sensors: Arc::new(PiSensors::new(&gpio)?),
    })
}

struct RelayBank {
    pins: Mutex<[OutputPin; 4]>,
}

impl RelayBank {
    fn new(gpio: &Gpio) -> anyhow::Result<Self> {
        let pins = [
            gpio.get(OUTPUT1_PIN).context("output1 pin")?.into_output_low(),
            gpio.get(OUTPUT2_PIN).context("output2 pin")?.into_output_low(),
            gpio.get(OUTPUT3_PIN).context("output3 pin")?.into_output_low(),
            gpio.get(OUTPUT4_PIN).context("output4 pin")?.into_output_low(),
        ];
        Ok(Self {
            pins: Mutex::new(pins),
        })
    }
}

impl OutputBank for RelayBank {
    fn set(&self, line: OutputLine, level: Level) -> Result<(), HardwareError> {
        let mut pins = self.pins.lock().unwrap_or_else(PoisonError::into_inner);
        match level {
            Level::High => pins[line.index()].set_high(),
            Level::Low => pins[line.index()].set_low(),
        }
        Ok(())
    }
}

/// WS2812 pixel driven from the SPI MOSI line: one SPI byte per color bit
/// at 6.4 MHz approximates the 1.25 us bit period.
struct NeoPixelIndicator {
    spi: Mutex<Spi>,
}

impl NeoPixelIndicator {
    fn new() -> anyhow::Result<Self> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, 6_400_000, SpiMode::Mode0)
            .context("failed to open spi for the status pixel")?;
        Ok(Self {
            spi: Mutex::new(spi),
        })
    }
}

impl StatusIndicator for NeoPixelIndicator {
    fn set(&self, color: IndicatorColor) -> Result<(), HardwareError> {
        let (r, g, b) = color.rgb();

        // Wire order is GRB, most significant bit first.
        let mut frame = Vec::with_capacity(24 + 64);
        for byte in [g, r, b] {
            for bit in (0..8).rev() {
                frame.push(if byte >> bit & 1 == 1 {
                    0b1111_1000
                } else {
                    0b1100_0000
                });
            }
        }
        // Quiet tail holds the line low past the 50 us latch threshold.
        frame.resize(frame.len() + 64, 0);

        let mut spi = self.spi.lock().unwrap_or_else(PoisonError::into_inner);
        spi.write(&frame)
            .map_err(|err| HardwareError::Spi(err.to_string()))?;
        Ok(())
    }
}

struct PiSensors {
    water_level: InputPin,
    dht: Mutex<IoPin>,
    adc: Mutex<I2c>,
    ds18b20_path: PathBuf,
}

impl PiSensors {
    fn new(gpio: &Gpio) -> anyhow::Result<Self> {
        let water_level = gpio
            .get(WATER_LEVEL_PIN)
            .context("water level pin")?
            .into_input_pulldown();
        let dht = gpio.get(DHT11_PIN).context("dht11 pin")?.into_io(Mode::Input);

        let mut adc = I2c::new().context("failed to open i2c bus")?;
        adc.set_slave_address(PCF8591_ADDR)
            .context("pcf8591 address")?;

        Ok(Self {
            water_level,
            dht: Mutex::new(dht),
            adc: Mutex::new(adc),
            ds18b20_path: PathBuf::from(DS18B20_DEVICE),
        })
    }

    fn read_air(&self) -> Option<(f32, f32)> {
        let mut pin = self.dht.lock().unwrap_or_else(PoisonError::into_inner);
        for attempt in 0..SENSOR_RETRY_COUNT {
            match read_dht11(&mut pin) {
                Ok(reading) => return Some(reading),
                Err(err) => {
                    if attempt + 1 == SENSOR_RETRY_COUNT {
                        warn!("dht11 read failed after {SENSOR_RETRY_COUNT} attempts: {err}");
                    }
                    thread::sleep(Duration::from_millis(500));
                }
            }
        }
        None
    }

    fn read_water_temp(&self) -> Option<f32> {
        match std::fs::read_to_string(&self.ds18b20_path) {
            Ok(raw) => parse_w1_slave(&raw),
            Err(err) => {
                warn!("water temperature read failed: {err}");
                None
            }
        }
    }

    fn read_adc(&self, channel: u8) -> Option<u8> {
        let mut adc = self.adc.lock().unwrap_or_else(PoisonError::into_inner);
        match sample_adc(&mut adc, channel) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("adc read failed on channel {channel}: {err}");
                None
            }
        }
    }
}

impl SensorSuite for PiSensors {
    fn read(&self) -> SensorReadings {
        let air = self.read_air();
        let water_temp = self.read_water_temp();

        let ec_value = self.read_adc(EC_CHANNEL).map(|raw| {
            let voltage = f32::from(raw) / 255.0 * VREF;
            let temp = water_temp.unwrap_or(25.0);
            (voltage / VREF) * EC_FACTOR * (1.0 + 0.02 * (temp - 25.0))
        });
        let brightness = self.read_adc(BRIGHTNESS_CHANNEL);

        SensorReadings {
            // Switch sits high when the float has dropped.
            water_level: Some(if self.water_level.is_high() {
                WaterLevel::Low
            } else {
                WaterLevel::Normal
            }),
            humidity: air.map(|(_, humidity)| humidity),
            temperature: air.map(|(temperature, _)| temperature),
            water_temp,
            ec_value,
            brightness,
        }
    }
}

/// The first conversion after a channel switch is stale; read twice.
fn sample_adc(adc: &mut I2c, channel: u8) -> Result<u8, rppal::i2c::Error> {
    adc.smbus_send_byte(channel)?;
    adc.smbus_receive_byte()?;
    adc.smbus_receive_byte()
}

fn parse_w1_slave(raw: &str) -> Option<f32> {
    let mut lines = raw.lines();
    if !lines.next()?.trim_end().ends_with("YES") {
        return None;
    }
    let (_, millidegrees) = lines.next()?.split_once("t=")?;
    let value: f32 = millidegrees.trim().parse().ok()?;
    Some(value / 1000.0)
}

/// Single-wire DHT11 exchange: host start pulse, sensor acknowledge, then
/// 40 data bits classified by high-pulse width. Checksummed; callers retry.
fn read_dht11(pin: &mut IoPin) -> Result<(f32, f32), HardwareError> {
    pin.set_mode(Mode::Output);
    pin.set_low();
    thread::sleep(Duration::from_millis(18));
    pin.set_high();
    pin.set_mode(Mode::Input);

    // Sensor acknowledges with ~80 us low then ~80 us high.
    wait_edge(pin, PinLevel::Low, Duration::from_micros(200))?;
    wait_edge(pin, PinLevel::High, Duration::from_micros(200))?;
    wait_edge(pin, PinLevel::Low, Duration::from_micros(200))?;

    let mut data = [0u8; 5];
    for bit in 0..40 {
        wait_edge(pin, PinLevel::High, Duration::from_micros(200))?;
        let width = pulse_width(pin, PinLevel::High, Duration::from_micros(200))?;
        // ~26 us high is a zero, ~70 us is a one.
        if width > Duration::from_micros(48) {
            data[bit / 8] |= 1 << (7 - bit % 8);
        }
    }

    let sum = data[0]
        .wrapping_add(data[1])
        .wrapping_add(data[2])
        .wrapping_add(data[3]);
    if sum != data[4] {
        return Err(HardwareError::Gpio("dht11 checksum mismatch".to_string()));
    }

    // DHT11 reports integer degrees/percent; the decimal bytes stay zero.
    Ok((f32::from(data[2]), f32::from(data[0])))
}

fn wait_edge(pin: &IoPin, level: PinLevel, timeout: Duration) -> Result<(), HardwareError> {
    let deadline = Instant::now() + timeout;
    while pin.read() != level {
        if Instant::now() > deadline {
            return Err(HardwareError::Gpio(
                "dht11 timed out waiting for edge".to_string(),
            ));
        }
    }
    Ok(())
}

fn pulse_width(pin: &IoPin, level: PinLevel, timeout: Duration) -> Result<Duration, HardwareError> {
    let started = Instant::now();
    let deadline = started + timeout;
    while pin.read() == level {
        if Instant::now() > deadline {
            return Err(HardwareError::Gpio("dht11 pulse overran".to_string()));
        }
    }
    Ok(started.elapsed())
}
