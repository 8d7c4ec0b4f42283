//! DS18B20 soil temperature sensor on a 1-Wire bus.
//!
//! A single sensor per bus, so every transaction addresses it with
//! SKIP ROM.  A measurement is:
//!
//! ```text
//!   reset ─ SKIP ROM ─ CONVERT T ─ wait 750 ms ─ reset ─ SKIP ROM ─ READ SCRATCHPAD (9 bytes)
//! ```
//!
//! Byte 8 of the scratchpad is a Dallas CRC-8 over bytes 0..8; bytes 0..2
//! are the temperature in 1/16 °C, little-endian two's complement.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: bit-banged with raw `gpio_*` calls and `ets_delay_us`.
//! On host/test: the scratchpad is synthesised from [`sim_set_raw`].

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicI32, Ordering};

use log::debug;

use super::{Measurement, MeasurementType, SensorAdapter, note_failure};
use crate::error::{ReportError, SensorError};
use crate::report::ReportDoc;

const MEASUREMENTS: &[Measurement] = &[Measurement {
    name: "soil_temperature_celsius",
    ty: MeasurementType::FloatCelsius,
}];

#[cfg(target_os = "espidf")]
const CMD_SKIP_ROM: u8 = 0xCC;
#[cfg(target_os = "espidf")]
const CMD_CONVERT_T: u8 = 0x44;
#[cfg(target_os = "espidf")]
const CMD_READ_SCRATCHPAD: u8 = 0xBE;

/// Power-on value of the temperature register (85 °C): conversion never ran.
const POWER_ON_RAW: i16 = 0x0550;

pub type Scratchpad = [u8; 9];

/// Dallas/Maxim CRC-8 (poly x^8 + x^5 + x^4 + 1, reflected).
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |mut crc, &byte| {
        let mut b = byte;
        for _ in 0..8 {
            let mix = (crc ^ b) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            b >>= 1;
        }
        crc
    })
}

/// Validate a scratchpad and convert it to °C.
pub fn decode_scratchpad(pad: &Scratchpad) -> Result<f32, SensorError> {
    if pad.iter().all(|b| *b == 0xFF) || pad.iter().all(|b| *b == 0) {
        return Err(SensorError::NotPresent);
    }
    if crc8(&pad[..8]) != pad[8] {
        return Err(SensorError::Checksum);
    }
    let raw = i16::from_le_bytes([pad[0], pad[1]]);
    if raw == POWER_ON_RAW {
        return Err(SensorError::Timeout);
    }
    Ok(f32::from(raw) / 16.0)
}

pub struct Ds18b20 {
    gpio: i32,
}

impl Ds18b20 {
    pub fn new(gpio: i32) -> Self {
        Self { gpio }
    }

    /// Run one conversion and read it back.  Blocks for ~750 ms.
    pub fn measure(&mut self) -> Result<f32, SensorError> {
        let pad = self.read_scratchpad()?;
        let celsius = decode_scratchpad(&pad)?;
        debug!("ds18b20: {:.2} C", celsius);
        Ok(celsius)
    }

    #[cfg(target_os = "espidf")]
    fn read_scratchpad(&mut self) -> Result<Scratchpad, SensorError> {
        self.reset()?;
        self.write_byte(CMD_SKIP_ROM);
        self.write_byte(CMD_CONVERT_T);
        crate::drivers::hw_init::delay_ms(750);

        self.reset()?;
        self.write_byte(CMD_SKIP_ROM);
        self.write_byte(CMD_READ_SCRATCHPAD);
        let mut pad: Scratchpad = [0; 9];
        for byte in &mut pad {
            *byte = self.read_byte();
        }
        Ok(pad)
    }

    /// Reset pulse; `NotPresent` if nothing pulls the line low in reply.
    #[cfg(target_os = "espidf")]
    fn reset(&self) -> Result<(), SensorError> {
        use crate::drivers::hw_init::{gpio_read, gpio_write};
        use esp_idf_svc::sys::ets_delay_us;

        gpio_write(self.gpio, false);
        // SAFETY: ROM busy-waits, no side effects.
        unsafe { ets_delay_us(480) };
        gpio_write(self.gpio, true);
        unsafe { ets_delay_us(70) };
        let present = !gpio_read(self.gpio);
        unsafe { ets_delay_us(410) };
        if present { Ok(()) } else { Err(SensorError::NotPresent) }
    }

    #[cfg(target_os = "espidf")]
    fn write_byte(&self, byte: u8) {
        use crate::drivers::hw_init::gpio_write;
        use esp_idf_svc::sys::ets_delay_us;

        for bit in 0..8 {
            let one = (byte >> bit) & 1 != 0;
            gpio_write(self.gpio, false);
            // SAFETY: ROM busy-waits, no side effects.
            unsafe { ets_delay_us(if one { 6 } else { 60 }) };
            gpio_write(self.gpio, true);
            unsafe { ets_delay_us(if one { 64 } else { 10 }) };
        }
    }

    #[cfg(target_os = "espidf")]
    fn read_byte(&self) -> u8 {
        use crate::drivers::hw_init::{gpio_read, gpio_write};
        use esp_idf_svc::sys::ets_delay_us;

        let mut byte = 0;
        for bit in 0..8 {
            gpio_write(self.gpio, false);
            // SAFETY: ROM busy-waits, no side effects.
            unsafe { ets_delay_us(6) };
            gpio_write(self.gpio, true);
            unsafe { ets_delay_us(9) };
            if gpio_read(self.gpio) {
                byte |= 1 << bit;
            }
            unsafe { ets_delay_us(55) };
        }
        byte
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_scratchpad(&mut self) -> Result<Scratchpad, SensorError> {
        let _ = self.gpio;
        let raw = SIM_RAW.load(Ordering::Relaxed);
        let Ok(raw) = i16::try_from(raw) else {
            return Err(SensorError::NotPresent);
        };
        let t = raw.to_le_bytes();
        // TH, TL, config (12 bit), reserved.
        let mut pad: Scratchpad = [t[0], t[1], 0x4B, 0x46, 0x7F, 0xFF, 0x0C, 0x10, 0];
        pad[8] = crc8(&pad[..8]);
        Ok(pad)
    }
}

impl SensorAdapter for Ds18b20 {
    fn name(&self) -> &'static str {
        "ds18b20"
    }

    fn measurements(&self) -> &'static [Measurement] {
        MEASUREMENTS
    }

    #[cfg(target_os = "espidf")]
    fn begin(&mut self) -> Result<(), SensorError> {
        self.reset()
    }

    #[cfg(not(target_os = "espidf"))]
    fn begin(&mut self) -> Result<(), SensorError> {
        self.read_scratchpad().map(|_| ())
    }

    fn record<const N: usize>(&mut self, doc: &mut ReportDoc<N>) -> Result<(), ReportError> {
        let reading = note_failure(self.name(), self.measure());
        MEASUREMENTS[0].write(doc, reading)
    }
}

// ── Simulation backend ────────────────────────────────────────

/// Out of `i16` range: no sensor on the bus.
#[cfg(not(target_os = "espidf"))]
const SIM_ABSENT: i32 = i32::MIN;

/// 18.5 °C.
#[cfg(not(target_os = "espidf"))]
static SIM_RAW: AtomicI32 = AtomicI32::new(18 * 16 + 8);

/// Set the raw 1/16 °C register the simulated sensor returns; `None`
/// removes the sensor from the bus.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_raw(raw: Option<i16>) {
    SIM_RAW.store(raw.map_or(SIM_ABSENT, i32::from), Ordering::Relaxed);
}
