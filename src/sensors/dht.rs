//! DHT22 / AM2302 air temperature and humidity sensor.
//!
//! Single-wire protocol, bit-banged on an open-drain GPIO:
//!
//! 1. Host pulls the line low for ~3 ms, releases it for ~25 µs.
//! 2. Sensor answers with 80 µs low + 80 µs high.
//! 3. 40 data bits follow: each bit is ~50 µs low, then high for ~27 µs
//!    (`0`) or ~70 µs (`1`).
//!
//! Frame: humidity ×10 (16 bit), temperature ×10 (15 bit + sign bit),
//! checksum = low byte of the sum of the first four bytes.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: reads the bus with raw `gpio_*` calls and `ets_delay_us`.
//! On host/test: decodes a frame injected through [`sim_set_frame`].

#[cfg(not(target_os = "espidf"))]
use core::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use super::{Measurement, MeasurementType, SensorAdapter, note_failure};
use crate::error::{ReportError, SensorError};
use crate::report::{FieldValue, ReportDoc};

const MEASUREMENTS: &[Measurement] = &[
    Measurement {
        name: "air_temperature_celsius",
        ty: MeasurementType::FloatCelsius,
    },
    Measurement {
        name: "air_humidity_percentage",
        ty: MeasurementType::Percentage,
    },
    Measurement {
        name: "air_heat_index_celsius",
        ty: MeasurementType::FloatCelsius,
    },
];

/// Raw 40-bit frame as clocked off the wire.
pub type DhtFrame = [u8; 5];

/// One decoded sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DhtReading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

impl DhtReading {
    /// Apparent temperature (NOAA Rothfusz regression with the usual
    /// low/high humidity adjustments).
    pub fn heat_index_c(&self) -> f32 {
        heat_index_celsius(self.temperature_c, self.humidity_pct)
    }
}

/// Decode and checksum a raw frame.
pub fn decode_frame(frame: &DhtFrame) -> Result<DhtReading, SensorError> {
    let sum = frame[..4].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if sum != frame[4] {
        return Err(SensorError::Checksum);
    }

    let humidity = f32::from(u16::from_be_bytes([frame[0], frame[1]])) / 10.0;
    let magnitude = f32::from(u16::from_be_bytes([frame[2] & 0x7F, frame[3]])) / 10.0;
    let temperature = if frame[2] & 0x80 != 0 { -magnitude } else { magnitude };

    if humidity > 100.0 || !(-40.0..=80.0).contains(&temperature) {
        return Err(SensorError::OutOfRange);
    }
    Ok(DhtReading {
        temperature_c: temperature,
        humidity_pct: humidity,
    })
}

pub fn heat_index_celsius(temperature_c: f32, humidity_pct: f32) -> f32 {
    let t = temperature_c * 1.8 + 32.0;
    let rh = humidity_pct;

    let mut hi = 0.5 * (t + 61.0 + ((t - 68.0) * 1.2) + (rh * 0.094));
    if hi > 79.0 {
        hi = -42.379 + 2.049_015_2 * t + 10.143_331 * rh
            - 0.224_755_4 * t * rh
            - 0.006_837_83 * t * t
            - 0.054_817_17 * rh * rh
            + 0.001_228_74 * t * t * rh
            + 0.000_852_82 * t * rh * rh
            - 0.000_001_99 * t * t * rh * rh;

        if rh < 13.0 && (80.0..=112.0).contains(&t) {
            hi -= ((13.0 - rh) * 0.25) * ((17.0 - (t - 95.0).abs()) * 0.058_82).sqrt();
        } else if rh > 85.0 && (80.0..=87.0).contains(&t) {
            hi += ((rh - 85.0) * 0.1) * ((87.0 - t) * 0.2);
        }
    }
    (hi - 32.0) / 1.8
}

pub struct Dht22 {
    gpio: i32,
    /// Bus transactions started since construction.
    reads: u32,
}

impl Dht22 {
    pub fn new(gpio: i32) -> Self {
        Self { gpio, reads: 0 }
    }

    /// Take one sample from the bus.
    pub fn measure(&mut self) -> Result<DhtReading, SensorError> {
        self.reads = self.reads.wrapping_add(1);
        let frame = self.read_frame()?;
        let reading = decode_frame(&frame)?;
        debug!(
            "dht22 read #{}: {:.1} C, {:.1} %RH",
            self.reads, reading.temperature_c, reading.humidity_pct
        );
        Ok(reading)
    }

    #[cfg(target_os = "espidf")]
    fn read_frame(&mut self) -> Result<DhtFrame, SensorError> {
        use esp_idf_svc::sys::*;

        let mut frame: DhtFrame = [0; 5];

        // SAFETY: the pin is configured open-drain by hw_init and only this
        // driver touches it; the tick loop is single-threaded.
        unsafe {
            gpio_set_direction(self.gpio, gpio_mode_t_GPIO_MODE_OUTPUT);
            gpio_set_level(self.gpio, 0);
            ets_delay_us(3_000);
            gpio_set_level(self.gpio, 1);
            ets_delay_us(25);
            gpio_set_direction(self.gpio, gpio_mode_t_GPIO_MODE_INPUT);
        }

        // Sensor response: 80 µs low, 80 µs high.
        self.wait_while(false, 85)?;
        self.wait_while(true, 85)?;

        for bit in 0..40 {
            self.wait_while(false, 56)?;
            let high_us = self.wait_while(true, 75)?;
            if high_us > 40 {
                frame[bit / 8] |= 1 << (7 - bit % 8);
            }
        }
        Ok(frame)
    }

    /// Busy-wait while the line stays at `level`; returns the elapsed µs.
    #[cfg(target_os = "espidf")]
    fn wait_while(&self, level: bool, max_us: u32) -> Result<u32, SensorError> {
        let mut elapsed = 0;
        while crate::drivers::hw_init::gpio_read(self.gpio) == level {
            elapsed += 1;
            if elapsed > max_us {
                return Err(SensorError::Timeout);
            }
            // SAFETY: ROM busy-wait, no side effects.
            unsafe { esp_idf_svc::sys::ets_delay_us(1) };
        }
        Ok(elapsed)
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_frame(&mut self) -> Result<DhtFrame, SensorError> {
        let _ = self.gpio;
        let packed = SIM_FRAME.load(Ordering::Relaxed);
        if packed == SIM_ABSENT {
            return Err(SensorError::Timeout);
        }
        let bytes = packed.to_be_bytes();
        Ok([bytes[3], bytes[4], bytes[5], bytes[6], bytes[7]])
    }
}

impl SensorAdapter for Dht22 {
    fn name(&self) -> &'static str {
        "dht22"
    }

    fn measurements(&self) -> &'static [Measurement] {
        MEASUREMENTS
    }

    /// Nothing to do beyond the pin config in hw_init.  The bus is left
    /// alone so the first report tick is at least 2 s from any other read;
    /// a missing sensor shows up as `null` fields on that tick.
    fn begin(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn record<const N: usize>(&mut self, doc: &mut ReportDoc<N>) -> Result<(), ReportError> {
        // One bus transaction per report; the sensor needs 2 s between reads.
        let reading = note_failure(self.name(), self.measure());
        let field = |f: fn(&DhtReading) -> f32| FieldValue::from(reading.map(|r| f(&r)));

        MEASUREMENTS[0].write(doc, field(|r| r.temperature_c))?;
        MEASUREMENTS[1].write(doc, field(|r| r.humidity_pct))?;
        MEASUREMENTS[2].write(doc, field(DhtReading::heat_index_c))
    }
}

// ── Simulation backend ────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
const SIM_ABSENT: u64 = u64::MAX;

/// 22.0 °C, 55.0 %RH.
#[cfg(not(target_os = "espidf"))]
static SIM_FRAME: AtomicU64 = AtomicU64::new(0x02_26_00_DC_04);

/// Inject the next frame the simulated bus returns; `None` simulates a
/// sensor that never answers.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_frame(frame: Option<DhtFrame>) {
    let packed = frame.map_or(SIM_ABSENT, |f| {
        u64::from_be_bytes([0, 0, 0, f[0], f[1], f[2], f[3], f[4]])
    });
    SIM_FRAME.store(packed, Ordering::Relaxed);
}
