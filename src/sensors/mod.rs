//! Sensor subsystem: individual drivers and the aggregating [`SensorSet`].
//!
//! Every driver implements [`SensorAdapter`]: a one-time `begin()` and a
//! `record()` that samples the hardware and writes one report field per
//! measured quantity.  Reads are never cached across report ticks; a failed
//! read is written as `null` so the report keeps its shape.

pub mod dht;
pub mod soil_resistivity;
pub mod soil_temperature;

use log::warn;

use crate::app::ports::SensorPort;
use crate::error::{Error, ReportError, SensorError};
use crate::report::{FieldValue, ReportDoc};

use dht::Dht22;
use soil_resistivity::SoilResistivitySensor;
use soil_temperature::Ds18b20;

/// Unit / encoding of a field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementType {
    /// Degrees Celsius, -100 to 100.
    FloatCelsius,
    /// 0 to 100.
    Percentage,
    /// Uncalibrated 10-bit analog count, 0 to 1024.
    RawAnalogRead,
}

impl MeasurementType {
    /// Whether the server accepts `value` for a field of this type.
    /// `null` always passes; it marks a failed read.
    pub fn accepts(self, value: FieldValue) -> bool {
        let v = match value {
            FieldValue::Missing => return true,
            FieldValue::Float(v) if !v.is_finite() => return true,
            FieldValue::Float(v) => f64::from(v),
            FieldValue::Unsigned(v) => f64::from(v),
        };
        match self {
            Self::FloatCelsius => (-100.0..=100.0).contains(&v),
            Self::Percentage => (0.0..=100.0).contains(&v),
            Self::RawAnalogRead => {
                matches!(value, FieldValue::Unsigned(raw) if raw <= RAW_ANALOG_MAX)
            }
        }
    }
}

/// Largest raw analog count the server accepts.
pub const RAW_ANALOG_MAX: u32 = 1024;

/// Static description of one report field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    pub name: &'static str,
    pub ty: MeasurementType,
}

impl Measurement {
    /// Write `value` under this field's name, or `null` when the server
    /// would reject it for this field's type.
    pub fn write<const N: usize>(
        &self,
        doc: &mut ReportDoc<N>,
        value: impl Into<FieldValue>,
    ) -> Result<(), ReportError> {
        let value = value.into();
        if self.ty.accepts(value) {
            doc.set(self.name, value)
        } else {
            warn!("{}: {:?} outside {:?} range, sending null", self.name, value, self.ty);
            doc.set(self.name, FieldValue::Missing)
        }
    }
}

/// Uniform interface of a single sensor driver.
pub trait SensorAdapter {
    /// Short name for logs and fault events.
    fn name(&self) -> &'static str;

    /// Fields this sensor writes, in write order.
    fn measurements(&self) -> &'static [Measurement];

    /// One-time initialisation.  Called once at setup.
    fn begin(&mut self) -> Result<(), SensorError>;

    /// Sample the hardware and write every field in
    /// [`measurements`](Self::measurements) order.
    fn record<const N: usize>(&mut self, doc: &mut ReportDoc<N>) -> Result<(), ReportError>;
}

/// Log a failed read without interrupting the report.
pub(crate) fn note_failure<T>(
    sensor: &str,
    reading: Result<T, SensorError>,
) -> Result<T, SensorError> {
    reading.inspect_err(|e| warn!("{}: read failed ({})", sensor, e))
}

/// The node's sensor complement, in report order.
pub struct SensorSet {
    pub air: Dht22,
    pub soil_resistivity: SoilResistivitySensor,
    pub soil_temperature: Ds18b20,
}

impl SensorSet {
    pub fn new(
        air: Dht22,
        soil_resistivity: SoilResistivitySensor,
        soil_temperature: Ds18b20,
    ) -> Self {
        Self {
            air,
            soil_resistivity,
            soil_temperature,
        }
    }

    /// Every field the set writes, in report order.
    pub fn measurements(&self) -> impl Iterator<Item = &'static Measurement> {
        self.air
            .measurements()
            .iter()
            .chain(self.soil_resistivity.measurements())
            .chain(self.soil_temperature.measurements())
    }
}

impl SensorPort for SensorSet {
    fn begin_all(&mut self, on_error: &mut dyn FnMut(&'static str, Error)) {
        let results = [
            (self.air.name(), self.air.begin()),
            (self.soil_resistivity.name(), self.soil_resistivity.begin()),
            (self.soil_temperature.name(), self.soil_temperature.begin()),
        ];
        for (name, result) in results {
            if let Err(e) = result {
                on_error(name, e.into());
            }
        }
    }

    fn record<const N: usize>(&mut self, doc: &mut ReportDoc<N>) -> Result<(), ReportError> {
        self.air.record(doc)?;
        self.soil_resistivity.record(doc)?;
        self.soil_temperature.record(doc)
    }
}
