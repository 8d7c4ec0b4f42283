//! Resistive soil moisture sensor.
//!
//! Two electrodes in a voltage divider, read by ADC1.  The sensor is only
//! powered while sampling to slow electrode corrosion: power on, wait for
//! the divider to settle, take one oneshot read, power off.
//!
//! The ADC samples at 12 bits; the value is reported uncalibrated as a
//! 10-bit count (0-1023), the range the server accepts for raw analog
//! reads.  Wetter soil conducts better and reads lower.

use log::debug;

use super::{Measurement, MeasurementType, SensorAdapter, note_failure};
use crate::config::NodeConfig;
use crate::drivers::hw_init;
use crate::error::{ReportError, SensorError};
use crate::pins;
use crate::report::ReportDoc;

const MEASUREMENTS: &[Measurement] = &[Measurement {
    name: "soil_resistivity_raw",
    ty: MeasurementType::RawAnalogRead,
}];

/// Full-scale count of the 12-bit ADC.
const ADC_MAX: u16 = 4095;

/// Bits dropped to bring a 12-bit sample down to the 10-bit report scale.
const REPORT_SHIFT: u32 = 2;

pub struct SoilResistivitySensor {
    power_gpio: i32,
    adc_channel: u32,
    settle_ms: u32,
}

impl SoilResistivitySensor {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            power_gpio: pins::SOIL_SENSOR_POWER_GPIO,
            adc_channel: pins::SOIL_SENSOR_ADC_CHANNEL,
            settle_ms: config.soil_settle_ms,
        }
    }

    /// Power the sensor, sample once, power it down again.  Returns the
    /// 10-bit count.
    pub fn measure(&mut self) -> Result<u16, SensorError> {
        hw_init::gpio_write(self.power_gpio, true);
        hw_init::delay_ms(self.settle_ms);
        let raw = hw_init::adc1_read(self.adc_channel);
        hw_init::gpio_write(self.power_gpio, false);

        let raw = raw?;
        if raw > ADC_MAX {
            return Err(SensorError::OutOfRange);
        }
        let scaled = raw >> REPORT_SHIFT;
        debug!("soil sensor: adc={} reported={}", raw, scaled);
        Ok(scaled)
    }
}

impl SensorAdapter for SoilResistivitySensor {
    fn name(&self) -> &'static str {
        "soil-resistivity"
    }

    fn measurements(&self) -> &'static [Measurement] {
        MEASUREMENTS
    }

    fn begin(&mut self) -> Result<(), SensorError> {
        hw_init::gpio_write(self.power_gpio, false);
        Ok(())
    }

    fn record<const N: usize>(&mut self, doc: &mut ReportDoc<N>) -> Result<(), ReportError> {
        let reading = note_failure(self.name(), self.measure());
        MEASUREMENTS[0].write(doc, reading)
    }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;
    use crate::report::Report;
    use crate::sensors::RAW_ANALOG_MAX;

    // The simulated ADC is process-wide, so every case runs in one test.
    #[test]
    fn samples_scales_and_powers_down() {
        let mut sensor = SoilResistivitySensor::new(&NodeConfig::default());
        sensor.begin().unwrap();

        hw_init::sim::set_adc(pins::SOIL_SENSOR_ADC_CHANNEL, Some(1870));
        assert_eq!(sensor.measure(), Ok(467));
        assert!(!hw_init::gpio_read(pins::SOIL_SENSOR_POWER_GPIO));
        let report = Report::<64>::build(|doc| sensor.record(doc)).unwrap();
        assert_eq!(report.as_str(), r#"{"soil_resistivity_raw":467}"#);

        // A near full-scale sample stays inside the server's 0..=1024.
        hw_init::sim::set_adc(pins::SOIL_SENSOR_ADC_CHANNEL, Some(4000));
        let report = Report::<64>::build(|doc| sensor.record(doc)).unwrap();
        assert_eq!(report.as_str(), r#"{"soil_resistivity_raw":1000}"#);

        hw_init::sim::set_adc(pins::SOIL_SENSOR_ADC_CHANNEL, Some(ADC_MAX));
        let top = sensor.measure().unwrap();
        assert_eq!(top, 1023);
        assert!(u32::from(top) <= RAW_ANALOG_MAX);

        hw_init::sim::set_adc(pins::SOIL_SENSOR_ADC_CHANNEL, Some(ADC_MAX + 1));
        assert_eq!(sensor.measure(), Err(SensorError::OutOfRange));
        let report = Report::<64>::build(|doc| sensor.record(doc)).unwrap();
        assert_eq!(report.as_str(), r#"{"soil_resistivity_raw":null}"#);

        hw_init::sim::set_adc(pins::SOIL_SENSOR_ADC_CHANNEL, Some(1870));
    }
}
