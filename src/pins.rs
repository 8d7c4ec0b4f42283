//! GPIO / peripheral pin assignments for the field node board (ESP32-DevKitC).
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Air temperature & humidity (DHT22 / AM2302, single-wire)
// ---------------------------------------------------------------------------

/// Open-drain data line with 10 kΩ pull-up.
pub const AIR_DHT_GPIO: i32 = 4;

// ---------------------------------------------------------------------------
// Soil temperature (DS18B20 sensor, 1-Wire)
// ---------------------------------------------------------------------------

/// 1-Wire bus with 4.7 kΩ pull-up.
pub const SOIL_TEMP_ONEWIRE_GPIO: i32 = 5;

// ---------------------------------------------------------------------------
// Soil resistivity sensor
// ---------------------------------------------------------------------------

/// Digital output powering the sensor only while sampling (limits electrolysis).
pub const SOIL_SENSOR_POWER_GPIO: i32 = 13;
/// Sensor divider output.  ADC1 channel 6 (GPIO 34, input only).
pub const SOIL_SENSOR_ADC_GPIO: i32 = 34;
/// ADC1 channel number for [`SOIL_SENSOR_ADC_GPIO`].
pub const SOIL_SENSOR_ADC_CHANNEL: u32 = 6;

// ---------------------------------------------------------------------------
// Factory reset button (active-low with pull-up)
// ---------------------------------------------------------------------------

/// BOOT button on the dev kit, reused as the factory reset button.
pub const FACTORY_RESET_GPIO: i32 = 0;
