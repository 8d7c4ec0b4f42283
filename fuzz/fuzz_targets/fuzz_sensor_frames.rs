//! Fuzz target: DHT22 frame and DS18B20 scratchpad decoding
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - A decoded DHT sample is inside the sensor's rated range
//! - A decoded scratchpad always carried a valid CRC
//!
//! cargo fuzz run fuzz_sensor_frames

#![no_main]

use fieldnode::sensors::dht::decode_frame;
use fieldnode::sensors::soil_temperature::{crc8, decode_scratchpad};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Some(frame) = data.get(..5) {
        let frame: [u8; 5] = frame.try_into().unwrap();
        if let Ok(reading) = decode_frame(&frame) {
            assert!((0.0..=100.0).contains(&reading.humidity_pct));
            assert!((-40.0..=80.0).contains(&reading.temperature_c));
            assert!(reading.heat_index_c().is_finite());
        }
    }

    if let Some(pad) = data.get(..9) {
        let pad: [u8; 9] = pad.try_into().unwrap();
        if decode_scratchpad(&pad).is_ok() {
            assert_eq!(crc8(&pad[..8]), pad[8]);
        }
    }
});
