//! Device statistics attached to every submission.
//!
//! The server stores these next to each event: firmware version, MAC
//! address, uptime and memory headroom.  They travel as request metadata,
//! not inside the report body.

use core::fmt::Write;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// `AA:BB:CC:DD:EE:FF`
pub type MacString = heapless::String<17>;

/// Firmware identifier as the server names it.
pub type FirmwareVersion = heapless::String<64>;

/// Point-in-time device health snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStat {
    pub mac_address: MacString,
    pub version: &'static str,
    pub time_running_ms: u64,
    /// Supply voltage in millivolts (0 when not measured).
    pub vcc: u16,
    pub free_heap: u32,
    pub biggest_heap_block: u32,
    /// Main task stack high-water mark, in bytes.
    pub free_stack: u32,
}

impl DeviceStat {
    /// Collect a snapshot from the running system.
    #[cfg(target_os = "espidf")]
    pub fn collect(time_running_ms: u64) -> Self {
        use esp_idf_svc::sys::*;
        // SAFETY: read-only queries of allocator and scheduler state from
        // the main task.
        let (free_heap, biggest, stack) = unsafe {
            (
                esp_get_free_heap_size(),
                heap_caps_get_largest_free_block(MALLOC_CAP_8BIT) as u32,
                uxTaskGetStackHighWaterMark(core::ptr::null_mut()) as u32,
            )
        };
        Self {
            mac_address: format_mac(&read_mac()),
            version: env!("CARGO_PKG_VERSION"),
            time_running_ms,
            vcc: 0,
            free_heap,
            biggest_heap_block: biggest,
            free_stack: stack,
        }
    }

    /// Simulation: deterministic values so host tests see stable metadata.
    #[cfg(not(target_os = "espidf"))]
    pub fn collect(time_running_ms: u64) -> Self {
        Self {
            mac_address: format_mac(&read_mac()),
            version: env!("CARGO_PKG_VERSION"),
            time_running_ms,
            vcc: 3300,
            free_heap: 180_000,
            biggest_heap_block: 110_000,
            free_stack: 4_096,
        }
    }
}

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: the buffer is exactly the 6 bytes the API writes.
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Colon-separated uppercase hex, the form the server expects.
pub fn format_mac(mac: &MacAddress) -> MacString {
    let mut s = MacString::new();
    let _ = write!(
        s,
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
    s
}
