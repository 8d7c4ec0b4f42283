//! Panic reporting and the fatal halt path.
//!
//! A fatal error (report overflow, duplicate field, callback failure)
//! becomes a [`PanicReport`].  It is persisted in a 4-slot NVS ring under
//! the "panic" namespace, handed to the server while a token is held, and
//! then the node calls [`halt`].
//!
//! [`PanicOutbox`] owns the ring at runtime.  Reports left from earlier
//! boots are read without being erased; a slot is deleted only once the
//! server has accepted its report, so a reboot before delivery loses
//! nothing.

use core::fmt::Write;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::StoragePort;
use crate::error::CommsError;

pub const PANIC_NAMESPACE: &str = "panic";
const PANIC_RING_SLOTS: usize = 4;
const PANIC_INDEX_KEY: &str = "idx";

/// A report together with the ring slot holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPanic {
    pub slot: usize,
    pub report: PanicReport,
}

pub type PanicReports = heapless::Vec<StoredPanic, PANIC_RING_SLOTS>;

/// What went wrong and where, in the shape the server's panic endpoint takes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanicReport {
    pub file: heapless::String<48>,
    pub line: u32,
    pub func: heapless::String<32>,
    pub msg: heapless::String<96>,
}

/// Copy as much of `src` as fits, never splitting a UTF-8 sequence.
fn truncated<const N: usize>(src: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in src.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

impl PanicReport {
    pub fn new(file: &str, line: u32, func: &str, msg: &str) -> Self {
        // Keep the tail of long paths; the file name is what matters.
        let file = match file.char_indices().rev().nth(47) {
            Some((at, _)) if file.len() > 48 => &file[at..],
            _ => file,
        };
        Self {
            file: truncated(file),
            line,
            func: truncated(func),
            msg: truncated(msg),
        }
    }

    /// Build a report from anything `Display`, truncating the message.
    pub fn from_error(file: &str, line: u32, func: &str, error: &impl core::fmt::Display) -> Self {
        let mut msg = heapless::String::<96>::new();
        // Overflow only truncates.
        let _ = write!(TruncatingWriter(&mut msg), "{error}");
        let mut report = Self::new(file, line, func, "");
        report.msg = msg;
        report
    }
}

/// `fmt::Write` into a heapless string that drops what doesn't fit.
struct TruncatingWriter<'a, const N: usize>(&'a mut heapless::String<N>);

impl<const N: usize> Write for TruncatingWriter<'_, N> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// NVS-backed ring buffer of panic reports.
#[derive(Default)]
pub struct PanicLog {
    write_index: usize,
}

impl PanicLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the write index from storage, or default to 0.
    pub fn init(&mut self, nvs: &dyn StoragePort) {
        let mut buf = [0u8; 4];
        if let Ok(4) = nvs.read(PANIC_NAMESPACE, PANIC_INDEX_KEY, &mut buf) {
            self.write_index = u32::from_le_bytes(buf) as usize % PANIC_RING_SLOTS;
        }
    }

    /// Persist a report in the next slot, overwriting the oldest when full.
    /// Returns the slot written.
    pub fn record(&mut self, nvs: &mut dyn StoragePort, report: &PanicReport) -> usize {
        let slot = self.write_index;
        match postcard::to_allocvec(report) {
            Ok(bytes) => {
                if let Err(e) = nvs.write(PANIC_NAMESPACE, &Self::slot_key(slot), &bytes) {
                    error!("PanicLog: write failed ({})", e);
                }
            }
            Err(_) => error!("PanicLog: encode failed"),
        }

        self.write_index = (self.write_index + 1) % PANIC_RING_SLOTS;
        let idx_bytes = (self.write_index as u32).to_le_bytes();
        let _ = nvs.write(PANIC_NAMESPACE, PANIC_INDEX_KEY, &idx_bytes);
        slot
    }

    /// Every stored report, oldest slot first.  The ring is left as is.
    pub fn read_all(&self, nvs: &dyn StoragePort) -> PanicReports {
        let mut reports = PanicReports::new();
        for i in 0..PANIC_RING_SLOTS {
            let slot = (self.write_index + i) % PANIC_RING_SLOTS;
            let mut buf = [0u8; 256];
            if let Ok(len) = nvs.read(PANIC_NAMESPACE, &Self::slot_key(slot), &mut buf) {
                match postcard::from_bytes::<PanicReport>(&buf[..len]) {
                    Ok(report) => {
                        let _ = reports.push(StoredPanic { slot, report });
                    }
                    Err(_) => warn!("PanicLog: slot {} unreadable, skipped", slot),
                }
            }
        }
        reports
    }

    /// Erase one slot after its report was delivered.
    pub fn remove(&mut self, nvs: &mut dyn StoragePort, slot: usize) {
        if let Err(e) = nvs.delete(PANIC_NAMESPACE, &Self::slot_key(slot)) {
            warn!("PanicLog: could not erase slot {} ({})", slot, e);
        }
    }

    pub fn count(&self, nvs: &dyn StoragePort) -> usize {
        (0..PANIC_RING_SLOTS)
            .filter(|i| nvs.exists(PANIC_NAMESPACE, &Self::slot_key(*i)))
            .count()
    }

    fn slot_key(index: usize) -> heapless::String<8> {
        let mut s = heapless::String::new();
        let _ = write!(s, "p{}", index);
        s
    }
}

/// Panic reports waiting for the server, backed by the NVS ring.
pub struct PanicOutbox {
    log: PanicLog,
    storage: Box<dyn StoragePort>,
    pending: PanicReports,
}

impl PanicOutbox {
    /// Take over the ring in `storage` and queue whatever it holds.
    pub fn open(storage: Box<dyn StoragePort>) -> Self {
        let mut log = PanicLog::new();
        log.init(storage.as_ref());
        let pending = log.read_all(storage.as_ref());
        if !pending.is_empty() {
            warn!("{} panic report(s) from earlier boots", pending.len());
        }
        Self {
            log,
            storage,
            pending,
        }
    }

    /// Queued reports, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &PanicReport> {
        self.pending.iter().map(|p| &p.report)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Persist a new report and queue it behind the older ones.
    pub fn record(&mut self, report: &PanicReport) {
        let slot = self.log.record(self.storage.as_mut(), report);
        // The ring just overwrote whatever was queued from that slot.
        self.pending.retain(|p| p.slot != slot);
        let _ = self.pending.push(StoredPanic {
            slot,
            report: report.clone(),
        });
    }

    /// Hand queued reports to `send`, oldest first, erasing each slot as
    /// soon as `send` succeeds.  Stops at the first failure and returns how
    /// many went out.
    pub fn deliver<F>(&mut self, mut send: F) -> usize
    where
        F: FnMut(&PanicReport) -> Result<(), CommsError>,
    {
        let mut delivered = 0;
        while let Some(next) = self.pending.first() {
            if send(&next.report).is_err() {
                break;
            }
            self.log.remove(self.storage.as_mut(), next.slot);
            self.pending.remove(0);
            delivered += 1;
        }
        if delivered > 0 {
            info!("PanicOutbox: {} report(s) delivered", delivered);
        }
        delivered
    }
}

/// Stop doing anything useful until someone power-cycles the node.
///
/// The tick loop is never re-entered: a node that overflowed its report
/// buffer would only overflow it again.
pub fn halt() -> ! {
    error!("Node halted. Power cycle required.");
    loop {
        #[cfg(target_os = "espidf")]
        esp_idf_hal::delay::FreeRtos::delay_ms(10_000);

        #[cfg(not(target_os = "espidf"))]
        std::thread::sleep(std::time::Duration::from_secs(10));
    }
}

// ───────────────────────────────────────────────────────────────
// Panic hook: persist a PanicReport before the runtime aborts
// ───────────────────────────────────────────────────────────────

/// Install a panic hook that persists the panic location to NVS.
///
/// Must be called once during init, after NVS is ready.
pub fn install_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        let msg = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            *msg
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.as_str()
        } else {
            "unknown panic"
        };
        let (file, line) = info
            .location()
            .map_or(("unknown", 0), |l| (l.file(), l.line()));

        error!("PANIC at {}:{}: {}", file, line, msg);

        #[cfg(target_os = "espidf")]
        {
            // NVS was opened in main; if it wasn't, the report is lost.
            match crate::adapters::nvs::NvsAdapter::new() {
                Ok(mut nvs) => {
                    let mut log = PanicLog::new();
                    log.init(&nvs);
                    log.record(&mut nvs, &PanicReport::new(file, line, "panic", msg));
                }
                Err(_) => error!("Panic handler: NVS unavailable, report not persisted"),
            }
        }
    }));
}
