//! Device log: notable events kept as plain text lines until the server
//! has them.
//!
//! ```text
//! [180000] report not delivered: HTTP status 503
//! [180000] sensor dht22 unavailable: sensor timeout
//! ```
//!
//! Lines are uploaded as one text body after each report tick and
//! cleared once the transport accepts them.  The buffer is fixed; lines
//! that no longer fit are dropped whole and counted.

use core::fmt::{self, Write};

use log::debug;

use super::events::AppEvent;

pub const DEVICE_LOG_CAPACITY: usize = 512;
const LINE_CAPACITY: usize = 128;

#[derive(Debug, Default)]
pub struct DeviceLog {
    buf: heapless::String<DEVICE_LOG_CAPACITY>,
    dropped: u32,
}

impl DeviceLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep a line for the events the server should hear about.
    pub fn note(&mut self, now_ms: u64, event: &AppEvent) {
        match event {
            AppEvent::Started { tasks } => self.push(
                now_ms,
                format_args!("started v{} with {} tasks", env!("CARGO_PKG_VERSION"), tasks),
            ),
            AppEvent::SensorFault { sensor, error } => {
                self.push(now_ms, format_args!("sensor {} unavailable: {}", sensor, error));
            }
            AppEvent::ReportFailed(e) => {
                self.push(now_ms, format_args!("report not delivered: {}", e));
            }
            AppEvent::UpdateAvailable { version } => {
                self.push(now_ms, format_args!("server offers firmware {}", version));
            }
            AppEvent::ReportSubmitted { .. }
            | AppEvent::PanicFlushed
            | AppEvent::LogUploaded { .. }
            | AppEvent::ResetTriggered => {}
        }
    }

    /// Append one `[now_ms] text` line.  Long text is cut at the line
    /// limit; a line that does not fit the buffer is dropped.
    pub fn push(&mut self, now_ms: u64, text: fmt::Arguments<'_>) {
        let mut line = heapless::String::<LINE_CAPACITY>::new();
        let _ = write!(line, "[{}] ", now_ms);
        let _ = line.write_fmt(text);
        if self.buf.push_str(&line).and_then(|()| self.buf.push('\n')).is_err() {
            // Roll back a half-written line.
            let keep = self.buf.rfind('\n').map_or(0, |at| at + 1);
            self.buf.truncate(keep);
            self.dropped = self.dropped.saturating_add(1);
            debug!("device log full, {} line(s) dropped", self.dropped);
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_bytes()
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Lines lost to a full buffer since the last upload.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Forget everything that has been uploaded.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.dropped = 0;
    }
}
