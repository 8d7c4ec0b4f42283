//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (UART in production, stderr on the host).

use log::{error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { tasks } => {
                info!("START | tasks={}", tasks);
            }
            AppEvent::SensorFault { sensor, error } => {
                warn!("SENSOR | {} unavailable: {}", sensor, error);
            }
            AppEvent::ReportSubmitted { bytes, fields } => {
                info!("REPORT | sent {} fields ({} bytes)", fields, bytes);
            }
            AppEvent::ReportFailed(e) => {
                warn!("REPORT | not delivered: {}", e);
            }
            AppEvent::UpdateAvailable { version } => {
                info!("UPDATE | server offers firmware {}", version);
            }
            AppEvent::LogUploaded { bytes } => {
                info!("LOG | uploaded {} bytes", bytes);
            }
            AppEvent::PanicFlushed => {
                info!("PANIC | stored report delivered");
            }
            AppEvent::ResetTriggered => {
                error!("RESET | factory reset requested by button");
            }
        }
    }
}
