//! Outbound application events.
//!
//! The [`NodeService`](super::service::NodeService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other side
//! decide what to do with them (serial log today).

use crate::error::{CommsError, Error};

use super::stat::FirmwareVersion;

/// Structured events emitted by the node core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Setup finished; carries the number of registered tasks.
    Started { tasks: usize },

    /// A sensor failed to initialise.
    SensorFault { sensor: &'static str, error: Error },

    /// A report was handed to the transport and accepted.
    ReportSubmitted { bytes: usize, fields: usize },

    /// The transport rejected or failed a report.
    ReportFailed(CommsError),

    /// The server answered a report with a newer firmware version.
    UpdateAvailable { version: FirmwareVersion },

    /// The device log was uploaded and cleared.
    LogUploaded { bytes: usize },

    /// A stored panic report was delivered.
    PanicFlushed,

    /// The factory reset button was held long enough.
    ResetTriggered,
}
