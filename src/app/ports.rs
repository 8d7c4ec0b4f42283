//! Port traits: the hexagonal boundary between the node core and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ NodeService (domain)
//! ```
//!
//! Driven adapters (sensors, transport, storage, reset action, event sinks)
//! implement these traits.  [`NodeService`](super::service::NodeService)
//! consumes them via generics, so the core never touches hardware directly.

use crate::auth::AuthToken;
use crate::config::NodeConfig;
use crate::diagnostics::PanicReport;
use crate::error::{CommsError, Error, ReportError, StorageError};
use crate::report::ReportDoc;

use super::events::AppEvent;
use super::stat::{DeviceStat, FirmwareVersion};

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// The full set of sensors the report task samples.
pub trait SensorPort {
    /// One-time initialisation of every sensor.  Returns the first
    /// failure per sensor through `on_error` and keeps going.
    fn begin_all(&mut self, on_error: &mut dyn FnMut(&'static str, Error));

    /// Measure every quantity once and write it into `doc`, in the
    /// declared field order.  Stops at the document's first error.
    fn record<const N: usize>(&mut self, doc: &mut ReportDoc<N>) -> Result<(), ReportError>;
}

// ───────────────────────────────────────────────────────────────
// Transport port (driven adapter: domain → network)
// ───────────────────────────────────────────────────────────────

/// What the server said back about an accepted report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportAck {
    /// Firmware the server wants this device on (`latest_version` header).
    pub latest_version: Option<FirmwareVersion>,
}

/// Network submission channel.  Retry, backoff and connectivity are the
/// adapter's business; the core only looks at the outcome to log it.
pub trait ReportTransport {
    /// Submit one complete measurement report.
    fn submit_report(
        &mut self,
        token: &AuthToken,
        payload: &[u8],
        stat: &DeviceStat,
    ) -> Result<ReportAck, CommsError>;

    /// Submit a panic report.
    fn submit_panic(&mut self, token: &AuthToken, panic: &PanicReport) -> Result<(), CommsError>;

    /// Upload device log lines (plain text).
    fn submit_log(&mut self, token: &AuthToken, log: &[u8]) -> Result<(), CommsError>;
}

// ───────────────────────────────────────────────────────────────
// Reset action (domain → irreversible device action)
// ───────────────────────────────────────────────────────────────

/// Invoked exactly once when a sustained factory-reset press is confirmed.
pub trait ResetAction {
    fn factory_reset(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Credential source
// ───────────────────────────────────────────────────────────────

/// Whoever owns the server credential.  `None` means "not provisioned".
pub trait TokenSource {
    fn token(&self) -> Option<&AuthToken>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`]s through this port.
pub trait EventSink {
    fn emit(&mut self, event: &AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads node configuration written by the provisioning tool.
///
/// Stored values are validated on load; invalid values are rejected, not
/// clamped.
pub trait ConfigPort {
    /// Returns [`NodeConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<NodeConfig, Error>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for credentials, config and panic logs.
///
/// Keys are namespaced; write operations are atomic per key.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;

    /// Remove every key of a namespace.
    fn erase_namespace(&mut self, namespace: &str) -> Result<(), StorageError>;
}
