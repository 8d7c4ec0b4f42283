//! Factory reset action.
//!
//! Erases every credential the node holds (server token, Wi-Fi station
//! config) and restarts, so the device comes back up unprovisioned.
//! Configuration and the panic log survive.

use log::{error, warn};

use crate::app::ports::{ResetAction, StoragePort};
use crate::auth::AUTH_NAMESPACE;

/// Namespace holding the Wi-Fi station credentials.
pub const WIFI_NAMESPACE: &str = "wifi";

/// Namespaces wiped by a factory reset.
pub const ERASED_NAMESPACES: [&str; 2] = [AUTH_NAMESPACE, WIFI_NAMESPACE];

pub struct FactoryReset<S> {
    storage: S,
    performed: bool,
}

impl<S: StoragePort> FactoryReset<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            performed: false,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Whether the reset has run (only observable on the host; on the
    /// device the action restarts the chip).
    pub fn performed(&self) -> bool {
        self.performed
    }

    #[cfg(target_os = "espidf")]
    fn restart() {
        // SAFETY: esp_restart never returns; all NVS handles are closed.
        unsafe { esp_idf_svc::sys::esp_restart() };
    }

    #[cfg(not(target_os = "espidf"))]
    fn restart() {
        warn!("FactoryReset(sim): restart skipped");
    }
}

impl<S: StoragePort> ResetAction for FactoryReset<S> {
    fn factory_reset(&mut self) {
        error!("FactoryReset: erasing credentials");
        for ns in ERASED_NAMESPACES {
            // Erase as much as possible before restarting.
            if let Err(e) = self.storage.erase_namespace(ns) {
                warn!("FactoryReset: could not erase '{}' ({})", ns, e);
            }
        }
        self.performed = true;
        Self::restart();
    }
}
