//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] (read side; the provisioning tool
//! writes the blob) and [`StoragePort`] for the node.
//!
//! | Namespace  | Contents                                  | Factory reset |
//! |------------|-------------------------------------------|---------------|
//! | `fieldnode`| `NodeConfig` (postcard)                   | kept          |
//! | `auth`     | server token                              | erased        |
//! | `wifi`     | station credentials                       | erased        |
//! | `panic`    | panic report ring                         | kept          |
//!
//! NVS limits namespace and key names to 15 bytes; longer names are
//! rejected with [`StorageError::IoError`] rather than silently truncated.

use log::{info, warn};

use crate::app::ports::{ConfigPort, StoragePort};
use crate::config::NodeConfig;
use crate::error::{Error, StorageError};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "fieldnode";
const CONFIG_KEY: &str = "nodecfg";

/// Longest blob any caller stores (config, token, panic report).
#[cfg(target_os = "espidf")]
const MAX_BLOB_SIZE: usize = 1024;

/// NUL-terminated copy of an NVS name (max 15 bytes + NUL).
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
struct NvsName([u8; 16]);

impl NvsName {
    fn new(name: &str) -> Result<Self, StorageError> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > 15 || bytes.contains(&0) {
            return Err(StorageError::IoError);
        }
        let mut buf = [0u8; 16];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(buf))
    }

    #[cfg(target_os = "espidf")]
    fn as_ptr(&self) -> *const core::ffi::c_char {
        self.0.as_ptr().cast()
    }
}

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Initialise NVS flash.
    ///
    /// On first boot or after a layout version change the partition is
    /// erased and re-initialised automatically.
    pub fn new() -> Result<Self, Error> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called from the single main-task context before any
            // other NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES as esp_err_t
                || ret == ESP_ERR_NVS_NEW_VERSION_FOUND as esp_err_t
            {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK || unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(Error::Storage(StorageError::IoError));
                }
            } else if ret != ESP_OK {
                return Err(Error::Storage(StorageError::IoError));
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> Result<String, StorageError> {
        NvsName::new(namespace)?;
        NvsName::new(key)?;
        Ok(format!("{}::{}", namespace, key))
    }

    /// Open a namespace, run `f` with the handle, then close it.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = NvsName::new(namespace)?;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let mut handle: nvs_handle_t = 0;
        // SAFETY: `ns` is NUL-terminated and outlives the call.
        let ret = unsafe { nvs_open(ns.as_ptr(), mode, &mut handle) };
        if ret == ESP_ERR_NVS_NOT_FOUND as esp_err_t {
            // Read-only open of a namespace nobody has written yet.
            return Err(StorageError::NotFound);
        }
        if ret != ESP_OK {
            return Err(StorageError::IoError);
        }

        let result = f(handle);
        // SAFETY: handle was opened above and is not used afterwards.
        unsafe { nvs_close(handle) };
        result.map_err(|rc| match rc {
            rc if rc == ESP_ERR_NVS_NOT_FOUND as esp_err_t => StorageError::NotFound,
            rc if rc == ESP_ERR_NVS_NOT_ENOUGH_SPACE as esp_err_t => StorageError::Full,
            _ => StorageError::IoError,
        })
    }

    #[cfg(target_os = "espidf")]
    fn commit(handle: nvs_handle_t) -> Result<(), i32> {
        // SAFETY: handle is open for writing.
        let ret = unsafe { nvs_commit(handle) };
        if ret == ESP_OK { Ok(()) } else { Err(ret) }
    }
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<NodeConfig, Error> {
        let mut buf = [0u8; 256];
        match self.read(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(len) => {
                let cfg: NodeConfig = postcard::from_bytes(&buf[..len])
                    .map_err(|_| Error::Storage(StorageError::Corrupted))?;
                cfg.validate()?;
                info!("NvsAdapter: loaded config ({} bytes)", len);
                Ok(cfg)
            }
            Err(StorageError::NotFound) => {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(NodeConfig::default())
            }
            Err(e) => {
                warn!("NvsAdapter: config read error ({}), using defaults", e);
                Ok(NodeConfig::default())
            }
        }
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key)?;
            match self.store.borrow().get(&composite) {
                Some(data) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let key = NvsName::new(key)?;
            Self::with_nvs_handle(namespace, false, |handle| {
                let mut size = buf.len().min(MAX_BLOB_SIZE);
                // SAFETY: `size` never exceeds the buffer length.
                let ret = unsafe {
                    nvs_get_blob(handle, key.as_ptr(), buf.as_mut_ptr().cast(), &mut size)
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            })
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key)?;
            self.store.borrow_mut().insert(composite, data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = NvsName::new(key)?;
            Self::with_nvs_handle(namespace, true, |handle| {
                // SAFETY: key is NUL-terminated; data outlives the call.
                let ret =
                    unsafe { nvs_set_blob(handle, key.as_ptr(), data.as_ptr().cast(), data.len()) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Self::commit(handle)
            })
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key)?;
            self.store.borrow_mut().remove(&composite);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = NvsName::new(key)?;
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                // SAFETY: key is NUL-terminated.
                let ret = unsafe { nvs_erase_key(handle, key.as_ptr()) };
                if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND as esp_err_t {
                    return Err(ret);
                }
                Self::commit(handle)
            });
            match result {
                Err(StorageError::NotFound) => Ok(()),
                other => other,
            }
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            Self::composite_key(namespace, key)
                .is_ok_and(|composite| self.store.borrow().contains_key(&composite))
        }

        #[cfg(target_os = "espidf")]
        {
            let Ok(key) = NvsName::new(key) else {
                return false;
            };
            Self::with_nvs_handle(namespace, false, |handle| {
                // SAFETY: key is NUL-terminated; the type out-param is optional.
                let ret = unsafe { nvs_find_key(handle, key.as_ptr(), core::ptr::null_mut()) };
                Ok(ret == ESP_OK)
            })
            .unwrap_or(false)
        }
    }

    fn erase_namespace(&mut self, namespace: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            NvsName::new(namespace)?;
            let prefix = format!("{}::", namespace);
            self.store.borrow_mut().retain(|k, _| !k.starts_with(&prefix));
            info!("NvsAdapter: namespace '{}' erased (simulation)", namespace);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                // SAFETY: handle is open for writing.
                let ret = unsafe { nvs_erase_all(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Self::commit(handle)
            });
            info!("NvsAdapter: namespace '{}' erased", namespace);
            result
        }
    }
}
