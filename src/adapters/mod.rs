//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter         | Implements      | Connects to              |
//! |-----------------|-----------------|--------------------------|
//! | `factory_reset` | ResetAction     | NVS erase + chip restart |
//! | `http`          | ReportTransport | Monitor server over HTTP |
//! | `log_sink`      | EventSink       | Serial log output        |
//! | `nvs`           | ConfigPort      | NVS / in-memory store    |
//! |                 | StoragePort     |                          |
//! | `time`          | (uptime clock)  | ESP32 system timer       |

pub mod factory_reset;
pub mod http;
pub mod log_sink;
pub mod nvs;
pub mod time;
