//! Fieldnode firmware library.
//!
//! Exposes the node core (scheduler, report builder, reporting gate and
//! reset watchdog) together with its adapters for integration testing.
//! All ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module; host builds get a simulated backend.

#![deny(unused_must_use)]

pub mod app;
pub mod auth;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod gate;
pub mod pins;
pub mod report;
pub mod scheduler;

pub mod adapters;
pub mod drivers;
pub mod sensors;
