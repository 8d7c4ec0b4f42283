//! Application core: domain logic behind port traits.
//!
//! The node's behaviour (which tasks run, how often, what a report task
//! does) lives here.  All interaction with hardware and the network
//! happens through the **port traits** in [`ports`], so the whole core is
//! testable on the host with mock adapters.

pub mod device_log;
pub mod events;
pub mod ports;
pub mod service;
pub mod stat;
