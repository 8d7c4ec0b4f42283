//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises the node against mock
//! adapters.  All tests run on the host (x86_64) with no real hardware
//! required.

#![cfg(not(target_os = "espidf"))]

mod mock_hw;
mod storage_tests;
mod service_tests;
