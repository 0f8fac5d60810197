//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one controller against
//! the recording adapters in `mock_hw`.  Everything runs on the host.

mod ble_service_tests;
mod gps_controller_tests;
mod mock_hw;
