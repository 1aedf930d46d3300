//! Passpoint Harness Library
//!
//! This library drives Passpoint network-selection and roaming scenarios:
//! it brings up access points with configurable ANQP advertisements,
//! provisions credentials on the device under test, and verifies which
//! AP the client associates with. Backends are hostapd plus shill for
//! real radios, or a deterministic simulated air.

// Use mimalloc as the global allocator for tests (non-Windows only)
#[cfg(not(windows))]
#[cfg(test)]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod access_point;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod driver;
pub mod error;
pub mod fabric;
pub mod hostapd;
pub mod monitor;
pub mod network_manager;
pub mod runner;
pub mod scenario;
pub mod selection;
pub mod shill;
pub mod sim;
pub mod utils;

// Test helpers module - available when test-internals feature is enabled
#[cfg(any(test, feature = "test-internals"))]
pub mod test_helpers;

#[cfg(test)]
pub mod tests;

// Re-export commonly used items
pub use access_point::AccessPoint;
pub use config::{HarnessConfig, HostapdSettings};
pub use controller::{ApController, ApInstance};
pub use credentials::{Auth, Credentials, Oi, TlsMaterial};
pub use driver::{Driver, RunOutcome};
pub use error::{HarnessError, Result};
pub use fabric::{ClientIface, MacAddr, RadioFabric};
pub use network_manager::NetworkManager;
pub use runner::{RunReport, Runner, ScenarioReport};
pub use scenario::{Expectation, Mode, Scenario};
pub use sim::{SimFaults, SimulatedAir};
pub use utils::now_ms;
