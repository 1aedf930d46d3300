//! Virtual radios for Passpoint integration testing.
//!
//! Loads the `mac80211_hwsim` kernel module to create a set of virtual
//! 802.11 radios that can see each other, and reports the network
//! interfaces they expose.
//!
//! # Modules
//!
//! - [`radios`]: Module loading and interface discovery (RAII unload on drop)
//! - [`harness`]: Dependency checks for tests that need real radios
//! - [`test_util`]: Privilege and binary checks

pub mod harness;
pub mod radios;
pub mod test_util;

pub use harness::{SkipReason, check_hwsim_deps};
pub use radios::{Hwsim, Radio, discover_radios};
pub use test_util::{check_binary, check_privileges};
