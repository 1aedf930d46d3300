//! Network-manager facade.
//!
//! The driver only talks to the client network stack through this trait.
//! Calls are synchronous from the driver's point of view and never retried.

use async_trait::async_trait;
use serde::Serialize;

use crate::credentials::Credentials;
use crate::error::Result;

/// Named persistence scope holding provisioned credentials.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub name: String,
    /// Backend handle, e.g. the D-Bus object path.
    pub path: String,
}

#[async_trait]
pub trait NetworkManager: Send + Sync {
    /// Begin a fresh profile. Fails with `ProfileExists` if `name` is in use.
    async fn create_profile(&self, name: &str) -> Result<Profile>;

    /// Remove a profile. Fails with `ProfileMissing` only; other cleanup
    /// errors are logged.
    async fn remove_profile(&self, name: &str) -> Result<()>;

    /// Install `creds.to_properties()` into `profile`.
    async fn add_credentials(&self, profile: &Profile, creds: &Credentials) -> Result<()>;

    /// Toggle Passpoint interworking selection on `client_iface`.
    async fn set_interworking_select(&self, client_iface: &str, enabled: bool) -> Result<()>;

    /// Request an active scan. Returns once acknowledged.
    async fn request_scan(&self, client_iface: &str) -> Result<()>;
}
