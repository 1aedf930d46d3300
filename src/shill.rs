//! Network-manager facade over shill's D-Bus API.
//!
//! Profiles are shill user profiles, created and pushed on the profile
//! stack; credentials go through `Manager.AddPasspointCredentials`; the
//! interworking toggle is a property of the wifi `Device` bound to the
//! client interface.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use zbus::proxy;
use zbus::zvariant::{ObjectPath, OwnedObjectPath, OwnedValue, Value};

use crate::credentials::{Credentials, PropertyValue};
use crate::error::{HarnessError, Result};
use crate::network_manager::{NetworkManager, Profile};

const SHILL_SERVICE: &str = "org.chromium.flimflam";
const ERROR_ALREADY_EXISTS: &str = "org.chromium.flimflam.Error.AlreadyExists";
const ERROR_NOT_FOUND: &str = "org.chromium.flimflam.Error.NotFound";
const ERROR_INVALID_ARGUMENTS: &str = "org.chromium.flimflam.Error.InvalidArguments";

const TECHNOLOGY_WIFI: &str = "wifi";
const PROPERTY_DEVICES: &str = "Devices";
const PROPERTY_INTERFACE: &str = "Interface";
const PROPERTY_INTERWORKING_SELECT: &str = "PasspointInterworkingSelectEnabled";

#[proxy(
    interface = "org.chromium.flimflam.Manager",
    default_service = "org.chromium.flimflam",
    default_path = "/",
    gen_blocking = false
)]
trait Manager {
    fn get_properties(&self) -> zbus::Result<HashMap<String, OwnedValue>>;
    fn create_profile(&self, name: &str) -> zbus::Result<OwnedObjectPath>;
    fn push_profile(&self, name: &str) -> zbus::Result<OwnedObjectPath>;
    fn pop_profile(&self, name: &str) -> zbus::Result<()>;
    fn remove_profile(&self, name: &str) -> zbus::Result<()>;
    fn request_scan(&self, technology: &str) -> zbus::Result<()>;
    fn add_passpoint_credentials(
        &self,
        profile: &ObjectPath<'_>,
        properties: HashMap<&str, Value<'_>>,
    ) -> zbus::Result<()>;
}

#[proxy(
    interface = "org.chromium.flimflam.Device",
    default_service = "org.chromium.flimflam",
    gen_blocking = false
)]
trait Device {
    fn get_properties(&self) -> zbus::Result<HashMap<String, OwnedValue>>;
    #[zbus(name = "SetProperty")]
    fn set_device_property(&self, name: &str, value: &Value<'_>) -> zbus::Result<()>;
}

/// D-Bus error name of a failed method call, if that is what `err` is.
fn method_error_name(err: &zbus::Error) -> Option<&str> {
    match err {
        zbus::Error::MethodError(name, _, _) => Some(name.as_str()),
        _ => None,
    }
}

fn create_profile_error(name: &str, err: zbus::Error) -> HarnessError {
    match method_error_name(&err) {
        Some(ERROR_ALREADY_EXISTS) => HarnessError::ProfileExists(name.into()),
        _ => err.into(),
    }
}

/// `None` when the failure is internal cleanup and must be absorbed.
fn remove_profile_error(name: &str, err: &zbus::Error) -> Option<HarnessError> {
    match method_error_name(err) {
        Some(ERROR_NOT_FOUND) => Some(HarnessError::ProfileMissing(name.into())),
        _ => None,
    }
}

fn add_credentials_error(err: zbus::Error) -> HarnessError {
    match method_error_name(&err) {
        Some(ERROR_INVALID_ARGUMENTS) => HarnessError::InvalidCredentials(err.to_string()),
        Some(_) => HarnessError::ProvisionFailed(err.to_string()),
        None => err.into(),
    }
}

fn to_value(value: &PropertyValue) -> Value<'_> {
    match value {
        PropertyValue::Bool(b) => Value::from(*b),
        PropertyValue::Str(s) => Value::from(s.as_str()),
        PropertyValue::StrList(list) => Value::from(list.iter().map(String::as_str).collect::<Vec<_>>()),
    }
}

pub struct ShillManager {
    conn: zbus::Connection,
    manager: ManagerProxy<'static>,
}

impl ShillManager {
    /// Connect to shill on the system bus.
    pub async fn connect() -> Result<Self> {
        let conn = zbus::Connection::system().await?;
        Self::with_connection(conn).await
    }

    pub async fn with_connection(conn: zbus::Connection) -> Result<Self> {
        let manager = ManagerProxy::new(&conn).await?;
        debug!(service = SHILL_SERVICE, "connected to shill manager");
        Ok(Self { conn, manager })
    }

    /// Find the shill device bound to `iface`.
    async fn device(&self, iface: &str) -> Result<DeviceProxy<'static>> {
        let mut props = self.manager.get_properties().await?;
        let devices = match props.remove(PROPERTY_DEVICES) {
            Some(value) => Vec::<OwnedObjectPath>::try_from(value)?,
            None => Vec::new(),
        };
        for path in devices {
            let device = DeviceProxy::builder(&self.conn).path(path)?.build().await?;
            let mut props = device.get_properties().await?;
            let name = match props.remove(PROPERTY_INTERFACE) {
                Some(value) => String::try_from(value)?,
                None => continue,
            };
            if name == iface {
                return Ok(device);
            }
        }
        Err(HarnessError::Transport(format!("no shill device for {iface}")))
    }
}

#[async_trait]
impl NetworkManager for ShillManager {
    async fn create_profile(&self, name: &str) -> Result<Profile> {
        if let Err(err) = self.manager.create_profile(name).await {
            return Err(create_profile_error(name, err));
        }
        let path = self.manager.push_profile(name).await?;
        info!(profile = name, path = %path.as_str(), "created shill profile");
        Ok(Profile {
            name: name.to_string(),
            path: path.as_str().to_string(),
        })
    }

    async fn remove_profile(&self, name: &str) -> Result<()> {
        if let Err(err) = self.manager.pop_profile(name).await {
            warn!(profile = name, "failed to pop profile: {}", err);
        }
        match self.manager.remove_profile(name).await {
            Ok(()) => {
                info!(profile = name, "removed shill profile");
                Ok(())
            }
            Err(err) => match remove_profile_error(name, &err) {
                Some(missing) => Err(missing),
                None => {
                    warn!(profile = name, "failed to remove profile: {}", err);
                    Ok(())
                }
            },
        }
    }

    async fn add_credentials(&self, profile: &Profile, creds: &Credentials) -> Result<()> {
        creds.validate()?;
        let path = ObjectPath::try_from(profile.path.as_str())?;
        let bag = creds.to_properties();
        let properties: HashMap<&str, Value<'_>> =
            bag.iter().map(|(k, v)| (*k, to_value(v))).collect();

        match self.manager.add_passpoint_credentials(&path, properties).await {
            Ok(()) => {
                debug!(profile = %profile.name, domain = %creds.domain, "added passpoint credentials");
                Ok(())
            }
            Err(err) => Err(add_credentials_error(err)),
        }
    }

    async fn set_interworking_select(&self, client_iface: &str, enabled: bool) -> Result<()> {
        let device = self.device(client_iface).await?;
        device
            .set_device_property(PROPERTY_INTERWORKING_SELECT, &Value::from(enabled))
            .await?;
        debug!(iface = client_iface, enabled, "set interworking select");
        Ok(())
    }

    async fn request_scan(&self, client_iface: &str) -> Result<()> {
        // shill scans every wifi device; the interface only has to exist.
        self.device(client_iface).await?;
        self.manager.request_scan(TECHNOLOGY_WIFI).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_value() {
        assert_eq!(to_value(&PropertyValue::Bool(false)), Value::from(false));
        assert_eq!(
            to_value(&PropertyValue::Str("TTLS".into())),
            Value::from("TTLS")
        );
        let ois = PropertyValue::StrList(vec!["170".into(), "187".into()]);
        assert_eq!(to_value(&ois), Value::from(vec!["170", "187"]));
    }

    #[test]
    fn test_credentials_map_to_dbus_values() {
        let creds = Credentials::new("blue.example").with_home_ois(&[0xaa]);
        let bag = creds.to_properties();
        let properties: HashMap<&str, Value<'_>> =
            bag.iter().map(|(k, v)| (*k, to_value(v))).collect();
        assert_eq!(properties["Realm"], Value::from("blue.example"));
        assert_eq!(properties["HomeOIs"], Value::from(vec!["170"]));
        assert_eq!(properties["MeteredOverride"], Value::from(false));
    }

    /// Error reply as shill would send it for a failed method call.
    fn method_error(name: &str) -> zbus::Error {
        let reply = zbus::Message::method_call("/", "CreateProfile")
            .unwrap()
            .build(&())
            .unwrap();
        zbus::Error::MethodError(
            zbus::names::OwnedErrorName::try_from(name).unwrap(),
            Some("shill says no".into()),
            reply,
        )
    }

    fn transport_error() -> zbus::Error {
        zbus::Error::InvalidReply
    }

    #[test]
    fn test_create_profile_errors() {
        assert!(matches!(
            create_profile_error("~p/t", method_error(ERROR_ALREADY_EXISTS)),
            HarnessError::ProfileExists(name) if name == "~p/t"
        ));
        assert!(matches!(
            create_profile_error("~p/t", method_error("org.chromium.flimflam.Error.Failure")),
            HarnessError::Transport(_)
        ));
        assert!(matches!(
            create_profile_error("~p/t", transport_error()),
            HarnessError::Transport(_)
        ));
    }

    #[test]
    fn test_remove_profile_errors() {
        assert!(matches!(
            remove_profile_error("~p/t", &method_error(ERROR_NOT_FOUND)),
            Some(HarnessError::ProfileMissing(_))
        ));
        // Anything else is cleanup noise and is absorbed.
        assert!(remove_profile_error("~p/t", &method_error("org.chromium.flimflam.Error.Failure")).is_none());
        assert!(remove_profile_error("~p/t", &transport_error()).is_none());
    }

    #[test]
    fn test_add_credentials_errors() {
        assert!(matches!(
            add_credentials_error(method_error(ERROR_INVALID_ARGUMENTS)),
            HarnessError::InvalidCredentials(_)
        ));
        assert!(matches!(
            add_credentials_error(method_error("org.chromium.flimflam.Error.OperationFailed")),
            HarnessError::ProvisionFailed(_)
        ));
        assert!(matches!(
            add_credentials_error(transport_error()),
            HarnessError::Transport(_)
        ));
    }
}
