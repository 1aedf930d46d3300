//! Passpoint credential model.
//!
//! A credential set is the identity the device carries: its home FQDN,
//! optional partner FQDNs, and the organization identifiers (OIs) it accepts
//! as home or roaming partners. The TLS material is opaque here and is
//! forwarded verbatim to the network manager.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// A Roaming Consortium organization identifier (3 or 5 octets on the air).
pub type Oi = u64;

/// Package name reported to the network manager as the credential owner.
pub const ANDROID_PACKAGE_NAME: &str = "app.passpoint.example.com";

/// Property names accepted by the network manager for Passpoint credentials.
pub mod props {
    pub const DOMAINS: &str = "Domains";
    pub const REALM: &str = "Realm";
    pub const HOME_OIS: &str = "HomeOIs";
    pub const REQUIRED_HOME_OIS: &str = "RequiredHomeOIs";
    pub const ROAMING_CONSORTIA: &str = "RoamingConsortia";
    pub const METERED_OVERRIDE: &str = "MeteredOverride";
    pub const ANDROID_PACKAGE_NAME: &str = "AndroidPackageName";
    pub const EAP_METHOD: &str = "EAP.EAP";
    pub const EAP_INNER_EAP: &str = "EAP.InnerEAP";
    pub const EAP_IDENTITY: &str = "EAP.Identity";
    pub const EAP_PASSWORD: &str = "EAP.Password";
    pub const EAP_CA_CERT_PEM: &str = "EAP.CACertPEM";
    pub const EAP_CERT_ID: &str = "EAP.CertID";
    pub const EAP_KEY_ID: &str = "EAP.KeyID";
}

/// EAP authentication profile.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Auth {
    /// EAP-TTLS with MSCHAPv2 inner authentication.
    #[default]
    Ttls,
    /// EAP-TLS with a client certificate.
    Tls,
}

impl Auth {
    /// Value of the `EAP.EAP` property.
    pub const fn eap_method(self) -> &'static str {
        match self {
            Auth::Ttls => "TTLS",
            Auth::Tls => "TLS",
        }
    }

    /// IANA EAP method type, as used in NAI realm advertisements.
    pub const fn eap_type(self) -> u8 {
        match self {
            Auth::Ttls => 21,
            Auth::Tls => 13,
        }
    }
}

impl fmt::Display for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.eap_method())
    }
}

impl std::str::FromStr for Auth {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "TTLS" => Ok(Auth::Ttls),
            "TLS" => Ok(Auth::Tls),
            _ => Err(format!("invalid auth '{s}': use TTLS or TLS")),
        }
    }
}

/// Secrets needed to authenticate. Never interpreted by the harness.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsMaterial {
    pub identity: Option<String>,
    pub password: Option<String>,
    /// CA certificate chain, PEM encoded.
    pub ca_cert_pem: Vec<String>,
    pub cert_id: Option<String>,
    pub key_id: Option<String>,
}

impl fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("identity", &self.identity)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ca_cert_pem", &self.ca_cert_pem.len())
            .field("cert_id", &self.cert_id)
            .field("key_id", &self.key_id)
            .finish()
    }
}

/// A value in the property bag handed to the network manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Str(String),
    StrList(Vec<String>),
}

/// Opaque property bag accepted by `NetworkManager::add_credentials`.
pub type PropertyBag = BTreeMap<&'static str, PropertyValue>;

/// A set of Passpoint credentials with their selection criteria.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    /// FQDN of the home service provider.
    pub domain: String,
    /// FQDNs of partner providers also considered home.
    pub other_home_partners: BTreeSet<String>,
    pub home_ois: BTreeSet<Oi>,
    /// Home OIs that must all be advertised by an AP.
    pub required_home_ois: BTreeSet<Oi>,
    pub roaming_ois: BTreeSet<Oi>,
    pub auth: Auth,
    pub tls: Option<TlsMaterial>,
}

impl Credentials {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            ..Default::default()
        }
    }

    pub fn with_home_ois(mut self, ois: &[Oi]) -> Self {
        self.home_ois.extend(ois);
        self
    }

    /// Required OIs are home OIs too, so they are added to both sets.
    pub fn with_required_home_ois(mut self, ois: &[Oi]) -> Self {
        self.required_home_ois.extend(ois);
        self.home_ois.extend(ois);
        self
    }

    pub fn with_roaming_ois(mut self, ois: &[Oi]) -> Self {
        self.roaming_ois.extend(ois);
        self
    }

    pub fn with_partners(mut self, partners: &[&str]) -> Self {
        self.other_home_partners
            .extend(partners.iter().map(|p| p.to_string()));
        self
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_tls(mut self, tls: TlsMaterial) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Realm used for NAI realm matching. Same as the home FQDN.
    pub fn realm(&self) -> &str {
        &self.domain
    }

    /// Home FQDN followed by the partner FQDNs.
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.domain.as_str())
            .chain(self.other_home_partners.iter().map(String::as_str))
    }

    /// True if `domain` is the home FQDN or one of the partners.
    pub fn is_home_domain(&self, domain: &str) -> bool {
        self.domains().any(|d| d.eq_ignore_ascii_case(domain))
    }

    /// Check the credential invariants.
    pub fn validate(&self) -> Result<()> {
        if self.domain.trim().is_empty() {
            return Err(HarnessError::InvalidCredentials("empty domain".into()));
        }
        if let Some(oi) = self.required_home_ois.difference(&self.home_ois).next() {
            return Err(HarnessError::InvalidCredentials(format!(
                "required home OI {oi:#x} is not a home OI"
            )));
        }
        if let Some(oi) = self.home_ois.intersection(&self.roaming_ois).next() {
            return Err(HarnessError::InvalidCredentials(format!(
                "OI {oi:#x} is both a home and a roaming OI"
            )));
        }
        Ok(())
    }

    /// Convert to the property bag the network manager accepts.
    ///
    /// OIs are exported as decimal strings. TLS material is copied as is.
    pub fn to_properties(&self) -> PropertyBag {
        let mut bag = PropertyBag::new();
        bag.insert(
            props::DOMAINS,
            PropertyValue::StrList(self.domains().map(str::to_string).collect()),
        );
        bag.insert(props::REALM, PropertyValue::Str(self.realm().to_string()));
        bag.insert(props::HOME_OIS, oi_list(&self.home_ois));
        bag.insert(props::REQUIRED_HOME_OIS, oi_list(&self.required_home_ois));
        bag.insert(props::ROAMING_CONSORTIA, oi_list(&self.roaming_ois));
        bag.insert(props::METERED_OVERRIDE, PropertyValue::Bool(false));
        bag.insert(
            props::ANDROID_PACKAGE_NAME,
            PropertyValue::Str(ANDROID_PACKAGE_NAME.to_string()),
        );
        bag.insert(
            props::EAP_METHOD,
            PropertyValue::Str(self.auth.eap_method().to_string()),
        );
        if self.auth == Auth::Ttls {
            bag.insert(
                props::EAP_INNER_EAP,
                PropertyValue::Str("auth=MSCHAPV2".to_string()),
            );
        }

        if let Some(tls) = &self.tls {
            let strings = [
                (props::EAP_IDENTITY, &tls.identity),
                (props::EAP_PASSWORD, &tls.password),
                (props::EAP_CERT_ID, &tls.cert_id),
                (props::EAP_KEY_ID, &tls.key_id),
            ];
            for (name, value) in strings {
                if let Some(value) = value {
                    bag.insert(name, PropertyValue::Str(value.clone()));
                }
            }
            if !tls.ca_cert_pem.is_empty() {
                bag.insert(
                    props::EAP_CA_CERT_PEM,
                    PropertyValue::StrList(tls.ca_cert_pem.clone()),
                );
            }
        }

        bag
    }
}

fn oi_list(ois: &BTreeSet<Oi>) -> PropertyValue {
    PropertyValue::StrList(ois.iter().map(|oi| oi.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_empty_domain() {
        let err = Credentials::new("").validate().unwrap_err();
        assert!(matches!(err, HarnessError::InvalidCredentials(_)));
    }

    #[test]
    fn test_validate_required_must_be_home() {
        let mut creds = Credentials::new("blue.example");
        creds.required_home_ois.insert(0xaa);
        assert!(creds.validate().is_err());

        let creds = Credentials::new("blue.example").with_required_home_ois(&[0xaa]);
        assert!(creds.validate().is_ok());
        assert!(creds.home_ois.contains(&0xaa));
    }

    #[test]
    fn test_validate_home_and_roaming_disjoint() {
        let creds = Credentials::new("blue.example")
            .with_home_ois(&[0xaa])
            .with_roaming_ois(&[0xaa, 0xbb]);
        assert!(creds.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_wide_ois() {
        let creds = Credentials::new("blue.example")
            .with_home_ois(&[0x0011_2233_4455_6677])
            .with_roaming_ois(&[u64::MAX]);
        creds.validate().unwrap();
        assert_eq!(
            creds.to_properties()[props::ROAMING_CONSORTIA],
            PropertyValue::StrList(vec![u64::MAX.to_string()])
        );
    }

    #[test]
    fn test_equality_ignores_order() {
        let a = Credentials::new("blue.example").with_home_ois(&[0xaa, 0xbb]);
        let b = Credentials::new("blue.example").with_home_ois(&[0xbb, 0xaa]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_properties_ttls() {
        let creds = Credentials::new("blue.example")
            .with_partners(&["partner.example"])
            .with_home_ois(&[0xaa])
            .with_roaming_ois(&[0xbb]);
        let bag = creds.to_properties();

        assert_eq!(
            bag[props::DOMAINS],
            PropertyValue::StrList(vec!["blue.example".into(), "partner.example".into()])
        );
        assert_eq!(bag[props::REALM], PropertyValue::Str("blue.example".into()));
        assert_eq!(bag[props::HOME_OIS], PropertyValue::StrList(vec!["170".into()]));
        assert_eq!(
            bag[props::ROAMING_CONSORTIA],
            PropertyValue::StrList(vec!["187".into()])
        );
        assert_eq!(bag[props::REQUIRED_HOME_OIS], PropertyValue::StrList(vec![]));
        assert_eq!(bag[props::EAP_METHOD], PropertyValue::Str("TTLS".into()));
        assert_eq!(
            bag[props::EAP_INNER_EAP],
            PropertyValue::Str("auth=MSCHAPV2".into())
        );
        assert!(!bag.contains_key(props::EAP_IDENTITY));
    }

    #[test]
    fn test_properties_forward_tls_material() {
        let creds = Credentials::new("blue.example")
            .with_auth(Auth::Tls)
            .with_tls(TlsMaterial {
                identity: Some("test-user".into()),
                cert_id: Some("0:1234".into()),
                ca_cert_pem: vec!["-----BEGIN CERTIFICATE-----".into()],
                ..Default::default()
            });
        let bag = creds.to_properties();

        assert_eq!(bag[props::EAP_METHOD], PropertyValue::Str("TLS".into()));
        assert!(!bag.contains_key(props::EAP_INNER_EAP));
        assert_eq!(bag[props::EAP_IDENTITY], PropertyValue::Str("test-user".into()));
        assert_eq!(bag[props::EAP_CERT_ID], PropertyValue::Str("0:1234".into()));
        assert!(!bag.contains_key(props::EAP_PASSWORD));
        assert!(matches!(
            bag[props::EAP_CA_CERT_PEM],
            PropertyValue::StrList(ref certs) if certs.len() == 1
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let tls = TlsMaterial {
            password: Some("hunter2".into()),
            ..Default::default()
        };
        assert!(!format!("{tls:?}").contains("hunter2"));
    }

    #[test]
    fn test_auth_parse() {
        assert_eq!("ttls".parse::<Auth>().unwrap(), Auth::Ttls);
        assert_eq!("TLS".parse::<Auth>().unwrap(), Auth::Tls);
        assert!("peap".parse::<Auth>().is_err());
    }
}
