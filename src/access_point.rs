//! Simulated Passpoint access point descriptors.
//!
//! A descriptor is the beacon and ANQP content one AP advertises. It knows
//! how to render itself into a hostapd configuration file.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::credentials::{Auth, Oi};
use crate::error::{HarnessError, Result};

/// Longest SSID allowed by 802.11.
pub const MAX_SSID_LEN: usize = 32;

/// Default 2.4 GHz channel for simulated APs.
pub const DEFAULT_CHANNEL: u8 = 1;

/// Observable beacon/ANQP content of one simulated AP.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessPoint {
    pub ssid: String,
    /// Home realm advertised in the ANQP domain name list.
    pub domain: Option<String>,
    /// NAI realms, in advertisement order.
    pub realms: Vec<String>,
    /// OI advertised in the Roaming Consortium element.
    pub roaming_consortium: Option<Oi>,
    pub auth: Auth,
}

impl AccessPoint {
    pub fn new(ssid: &str) -> Self {
        Self {
            ssid: ssid.to_string(),
            ..Default::default()
        }
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    pub fn with_realms(mut self, realms: &[&str]) -> Self {
        self.realms = realms.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_roaming_consortium(mut self, oi: Oi) -> Self {
        self.roaming_consortium = Some(oi);
        self
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    /// True if `realm` is in the advertised NAI realm list.
    pub fn advertises_realm(&self, realm: &str) -> bool {
        self.realms.iter().any(|r| r.eq_ignore_ascii_case(realm))
    }

    pub fn validate(&self) -> Result<()> {
        if self.ssid.is_empty() {
            return Err(HarnessError::InvalidDescriptor("empty SSID".into()));
        }
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(HarnessError::InvalidDescriptor(format!(
                "SSID {:?} longer than {MAX_SSID_LEN} bytes",
                self.ssid
            )));
        }
        if self.realms.iter().any(|r| r.trim().is_empty()) {
            return Err(HarnessError::InvalidDescriptor(format!(
                "{}: empty NAI realm",
                self.ssid
            )));
        }
        Ok(())
    }
}

/// Files backing hostapd's internal EAP server.
#[derive(Clone, Copy, Debug)]
pub struct EapServerFiles<'a> {
    pub eap_user_file: &'a Path,
    pub ca_cert: Option<&'a Path>,
    pub server_cert: Option<&'a Path>,
    pub private_key: Option<&'a Path>,
}

/// Render a hostapd configuration for `ap` bound to `iface`.
///
/// The AP runs WPA2-Enterprise with hostapd's internal EAP server and
/// advertises Interworking/Hotspot 2.0 with the descriptor's ANQP content.
pub fn format_hostapd_config(
    ap: &AccessPoint,
    iface: &str,
    ctrl_path: &Path,
    channel: u8,
    eap: &EapServerFiles<'_>,
) -> String {
    let mut builder = String::new();
    let mut configure = |k: &str, v: &str| {
        let _ = writeln!(builder, "{k}={v}");
    };

    configure("logger_syslog", "-1");
    configure("logger_syslog_level", "0");
    configure("driver", "nl80211");
    configure("ctrl_interface", &ctrl_path.to_string_lossy());
    configure("interface", iface);
    configure("ssid2", &encode_ssid(&ap.ssid));
    configure("hw_mode", "g");
    configure("channel", &channel.to_string());

    // WPA2-Enterprise, authenticated by the internal EAP server.
    configure("ieee8021x", "1");
    configure("eap_server", "1");
    configure("eap_user_file", &eap.eap_user_file.to_string_lossy());
    if let Some(path) = eap.ca_cert {
        configure("ca_cert", &path.to_string_lossy());
    }
    if let Some(path) = eap.server_cert {
        configure("server_cert", &path.to_string_lossy());
    }
    if let Some(path) = eap.private_key {
        configure("private_key", &path.to_string_lossy());
    }
    configure("wpa", "2");
    configure("wpa_key_mgmt", "WPA-EAP");
    configure("rsn_pairwise", "CCMP");
    configure("ieee80211w", "1");

    // Interworking and Hotspot 2.0.
    configure("interworking", "1");
    configure("access_network_type", "2");
    configure("internet", "1");
    configure("hs20", "1");
    if let Some(domain) = &ap.domain {
        configure("domain_name", domain);
    }
    for realm in &ap.realms {
        configure("nai_realm", &nai_realm(realm, ap.auth));
    }
    if let Some(oi) = ap.roaming_consortium {
        configure("roaming_consortium", &format_oi(oi));
    }

    builder
}

/// NAI realm entry advertising `auth` for `realm`.
fn nai_realm(realm: &str, auth: Auth) -> String {
    match auth {
        // Non-EAP inner MSCHAPv2, username/password credential.
        Auth::Ttls => format!("0,{realm},{}[2:4][5:7]", auth.eap_type()),
        // Certificate credential.
        Auth::Tls => format!("0,{realm},{}[5:6]", auth.eap_type()),
    }
}

/// Hex encoding of an OI in the fewest whole octets, at least 3.
pub fn format_oi(oi: Oi) -> String {
    let significant = (Oi::BITS - oi.leading_zeros()).div_ceil(8);
    let width = 2 * significant.max(3) as usize;
    format!("{oi:0width$x}")
}

/// Encode `ssid` the way hostapd's `printf_decode` reads it.
pub fn encode_ssid(ssid: &str) -> String {
    let mut out = String::with_capacity(ssid.len() + 3);
    out.push_str("P\"");
    for &b in ssid.as_bytes() {
        match b {
            b'\\' | b'"' => {
                out.push('\\');
                out.push(b as char);
            }
            0x1b => out.push_str("\\e"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            32..=126 => out.push(b as char),
            _ => {
                let _ = write!(out, "\\x{b:02x}");
            }
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn blue() -> AccessPoint {
        AccessPoint::new("passpoint-blue")
            .with_domain("blue.example")
            .with_realms(&["blue.example"])
            .with_roaming_consortium(0xaa)
    }

    #[test]
    fn test_validate() {
        assert!(blue().validate().is_ok());
        assert!(AccessPoint::new("").validate().is_err());
        assert!(AccessPoint::new(&"x".repeat(33)).validate().is_err());
        assert!(
            AccessPoint::new("ap")
                .with_roaming_consortium(0x0011_2233_4455_6677)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_encode_ssid() {
        assert_eq!(encode_ssid("plain"), "P\"plain\"");
        assert_eq!(encode_ssid("a\"b\\c"), "P\"a\\\"b\\\\c\"");
        assert_eq!(encode_ssid("tab\there"), "P\"tab\\there\"");
        assert_eq!(encode_ssid("caf\u{e9}"), "P\"caf\\xc3\\xa9\"");
    }

    #[test]
    fn test_format_oi() {
        assert_eq!(format_oi(0xaa), "0000aa");
        assert_eq!(format_oi(0x506f9a), "506f9a");
        assert_eq!(format_oi(0x1_0000_0000), "0100000000");
        assert_eq!(format_oi(0x0011_2233_4455_6677), "11223344556677");
        assert_eq!(format_oi(u64::MAX), "ffffffffffffffff");
    }

    #[test]
    fn test_hostapd_config_passpoint_fields() {
        let users = PathBuf::from("/tmp/eap_users");
        let eap = EapServerFiles {
            eap_user_file: &users,
            ca_cert: None,
            server_cert: None,
            private_key: None,
        };
        let conf = format_hostapd_config(
            &blue(),
            "wlan1",
            Path::new("/tmp/ctrl"),
            DEFAULT_CHANNEL,
            &eap,
        );
        let lines: Vec<&str> = conf.lines().collect();

        assert!(lines.contains(&"interface=wlan1"));
        assert!(lines.contains(&"ssid2=P\"passpoint-blue\""));
        assert!(lines.contains(&"ctrl_interface=/tmp/ctrl"));
        assert!(lines.contains(&"interworking=1"));
        assert!(lines.contains(&"hs20=1"));
        assert!(lines.contains(&"domain_name=blue.example"));
        assert!(lines.contains(&"nai_realm=0,blue.example,21[2:4][5:7]"));
        assert!(lines.contains(&"roaming_consortium=0000aa"));
        assert!(lines.contains(&"eap_user_file=/tmp/eap_users"));
        assert!(!conf.contains("server_cert="));
    }

    #[test]
    fn test_hostapd_config_without_optional_anqp() {
        let users = PathBuf::from("/tmp/eap_users");
        let eap = EapServerFiles {
            eap_user_file: &users,
            ca_cert: None,
            server_cert: None,
            private_key: None,
        };
        let ap = AccessPoint::new("passpoint-tls")
            .with_realms(&["blue.example"])
            .with_auth(Auth::Tls);
        let conf = format_hostapd_config(&ap, "wlan2", Path::new("/tmp/ctrl"), 6, &eap);

        assert!(conf.contains("nai_realm=0,blue.example,13[5:6]\n"));
        assert!(conf.contains("channel=6\n"));
        assert!(!conf.contains("domain_name="));
        assert!(!conf.contains("roaming_consortium="));
    }
}
