//! Radio fabric: the client and AP interfaces the environment provides.
//!
//! The harness never creates interfaces. It only binds descriptors to the AP
//! interfaces and attributes association events to client interfaces by MAC.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{HarnessError, Result};

/// IEEE 802 MAC address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Random locally administered unicast address.
    pub fn random_local() -> Self {
        let mut octets: [u8; 6] = rand::random();
        octets[0] = (octets[0] & 0xfc) | 0x02;
        Self(octets)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddr {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.trim().split(':');
        for octet in &mut octets {
            let part = parts.next().ok_or_else(|| format!("invalid MAC '{s}'"))?;
            if part.len() != 2 {
                return Err(format!("invalid MAC '{s}'"));
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| format!("invalid MAC '{s}'"))?;
        }
        if parts.next().is_some() {
            return Err(format!("invalid MAC '{s}'"));
        }
        Ok(Self(octets))
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Read the hardware address of a network interface from sysfs.
pub fn read_iface_mac(iface: &str) -> anyhow::Result<MacAddr> {
    let path = Path::new("/sys/class/net").join(iface).join("address");
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("read {}", path.display()))?;
    raw.parse::<MacAddr>()
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("parse MAC of {iface}"))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIface {
    pub name: String,
    pub mac: MacAddr,
}

impl ClientIface {
    pub fn new(name: &str, mac: MacAddr) -> Self {
        Self {
            name: name.to_string(),
            mac,
        }
    }
}

/// Two disjoint, ordered interface sequences.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RadioFabric {
    clients: Vec<ClientIface>,
    aps: Vec<String>,
}

impl RadioFabric {
    pub fn new(clients: Vec<ClientIface>, aps: Vec<String>) -> Result<Self> {
        if clients.is_empty() {
            return Err(HarnessError::InvalidScenario(
                "radio fabric has no client interface".into(),
            ));
        }

        let mut names = FxHashSet::default();
        for name in clients.iter().map(|c| c.name.as_str()).chain(aps.iter().map(String::as_str)) {
            if name.is_empty() {
                return Err(HarnessError::InvalidScenario("empty interface name".into()));
            }
            if !names.insert(name) {
                return Err(HarnessError::InvalidScenario(format!(
                    "interface {name} listed twice"
                )));
            }
        }

        let mut macs = FxHashSet::default();
        if let Some(dup) = clients.iter().find(|c| !macs.insert(c.mac)) {
            return Err(HarnessError::InvalidScenario(format!(
                "client MAC {} listed twice",
                dup.mac
            )));
        }

        Ok(Self { clients, aps })
    }

    /// Client interface driven by the scenario.
    pub fn primary_client(&self) -> &ClientIface {
        &self.clients[0]
    }

    pub fn clients(&self) -> &[ClientIface] {
        &self.clients
    }

    pub fn ap_ifaces(&self) -> &[String] {
        &self.aps
    }

    /// Name of the client interface owning `mac`.
    pub fn client_for_mac(&self, mac: &MacAddr) -> Option<&str> {
        self.clients
            .iter()
            .find(|c| c.mac == *mac)
            .map(|c| c.name.as_str())
    }
}
