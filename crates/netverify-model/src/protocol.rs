use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Route sources understood by the encoder.
///
/// The declaration order is the protocol priority used to break ties
/// between protocol winners with the same prefix length and administrative
/// distance (earlier wins).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Connected,
    Static,
    Ospf,
    Bgp,
}

impl Protocol {
    pub const ALL: [Protocol; 4] = [
        Protocol::Connected,
        Protocol::Static,
        Protocol::Ospf,
        Protocol::Bgp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Protocol::Connected => "connected",
            Protocol::Static => "static",
            Protocol::Ospf => "ospf",
            Protocol::Bgp => "bgp",
        }
    }

    /// Default administrative distance. BGP distinguishes external (20)
    /// from internal (200) sessions.
    pub fn default_admin_distance(self, external: bool) -> i64 {
        match self {
            Protocol::Connected => 0,
            Protocol::Static => 1,
            Protocol::Ospf => 110,
            Protocol::Bgp if external => 20,
            Protocol::Bgp => 200,
        }
    }

    /// Protocols that exchange routes with peers over logical edges.
    pub fn is_dynamic(self) -> bool {
        matches!(self, Protocol::Ospf | Protocol::Bgp)
    }

    /// Whether local preference takes part in best-route selection.
    pub fn uses_local_pref(self) -> bool {
        self == Protocol::Bgp
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "connected" => Ok(Protocol::Connected),
            "static" => Ok(Protocol::Static),
            "ospf" => Ok(Protocol::Ospf),
            "bgp" => Ok(Protocol::Bgp),
            _ => Err(ModelError::UnknownOption {
                kind: "protocol",
                value: s.to_string(),
            }),
        }
    }
}
