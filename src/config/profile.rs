use serde::{Deserialize, Serialize};

/// Known product type codes and their display labels.
/// Codes missing from this table are still accepted and labelled [`UNKNOWN_PRODUCT_LABEL`].
pub const PRODUCT_TYPES: &[(u8, &str)] = &[
    (0x5B, "Light switch"),
    (0x5C, "Outlet switch"),
    (0x5D, "Dimmer switch"),
];

pub const UNKNOWN_PRODUCT_LABEL: &str = "unknown";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("MAC suffix must be exactly 4 hex characters, got {0:?}")]
    InvalidMac(String),
}

/// One-byte product type code as written to packet byte 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductType(pub u8);

impl ProductType {
    pub const LIGHT_SWITCH: ProductType = ProductType(0x5B);
    pub const OUTLET_SWITCH: ProductType = ProductType(0x5C);
    pub const DIMMER_SWITCH: ProductType = ProductType(0x5D);

    pub fn code(self) -> u8 {
        self.0
    }

    /// Human label for the UI; unknown codes map to "unknown"
    pub fn label(self) -> &'static str {
        PRODUCT_TYPES
            .iter()
            .find(|(code, _)| *code == self.0)
            .map(|(_, label)| *label)
            .unwrap_or(UNKNOWN_PRODUCT_LABEL)
    }

    pub fn is_known(self) -> bool {
        PRODUCT_TYPES.iter().any(|(code, _)| *code == self.0)
    }
}

impl From<u8> for ProductType {
    fn from(code: u8) -> Self {
        ProductType(code)
    }
}

/// Configuration written to a device on the production line.
///
/// The MAC suffix is kept as the operator typed it. [`ConfigurationProfile::validate`]
/// rejects malformed suffixes; packet encoding itself falls back to zero bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationProfile {
    pub product_type: ProductType,
    pub mac_suffix: String,
    pub light_circuits: u8,
    pub outlet_circuits: u8,
    pub dimming_type: u8,
}

impl ConfigurationProfile {
    pub fn new(
        product_type: u8,
        mac_suffix: impl Into<String>,
        light_circuits: u8,
        outlet_circuits: u8,
        dimming_type: u8,
    ) -> Self {
        Self {
            product_type: ProductType(product_type),
            mac_suffix: mac_suffix.into(),
            light_circuits,
            outlet_circuits,
            dimming_type,
        }
    }

    /// Check operator input before it is sent to a device
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_mac_suffix(&self.mac_suffix).map(|_| ())
    }

    pub fn product_label(&self) -> &'static str {
        self.product_type.label()
    }

    /// MAC suffix bytes, or `None` when the suffix is not exactly 4 hex characters
    pub fn mac_bytes(&self) -> Option<[u8; 2]> {
        parse_mac_suffix(&self.mac_suffix).ok()
    }
}

impl Default for ConfigurationProfile {
    fn default() -> Self {
        Self {
            product_type: ProductType::LIGHT_SWITCH,
            mac_suffix: "0000".to_string(),
            light_circuits: 1,
            outlet_circuits: 0,
            dimming_type: 0,
        }
    }
}

/// Parse the low two MAC bytes from exactly four hex characters
pub fn parse_mac_suffix(mac: &str) -> Result<[u8; 2], ConfigError> {
    if mac.len() != 4 || !is_hex_string(mac) {
        return Err(ConfigError::InvalidMac(mac.to_string()));
    }

    let mut bytes = [0u8; 2];
    hex::decode_to_slice(mac, &mut bytes).map_err(|_| ConfigError::InvalidMac(mac.to_string()))?;
    Ok(bytes)
}

/// Non-empty and made only of hex digits
pub fn is_hex_string(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}
