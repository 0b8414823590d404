use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct InterfaceInfo {
    pub(crate) name: String,
    pub(crate) path: String,
}

/// One access point radio observed by a scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ScanResult {
    pub(crate) ssid: String,
    pub(crate) bssid: String,
    pub(crate) signal_dbm: Option<i16>,
}

impl ScanResult {
    pub(crate) fn new(ssid: impl Into<String>, bssid: impl AsRef<str>) -> Self {
        Self {
            ssid: ssid.into(),
            bssid: bssid.as_ref().to_ascii_lowercase(),
            signal_dbm: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) enum InterfaceStatus {
    Connected {
        ssid: Option<String>,
        bssid: String,
    },
    #[default]
    Disconnected,
}

/// A row of the network list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct DisplayEntry {
    pub(crate) ssid: String,
    pub(crate) bssid: String,
    pub(crate) signal_dbm: Option<i16>,
    pub(crate) color: Option<Rgb>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct KnownNetwork {
    pub(crate) ssid: String,
    pub(crate) color: Rgb,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub(crate) struct Rgb(pub(crate) [u8; 3]);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid color `{0}`, expected #rrggbb")]
pub(crate) struct InvalidColor(String);

impl FromStr for Rgb {
    type Err = InvalidColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidColor(s.to_string());
        let hex = s.strip_prefix('#').ok_or_else(invalid)?;
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(invalid());
        }
        let mut out = [0u8; 3];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Self(out))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}

impl TryFrom<String> for Rgb {
    type Error = InvalidColor;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_string()
    }
}
