use crate::error::Result;
use serde::{Deserialize, Deserializer};

/// ANSI truecolor prefixes for each kind of thing the renderer paints.
///
/// Missing keys keep the default palette; unknown keys are rejected so a
/// misspelled role does not silently do nothing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Theme {
    #[serde(deserialize_with = "color")]
    pub directory: String,
    #[serde(deserialize_with = "color")]
    pub executable: String,
    #[serde(deserialize_with = "color")]
    pub symlink: String,
    #[serde(deserialize_with = "color")]
    pub tree_chars: String,
    #[serde(deserialize_with = "color")]
    pub permissions: String,
    #[serde(deserialize_with = "color")]
    pub ownership: String,
    /// Platform headings and breadcrumbs
    #[serde(deserialize_with = "color")]
    pub platform: String,
    #[serde(deserialize_with = "color")]
    pub digest: String,
    #[serde(deserialize_with = "color")]
    pub size: String,
    /// Deleted and opaque markers
    #[serde(deserialize_with = "color")]
    pub whiteout: String,
}

impl Default for Theme {
    // Gruvbox Material Dark
    fn default() -> Self {
        Theme {
            directory: ansi([0x7d, 0xae, 0xa3]),
            executable: ansi([0xa9, 0xb6, 0x65]),
            symlink: ansi([0x89, 0xb4, 0x82]),
            tree_chars: ansi([0x92, 0x83, 0x74]),
            permissions: ansi([0xdd, 0xc7, 0xa1]),
            ownership: ansi([0xd8, 0xa6, 0x57]),
            platform: ansi([0xd3, 0x86, 0x9b]),
            digest: ansi([0x92, 0x83, 0x74]),
            size: ansi([0xd8, 0xa6, 0x57]),
            whiteout: ansi([0xea, 0x69, 0x62]),
        }
    }
}

impl Theme {
    /// Parse a theme from a JSON object such as `{"digest": "#928374"}`
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

fn ansi([r, g, b]: [u8; 3]) -> String {
    format!("\x1b[38;2;{};{};{}m", r, g, b)
}

/// `#RRGGBB` or `RRGGBB`
fn parse_hex(hex: &str) -> Option<[u8; 3]> {
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

/// A color is a hex string or an `[r, g, b]` array.
fn color<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Spec {
        Hex(String),
        Rgb([u8; 3]),
    }

    match Spec::deserialize(deserializer)? {
        Spec::Rgb(rgb) => Ok(ansi(rgb)),
        Spec::Hex(hex) => parse_hex(&hex)
            .map(ansi)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid hex color: {}", hex))),
    }
}
