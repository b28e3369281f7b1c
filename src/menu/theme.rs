//! Public menu theme

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::ValidationError;

pub const DEFAULT_BRAND_COLOR: &str = "#FBBF24";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreset {
    Light,
    #[default]
    Dark,
    Brand,
}

impl ThemePreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThemePreset::Light => "light",
            ThemePreset::Dark => "dark",
            ThemePreset::Brand => "brand",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "light" => Some(ThemePreset::Light),
            "dark" => Some(ThemePreset::Dark),
            "brand" => Some(ThemePreset::Brand),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    pub preset: ThemePreset,
    pub brand_color: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            preset: ThemePreset::Dark,
            brand_color: DEFAULT_BRAND_COLOR.to_string(),
        }
    }
}

impl Theme {
    /// Read a theme from the loosely-typed column value.
    ///
    /// Each field falls back to its default on its own, so a valid preset
    /// with a missing colour still keeps the preset.
    pub fn parse(value: &serde_json::Value) -> Self {
        let mut theme = Theme::default();
        let Some(obj) = value.as_object() else {
            return theme;
        };

        if let Some(preset) = obj
            .get("preset")
            .and_then(|p| p.as_str())
            .and_then(ThemePreset::from_str)
        {
            theme.preset = preset;
        }
        if let Some(color) = obj.get("brandColor").and_then(|c| c.as_str()) {
            theme.brand_color = color.to_string();
        }
        theme
    }

    /// Reject a brand colour that is not `#rrggbb`
    pub fn validated(self) -> Result<Self, ValidationError> {
        let hex = self.brand_color.strip_prefix('#').unwrap_or_default();
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::InvalidColor(self.brand_color));
        }
        Ok(self)
    }

    /// Column value as written by the settings page
    pub fn to_json(&self) -> serde_json::Value {
        json!({ "preset": self.preset.as_str(), "brandColor": self.brand_color })
    }

    /// Colour used for headings: the brand colour, or the default accent
    /// outside the brand preset.
    pub fn accent_color(&self) -> &str {
        match self.preset {
            ThemePreset::Brand => &self.brand_color,
            _ => DEFAULT_BRAND_COLOR,
        }
    }
}
