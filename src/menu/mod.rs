//! Menu data model
//!
//! Restaurants own an ordered list of sections, and each section owns an
//! ordered list of items. Order among siblings is carried by an integer
//! `position` that the `reorder` module keeps dense.

mod model;
pub mod public;
pub mod theme;

use thiserror::Error;
use uuid::Uuid;

pub use model::{
    FieldKey, ItemDraft, ItemField, MenuItem, Restaurant, RestaurantSettings, Section, Tag,
};
pub use public::{format_price, PublicMenu, PublicSection};
pub use theme::{Theme, ThemePreset};

pub type RestaurantId = Uuid;
pub type SectionId = Uuid;
pub type ItemId = Uuid;
pub type UserId = Uuid;

/// Rejections raised locally, before any remote call is made
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Name must not be empty")]
    EmptyName,

    #[error("Invalid price: {0}")]
    InvalidPrice(f64),

    #[error("Invalid subdomain: {0}")]
    InvalidSubdomain(String),

    #[error("Invalid colour: {0}")]
    InvalidColor(String),
}

/// Trim a display name, rejecting blank input.
pub fn normalize_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    Ok(trimmed.to_string())
}

/// Prices are non-negative, finite decimals.
pub fn validate_price(price: f64) -> Result<f64, ValidationError> {
    if !price.is_finite() || price < 0.0 {
        return Err(ValidationError::InvalidPrice(price));
    }
    Ok(price)
}

/// A subdomain is a single DNS label: `[a-z0-9-]{1,63}`, no leading or
/// trailing hyphen.
pub fn validate_subdomain(subdomain: &str) -> Result<String, ValidationError> {
    let label = subdomain.trim().to_ascii_lowercase();
    let valid_chars = label
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if label.is_empty()
        || label.len() > 63
        || !valid_chars
        || label.starts_with('-')
        || label.ends_with('-')
    {
        return Err(ValidationError::InvalidSubdomain(subdomain.to_string()));
    }
    Ok(label)
}
