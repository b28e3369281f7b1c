//! Restaurant, section and item records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::theme::Theme;
use super::{
    normalize_name, validate_price, validate_subdomain, ItemId, RestaurantId, SectionId, UserId,
    ValidationError,
};
use crate::reorder::{next_position, Contained, Positioned};

/// A tenant: one restaurant and its public menu settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Restaurant {
    pub id: RestaurantId,
    pub owner_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub subdomain: String,
    pub logo_url: Option<String>,
    /// Stored as loose JSON by the backend; read through `Theme::parse`
    #[serde(default)]
    pub theme: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Restaurant {
    pub fn new(owner_id: UserId, name: &str, subdomain: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            id: Uuid::new_v4(),
            owner_id,
            name: normalize_name(name)?,
            description: None,
            subdomain: validate_subdomain(subdomain)?,
            logo_url: None,
            theme: serde_json::Value::Null,
            created_at: Utc::now(),
        })
    }

    pub fn theme(&self) -> Theme {
        Theme::parse(&self.theme)
    }

    /// The fields the settings page edits
    pub fn settings(&self) -> RestaurantSettings {
        RestaurantSettings {
            name: self.name.clone(),
            description: self.description.clone(),
            logo_url: self.logo_url.clone(),
            theme: self.theme(),
        }
    }

    pub fn apply_settings(&mut self, settings: &RestaurantSettings) {
        self.name = settings.name.clone();
        self.description = settings.description.clone();
        self.logo_url = settings.logo_url.clone();
        self.theme = settings.theme.to_json();
    }
}

/// Editable restaurant details. Subdomain and owner are fixed at creation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RestaurantSettings {
    pub name: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub theme: Theme,
}

impl RestaurantSettings {
    /// Trim the name, drop a blank description and check the theme
    pub fn validated(self) -> Result<Self, ValidationError> {
        let description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        Ok(Self {
            name: normalize_name(&self.name)?,
            description,
            logo_url: self.logo_url,
            theme: self.theme.validated()?,
        })
    }

    /// Body of the `restaurants` row update
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "logo_url": self.logo_url,
            "theme": self.theme.to_json(),
        })
    }
}

/// A label attached to items on the public menu
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub color: String,
}

/// An ordered group of items within a restaurant's menu
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Section {
    pub id: SectionId,
    pub restaurant_id: RestaurantId,
    pub name: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<MenuItem>,
}

impl Section {
    pub fn new(
        restaurant_id: RestaurantId,
        name: &str,
        position: i32,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            id: Uuid::new_v4(),
            restaurant_id,
            name: normalize_name(name)?,
            position,
            created_at: Utc::now(),
            updated_at: None,
            items: Vec::new(),
        })
    }

    /// Position for an item appended to the end of this section
    pub fn next_item_position(&self) -> i32 {
        next_position(&self.items)
    }

    /// Copy of this section without its items, as stored in the sections table
    pub fn header(&self) -> Section {
        Section {
            items: Vec::new(),
            ..self.clone()
        }
    }
}

/// A single dish or drink on the menu
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MenuItem {
    pub id: ItemId,
    pub section_id: SectionId,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub image_url: Option<String>,
    pub is_visible: bool,
    pub is_featured: bool,
    #[serde(default)]
    pub tags: Vec<Tag>,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl MenuItem {
    /// Build a new item appended at `position` in `section_id`
    pub fn from_draft(
        section_id: SectionId,
        draft: ItemDraft,
        position: i32,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            id: Uuid::new_v4(),
            section_id,
            name: normalize_name(&draft.name)?,
            description: draft.description,
            price: validate_price(draft.price)?,
            image_url: draft.image_url,
            is_visible: draft.is_visible,
            is_featured: draft.is_featured,
            tags: draft.tags,
            position,
            created_at: Utc::now(),
            updated_at: None,
        })
    }

    /// Apply a single field edit in place
    pub fn apply_field(&mut self, field: &ItemField) {
        match field {
            ItemField::Name(name) => self.name = name.clone(),
            ItemField::Description(description) => self.description = description.clone(),
            ItemField::Price(price) => self.price = *price,
            ItemField::ImageUrl(url) => self.image_url = url.clone(),
            ItemField::Visible(visible) => self.is_visible = *visible,
            ItemField::Featured(featured) => self.is_featured = *featured,
        }
    }

    /// Current value of the field identified by `key`
    pub fn field(&self, key: FieldKey) -> ItemField {
        match key {
            FieldKey::Name => ItemField::Name(self.name.clone()),
            FieldKey::Description => ItemField::Description(self.description.clone()),
            FieldKey::Price => ItemField::Price(self.price),
            FieldKey::ImageUrl => ItemField::ImageUrl(self.image_url.clone()),
            FieldKey::Visible => ItemField::Visible(self.is_visible),
            FieldKey::Featured => ItemField::Featured(self.is_featured),
        }
    }
}

/// Input for creating an item. Defaults match the builder's "+ Add Item".
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ItemDraft {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub image_url: Option<String>,
    pub is_visible: bool,
    pub is_featured: bool,
    pub tags: Vec<Tag>,
}

impl Default for ItemDraft {
    fn default() -> Self {
        Self {
            name: "New Item".to_string(),
            description: None,
            price: 0.0,
            image_url: None,
            is_visible: true,
            is_featured: false,
            tags: Vec::new(),
        }
    }
}

/// Identifies an editable scalar field of an item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    Name,
    Description,
    Price,
    ImageUrl,
    Visible,
    Featured,
}

impl FieldKey {
    /// Column name in the items table
    pub fn column(&self) -> &'static str {
        match self {
            FieldKey::Name => "name",
            FieldKey::Description => "description",
            FieldKey::Price => "price",
            FieldKey::ImageUrl => "image_url",
            FieldKey::Visible => "is_visible",
            FieldKey::Featured => "is_featured",
        }
    }
}

/// A new value for one item field
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum ItemField {
    Name(String),
    Description(Option<String>),
    Price(f64),
    ImageUrl(Option<String>),
    Visible(bool),
    Featured(bool),
}

impl ItemField {
    pub fn key(&self) -> FieldKey {
        match self {
            ItemField::Name(_) => FieldKey::Name,
            ItemField::Description(_) => FieldKey::Description,
            ItemField::Price(_) => FieldKey::Price,
            ItemField::ImageUrl(_) => FieldKey::ImageUrl,
            ItemField::Visible(_) => FieldKey::Visible,
            ItemField::Featured(_) => FieldKey::Featured,
        }
    }

    /// Check and normalize the value before it touches local state
    pub fn validated(self) -> Result<Self, ValidationError> {
        match self {
            ItemField::Name(name) => Ok(ItemField::Name(normalize_name(&name)?)),
            ItemField::Price(price) => Ok(ItemField::Price(validate_price(price)?)),
            other => Ok(other),
        }
    }

    /// JSON value as written to the backend column
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ItemField::Name(name) => serde_json::json!(name),
            ItemField::Description(description) => serde_json::json!(description),
            ItemField::Price(price) => serde_json::json!(price),
            ItemField::ImageUrl(url) => serde_json::json!(url),
            ItemField::Visible(visible) => serde_json::json!(visible),
            ItemField::Featured(featured) => serde_json::json!(featured),
        }
    }
}

impl Positioned for Section {
    fn id(&self) -> Uuid {
        self.id
    }

    fn position(&self) -> i32 {
        self.position
    }

    fn set_position(&mut self, position: i32) {
        self.position = position;
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Positioned for MenuItem {
    fn id(&self) -> Uuid {
        self.id
    }

    fn position(&self) -> i32 {
        self.position
    }

    fn set_position(&mut self, position: i32) {
        self.position = position;
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Contained for MenuItem {
    fn container_id(&self) -> Uuid {
        self.section_id
    }

    fn set_container_id(&mut self, container_id: Uuid) {
        self.section_id = container_id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::ThemePreset;

    #[test]
    fn test_section_creation_trims_name() {
        let section = Section::new(Uuid::new_v4(), "  Mains ", 3).unwrap();
        assert_eq!(section.name, "Mains");
        assert_eq!(section.position, 3);
        assert!(section.items.is_empty());
        assert!(Section::new(Uuid::new_v4(), " ", 0).is_err());
    }

    #[test]
    fn test_settings_round_trip_through_restaurant() {
        let mut restaurant = Restaurant::new(Uuid::new_v4(), "Cafe Roma", "cafe-roma").unwrap();
        assert_eq!(restaurant.settings().theme, Theme::default());

        let settings = RestaurantSettings {
            name: "  Roma Trattoria ".into(),
            description: Some("   ".into()),
            logo_url: Some("https://cdn.example.com/logo.png".into()),
            theme: Theme { preset: ThemePreset::Brand, brand_color: "#AA3300".into() },
        }
        .validated()
        .unwrap();
        assert_eq!(settings.name, "Roma Trattoria");
        assert_eq!(settings.description, None);

        restaurant.apply_settings(&settings);
        assert_eq!(restaurant.settings(), settings);
        assert_eq!(restaurant.theme().accent_color(), "#AA3300");
    }

    #[test]
    fn test_settings_reject_bad_colour() {
        let settings = RestaurantSettings {
            name: "Cafe Roma".into(),
            description: None,
            logo_url: None,
            theme: Theme { preset: ThemePreset::Brand, brand_color: "red".into() },
        };
        assert_eq!(settings.validated(), Err(ValidationError::InvalidColor("red".into())));
    }

    #[test]
    fn test_next_item_position() {
        let mut section = Section::new(Uuid::new_v4(), "Drinks", 0).unwrap();
        assert_eq!(section.next_item_position(), 0);

        let item = MenuItem::from_draft(section.id, ItemDraft::default(), 4).unwrap();
        section.items.push(item);
        assert_eq!(section.next_item_position(), 5);
    }

    #[test]
    fn test_item_draft_defaults() {
        let item = MenuItem::from_draft(Uuid::new_v4(), ItemDraft::default(), 0).unwrap();
        assert_eq!(item.name, "New Item");
        assert_eq!(item.price, 0.0);
        assert!(item.is_visible);
        assert!(!item.is_featured);
    }

    #[test]
    fn test_item_draft_rejects_negative_price() {
        let draft = ItemDraft { price: -1.0, ..ItemDraft::default() };
        assert_eq!(
            MenuItem::from_draft(Uuid::new_v4(), draft, 0),
            Err(ValidationError::InvalidPrice(-1.0))
        );
    }

    #[test]
    fn test_apply_field_and_read_back() {
        let mut item = MenuItem::from_draft(Uuid::new_v4(), ItemDraft::default(), 0).unwrap();
        item.apply_field(&ItemField::Price(9.5));
        item.apply_field(&ItemField::Featured(true));

        assert_eq!(item.field(FieldKey::Price), ItemField::Price(9.5));
        assert_eq!(item.field(FieldKey::Featured), ItemField::Featured(true));
        assert_eq!(ItemField::Price(9.5).key().column(), "price");
    }

    #[test]
    fn test_item_field_validation() {
        assert_eq!(
            ItemField::Name("  Dal ".into()).validated().unwrap(),
            ItemField::Name("Dal".into())
        );
        assert!(ItemField::Name("".into()).validated().is_err());
        assert!(ItemField::Price(-3.0).validated().is_err());
        assert_eq!(
            ItemField::Visible(false).validated().unwrap(),
            ItemField::Visible(false)
        );
    }

    #[test]
    fn test_section_header_drops_items() {
        let mut section = Section::new(Uuid::new_v4(), "Desserts", 0).unwrap();
        section
            .items
            .push(MenuItem::from_draft(section.id, ItemDraft::default(), 0).unwrap());
        let header = section.header();
        assert_eq!(header.id, section.id);
        assert!(header.items.is_empty());
    }
}
