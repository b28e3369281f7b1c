//! Read-only projection of a restaurant's menu for the public page

use serde::Serialize;

use super::{MenuItem, Restaurant, Section, SectionId, Theme};
use crate::reorder::sort_canonical;

const PLACEHOLDER_IMAGE_BASE: &str = "https://placehold.co/600x400/333/white?text=";

/// One section as shown to guests
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PublicSection {
    pub id: SectionId,
    pub name: String,
    pub items: Vec<MenuItem>,
}

/// Everything the themed public menu renders
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PublicMenu {
    pub name: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub theme: Theme,
    pub sections: Vec<PublicSection>,
}

impl PublicMenu {
    /// Project the stored menu: canonical order, hidden items removed,
    /// missing images replaced with a placeholder.
    pub fn build(restaurant: &Restaurant, sections: &[Section]) -> Self {
        let mut ordered = sections.to_vec();
        sort_canonical(&mut ordered);

        let sections = ordered
            .into_iter()
            .map(|mut section| {
                sort_canonical(&mut section.items);
                let items = section
                    .items
                    .into_iter()
                    .filter(|item| item.is_visible)
                    .map(|mut item| {
                        if item.image_url.is_none() {
                            item.image_url = Some(placeholder_image(&item.name));
                        }
                        item
                    })
                    .collect();
                PublicSection {
                    id: section.id,
                    name: section.name,
                    items,
                }
            })
            .collect();

        Self {
            name: restaurant.name.clone(),
            description: restaurant.description.clone(),
            logo_url: restaurant.logo_url.clone(),
            theme: restaurant.theme(),
            sections,
        }
    }

    /// Featured items across all sections, in menu order
    pub fn featured(&self) -> Vec<&MenuItem> {
        self.sections
            .iter()
            .flat_map(|s| s.items.iter())
            .filter(|item| item.is_featured)
            .collect()
    }

    /// Section to highlight when the page first loads
    pub fn initial_section(&self) -> Option<SectionId> {
        self.sections.first().map(|s| s.id)
    }
}

pub fn placeholder_image(name: &str) -> String {
    format!("{}{}", PLACEHOLDER_IMAGE_BASE, urlencoding::encode(name))
}

/// Format a price in rupees with Indian digit grouping, e.g. `₹1,23,456.50`
pub fn format_price(price: f64) -> String {
    let paise = (price.abs() * 100.0).round() as u64;
    let whole = (paise / 100).to_string();
    let fraction = paise % 100;

    let grouped = if whole.len() <= 3 {
        whole
    } else {
        let (head, tail) = whole.split_at(whole.len() - 3);
        let mut groups: Vec<&str> = Vec::new();
        let mut end = head.len();
        while end > 0 {
            let start = end.saturating_sub(2);
            groups.push(&head[start..end]);
            end = start;
        }
        groups.reverse();
        format!("{},{}", groups.join(","), tail)
    };

    let sign = if price < 0.0 { "-" } else { "" };
    format!("{}₹{}.{:02}", sign, grouped, fraction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::ItemDraft;
    use uuid::Uuid;

    fn item(
        section: &Section,
        name: &str,
        position: i32,
        visible: bool,
        featured: bool,
    ) -> MenuItem {
        let draft = ItemDraft {
            name: name.to_string(),
            is_visible: visible,
            is_featured: featured,
            ..ItemDraft::default()
        };
        MenuItem::from_draft(section.id, draft, position).unwrap()
    }

    #[test]
    fn test_build_filters_and_orders() {
        let restaurant = Restaurant::new(Uuid::new_v4(), "Cafe Roma", "cafe-roma").unwrap();
        let mut mains = Section::new(restaurant.id, "Mains", 1).unwrap();
        let starters = Section::new(restaurant.id, "Starters", 0).unwrap();

        mains.items.push(item(&mains, "Risotto", 1, true, true));
        mains.items.push(item(&mains, "Secret Special", 0, false, false));
        mains.items.push(item(&mains, "Lasagne", 0, true, false));

        let menu = PublicMenu::build(&restaurant, &[mains, starters]);

        assert_eq!(menu.sections.len(), 2);
        assert_eq!(menu.sections[0].name, "Starters");
        assert!(menu.sections[0].items.is_empty());

        let names: Vec<&str> = menu.sections[1].items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Lasagne", "Risotto"]);
        assert_eq!(menu.featured().len(), 1);
        assert_eq!(menu.featured()[0].name, "Risotto");
        assert_eq!(menu.initial_section(), Some(menu.sections[0].id));
    }

    #[test]
    fn test_placeholder_image() {
        assert_eq!(
            placeholder_image("Masala Dosa"),
            "https://placehold.co/600x400/333/white?text=Masala%20Dosa"
        );
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(0.0), "₹0.00");
        assert_eq!(format_price(99.5), "₹99.50");
        assert_eq!(format_price(1234.5), "₹1,234.50");
        assert_eq!(format_price(123456.0), "₹1,23,456.00");
        assert_eq!(format_price(12345678.9), "₹1,23,45,678.90");
    }
}
