//! Controlled vocabularies offered to the model and enforced on its replies.

use db::models::catalog_item::ItemKind;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use ts_rs::TS;

pub const FEMALE_CATEGORIES: &[&str] = &[
    "Camisas",
    "Blusas",
    "Camisetas",
    "Tops",
    "Jerséis",
    "Sudaderas",
    "Chaquetas",
    "Abrigos",
    "Pantalones",
    "Vaqueros",
    "Faldas",
    "Vestidos",
    "Monos",
    "Shorts",
    "Ropa deportiva",
    "Calzado",
];

pub const MALE_CATEGORIES: &[&str] = &[
    "Camisas",
    "Camisetas",
    "Polos",
    "Jerséis",
    "Sudaderas",
    "Chaquetas",
    "Abrigos",
    "Trajes",
    "Pantalones",
    "Vaqueros",
    "Shorts",
    "Ropa deportiva",
    "Calzado",
];

pub const ACCESSORY_CATEGORIES: &[&str] = &[
    "Bolsos",
    "Cinturones",
    "Bufandas",
    "Sombreros",
    "Gafas de sol",
    "Joyería",
    "Relojes",
    "Corbatas",
    "Guantes",
    "Otros",
];

pub const COLORS: &[&str] = &[
    "Negro",
    "Blanco",
    "Gris",
    "Azul",
    "Azul marino",
    "Rojo",
    "Rosa",
    "Verde",
    "Amarillo",
    "Naranja",
    "Morado",
    "Marrón",
    "Beige",
    "Multicolor",
];

pub const TAGS: &[&str] = &[
    "casual",
    "formal",
    "trabajo",
    "deporte",
    "fiesta",
    "verano",
    "invierno",
    "entretiempo",
    "básico",
    "estampado",
];

pub const DEFAULT_COLOR: &str = "Negro";
pub const DEFAULT_TAG: &str = "casual";

/// Gender attribute of a user profile, as far as vocabulary selection is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Gender {
    #[strum(to_string = "female", serialize = "woman", serialize = "mujer", serialize = "femenino")]
    Female,
    #[strum(to_string = "male", serialize = "man", serialize = "hombre", serialize = "masculino")]
    Male,
}

impl Gender {
    /// Recognize a free-form profile attribute; anything else is `None`
    pub fn from_attribute(value: &str) -> Option<Self> {
        value.trim().parse().ok()
    }
}

/// The option lists for one enrichment call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct Vocabulary {
    pub categories: Vec<String>,
    pub colors: Vec<String>,
    pub tags: Vec<String>,
}

impl Vocabulary {
    pub fn for_item(gender: Option<Gender>, kind: ItemKind) -> Self {
        Self {
            categories: category_vocabulary(gender, kind),
            colors: to_owned(COLORS),
            tags: to_owned(TAGS),
        }
    }

    /// First category offered; used whenever the model's choice cannot be trusted
    pub fn default_category(&self) -> &str {
        self.categories
            .first()
            .map(String::as_str)
            .unwrap_or("Otros")
    }

    pub fn default_color(&self) -> &str {
        if self.colors.iter().any(|c| c == DEFAULT_COLOR) {
            DEFAULT_COLOR
        } else {
            self.colors.first().map(String::as_str).unwrap_or(DEFAULT_COLOR)
        }
    }

    /// Canonical spelling of `value` if it is one of the categories
    pub fn canonical_category(&self, value: &str) -> Option<&str> {
        canonical(&self.categories, value)
    }

    pub fn canonical_color(&self, value: &str) -> Option<&str> {
        canonical(&self.colors, value)
    }
}

/// Categories for the given profile attribute and item kind.
///
/// Unknown or missing gender yields the union of the gendered lists, deduplicated
/// in first-seen order (female list, then male list).
pub fn category_vocabulary(gender: Option<Gender>, kind: ItemKind) -> Vec<String> {
    match (kind, gender) {
        (ItemKind::Accessory, _) => to_owned(ACCESSORY_CATEGORIES),
        (ItemKind::Garment, Some(Gender::Female)) => to_owned(FEMALE_CATEGORIES),
        (ItemKind::Garment, Some(Gender::Male)) => to_owned(MALE_CATEGORIES),
        (ItemKind::Garment, None) => {
            let mut union: Vec<String> = Vec::new();
            for category in FEMALE_CATEGORIES.iter().chain(MALE_CATEGORIES) {
                if !union.iter().any(|c| c == category) {
                    union.push((*category).to_string());
                }
            }
            union
        }
    }
}

fn canonical<'a>(options: &'a [String], value: &str) -> Option<&'a str> {
    let value = value.trim();
    options
        .iter()
        .find(|option| option.to_lowercase() == value.to_lowercase())
        .map(String::as_str)
}

fn to_owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
