//! Prompt construction for garment analysis, descriptions and styling advice.
//!
//! Every builder here is a pure function of its inputs; none of them perform I/O.

use base64::{Engine, engine::general_purpose::STANDARD};
use db::models::catalog_item::{CatalogItem, ItemKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use utils::text::preview;

use super::{
    ai_gateway::ChatMessage,
    garment_vocabulary::{Gender, Vocabulary},
};

const ANALYSIS_SYSTEM_PROMPT: &str = "Eres un asistente experto en moda que cataloga prendas a partir de fotografías. \
     Eliges siempre valores de las listas permitidas y respondes solo con JSON válido.";

const DESCRIPTION_SYSTEM_PROMPT: &str = "Eres un asistente experto en moda. Describes prendas de forma precisa y útil \
     para un armario digital, en texto plano.";

const STYLIST_SYSTEM_PROMPT: &str = "Eres un estilista personal. Das consejos concretos y prácticos basados solo en las \
     prendas que se te indican.";

const OUTPUT_FORMAT: &str = r#"
## Formato de respuesta
Responde ÚNICAMENTE con un objeto JSON válido, sin texto adicional, con esta estructura exacta:
{
  "formData": {
    "name": "nombre corto y descriptivo",
    "category": "exactamente una de las categorías permitidas",
    "color": "exactamente uno de los colores permitidos",
    "brand": "marca visible o cadena vacía",
    "suggestedTags": ["etiquetas de la lista permitida"],
    "notes": "observaciones breves sobre cuidado o estilo"
  },
  "aiMetadata": "párrafo descriptivo de 60 a 100 palabras: tejido, corte, detalles, estilo y ocasiones de uso",
  "confidence": {
    "category": 1,
    "color": 1,
    "overall": 1
  }
}
Los valores de "confidence" son enteros del 1 al 10.
"#;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PromptError {
    #[error("image is required")]
    MissingImage,
    #[error("at least {required} items are required, got {actual}")]
    NotEnoughItems { required: usize, actual: usize },
}

/// Image reference sent alongside a prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ImageData {
    /// Publicly reachable URL (or an existing `data:` URL)
    Url { url: String },
    /// Base64-encoded bytes
    Inline {
        #[serde(rename = "mediaType")]
        media_type: String,
        data: String,
    },
}

impl ImageData {
    pub fn from_bytes(bytes: &[u8], media_type: impl Into<String>) -> Self {
        Self::Inline {
            media_type: media_type.into(),
            data: STANDARD.encode(bytes),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Url { url } => url.trim().is_empty(),
            Self::Inline { data, .. } => data.trim().is_empty(),
        }
    }

    /// URL form accepted by the gateway (`data:` URL for inline bytes)
    pub fn to_url(&self) -> String {
        match self {
            Self::Url { url } => url.trim().to_string(),
            Self::Inline { media_type, data } => format!("data:{media_type};base64,{data}"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UserProfile {
    #[serde(default)]
    pub gender: Option<String>,
}

impl UserProfile {
    pub fn gender(&self) -> Option<Gender> {
        self.gender.as_deref().and_then(Gender::from_attribute)
    }
}

/// Fields of an item the caller already knows; blanks count as unknown
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ItemInfo {
    #[serde(default)]
    pub kind: Option<ItemKind>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ItemInfo {
    pub fn kind(&self) -> ItemKind {
        self.kind.unwrap_or_default()
    }

    pub fn known_name(&self) -> Option<&str> {
        known(&self.name)
    }

    fn known_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::new();
        for (label, value) in [
            ("Nombre", &self.name),
            ("Categoría", &self.category),
            ("Color", &self.color),
            ("Marca", &self.brand),
            ("Notas", &self.notes),
        ] {
            if let Some(value) = known(value) {
                fields.push((label, value.to_string()));
            }
        }
        if !self.tags.is_empty() {
            fields.push(("Etiquetas", self.tags.join(", ")));
        }
        fields
    }
}

impl From<&CatalogItem> for ItemInfo {
    fn from(item: &CatalogItem) -> Self {
        Self {
            kind: Some(item.kind),
            name: Some(item.name.clone()),
            category: Some(item.category.clone()),
            color: Some(item.color.clone()),
            brand: item.brand.clone(),
            notes: item.notes.clone(),
            tags: item.tags.clone(),
        }
    }
}

fn known(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Compact view of an already catalogued item for advisory prompts
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub name: String,
    #[serde(default)]
    pub kind: ItemKind,
    pub category: String,
    pub color: String,
    #[serde(default)]
    pub ai_metadata: Option<String>,
}

impl From<&CatalogItem> for ItemSummary {
    fn from(item: &CatalogItem) -> Self {
        Self {
            name: item.name.clone(),
            kind: item.kind,
            category: item.category.clone(),
            color: item.color.clone(),
            ai_metadata: item.ai_metadata.clone(),
        }
    }
}

impl ItemSummary {
    fn render(&self) -> String {
        let mut line = format!("- {} ({}, {})", self.name, self.category, self.color);
        if let Some(metadata) = known(&self.ai_metadata) {
            line.push_str(": ");
            line.push_str(&preview(metadata, 300));
        }
        line
    }
}

/// Messages for a structured analysis call plus the vocabulary they offered
#[derive(Debug, Clone)]
pub struct AnalysisPrompt {
    pub messages: Vec<ChatMessage>,
    pub vocabulary: Vocabulary,
}

fn require_image(image: Option<&ImageData>) -> Result<&ImageData, PromptError> {
    image
        .filter(|image| !image.is_empty())
        .ok_or(PromptError::MissingImage)
}

/// How the prompt refers to the pictured item
fn subject(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Garment => "la prenda",
        ItemKind::Accessory => "el accesorio",
    }
}

fn of_subject(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Garment => "de la prenda",
        ItemKind::Accessory => "del accesorio",
    }
}

fn push_known_fields(prompt: &mut String, item_info: Option<&ItemInfo>) {
    let of_subject = of_subject(item_info.map(ItemInfo::kind).unwrap_or_default());
    let fields = item_info.map(ItemInfo::known_fields).unwrap_or_default();
    if fields.is_empty() {
        prompt.push_str(&format!("No hay datos previos {of_subject}.\n"));
        return;
    }
    prompt.push_str(&format!(
        "Datos ya conocidos {of_subject} (respétalos tal cual):\n"
    ));
    for (label, value) in fields {
        prompt.push_str(&format!("- {label}: {value}\n"));
    }
}

/// Build the structured analysis prompt for one garment image
pub fn build_analysis_prompt(
    image: Option<&ImageData>,
    profile: Option<&UserProfile>,
    item_info: Option<&ItemInfo>,
) -> Result<AnalysisPrompt, PromptError> {
    let image = require_image(image)?;
    let gender = profile.and_then(UserProfile::gender);
    let kind = item_info.map(ItemInfo::kind).unwrap_or_default();
    let vocabulary = Vocabulary::for_item(gender, kind);

    let subject = subject(kind);
    let mut prompt = format!(
        "Analiza {subject} de la imagen y completa su ficha para un armario digital.\n\n## Datos conocidos\n"
    );
    push_known_fields(&mut prompt, item_info);

    prompt.push_str(&format!(
        r#"
## Valores permitidos
Categorías: {}
Colores: {}
Etiquetas: {}

## Instrucciones
1. Si un dato ya es conocido, consérvalo exactamente como está.
2. "category" debe ser exactamente una de las categorías permitidas.
3. "color" debe ser exactamente uno de los colores permitidos (el color predominante).
4. "suggestedTags" solo puede contener etiquetas de la lista permitida.
5. Si la marca no es visible, deja "brand" vacío.
"#,
        vocabulary.categories.join(", "),
        vocabulary.colors.join(", "),
        vocabulary.tags.join(", "),
    ));
    prompt.push_str(OUTPUT_FORMAT);

    Ok(AnalysisPrompt {
        messages: vec![
            ChatMessage::system(ANALYSIS_SYSTEM_PROMPT),
            ChatMessage::user_with_image(prompt, image.to_url()),
        ],
        vocabulary,
    })
}

/// Build the plain-text description prompt; no structured output is requested
pub fn build_description_prompt(
    image: Option<&ImageData>,
    item_info: Option<&ItemInfo>,
) -> Result<Vec<ChatMessage>, PromptError> {
    let image = require_image(image)?;

    let kind = item_info.map(ItemInfo::kind).unwrap_or_default();
    let (pronoun, features) = match kind {
        ItemKind::Garment => ("la", "tejido aparente, corte"),
        ItemKind::Accessory => ("lo", "material aparente, forma"),
    };
    let mut prompt = format!(
        "Describe {} de la imagen para su ficha en un armario digital.\n\n",
        subject(kind)
    );
    push_known_fields(&mut prompt, item_info);
    prompt.push_str(&format!(
        "\nEscribe un único párrafo de 60 a 100 palabras en texto plano, sin listas, sin JSON y sin \
         encabezados. Menciona {features}, detalles destacables, estilo y ocasiones en las que \
         combinar{pronoun}.\n"
    ));

    Ok(vec![
        ChatMessage::system(DESCRIPTION_SYSTEM_PROMPT),
        ChatMessage::user_with_image(prompt, image.to_url()),
    ])
}

/// Ask how well a small set of catalogued items work together
pub fn build_compatibility_prompt(items: &[ItemSummary]) -> Result<Vec<ChatMessage>, PromptError> {
    if items.len() < 2 {
        return Err(PromptError::NotEnoughItems {
            required: 2,
            actual: items.len(),
        });
    }

    let listing = items.iter().map(ItemSummary::render).collect::<Vec<_>>().join("\n");
    let prompt = format!(
        r#"Evalúa si estas prendas combinan bien en un mismo conjunto.

## Prendas
{listing}

## Instrucciones
- Da una valoración general de la combinación.
- Explica qué funciona y qué no (colores, estilos, proporciones).
- Sugiere un cambio concreto si mejoraría el conjunto.
Responde en texto plano, en un máximo de 150 palabras."#
    );

    Ok(vec![
        ChatMessage::system(STYLIST_SYSTEM_PROMPT),
        ChatMessage::user(prompt),
    ])
}

/// Ask for a scan of the whole catalog looking for styling gaps
pub fn build_wardrobe_gaps_prompt(
    items: &[ItemSummary],
    profile: Option<&UserProfile>,
) -> Result<Vec<ChatMessage>, PromptError> {
    if items.is_empty() {
        return Err(PromptError::NotEnoughItems {
            required: 1,
            actual: 0,
        });
    }

    let garments: Vec<String> = items
        .iter()
        .filter(|item| item.kind == ItemKind::Garment)
        .map(ItemSummary::render)
        .collect();
    let accessories: Vec<String> = items
        .iter()
        .filter(|item| item.kind == ItemKind::Accessory)
        .map(ItemSummary::render)
        .collect();

    let mut prompt = String::from("Analiza este armario y detecta carencias de estilo.\n");
    if let Some(gender) = profile.and_then(UserProfile::gender) {
        prompt.push_str(&format!("Perfil de la persona: {gender}.\n"));
    }
    prompt.push_str(&format!("\n## Prendas ({})\n", garments.len()));
    prompt.push_str(&or_none(&garments));
    prompt.push_str(&format!("\n\n## Accesorios ({})\n", accessories.len()));
    prompt.push_str(&or_none(&accessories));
    prompt.push_str(
        r#"

## Instrucciones
- Señala qué tipos de prenda o colores básicos faltan para crear conjuntos versátiles.
- Indica prendas que están infrautilizadas por falta de combinaciones.
- Propón un máximo de 5 incorporaciones prioritarias, explicando por qué.
Responde en texto plano, en un máximo de 250 palabras."#,
    );

    Ok(vec![
        ChatMessage::system(STYLIST_SYSTEM_PROMPT),
        ChatMessage::user(prompt),
    ])
}

fn or_none(lines: &[String]) -> String {
    if lines.is_empty() {
        "(ninguno)".to_string()
    } else {
        lines.join("\n")
    }
}
