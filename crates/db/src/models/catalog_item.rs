use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use tracing::warn;
use ts_rs::TS;
use uuid::Uuid;

/// Whether a catalog entry is a wardrobe piece or an accessory
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "item_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ItemKind {
    #[default]
    Garment,
    Accessory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: Uuid,
    pub kind: ItemKind,
    pub name: String,
    pub category: String,
    pub color: String,
    pub brand: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub ai_metadata: Option<String>, // user-owned text, stored verbatim
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row shape as stored; tags are a JSON array in a TEXT column
#[derive(Debug, FromRow)]
struct CatalogItemRow {
    id: Uuid,
    kind: ItemKind,
    name: String,
    category: String,
    color: String,
    brand: Option<String>,
    notes: Option<String>,
    tags: String,
    image_url: Option<String>,
    ai_metadata: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CatalogItemRow> for CatalogItem {
    fn from(row: CatalogItemRow) -> Self {
        Self {
            id: row.id,
            kind: row.kind,
            name: row.name,
            category: row.category,
            color: row.color,
            brand: row.brand,
            notes: row.notes,
            tags: decode_tags(row.id, &row.tags),
            image_url: row.image_url,
            ai_metadata: row.ai_metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct CreateCatalogItem {
    #[serde(default)]
    pub kind: ItemKind,
    pub name: String,
    pub category: String,
    pub color: String,
    pub brand: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub ai_metadata: Option<String>,
}

/// Partial update; `None` leaves the stored value untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCatalogItem {
    pub name: Option<String>,
    pub category: Option<String>,
    pub color: Option<String>,
    pub brand: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<Vec<String>>,
    pub image_url: Option<String>,
    pub ai_metadata: Option<String>,
}

/// Suggested fields produced by an enrichment call, ready to merge into a stored item
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentPatch {
    pub name: String,
    pub category: String,
    pub color: String,
    pub brand: String,
    pub notes: String,
    pub tags: Vec<String>,
    pub ai_metadata: String,
}

/// Deduplicate tags keeping first-seen order; blank tags are dropped
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !out.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            out.push(tag.to_string());
        }
    }
    out
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl CatalogItem {
    /// Merge suggested fields: non-blank suggestions replace stored values, tags are unioned,
    /// `ai_metadata` is replaced verbatim.
    pub fn merged_with(&self, patch: &EnrichmentPatch) -> UpdateCatalogItem {
        UpdateCatalogItem {
            name: non_blank(&patch.name),
            category: non_blank(&patch.category),
            color: non_blank(&patch.color),
            brand: non_blank(&patch.brand),
            notes: non_blank(&patch.notes),
            tags: Some(normalize_tags(self.tags.iter().chain(patch.tags.iter()))),
            image_url: None,
            ai_metadata: Some(patch.ai_metadata.clone()),
        }
    }

    pub async fn create(
        pool: &SqlitePool,
        id: Uuid,
        data: &CreateCatalogItem,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        let tags = encode_tags(&normalize_tags(&data.tags))?;
        sqlx::query(
            r#"INSERT INTO catalog_items
                (id, kind, name, category, color, brand, notes, tags, image_url, ai_metadata, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)"#,
        )
        .bind(id)
        .bind(data.kind)
        .bind(&data.name)
        .bind(&data.category)
        .bind(&data.color)
        .bind(&data.brand)
        .bind(&data.notes)
        .bind(tags)
        .bind(&data.image_url)
        .bind(&data.ai_metadata)
        .bind(now)
        .execute(pool)
        .await?;

        Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, CatalogItemRow>(
            r#"SELECT id, kind, name, category, color, brand, notes, tags, image_url, ai_metadata, created_at, updated_at
               FROM catalog_items
               WHERE id = ?1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(Into::into))
    }

    /// All items, newest first, optionally restricted to one kind
    pub async fn find_all(
        pool: &SqlitePool,
        kind: Option<ItemKind>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, CatalogItemRow>(
            r#"SELECT id, kind, name, category, color, brand, notes, tags, image_url, ai_metadata, created_at, updated_at
               FROM catalog_items
               WHERE ?1 IS NULL OR kind = ?1
               ORDER BY created_at DESC"#,
        )
        .bind(kind)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Items that have an image but no descriptive metadata yet
    pub async fn find_missing_ai_metadata(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        let rows = sqlx::query_as::<_, CatalogItemRow>(
            r#"SELECT id, kind, name, category, color, brand, notes, tags, image_url, ai_metadata, created_at, updated_at
               FROM catalog_items
               WHERE image_url IS NOT NULL
                 AND (ai_metadata IS NULL OR trim(ai_metadata) = '')
               ORDER BY created_at ASC"#,
        )
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateCatalogItem,
    ) -> Result<Option<Self>, sqlx::Error> {
        let tags = data
            .tags
            .as_ref()
            .map(|tags| encode_tags(&normalize_tags(tags)))
            .transpose()?;
        let result = sqlx::query(
            r#"UPDATE catalog_items
               SET name        = COALESCE(?2, name),
                   category    = COALESCE(?3, category),
                   color       = COALESCE(?4, color),
                   brand       = COALESCE(?5, brand),
                   notes       = COALESCE(?6, notes),
                   tags        = COALESCE(?7, tags),
                   image_url   = COALESCE(?8, image_url),
                   ai_metadata = COALESCE(?9, ai_metadata),
                   updated_at  = ?10
               WHERE id = ?1"#,
        )
        .bind(id)
        .bind(&data.name)
        .bind(&data.category)
        .bind(&data.color)
        .bind(&data.brand)
        .bind(&data.notes)
        .bind(tags)
        .bind(&data.image_url)
        .bind(&data.ai_metadata)
        .bind(Utc::now())
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Self::find_by_id(pool, id).await
    }

    /// Merge an enrichment result into the stored item
    pub async fn apply_enrichment(
        pool: &SqlitePool,
        id: Uuid,
        patch: &EnrichmentPatch,
    ) -> Result<Option<Self>, sqlx::Error> {
        let Some(existing) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };
        Self::update(pool, id, &existing.merged_with(patch)).await
    }

    /// Store a generated description only while the item still has none, so a
    /// description written in the meantime is kept. Returns whether a row changed.
    pub async fn fill_missing_ai_metadata(
        pool: &SqlitePool,
        id: Uuid,
        ai_metadata: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE catalog_items
               SET ai_metadata = ?2,
                   updated_at = ?3
               WHERE id = ?1
                 AND (ai_metadata IS NULL OR trim(ai_metadata) = '')"#,
        )
        .bind(id)
        .bind(ai_metadata)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM catalog_items WHERE id = ?1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn decode_tags(id: Uuid, raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(item_id = %id, error = %e, "Stored tags are not a JSON array, ignoring them");
        Vec::new()
    })
}

fn encode_tags(tags: &[String]) -> Result<String, sqlx::Error> {
    serde_json::to_string(tags).map_err(|e| sqlx::Error::Protocol(e.to_string()))
}
