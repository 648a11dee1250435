//! Shared domain models.

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Opaque identifier assigned by the catalog service.
///
/// The service has emitted both integers and strings for this field, so both
/// are accepted on input. It is always written back out as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Wrap a raw identifier.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EntryId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl<'de> Deserialize<'de> for EntryId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(value) => Self(value),
            RawId::Signed(value) => Self(value.to_string()),
            RawId::Unsigned(value) => Self(value.to_string()),
        })
    }
}

/// A vehicle listing as returned by the catalog service.
///
/// Equality and hashing only look at [`CatalogEntry::id`]: two fetches of the
/// same listing may differ in their optional display fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Service-assigned identity.
    pub id: EntryId,
    /// Manufacturer, e.g. `Honda`.
    pub make: String,
    /// Model name, e.g. `Civic`.
    pub model: String,
    /// Model year.
    pub year: i32,
    /// Asking price.
    pub price: f64,
    /// Odometer reading, if known.
    #[serde(default)]
    pub mileage: Option<u64>,
    /// Free-form seller description.
    #[serde(default)]
    pub description: Option<String>,
    /// Stored image reference, served from `/images/{image_ref}`.
    #[serde(rename = "image_path", default)]
    pub image_ref: Option<String>,
    /// Creation time assigned by the service.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl CatalogEntry {
    /// Returns a user-facing label such as `2020 Honda Civic`.
    pub fn display_name(&self) -> String {
        format!("{} {} {}", self.year, self.make, self.model)
    }
}

impl PartialEq for CatalogEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CatalogEntry {}

impl Hash for CatalogEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Payload for a new listing. The service assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDraft {
    /// Manufacturer.
    pub make: String,
    /// Model name.
    pub model: String,
    /// Model year.
    pub year: i32,
    /// Asking price, strictly positive.
    pub price: f64,
    /// Odometer reading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mileage: Option<u64>,
    /// Seller description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An image attached to a new listing.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    /// File name reported to the service.
    pub file_name: String,
    /// MIME type, e.g. `image/jpeg`.
    pub content_type: String,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

/// Body of a create request.
#[derive(Debug, Clone)]
pub enum NewEntry {
    /// Encoded as a JSON document.
    Json(EntryDraft),
    /// Encoded as `multipart/form-data` because an image is attached.
    Multipart {
        /// Listing fields.
        draft: EntryDraft,
        /// Attached image.
        image: ImageUpload,
    },
}

impl NewEntry {
    /// Pick the encoding for a draft based on whether an image is present.
    pub fn from_parts(draft: EntryDraft, image: Option<ImageUpload>) -> Self {
        match image {
            Some(image) => NewEntry::Multipart { draft, image },
            None => NewEntry::Json(draft),
        }
    }

    /// Listing fields regardless of encoding.
    pub fn draft(&self) -> &EntryDraft {
        match self {
            NewEntry::Json(draft) | NewEntry::Multipart { draft, .. } => draft,
        }
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    // The service stores naive UTC timestamps and omits the offset.
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_service_payload() -> serde_json::Result<()> {
        let entry: CatalogEntry = serde_json::from_value(json!({
            "id": "65f1c0ffee",
            "make": "Honda",
            "model": "Civic",
            "year": 2020,
            "price": 18000.0,
            "mileage": 42000,
            "description": null,
            "created_at": "2024-03-01T10:15:30.123456",
            "image_path": "abc.png"
        }))?;

        assert_eq!(entry.id.as_str(), "65f1c0ffee");
        assert_eq!(entry.mileage, Some(42000));
        assert_eq!(entry.image_ref.as_deref(), Some("abc.png"));
        assert_eq!(
            entry.created_at.map(|at| at.to_rfc3339()),
            Some("2024-03-01T10:15:30.123456+00:00".to_string())
        );
        assert_eq!(entry.display_name(), "2020 Honda Civic");
        Ok(())
    }

    #[test]
    fn numeric_ids_become_strings() -> serde_json::Result<()> {
        let entry: CatalogEntry = serde_json::from_value(json!({
            "id": 7, "make": "Audi", "model": "A4", "year": 2019, "price": 21000
        }))?;
        assert_eq!(entry.id, EntryId::from("7"));
        assert_eq!(serde_json::to_value(&entry.id)?, json!("7"));
        assert!(entry.created_at.is_none());
        Ok(())
    }

    #[test]
    fn equality_is_by_id_only() -> serde_json::Result<()> {
        let first: CatalogEntry = serde_json::from_value(json!({
            "id": "1", "make": "Honda", "model": "Civic", "year": 2020, "price": 18000
        }))?;
        let mut second = first.clone();
        second.description = Some("Freshly detailed".to_string());
        second.price = 17500.0;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn draft_omits_absent_optionals() -> serde_json::Result<()> {
        let draft = EntryDraft {
            make: "Ford".to_string(),
            model: "Mustang".to_string(),
            year: 1967,
            price: 55000.0,
            mileage: None,
            description: None,
        };
        let encoded = serde_json::to_value(&draft)?;
        assert_eq!(
            encoded,
            json!({"make": "Ford", "model": "Mustang", "year": 1967, "price": 55000.0})
        );
        Ok(())
    }
}
