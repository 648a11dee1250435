use std::{collections::BTreeMap, fmt};

use chrono::{Datelike, Utc};

use crate::models::{EntryDraft, ImageUpload, NewEntry};

/// Earliest model year accepted for a listing.
pub const MIN_YEAR: i32 = 1900;
const NAME_LEN: std::ops::RangeInclusive<usize> = 2..=50;
const MAX_DESCRIPTION_LEN: usize = 500;
const REQUIRED: &str = "This field is required";

/// Latest model year accepted for a listing: next year's models are already on sale.
pub fn current_max_year() -> i32 {
    Utc::now().year() + 1
}

/// Input fields of the listing form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DraftField {
    /// Manufacturer.
    Make,
    /// Model name.
    Model,
    /// Model year.
    Year,
    /// Asking price.
    Price,
    /// Odometer reading.
    Mileage,
    /// Seller description.
    Description,
}

impl fmt::Display for DraftField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DraftField::Make => "make",
            DraftField::Model => "model",
            DraftField::Year => "year",
            DraftField::Price => "price",
            DraftField::Mileage => "mileage",
            DraftField::Description => "description",
        };
        f.write_str(name)
    }
}

/// One message per field that failed validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftErrors {
    fields: BTreeMap<DraftField, String>,
}

impl DraftErrors {
    fn insert(&mut self, field: DraftField, message: impl Into<String>) {
        self.fields.insert(field, message.into());
    }

    /// Message for `field`, if it failed.
    pub fn get(&self, field: DraftField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    /// Failing fields in form order.
    pub fn iter(&self) -> impl Iterator<Item = (DraftField, &str)> {
        self.fields.iter().map(|(field, message)| (*field, message.as_str()))
    }

    /// `true` when every field passed.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for DraftErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in self.iter() {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for DraftErrors {}

/// Raw listing form input, exactly as typed.
#[derive(Debug, Clone, Default)]
pub struct DraftForm {
    /// Manufacturer.
    pub make: String,
    /// Model name.
    pub model: String,
    /// Model year.
    pub year: String,
    /// Asking price.
    pub price: String,
    /// Odometer reading; blank means unknown.
    pub mileage: String,
    /// Seller description; blank means none.
    pub description: String,
    /// Optional photo. Its presence switches the request to multipart.
    pub image: Option<ImageUpload>,
}

impl DraftForm {
    /// Check every field and build the request payload.
    pub fn validate(&self, max_year: i32) -> Result<EntryDraft, DraftErrors> {
        let mut errors = DraftErrors::default();

        let make = check_name(&mut errors, DraftField::Make, "Make", &self.make);
        let model = check_name(&mut errors, DraftField::Model, "Model", &self.model);

        let year = match self.year.trim() {
            "" => {
                errors.insert(DraftField::Year, REQUIRED);
                None
            }
            raw => match raw.parse::<i32>() {
                Ok(year) if (MIN_YEAR..=max_year).contains(&year) => Some(year),
                _ => {
                    errors.insert(
                        DraftField::Year,
                        format!("Please enter a valid year ({MIN_YEAR}-{max_year})"),
                    );
                    None
                }
            },
        };

        let price = match self.price.trim() {
            "" => {
                errors.insert(DraftField::Price, REQUIRED);
                None
            }
            raw => match raw.parse::<f64>() {
                Ok(price) if price.is_finite() && price > 0.0 => Some(price),
                _ => {
                    errors.insert(DraftField::Price, "Please enter a valid positive price");
                    None
                }
            },
        };

        let mileage = match self.mileage.trim() {
            "" => None,
            raw => match raw.parse::<u64>() {
                Ok(mileage) => Some(mileage),
                Err(_) => {
                    errors.insert(DraftField::Mileage, "Please enter a valid non-negative mileage");
                    None
                }
            },
        };

        let description = Some(self.description.trim())
            .filter(|text| !text.is_empty())
            .map(str::to_string);
        if description
            .as_ref()
            .is_some_and(|text| text.chars().count() > MAX_DESCRIPTION_LEN)
        {
            errors.insert(
                DraftField::Description,
                format!("Description must be at most {MAX_DESCRIPTION_LEN} characters"),
            );
        }

        match (make, model, year, price) {
            (Some(make), Some(model), Some(year), Some(price)) if errors.is_empty() => {
                Ok(EntryDraft {
                    make,
                    model,
                    year,
                    price,
                    mileage,
                    description,
                })
            }
            _ => Err(errors),
        }
    }

    /// Validate and pick the request encoding (multipart when an image is attached).
    pub fn into_new_entry(self, max_year: i32) -> Result<NewEntry, DraftErrors> {
        let draft = self.validate(max_year)?;
        Ok(NewEntry::from_parts(draft, self.image))
    }
}

fn check_name(errors: &mut DraftErrors, field: DraftField, label: &str, raw: &str) -> Option<String> {
    let value = raw.trim();
    let len = value.chars().count();
    if len == 0 {
        errors.insert(field, REQUIRED);
        None
    } else if len < *NAME_LEN.start() {
        errors.insert(field, format!("{label} must be at least {} characters", NAME_LEN.start()));
        None
    } else if len > *NAME_LEN.end() {
        errors.insert(field, format!("{label} must be at most {} characters", NAME_LEN.end()));
        None
    } else {
        Some(value.to_string())
    }
}
