#![warn(clippy::all, missing_docs)]

//! Client-side core of the carlot vehicle marketplace.
//!
//! This crate hosts the listing models, the typed catalog HTTP client,
//! the locally persisted favorites store, and the debounced search
//! controller used by the command-line frontend and any future ones.

pub mod catalog;
pub mod config;
pub mod error;
pub mod favorites;
pub mod models;
pub mod search;

pub use catalog::{CatalogClient, CatalogSource};
pub use config::AppConfig;
pub use error::{make_failure, ApiFailure, FailureKind};
pub use favorites::{FavoritesStore, FileStorage, HydrationState, MemoryStorage, Toggled};
pub use models::{CatalogEntry, EntryDraft, EntryId, ImageUpload, NewEntry};
pub use search::{CreateError, DraftErrors, DraftField, DraftForm, Phase, SearchController, SearchState};
