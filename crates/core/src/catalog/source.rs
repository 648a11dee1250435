use async_trait::async_trait;

use crate::{
    error::ApiFailure,
    models::{CatalogEntry, EntryId, NewEntry},
};

/// Operations the rest of the crate needs from the catalog service.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Every listing in the catalog.
    async fn list_entries(&self) -> Result<Vec<CatalogEntry>, ApiFailure>;

    /// Listings whose make or model matches `query`. An empty query lists everything.
    async fn search_entries(&self, query: &str) -> Result<Vec<CatalogEntry>, ApiFailure>;

    /// Submit a new listing and return it with its assigned id.
    async fn create_entry(&self, entry: NewEntry) -> Result<CatalogEntry, ApiFailure>;

    /// Remove a listing. A missing id fails with status `404`.
    async fn delete_entry(&self, id: &EntryId) -> Result<(), ApiFailure>;

    /// Look up one listing.
    ///
    /// The service has no single-entry endpoint, so this lists everything and
    /// filters locally. That is linear in the catalog size. A missing id is
    /// `Ok(None)`, not a failure.
    async fn get_entry_by_id(&self, id: &EntryId) -> Result<Option<CatalogEntry>, ApiFailure> {
        let entries = self.list_entries().await?;
        Ok(entries.into_iter().find(|entry| &entry.id == id))
    }
}
