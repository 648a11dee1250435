use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use super::validation::{current_max_year, DraftErrors, DraftForm};
use crate::{
    catalog::CatalogSource,
    config::AppConfig,
    error::ApiFailure,
    favorites::FavoritesStore,
    models::{CatalogEntry, EntryId},
};

/// Stage of the most recent fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// A fetch is in flight (or the first one has not finished).
    Loading,
    /// `results` holds the answer for `query`.
    Ready,
    /// The last fetch failed; see `error_message`.
    Failed,
}

/// Snapshot of the controller exposed to frontends.
#[derive(Debug, Clone)]
pub struct SearchState {
    /// Query the results belong to (or are being fetched for).
    pub query: String,
    /// Loading, ready or failed.
    pub phase: Phase,
    /// Listings matching `query`. Cleared on failure.
    pub results: Vec<CatalogEntry>,
    /// Message of the last failure.
    pub error_message: Option<String>,
    generation: u64,
}

impl SearchState {
    fn initial() -> Self {
        Self {
            query: String::new(),
            phase: Phase::Loading,
            results: Vec::new(),
            error_message: None,
            generation: 0,
        }
    }
}

/// Why a new listing was not created.
#[derive(Debug, Error)]
pub enum CreateError {
    /// The form failed client-side checks; nothing was sent.
    #[error("listing is invalid: {0}")]
    Invalid(#[from] DraftErrors),
    /// The service rejected or never received the request.
    #[error(transparent)]
    Remote(#[from] ApiFailure),
}

/// Owns the search query and the loading/error/data result.
///
/// Every fetch is tagged with a generation number; a result is committed only
/// if no newer query or refresh was issued in the meantime. Dropping the
/// controller aborts any scheduled or in-flight fetch.
pub struct SearchController {
    source: Arc<dyn CatalogSource>,
    state: Arc<watch::Sender<SearchState>>,
    pending: Mutex<Option<JoinHandle<()>>>,
    debounce: Duration,
    max_year: i32,
    favorites: Option<FavoritesStore>,
}

impl SearchController {
    /// Create a controller and immediately fetch the unfiltered list.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(source: Arc<dyn CatalogSource>, debounce: Duration) -> Self {
        let controller = Self::idle(source, debounce);
        controller.schedule(String::new(), Duration::ZERO);
        controller
    }

    /// Create a controller that fetches nothing until asked.
    ///
    /// Suits one-shot commands that delete or create and only need the
    /// refresh that follows.
    pub fn idle(source: Arc<dyn CatalogSource>, debounce: Duration) -> Self {
        let (state, _) = watch::channel(SearchState::initial());
        Self {
            source,
            state: Arc::new(state),
            pending: Mutex::new(None),
            debounce,
            max_year: current_max_year(),
            favorites: None,
        }
    }

    /// Create a controller using the configured debounce window.
    pub fn from_config(source: Arc<dyn CatalogSource>, config: &AppConfig) -> Self {
        Self::new(source, Duration::from_millis(config.search_debounce_ms))
    }

    /// Forget deleted listings in `favorites` as part of each delete.
    pub fn with_favorites(mut self, favorites: FavoritesStore) -> Self {
        self.favorites = Some(favorites);
        self
    }

    /// Override the latest model year accepted by [`SearchController::create_entry`].
    pub fn with_max_year(mut self, max_year: i32) -> Self {
        self.max_year = max_year;
        self
    }

    /// Current state.
    pub fn state(&self) -> SearchState {
        self.state.borrow().clone()
    }

    /// Receive every state change.
    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.state.subscribe()
    }

    /// Replace the query and schedule a fetch for it.
    ///
    /// Non-empty queries wait out the debounce window; clearing the query
    /// fetches right away. Any fetch scheduled earlier is cancelled.
    pub fn set_query(&self, query: impl Into<String>) {
        let query = query.into();
        let delay = if query.is_empty() {
            Duration::ZERO
        } else {
            self.debounce
        };
        self.schedule(query, delay);
    }

    /// Fetch the current query again right now, superseding anything pending.
    pub async fn refresh(&self) {
        self.cancel_pending();
        let query = self.state.borrow().query.clone();
        let generation = self.begin(query.clone());
        fetch_and_commit(self.source.as_ref(), &self.state, generation, &query).await;
    }

    /// Delete a listing, then refresh the results once the service confirms.
    ///
    /// On failure the results are left as they were. A `404` is returned as
    /// such; callers wanting idempotent deletes can check
    /// [`ApiFailure::is_not_found`].
    pub async fn delete_entry(&self, id: &EntryId) -> Result<(), ApiFailure> {
        if let Err(failure) = self.source.delete_entry(id).await {
            warn!("failed to delete listing {id}: {failure}");
            return Err(failure);
        }

        info!("deleted listing {id}");
        if let Some(favorites) = &self.favorites {
            favorites.forget(id).await;
        }
        self.refresh().await;
        Ok(())
    }

    /// Validate a form, submit it, and refresh the results on success.
    ///
    /// Invalid forms never reach the network.
    pub async fn create_entry(&self, form: DraftForm) -> Result<CatalogEntry, CreateError> {
        let entry = form.into_new_entry(self.max_year)?;
        let created = self.source.create_entry(entry).await?;
        info!("created listing {}", created.id);
        self.refresh().await;
        Ok(created)
    }

    fn schedule(&self, query: String, delay: Duration) {
        let generation = self.begin(query.clone());
        let task = tokio::spawn(run_fetch(
            Arc::clone(&self.source),
            Arc::clone(&self.state),
            generation,
            query,
            delay,
        ));
        let previous = self.pending.lock().replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn begin(&self, query: String) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|snapshot| {
            snapshot.generation += 1;
            snapshot.query = query;
            generation = snapshot.generation;
        });
        generation
    }

    fn cancel_pending(&self) {
        let previous = self.pending.lock().take();
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl Drop for SearchController {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

async fn run_fetch(
    source: Arc<dyn CatalogSource>,
    state: Arc<watch::Sender<SearchState>>,
    generation: u64,
    query: String,
    delay: Duration,
) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    fetch_and_commit(source.as_ref(), &state, generation, &query).await;
}

async fn fetch_and_commit(
    source: &dyn CatalogSource,
    state: &watch::Sender<SearchState>,
    generation: u64,
    query: &str,
) {
    let started = state.send_if_modified(|snapshot| {
        if snapshot.generation != generation {
            return false;
        }
        snapshot.phase = Phase::Loading;
        snapshot.error_message = None;
        true
    });
    if !started {
        return;
    }

    debug!("fetching listings for {query:?}");
    let outcome = source.search_entries(query).await;

    state.send_if_modified(|snapshot| {
        if snapshot.generation != generation {
            debug!("dropping superseded results for {query:?}");
            return false;
        }
        match outcome {
            Ok(results) => {
                snapshot.phase = Phase::Ready;
                snapshot.results = results;
            }
            Err(failure) => {
                warn!("listing fetch for {query:?} failed: {failure}");
                snapshot.phase = Phase::Failed;
                snapshot.results.clear();
                snapshot.error_message = Some(failure.message);
            }
        }
        true
    });
}
