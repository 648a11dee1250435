use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{set::FavoritesSet, storage::FavoritesStorage};
use crate::models::{CatalogEntry, EntryId};

/// Storage key holding the serialized favorites snapshot.
pub const FAVORITES_KEY: &str = "favorited-cars";

/// Lifecycle of the store's in-memory copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationState {
    /// Nothing has been read yet.
    Uninitialized,
    /// The persisted snapshot is being read.
    Hydrating,
    /// The in-memory set reflects storage; writes are allowed.
    Ready,
}

/// Whether changes reach durable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Every change is written through as a full snapshot.
    Durable,
    /// Storage could not be read at hydration; nothing is ever written.
    InMemoryOnly,
}

/// Result of [`FavoritesStore::toggle_favorite`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggled {
    /// The entry is now a favorite.
    Added,
    /// The entry is no longer a favorite.
    Removed,
    /// Hydration has not finished; the toggle will be applied once it does.
    Queued,
}

#[derive(Debug)]
enum PendingChange {
    Toggle(CatalogEntry),
    Forget(EntryId),
}

impl PendingChange {
    fn apply(self, set: &mut FavoritesSet) {
        match self {
            PendingChange::Toggle(entry) => {
                set.toggle(entry);
            }
            PendingChange::Forget(id) => {
                set.remove(&id);
            }
        }
    }
}

/// Shared handle to the favorites wishlist.
///
/// Clones share the same state. Nothing is written to storage until the
/// persisted snapshot has been read back ([`HydrationState::Ready`]); changes
/// made before then are queued and replayed on top of the loaded snapshot.
#[derive(Clone)]
pub struct FavoritesStore {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Arc<dyn FavoritesStorage>,
    key: String,
    state: Mutex<State>,
    // Serializes snapshot writes so a slow write never lands after a newer one.
    writer: tokio::sync::Mutex<()>,
    updates: watch::Sender<Vec<CatalogEntry>>,
}

struct State {
    hydration: HydrationState,
    persistence: Persistence,
    set: FavoritesSet,
    pending: Vec<PendingChange>,
}

impl FavoritesStore {
    /// Create an unhydrated store persisting under [`FAVORITES_KEY`].
    pub fn new(storage: Arc<dyn FavoritesStorage>) -> Self {
        Self::with_key(storage, FAVORITES_KEY)
    }

    /// Create an unhydrated store persisting under a custom key.
    ///
    /// [`FileStorage`](super::FileStorage) only accepts keys made of ASCII
    /// letters, digits, `-` and `_`.
    pub fn with_key(storage: Arc<dyn FavoritesStorage>, key: impl Into<String>) -> Self {
        let (updates, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Inner {
                storage,
                key: key.into(),
                state: Mutex::new(State {
                    hydration: HydrationState::Uninitialized,
                    persistence: Persistence::Durable,
                    set: FavoritesSet::new(),
                    pending: Vec::new(),
                }),
                writer: tokio::sync::Mutex::new(()),
                updates,
            }),
        }
    }

    /// Create a store and wait for hydration to finish.
    pub async fn open(storage: Arc<dyn FavoritesStorage>) -> Self {
        let store = Self::new(storage);
        store.hydrate().await;
        store
    }

    /// Load the persisted snapshot into memory.
    ///
    /// Only the first call does any work; later calls return immediately,
    /// even if that first hydration is still running. A hydration dropped
    /// before it finishes rolls back to [`HydrationState::Uninitialized`]
    /// with queued changes intact, so the next call starts over. A missing
    /// or corrupted snapshot yields an empty set. Unreadable storage switches
    /// the store to [`Persistence::InMemoryOnly`].
    pub async fn hydrate(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.hydration != HydrationState::Uninitialized {
                return;
            }
            state.hydration = HydrationState::Hydrating;
        }
        let mut guard = HydrationGuard {
            state: &self.inner.state,
            finished: false,
        };

        let (loaded, persistence) = match self.inner.storage.read(&self.inner.key).await {
            Ok(Some(raw)) => match FavoritesSet::from_json(&raw) {
                Ok(set) => (set, Persistence::Durable),
                Err(err) => {
                    warn!("discarding unreadable favorites snapshot: {err}");
                    (FavoritesSet::new(), Persistence::Durable)
                }
            },
            Ok(None) => (FavoritesSet::new(), Persistence::Durable),
            Err(err) => {
                warn!("favorites storage unavailable, keeping favorites in memory only: {err}");
                (FavoritesSet::new(), Persistence::InMemoryOnly)
            }
        };

        let replayed = {
            let mut state = self.inner.state.lock();
            let mut set = loaded;
            let pending = std::mem::take(&mut state.pending);
            let replayed = pending.len();
            for change in pending {
                change.apply(&mut set);
            }
            state.set = set;
            state.persistence = persistence;
            state.hydration = HydrationState::Ready;
            guard.finished = true;
            self.publish(&state);
            info!(
                "favorites ready with {} entries ({replayed} queued changes replayed)",
                state.set.len()
            );
            replayed
        };

        if replayed > 0 {
            self.persist().await;
        }
    }

    /// Current lifecycle stage.
    pub fn state(&self) -> HydrationState {
        self.inner.state.lock().hydration
    }

    /// Whether changes are being written to storage.
    pub fn persistence(&self) -> Persistence {
        self.inner.state.lock().persistence
    }

    /// Membership by id. Always `false` before hydration completes.
    pub fn is_favorite(&self, id: &EntryId) -> bool {
        let state = self.inner.state.lock();
        state.hydration == HydrationState::Ready && state.set.contains(id)
    }

    /// Favorited entries in the order they were added.
    pub fn favorites(&self) -> Vec<CatalogEntry> {
        self.inner.state.lock().set.entries().to_vec()
    }

    /// Number of favorites.
    pub fn len(&self) -> usize {
        self.inner.state.lock().set.len()
    }

    /// `true` when nothing is favorited.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receive the ordered snapshot after every change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<CatalogEntry>> {
        self.inner.updates.subscribe()
    }

    /// Add `entry` if it is not a favorite, remove it otherwise.
    pub async fn toggle_favorite(&self, entry: CatalogEntry) -> Toggled {
        let outcome = {
            let mut state = self.inner.state.lock();
            if state.hydration != HydrationState::Ready {
                debug!("queueing favorite toggle for {} until hydrated", entry.id);
                state.pending.push(PendingChange::Toggle(entry));
                return Toggled::Queued;
            }

            let added = state.set.toggle(entry);
            self.publish(&state);
            if added {
                Toggled::Added
            } else {
                Toggled::Removed
            }
        };

        self.persist().await;
        outcome
    }

    /// Drop `id` from the favorites, e.g. after the listing was deleted.
    ///
    /// Returns `true` if a stored favorite was removed. Before hydration the
    /// removal is queued and `false` is returned.
    pub async fn forget(&self, id: &EntryId) -> bool {
        let removed = {
            let mut state = self.inner.state.lock();
            if state.hydration != HydrationState::Ready {
                state.pending.push(PendingChange::Forget(id.clone()));
                return false;
            }
            let removed = state.set.remove(id);
            if removed {
                self.publish(&state);
            }
            removed
        };

        if removed {
            info!("forgot favorite {id}");
            self.persist().await;
        }
        removed
    }

    fn publish(&self, state: &State) {
        self.inner.updates.send_replace(state.set.entries().to_vec());
    }

    async fn persist(&self) {
        let _writer = self.inner.writer.lock().await;
        let snapshot = {
            let state = self.inner.state.lock();
            if state.hydration != HydrationState::Ready
                || state.persistence == Persistence::InMemoryOnly
            {
                return;
            }
            state.set.to_json()
        };

        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("failed to serialize favorites: {err}");
                return;
            }
        };
        if let Err(err) = self.inner.storage.write(&self.inner.key, &snapshot).await {
            warn!("failed to persist favorites, keeping changes in memory: {err}");
        }
    }
}

/// Resets an abandoned hydration so a later call can retry it.
struct HydrationGuard<'a> {
    state: &'a Mutex<State>,
    finished: bool,
}

impl Drop for HydrationGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut state = self.state.lock();
        if state.hydration == HydrationState::Hydrating {
            debug!("favorites hydration abandoned, will retry on next call");
            state.hydration = HydrationState::Uninitialized;
        }
    }
}
