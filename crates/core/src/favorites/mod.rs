//! Locally persisted favorites.

/// Ordered, id-keyed collection of favorited entries.
pub mod set;
/// Durable key/value backends holding the favorites snapshot.
pub mod storage;
/// Hydration-guarded store shared by every frontend component.
pub mod store;

pub use set::FavoritesSet;
pub use storage::{FavoritesStorage, FileStorage, MemoryStorage, StorageError};
pub use store::{FavoritesStore, HydrationState, Persistence, Toggled, FAVORITES_KEY};
