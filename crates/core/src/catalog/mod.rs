//! Access to the remote listing catalog.

/// Reqwest-backed client for the catalog HTTP API.
pub mod client;
/// Trait seam implemented by the client and by test doubles.
pub mod source;

pub use client::CatalogClient;
pub use source::CatalogSource;
