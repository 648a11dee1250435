//! Search/list state driven by user input.

/// Debounced query controller with a loading/error/data result.
pub mod controller;
/// Client-side checks for new listings.
pub mod validation;

pub use controller::{CreateError, Phase, SearchController, SearchState};
pub use validation::{current_max_year, DraftErrors, DraftField, DraftForm};
