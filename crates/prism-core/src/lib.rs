//! Domain layer for Prism.
//!
//! Holds the conversation data model, the shared error type, and the trait
//! seams (object store, preferences, repository, summary cache, remote API,
//! render sink) that the infrastructure and application crates implement.

pub mod clock;
pub mod config;
pub mod conversation;
pub mod error;
pub mod generation;
pub mod preference;
pub mod settings_keys;
pub mod store;

pub use error::{PrismError, Result};
