//! Preference store trait.
//!
//! Flat key/value text settings. Implementations never propagate storage
//! errors: reads degrade to the default and writes report `false`.

use async_trait::async_trait;

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Returns the stored value, or `default` when the key is absent or its
    /// content is empty/whitespace-only.
    async fn get(&self, key: &str, default: Option<&str>) -> Option<String>;

    /// Creates or overwrites a preference. Returns `false` if it could not be stored.
    async fn set(&self, key: &str, value: &str) -> bool;

    /// Removes a preference. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> bool;

    /// Lists the stored keys, sorted.
    async fn list(&self) -> Vec<String>;

    /// Removes every preference.
    async fn clear(&self) -> bool;
}
