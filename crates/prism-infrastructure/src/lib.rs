pub mod config_service;
pub mod conversation_repository;
pub mod image_data;
pub mod paths;
pub mod preference_store;
pub mod storage;
pub mod summary_cache;

pub use crate::config_service::ConfigService;
pub use crate::conversation_repository::StoreConversationRepository;
pub use crate::preference_store::StorePreferenceStore;
pub use crate::storage::FsObjectStore;
pub use crate::summary_cache::StoreSummaryCache;
