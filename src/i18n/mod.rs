//! Translation pipeline: validated translation trees, a versioned persisted
//! cache, layered loading (cache → remote → bundled), background update
//! checking against the server's version manifest, and missing-key reporting.

pub mod bundled;
pub mod loader;
pub mod missing;
pub mod store;
pub mod sync;
pub mod tree;

pub use bundled::{bundled, CANONICAL_LANGUAGE};
pub use loader::{LoadedTranslation, Source, TranslationLoader};
pub use missing::{MissingKey, MissingKeyReporter};
pub use store::{CacheEntry, TranslationCache, TranslationMeta};
pub use sync::UpdateChecker;
pub use tree::TranslationTree;
