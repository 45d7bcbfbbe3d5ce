mod cache;
mod fetcher;
mod meta_schemas;
mod uri;

pub use cache::{apply_defaults, Schema, ValidatorCache, ValidatorCacheConfig, ValidatorEntry};
pub use fetcher::SchemaFetcher;
pub use uri::{has_extension, has_scheme, resolve_uri};
