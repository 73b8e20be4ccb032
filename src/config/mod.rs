mod env_overrides;
pub mod hot_reload;
mod loader;
pub mod schema;

pub use hot_reload::ConfigHandle;
pub use schema::{
    Config, CustomProviderConfig, GenerationConfig, OcrConfig, ProviderSettings, SearchConfig,
    StorageConfig,
};
