pub mod model;
pub mod types;

pub use model::ModelDescriptor;
pub use types::{
    DeltaEvent, GenerationStatus, ImageRef, Message, MessageMarker, Role, SearchResult,
    TokenUsage,
};
