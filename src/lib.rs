#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::unnecessary_literal_bound,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod notify;
pub mod orchestrator;
pub mod providers;
pub mod reasoning;
pub mod search;
pub mod store;

pub use config::{Config, ConfigHandle};
pub use error::{ChatError, Result};
pub use orchestrator::{
    Collaborators, GenerationOrchestrator, SessionHandle, SessionOutcome, SessionSnapshot,
    UserTurn,
};
