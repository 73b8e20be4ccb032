//! Terminal front end over the generation pipeline.

pub mod handlers;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// `relaychat` - one streaming chat pipeline over a dozen LLM vendor APIs.
#[derive(Parser, Debug)]
#[command(name = "relaychat")]
#[command(version)]
#[command(about = "Chat with any of a dozen LLM vendors from the terminal.", long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one message and stream the answer
    Chat {
        /// The message to send
        message: String,

        /// Provider kind (openai, anthropic, gemini, ...) or `custom:<id>`
        #[arg(short, long)]
        provider: Option<String>,

        /// Model id; defaults to `default_model` from the config
        #[arg(short, long)]
        model: Option<String>,

        /// Attach an image file (repeatable)
        #[arg(short, long = "image", value_name = "PATH")]
        images: Vec<PathBuf>,

        /// Ground the answer with a web search
        #[arg(short, long)]
        search: bool,

        /// Quote earlier text as context for the message
        #[arg(short, long, value_name = "TEXT")]
        quote: Option<String>,
    },

    /// Show the stored conversation
    History {
        /// Delete every stored message instead
        #[arg(long)]
        clear: bool,
    },

    /// Show token usage and estimated cost
    Usage,

    /// List the built-in providers
    Providers,
}
