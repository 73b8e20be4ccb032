//! Generation workflow: placeholder, optional OCR and search pre-stages,
//! then the streamed completion, persisted delta by delta.
//!
//! At most one session runs at a time. [`GenerationOrchestrator::submit`]
//! cancels and awaits the previous session before the next one starts, so a
//! superseded session has finished all of its writes by then.

pub mod prompt;
mod session;

use crate::config::ConfigHandle;
use crate::core::{GenerationStatus, ImageRef, SearchResult};
use crate::notify::NotificationSink;
use crate::providers::{CompletionClient, ProviderKind};
use crate::search::SearchProvider;
use crate::store::{HistoryStore, ModelCapabilityStore, UsageRecorder};
use session::GenerationSession;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One user submission plus per-turn overrides of the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct UserTurn {
    pub text: String,
    pub images: Vec<ImageRef>,
    pub quoted_text: Option<String>,
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub custom_provider_id: Option<String>,
    /// Overrides `[search] enabled` for this turn.
    pub web_search: Option<bool>,
}

impl UserTurn {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_images(mut self, images: Vec<ImageRef>) -> Self {
        self.images = images;
        self
    }

    #[must_use]
    pub fn with_quote(mut self, quoted: impl Into<String>) -> Self {
        self.quoted_text = Some(quoted.into());
        self
    }

    #[must_use]
    pub fn with_model(mut self, provider: ProviderKind, model: impl Into<String>) -> Self {
        self.provider = Some(provider);
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_custom_provider(mut self, id: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider = Some(ProviderKind::Custom);
        self.custom_provider_id = Some(id.into());
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search = Some(enabled);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Running,
    Finished,
    Cancelled,
    /// Carries the user-readable summary written into the error message.
    Failed(String),
}

/// Observable state of one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub assistant_message_id: String,
    pub status: GenerationStatus,
    pub accumulated_visible: String,
    pub accumulated_reasoning: String,
    pub search_results: Vec<SearchResult>,
    pub ocr_text: Option<String>,
    pub outcome: SessionOutcome,
}

impl SessionSnapshot {
    fn started(assistant_message_id: String) -> Self {
        Self {
            assistant_message_id,
            status: GenerationStatus::Thinking,
            accumulated_visible: String::new(),
            accumulated_reasoning: String::new(),
            search_results: Vec::new(),
            ocr_text: None,
            outcome: SessionOutcome::Running,
        }
    }

    pub fn is_done(&self) -> bool {
        self.outcome != SessionOutcome::Running
    }
}

/// Caller's view of one submitted turn.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    assistant_message_id: String,
    token: CancellationToken,
    state: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub fn assistant_message_id(&self) -> &str {
        &self.assistant_message_id
    }

    /// Request cancellation of this session only.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Resolve once the session has finished, was cancelled or failed.
    pub async fn wait(mut self) -> SessionSnapshot {
        if let Ok(snapshot) = self.state.wait_for(SessionSnapshot::is_done).await {
            return snapshot.clone();
        }
        // Sender gone: the task ended without a final publish.
        self.state.borrow().clone()
    }
}

/// Everything a session talks to besides configuration.
#[derive(Clone)]
pub struct Collaborators {
    pub client: Arc<dyn CompletionClient>,
    pub history: Arc<dyn HistoryStore>,
    pub usage: Arc<dyn UsageRecorder>,
    pub capabilities: Arc<dyn ModelCapabilityStore>,
    pub search: Arc<dyn SearchProvider>,
    pub notifier: Arc<dyn NotificationSink>,
}

struct ActiveSession {
    assistant_message_id: String,
    token: CancellationToken,
    task: JoinHandle<()>,
}

pub struct GenerationOrchestrator {
    config: ConfigHandle,
    deps: Arc<Collaborators>,
    active: Mutex<Option<ActiveSession>>,
    snapshots: Arc<watch::Sender<Option<SessionSnapshot>>>,
}

impl GenerationOrchestrator {
    pub fn new(config: ConfigHandle, deps: Collaborators) -> Self {
        let (snapshots, _) = watch::channel(None);
        Self {
            config,
            deps: Arc::new(deps),
            active: Mutex::new(None),
            snapshots: Arc::new(snapshots),
        }
    }

    /// Start a generation for `turn`, superseding any session still running.
    pub async fn submit(&self, turn: UserTurn) -> SessionHandle {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            shutdown(previous).await;
        }

        let assistant_message_id = Uuid::new_v4().to_string();
        let token = CancellationToken::new();
        let (state_tx, state_rx) =
            watch::channel(SessionSnapshot::started(assistant_message_id.clone()));

        let session = GenerationSession::new(
            self.config.snapshot(),
            Arc::clone(&self.deps),
            turn,
            assistant_message_id.clone(),
            token.clone(),
            state_tx,
            Arc::clone(&self.snapshots),
        );
        let task = tokio::spawn(session.run());

        *active = Some(ActiveSession {
            assistant_message_id: assistant_message_id.clone(),
            token: token.clone(),
            task,
        });

        SessionHandle {
            assistant_message_id,
            token,
            state: state_rx,
        }
    }

    /// Cancel the running session, if any, and wait for it to wind down.
    pub async fn stop(&self) {
        let previous = self.active.lock().await.take();
        if let Some(previous) = previous {
            shutdown(previous).await;
        }
    }

    /// Latest snapshot of whichever session ran most recently.
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionSnapshot>> {
        self.snapshots.subscribe()
    }

    pub async fn active_session_id(&self) -> Option<String> {
        self.active
            .lock()
            .await
            .as_ref()
            .filter(|session| !session.task.is_finished())
            .map(|session| session.assistant_message_id.clone())
    }
}

async fn shutdown(session: ActiveSession) {
    session.token.cancel();
    if let Err(error) = session.task.await {
        tracing::warn!(
            message_id = %session.assistant_message_id,
            "generation task ended abnormally: {error}"
        );
    }
}
