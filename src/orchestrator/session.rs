use super::prompt::{self, OCR_PROMPT, PromptInputs};
use super::{Collaborators, SessionOutcome, SessionSnapshot, UserTurn};
use crate::config::{Config, OcrConfig};
use crate::core::{
    DeltaEvent, GenerationStatus, Message, MessageMarker, ModelDescriptor, TokenUsage,
};
use crate::error::{ChatError, Result};
use crate::notify::Notification;
use crate::providers::{GenerationParams, RequestBuilder, resolve_provider};
use futures_util::StreamExt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const OCR_TEMPERATURE: f64 = 0.2;

/// One assistant turn, owned by its spawned task.
///
/// Every store write goes through [`GenerationSession::persist`], which
/// refuses once the token is cancelled. The only write after cancellation is
/// the cancelled sentinel itself.
pub(super) struct GenerationSession {
    config: Arc<Config>,
    deps: Arc<Collaborators>,
    turn: UserTurn,
    model: ModelDescriptor,
    token: CancellationToken,
    state: watch::Sender<SessionSnapshot>,
    broadcast: Arc<watch::Sender<Option<SessionSnapshot>>>,
    snapshot: SessionSnapshot,
    user_message: Message,
    placeholder: Message,
    reasoning_flagged: bool,
}

impl GenerationSession {
    pub(super) fn new(
        config: Arc<Config>,
        deps: Arc<Collaborators>,
        turn: UserTurn,
        assistant_message_id: String,
        token: CancellationToken,
        state: watch::Sender<SessionSnapshot>,
        broadcast: Arc<watch::Sender<Option<SessionSnapshot>>>,
    ) -> Self {
        let model = answering_model(&config, &turn);

        let mut user_message =
            Message::user(turn.text.clone()).with_images(turn.images.clone());
        user_message.quoted_text = turn
            .quoted_text
            .clone()
            .filter(|quoted| !quoted.trim().is_empty());

        let mut placeholder = Message::assistant_placeholder(&model.id);
        placeholder.id.clone_from(&assistant_message_id);

        Self {
            config,
            deps,
            turn,
            model,
            token,
            state,
            broadcast,
            snapshot: SessionSnapshot::started(assistant_message_id),
            user_message,
            placeholder,
            reasoning_flagged: false,
        }
    }

    pub(super) async fn run(mut self) {
        tracing::info!(
            message_id = %self.snapshot.assistant_message_id,
            provider = %self.model.provider,
            model = %self.model.id,
            "generation started"
        );
        self.publish();
        self.notify();

        let outcome = match self.drive().await {
            Ok(()) => SessionOutcome::Finished,
            Err(error) if error.is_cancelled() || self.token.is_cancelled() => {
                self.record_cancelled().await;
                SessionOutcome::Cancelled
            }
            Err(error) => {
                let summary = error.user_summary();
                self.record_failure(&error, &summary).await;
                SessionOutcome::Failed(summary)
            }
        };

        tracing::info!(
            message_id = %self.snapshot.assistant_message_id,
            outcome = ?outcome,
            "generation ended"
        );
        let settled_early = self.snapshot.status != GenerationStatus::Completed;
        self.snapshot.status = GenerationStatus::Completed;
        self.snapshot.outcome = outcome;
        self.publish();
        if settled_early {
            self.notify();
        }
    }

    async fn drive(&mut self) -> Result<()> {
        self.persist(&self.user_message).await?;
        self.persist(&self.placeholder).await?;

        self.load_detected_capabilities().await;
        let provider = resolve_provider(&self.config, &self.model)?;

        let mut prompt_text = self.turn.text.clone();
        if let Some(analysis) = self.ocr_stage().await? {
            prompt_text = prompt::with_image_analysis(&prompt_text, &analysis);
        }
        let prompt_text = self.search_stage(prompt_text).await?;
        if self.snapshot.ocr_text.is_some() || !self.snapshot.search_results.is_empty() {
            self.placeholder.ocr_text.clone_from(&self.snapshot.ocr_text);
            self.placeholder
                .search_results
                .clone_from(&self.snapshot.search_results);
            self.persist(&self.placeholder).await?;
        }

        let history = self.deps.history.get_all_messages().await?;
        let mut params = GenerationParams::from(&self.config.generation);
        let system_prompt = params.system_prompt.take();
        let messages = prompt::assemble(PromptInputs {
            history: &history,
            current: &self.user_message,
            current_text: prompt_text,
            system_prompt: system_prompt.as_deref(),
            history_turns: self.config.generation.history_turns,
            supports_vision: self.model.supports_vision,
        });

        self.set_status(GenerationStatus::Generating);
        self.ensure_active()?;
        let request = RequestBuilder::new(&provider, &self.model, &params)
            .build(&messages)
            .await?;
        let mut stream = self.guarded(self.deps.client.open_stream(request)).await??;

        loop {
            let next = tokio::select! {
                biased;
                () = self.token.cancelled() => return Err(ChatError::Cancelled),
                next = stream.next() => next,
            };
            let Some(event) = next else { break };
            let event = event?;
            let terminal = event.is_terminal;
            self.apply_delta(event).await?;
            if terminal {
                break;
            }
        }
        drop(stream);

        self.complete().await
    }

    async fn apply_delta(&mut self, event: DeltaEvent) -> Result<()> {
        self.ensure_active()?;

        if !event.visible_text.is_empty() && self.snapshot.status == GenerationStatus::Generating {
            self.set_status(GenerationStatus::Streaming);
        }
        if let Some(usage) = event.usage {
            self.log_usage(usage).await;
        }
        if !event.reasoning_text.is_empty() {
            self.flag_reasoning().await;
        }
        if event.visible_text.is_empty() && event.reasoning_text.is_empty() {
            return Ok(());
        }

        self.snapshot.accumulated_visible.push_str(&event.visible_text);
        self.snapshot
            .accumulated_reasoning
            .push_str(&event.reasoning_text);
        self.sync_placeholder();
        self.persist(&self.placeholder).await?;
        self.publish();
        self.notify();
        Ok(())
    }

    async fn complete(&mut self) -> Result<()> {
        self.sync_placeholder();
        self.placeholder.pending = false;
        self.persist(&self.placeholder).await?;
        self.set_status(GenerationStatus::Completed);
        Ok(())
    }

    fn sync_placeholder(&mut self) {
        self.placeholder
            .text
            .clone_from(&self.snapshot.accumulated_visible);
        self.placeholder.reasoning_text = (!self.snapshot.accumulated_reasoning.is_empty())
            .then(|| self.snapshot.accumulated_reasoning.clone());
    }

    /// Vision pre-pass for models that cannot read the attached images.
    async fn ocr_stage(&mut self) -> Result<Option<String>> {
        let Some(ocr) = self.config.ocr.clone() else {
            return Ok(None);
        };
        if self.model.supports_vision || self.turn.images.is_empty() {
            return Ok(None);
        }

        let result = self.guarded(self.describe_images(&ocr)).await?;
        match result {
            Ok(text) if !text.trim().is_empty() => {
                self.snapshot.ocr_text = Some(text.clone());
                self.publish();
                Ok(Some(text))
            }
            Ok(_) => {
                tracing::warn!(model = %ocr.model, "image analysis returned no text");
                Ok(None)
            }
            Err(error) => {
                let degraded = ChatError::Upstream(format!("image analysis: {error}"));
                tracing::warn!(model = %ocr.model, "{degraded}; continuing without it");
                Ok(None)
            }
        }
    }

    async fn describe_images(&self, ocr: &OcrConfig) -> Result<String> {
        let mut model = ModelDescriptor::infer(&ocr.model, ocr.provider).with_vision(true);
        if let Some(custom) = &ocr.custom_provider_id {
            model = model.with_custom_provider(custom.clone());
        }
        let provider = resolve_provider(&self.config, &model)?;
        let params = GenerationParams {
            temperature: OCR_TEMPERATURE,
            max_tokens: Some(self.config.generation.max_tokens),
            ..GenerationParams::default()
        };
        let request = RequestBuilder::new(&provider, &model, &params)
            .build(&[Message::user(OCR_PROMPT).with_images(self.turn.images.clone())])
            .await?;

        let mut stream = self.deps.client.open_stream(request).await?;
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            text.push_str(&event?.visible_text);
        }
        Ok(text)
    }

    async fn search_stage(&mut self, prompt_text: String) -> Result<String> {
        let enabled = self.turn.web_search.unwrap_or(self.config.search.enabled);
        if !enabled {
            return Ok(prompt_text);
        }

        self.set_status(GenerationStatus::Searching);
        let result = self.guarded(self.deps.search.search(&prompt_text)).await?;
        match result {
            Ok(results) => {
                tracing::info!(count = results.len(), "search results received");
                self.snapshot.search_results = results;
                self.publish();
                Ok(prompt::with_search_results(
                    &prompt_text,
                    &self.snapshot.search_results,
                ))
            }
            Err(error) => {
                tracing::warn!("web search failed; continuing without results: {error}");
                self.snapshot.search_results.clear();
                Ok(prompt_text)
            }
        }
    }

    async fn load_detected_capabilities(&mut self) {
        let key = self.model.capability_key();
        match self.deps.capabilities.is_reasoning_detected(&key).await {
            Ok(detected) => {
                self.reasoning_flagged = detected;
                self.model = self.model.clone().with_reasoning_detected(detected);
            }
            Err(error) => tracing::warn!(model = %key, "failed to read model capabilities: {error:#}"),
        }
    }

    async fn flag_reasoning(&mut self) {
        if self.reasoning_flagged {
            return;
        }
        self.reasoning_flagged = true;
        self.model = self.model.clone().with_reasoning_detected(true);

        let key = self.model.capability_key();
        match self.deps.capabilities.mark_reasoning_detected(&key).await {
            Ok(()) => tracing::info!(model = %key, "model marked reasoning-capable"),
            Err(error) => {
                tracing::warn!(model = %key, "failed to record reasoning capability: {error:#}");
            }
        }
    }

    async fn log_usage(&self, usage: TokenUsage) {
        let provider = match (&self.model.custom_provider_id, self.model.provider) {
            (Some(custom), _) => format!("custom:{custom}"),
            (None, kind) => kind.as_str().to_string(),
        };
        if let Err(error) = self
            .deps
            .usage
            .log_usage(
                &provider,
                &self.model.id,
                usage.prompt_tokens,
                usage.completion_tokens,
            )
            .await
        {
            tracing::warn!(provider = %provider, model = %self.model.id, "failed to log usage: {error:#}");
        }
    }

    async fn record_cancelled(&self) {
        tracing::info!(message_id = %self.snapshot.assistant_message_id, "generation cancelled");
        let sentinel = Message::sentinel(MessageMarker::Cancelled, ChatError::Cancelled.user_summary());
        if let Err(error) = self.deps.history.save_message(&sentinel).await {
            tracing::warn!("failed to record cancellation: {error:#}");
        }
    }

    async fn record_failure(&mut self, error: &ChatError, summary: &str) {
        tracing::warn!(
            message_id = %self.snapshot.assistant_message_id,
            model = %self.model.id,
            "generation failed: {error}"
        );

        // Anything already gathered stays in the transcript; only a bare
        // placeholder is removed.
        let cleanup = if self.gathered_nothing() {
            self.deps
                .history
                .delete_message(&self.placeholder.id)
                .await
                .map(|_| ())
        } else {
            self.sync_placeholder();
            self.placeholder.ocr_text.clone_from(&self.snapshot.ocr_text);
            self.placeholder
                .search_results
                .clone_from(&self.snapshot.search_results);
            self.placeholder.pending = false;
            self.deps.history.save_message(&self.placeholder).await
        };
        if let Err(error) = cleanup {
            tracing::warn!("failed to settle placeholder after error: {error:#}");
        }

        let sentinel = Message::sentinel(MessageMarker::Error, summary);
        if let Err(error) = self.deps.history.save_message(&sentinel).await {
            tracing::warn!("failed to record error message: {error:#}");
        }
    }

    fn gathered_nothing(&self) -> bool {
        self.snapshot.accumulated_visible.is_empty()
            && self.snapshot.accumulated_reasoning.is_empty()
            && self.snapshot.ocr_text.is_none()
            && self.snapshot.search_results.is_empty()
    }

    /// Upsert `message` unless the session has been cancelled.
    async fn persist(&self, message: &Message) -> Result<()> {
        self.ensure_active()?;
        self.deps.history.save_message(message).await?;
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        if self.token.is_cancelled() {
            Err(ChatError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Await `future` unless cancellation fires first.
    async fn guarded<T>(&self, future: impl Future<Output = T>) -> Result<T> {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(ChatError::Cancelled),
            output = future => Ok(output),
        }
    }

    fn set_status(&mut self, status: GenerationStatus) {
        if self.snapshot.status == status {
            return;
        }
        tracing::info!(
            message_id = %self.snapshot.assistant_message_id,
            status = %status,
            "generation status"
        );
        self.snapshot.status = status;
        self.publish();
        self.notify();
    }

    fn publish(&self) {
        self.state.send_replace(self.snapshot.clone());
        self.broadcast.send_replace(Some(self.snapshot.clone()));
    }

    fn notify(&self) {
        self.deps.notifier.notify(Notification::new(
            self.snapshot.status,
            &self.snapshot.accumulated_visible,
        ));
    }
}

/// Model named by the turn, falling back to the configured default.
fn answering_model(config: &Config, turn: &UserTurn) -> ModelDescriptor {
    let provider = turn.provider.unwrap_or(config.default_provider);
    let id = turn
        .model
        .clone()
        .filter(|model| !model.trim().is_empty())
        .unwrap_or_else(|| config.default_model.clone());

    let model = ModelDescriptor::infer(&id, provider);
    match &turn.custom_provider_id {
        Some(custom) => model.with_custom_provider(custom.clone()),
        None => model,
    }
}
