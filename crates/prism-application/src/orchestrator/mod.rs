//! Generation orchestrator.
//!
//! Turns one user prompt into a persisted conversation entry:
//!
//! ```text
//! Idle -> Submitting -> Placeholder-Write -> Remote-Call -> Persist-Result -> Idle
//!                 \                              \
//!                  validation error               failure: placeholder removed
//! ```
//!
//! After Persist-Result the summary reconciliation and the usage enrichment
//! are handed to [`BackgroundTasks`]; control returns to the caller without
//! waiting for them.

use crate::background::{BackgroundTasks, TaskKey, TaskKind};
use crate::context::SessionContext;
use crate::enrichment;
use prism_core::clock::{RandomSeedSource, SeedSource};
use prism_core::config::AppConfig;
use prism_core::conversation::{
    Conversation, ConversationEntry, ConversationRepository, ConversationSummary, EntryMessage,
    EntryResponse, Resolution, SummaryCache,
};
use prism_core::error::{PrismError, Result};
use prism_core::generation::{
    Balance, ChatRole, ChatTurn, GenerationPayload, GenerationRequest, GenerationResult,
    ImageConfig, ImageGenerationApi, ModelInfo, RenderSink,
};
use prism_core::preference::PreferenceStore;
use prism_core::settings_keys;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const MISSING_API_KEY: &str = "Please enter your API key";
const MISSING_PROMPT: &str = "Please enter a prompt";
const MISSING_MODEL: &str = "Please select a model";

/// Parameters the user picks alongside the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub resolution: Resolution,
    pub aspect_ratio: String,
    pub system_prompt: String,
}

/// What a successful generation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub timestamp: i64,
    pub entry_index: usize,
    /// Stored image indices, in response order.
    pub image_indices: Vec<u32>,
    pub seed: i64,
    pub text: Option<String>,
}

/// How to regenerate a single image of an existing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegenerateMode {
    /// Same prompt and resolution, fresh seed.
    NewSeed,
    /// Same seed at 4K, using the existing image as input.
    Upscale,
}

/// Clears the in-flight flag when dropped.
struct GeneratingGuard<'a>(&'a AtomicBool);

impl Drop for GeneratingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct GenerationOrchestrator {
    ctx: Arc<SessionContext>,
    preferences: Arc<dyn PreferenceStore>,
    api: Arc<dyn ImageGenerationApi>,
    seeds: Arc<dyn SeedSource>,
    config: AppConfig,
    generating: AtomicBool,
    tasks: BackgroundTasks,
}

impl GenerationOrchestrator {
    pub fn new(
        repository: Arc<dyn ConversationRepository>,
        summaries: Arc<dyn SummaryCache>,
        preferences: Arc<dyn PreferenceStore>,
        api: Arc<dyn ImageGenerationApi>,
        sink: Arc<dyn RenderSink>,
        config: AppConfig,
    ) -> Self {
        Self {
            ctx: Arc::new(SessionContext::new(repository, summaries, sink)),
            preferences,
            api,
            seeds: Arc::new(RandomSeedSource),
            config,
            generating: AtomicBool::new(false),
            tasks: BackgroundTasks::new(),
        }
    }

    /// Replaces the seed source (tests pin seeds with this).
    pub fn with_seed_source(mut self, seeds: Arc<dyn SeedSource>) -> Self {
        self.seeds = seeds;
        self
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::Acquire)
    }

    /// Waits for every outstanding background task.
    pub async fn wait_idle(&self) {
        self.tasks.wait_idle().await;
    }

    // ============================================================================
    // Generation
    // ============================================================================

    /// Generates images for `prompt` with the settings stored in preferences.
    pub async fn submit(&self, prompt: &str) -> Result<GenerationOutcome> {
        let settings = self.generation_settings().await;
        self.submit_with_settings(prompt, settings).await
    }

    /// Generates images for `prompt` into the current conversation, creating
    /// one if none is open.
    pub async fn submit_with_settings(
        &self,
        prompt: &str,
        settings: GenerationSettings,
    ) -> Result<GenerationOutcome> {
        let _guard = self.begin()?;
        let (api_key, model) = self.validate(prompt).await?;
        let seed = self.seeds.next_seed();
        let message = EntryMessage {
            system_prompt: settings.system_prompt.clone(),
            text: prompt.to_string(),
            seed: Some(seed),
        };

        // Placeholder-Write
        let (timestamp, entry_index, history) = {
            let mut state = self.ctx.state.lock().await;
            if state.current.is_none() {
                let timestamp = self.ctx.repository.create().await;
                let conversation = self
                    .ctx
                    .repository
                    .load(timestamp)
                    .await
                    .unwrap_or_else(|| Conversation::new(timestamp));
                state.show(conversation);
            }
            let history = state.history.clone();
            state
                .history
                .push(ChatTurn::new(ChatRole::User, prompt.to_string()));

            let Some(conversation) = state.current.as_mut() else {
                return Err(PrismError::internal("No current conversation"));
            };
            conversation.entries.push(ConversationEntry::placeholder(
                message.clone(),
                settings.resolution,
            ));
            self.ctx.sink.on_placeholder_created(conversation);
            (
                conversation.timestamp,
                conversation.entries.len() - 1,
                history,
            )
        };
        tracing::info!(timestamp, entry_index, seed, model = %model, "Submitting generation");

        // Remote-Call
        let request = GenerationRequest {
            api_key: api_key.clone(),
            prompt: prompt.to_string(),
            model,
            system_prompt: settings.system_prompt.clone(),
            history,
            image_config: ImageConfig {
                image_size: settings.resolution,
                aspect_ratio: settings.aspect_ratio.clone(),
            },
            seed: Some(seed),
            image_input: None,
        };
        let outcome = self.call_and_store(timestamp, &request).await;
        self.spawn_balance_refresh(timestamp, &api_key);

        let (result, indices) = match outcome {
            Ok(stored) => stored,
            Err(e) => {
                self.rollback_placeholder(timestamp, entry_index).await;
                tracing::warn!(timestamp, "Generation failed: {}", e);
                self.ctx.sink.on_error(&e.to_string());
                return Err(e);
            }
        };

        // Persist-Result
        let text = result.text().map(str::to_string);
        let entry = ConversationEntry {
            message,
            response: EntryResponse {
                text: text.clone(),
                image_filenames: indices.iter().map(u32::to_string).collect(),
                image_resolutions: vec![settings.resolution; indices.len()],
                response_data: Some(result.response_data),
                generation_data: None,
            },
        };
        let finalized = self
            .ctx
            .update_conversation(timestamp, |conversation| {
                let replace = conversation
                    .entries
                    .get(entry_index)
                    .is_some_and(ConversationEntry::is_pending);
                if replace {
                    conversation.entries[entry_index] = entry;
                    (entry_index, conversation.entries.len())
                } else {
                    conversation.entries.push(entry);
                    (conversation.entries.len() - 1, conversation.entries.len())
                }
            })
            .await;
        let (stored_index, entry_count) = match finalized {
            Some((_, placement)) => placement,
            None => {
                tracing::error!(timestamp, "Conversation vanished before its entry was saved");
                // Saving the images recreated the directory.
                self.ctx.repository.delete(timestamp).await;
                let e = PrismError::not_found("Conversation", timestamp.to_string());
                self.ctx.sink.on_error(&e.to_string());
                return Err(e);
            }
        };
        if let Some(text) = text.as_deref().filter(|t| !t.trim().is_empty()) {
            let mut state = self.ctx.state.lock().await;
            if state.is_current(timestamp) {
                state.history.push(ChatTurn::new(ChatRole::Assistant, text));
            }
        }
        tracing::info!(timestamp, images = indices.len(), "Generation stored");

        // Summary-Reconciliation and Enrichment
        if entry_count == 1 {
            self.spawn_new_conversation_reconciliation(timestamp, &api_key, prompt);
        } else {
            self.spawn_count_reconciliation(timestamp);
        }
        if let Some(generation_id) = result.id {
            self.spawn_enrichment(timestamp, &api_key, generation_id);
        }

        Ok(GenerationOutcome {
            timestamp,
            entry_index: stored_index,
            image_indices: indices,
            seed,
            text,
        })
    }

    /// Regenerates one image of an entry and appends the result to it.
    ///
    /// Returns the new image indices, or an empty list when upscaling an
    /// image that already is 4K.
    pub async fn regenerate(
        &self,
        timestamp: i64,
        entry_index: usize,
        image_position: usize,
        mode: RegenerateMode,
    ) -> Result<Vec<u32>> {
        let _guard = self.begin()?;
        let result = self
            .regenerate_inner(timestamp, entry_index, image_position, mode)
            .await;
        if let Err(e) = &result {
            tracing::warn!(timestamp, entry_index, ?mode, "Regeneration failed: {}", e);
            self.ctx.sink.on_error(&e.to_string());
        }
        result
    }

    async fn regenerate_inner(
        &self,
        timestamp: i64,
        entry_index: usize,
        image_position: usize,
        mode: RegenerateMode,
    ) -> Result<Vec<u32>> {
        let api_key = self.require_api_key().await?;
        let model = self.require_model().await?;
        let conversation = self.snapshot(timestamp).await?;
        let entry = conversation
            .entries
            .get(entry_index)
            .filter(|entry| !entry.is_pending())
            .ok_or_else(|| PrismError::validation(format!("No entry #{}", entry_index)))?;
        let filename = entry
            .response
            .image_filenames
            .get(image_position)
            .ok_or_else(|| PrismError::validation(format!("No image #{}", image_position)))?;
        let source_resolution = entry
            .response
            .image_resolutions
            .get(image_position)
            .copied()
            .unwrap_or_default();

        let (resolution, seed, image_input) = match mode {
            RegenerateMode::NewSeed => (source_resolution, self.seeds.next_seed(), None),
            RegenerateMode::Upscale => {
                if source_resolution == Resolution::FourK {
                    tracing::debug!(timestamp, entry_index, "Image already at 4K");
                    return Ok(Vec::new());
                }
                let index: u32 = filename
                    .parse()
                    .map_err(|_| PrismError::validation(format!("Invalid image '{}'", filename)))?;
                let source = self
                    .ctx
                    .repository
                    .get_image_data_url(timestamp, index)
                    .await
                    .ok_or_else(|| PrismError::not_found("Image", format!("{}/{}", timestamp, index)))?;
                let seed = entry
                    .message
                    .seed
                    .unwrap_or_else(|| self.seeds.next_seed());
                (Resolution::FourK, seed, Some(source))
            }
        };

        let prior = Conversation {
            timestamp,
            entries: conversation.entries[..entry_index].to_vec(),
        };
        let request = GenerationRequest {
            api_key: api_key.clone(),
            prompt: entry.message.text.clone(),
            model,
            system_prompt: entry.message.system_prompt.clone(),
            history: prior.history(),
            image_config: ImageConfig {
                image_size: resolution,
                aspect_ratio: self.generation_settings().await.aspect_ratio,
            },
            seed: Some(seed),
            image_input,
        };
        tracing::info!(timestamp, entry_index, seed, ?mode, size = %resolution, "Regenerating image");

        let outcome = self.call_and_store(timestamp, &request).await;
        self.spawn_balance_refresh(timestamp, &api_key);
        let (_, indices) = outcome?;

        let appended = indices.clone();
        self.ctx
            .update_conversation(timestamp, move |conversation| {
                if let Some(entry) = conversation.entries.get_mut(entry_index) {
                    for index in appended {
                        entry.push_image(index, resolution);
                    }
                }
            })
            .await
            .ok_or_else(|| PrismError::not_found("Conversation", timestamp.to_string()))?;

        self.spawn_count_reconciliation(timestamp);
        Ok(indices)
    }

    // ============================================================================
    // Conversation lifecycle
    // ============================================================================

    /// Shows a stored conversation and rebuilds the model context from it.
    pub async fn open_conversation(&self, timestamp: i64) -> Result<Conversation> {
        let conversation = self
            .ctx
            .repository
            .load(timestamp)
            .await
            .ok_or_else(|| PrismError::not_found("Conversation", timestamp.to_string()))?;
        let mut state = self.ctx.state.lock().await;
        state.show(conversation.clone());
        Ok(conversation)
    }

    /// Closes the current conversation; the next submission starts a new one.
    pub async fn start_new_conversation(&self) {
        self.ctx.state.lock().await.clear();
    }

    pub async fn current_conversation(&self) -> Option<Conversation> {
        self.ctx.state.lock().await.current.clone()
    }

    /// Model context accumulated for the current conversation.
    pub async fn history(&self) -> Vec<ChatTurn> {
        self.ctx.state.lock().await.history.clone()
    }

    /// Deletes a conversation with its images and summary.
    ///
    /// Refused with [`PrismError::Busy`] while a generation is in flight, since
    /// its images would land in the removed directory.
    pub async fn delete_conversation(&self, timestamp: i64) -> Result<()> {
        if self.is_generating() {
            let e = PrismError::Busy;
            self.ctx.sink.on_error(&e.to_string());
            return Err(e);
        }
        self.tasks.cancel_conversation(timestamp);
        {
            let mut state = self.ctx.state.lock().await;
            if !self.ctx.repository.delete(timestamp).await {
                return Err(PrismError::io(format!(
                    "Failed to delete conversation {}",
                    timestamp
                )));
            }
            if state.is_current(timestamp) {
                state.clear();
            }
        }
        self.ctx.sink.on_conversations_changed();
        Ok(())
    }

    /// Conversations with their summaries, most recent first.
    ///
    /// A missing summary is computed on the spot. Directories without a
    /// readable record are skipped.
    pub async fn list_conversations(&self) -> Vec<(i64, ConversationSummary)> {
        let mut listed = Vec::new();
        for timestamp in self.ctx.repository.list().await {
            let summary = match self.ctx.summaries.get(timestamp).await {
                Some(summary) => Some(summary),
                None => self.ctx.recompute_summary(timestamp, None).await,
            };
            match summary {
                Some(summary) => listed.push((timestamp, summary)),
                None => tracing::debug!(timestamp, "Skipping conversation without record"),
            }
        }
        listed
    }

    /// Removes one image from an entry. An entry left without images stays in place.
    pub async fn delete_image(
        &self,
        timestamp: i64,
        entry_index: usize,
        image_position: usize,
    ) -> Result<()> {
        let removed = {
            let updated = self
                .ctx
                .update_conversation(timestamp, |conversation| {
                    let entry = conversation
                        .entries
                        .get_mut(entry_index)
                        .filter(|entry| !entry.is_pending())?;
                    let (filename, _) = entry.remove_image_at(image_position)?;
                    Some(filename)
                })
                .await
                .ok_or_else(|| PrismError::not_found("Conversation", timestamp.to_string()))?;
            let (conversation, removed) = updated;
            let mut state = self.ctx.state.lock().await;
            if state.is_current(timestamp) {
                state.history = conversation.history();
            }
            removed
        };

        let filename = removed.ok_or_else(|| {
            PrismError::validation(format!(
                "No image #{} in entry #{}",
                image_position, entry_index
            ))
        })?;
        match filename.parse::<u32>() {
            Ok(index) => {
                if !self.ctx.repository.delete_image(timestamp, index).await {
                    tracing::warn!(timestamp, index, "Image file could not be removed");
                }
            }
            Err(_) => tracing::warn!(timestamp, filename = %filename, "Removed non-numeric image name"),
        }

        self.spawn_count_reconciliation(timestamp);
        Ok(())
    }

    // ============================================================================
    // Models, balance, settings
    // ============================================================================

    pub async fn selected_model(&self) -> Option<String> {
        self.preferences
            .get(settings_keys::SELECTED_MODEL, None)
            .await
    }

    pub async fn select_model(&self, model: &str) -> Result<()> {
        let model = model.trim();
        if model.is_empty() {
            return Err(PrismError::validation(MISSING_MODEL));
        }
        if !self
            .preferences
            .set(settings_keys::SELECTED_MODEL, model)
            .await
        {
            return Err(PrismError::io("Failed to save the selected model"));
        }
        tracing::info!(model, "Selected model");
        Ok(())
    }

    /// Models able to produce images.
    pub async fn available_models(&self) -> Result<Vec<ModelInfo>> {
        let api_key = self.require_api_key().await?;
        self.api.fetch_models(&api_key).await
    }

    pub async fn balance(&self) -> Result<Balance> {
        let api_key = self.require_api_key().await?;
        self.api.fetch_balance(&api_key).await
    }

    /// Settings from preferences, falling back to configured defaults.
    pub async fn generation_settings(&self) -> GenerationSettings {
        let defaults = &self.config.generation;
        let resolution = match self.preferences.get(settings_keys::RESOLUTION, None).await {
            Some(value) => Resolution::from_str(value.trim()).unwrap_or_else(|_| {
                tracing::warn!(value = %value, "Ignoring unknown resolution preference");
                defaults.default_resolution
            }),
            None => defaults.default_resolution,
        };
        let aspect_ratio = self
            .preferences
            .get(
                settings_keys::ASPECT_RATIO,
                Some(defaults.default_aspect_ratio.as_str()),
            )
            .await
            .unwrap_or_else(|| defaults.default_aspect_ratio.clone());
        let system_prompt = self
            .preferences
            .get(
                settings_keys::SYSTEM_PROMPT,
                Some(defaults.default_system_prompt.as_str()),
            )
            .await
            .unwrap_or_default();
        GenerationSettings {
            resolution,
            aspect_ratio,
            system_prompt,
        }
    }

    // ============================================================================
    // Internals
    // ============================================================================

    fn begin(&self) -> Result<GeneratingGuard<'_>> {
        if self
            .generating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            let e = PrismError::Busy;
            self.ctx.sink.on_error(&e.to_string());
            return Err(e);
        }
        Ok(GeneratingGuard(&self.generating))
    }

    /// Checks API key, prompt and model, in that order.
    async fn validate(&self, prompt: &str) -> Result<(String, String)> {
        let api_key = self.require_api_key().await;
        let checked = api_key.and_then(|key| {
            if prompt.trim().is_empty() {
                Err(PrismError::validation(MISSING_PROMPT))
            } else {
                Ok(key)
            }
        });
        let result = match checked {
            Ok(key) => self.require_model().await.map(|model| (key, model)),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            self.ctx.sink.on_error(&e.to_string());
        }
        result
    }

    async fn require_api_key(&self) -> Result<String> {
        self.preferences
            .get(settings_keys::API_KEY, None)
            .await
            .map(|key| key.trim().to_string())
            .ok_or_else(|| PrismError::validation(MISSING_API_KEY))
    }

    async fn require_model(&self) -> Result<String> {
        self.selected_model()
            .await
            .map(|model| model.trim().to_string())
            .ok_or_else(|| PrismError::validation(MISSING_MODEL))
    }

    /// The on-screen copy if `timestamp` is current, else the stored record.
    async fn snapshot(&self, timestamp: i64) -> Result<Conversation> {
        {
            let state = self.ctx.state.lock().await;
            if let Some(current) = state.current.as_ref().filter(|c| c.timestamp == timestamp) {
                return Ok(current.clone());
            }
        }
        self.ctx
            .repository
            .load(timestamp)
            .await
            .ok_or_else(|| PrismError::not_found("Conversation", timestamp.to_string()))
    }

    /// Runs the remote call and stores every decodable image.
    ///
    /// Fails if the call fails, returns no image, or none of the images could
    /// be stored.
    async fn call_and_store(
        &self,
        timestamp: i64,
        request: &GenerationRequest,
    ) -> Result<(GenerationResult, Vec<u32>)> {
        let result = self.api.generate(request).await?;
        let images = match &result.payload {
            GenerationPayload::Images { images, .. } => images.clone(),
            GenerationPayload::TextOnly { text } => {
                tracing::info!(timestamp, "Model answered without images: {}", text);
                return Err(PrismError::NoImages);
            }
            GenerationPayload::Empty => return Err(PrismError::NoImages),
        };

        let mut indices = Vec::with_capacity(images.len());
        for image in &images {
            if let Some(index) = self.ctx.repository.save_image(timestamp, image).await {
                indices.push(index);
            }
        }
        if indices.len() < images.len() {
            tracing::warn!(
                timestamp,
                dropped = images.len() - indices.len(),
                "Some image payloads could not be stored"
            );
        }
        if indices.is_empty() {
            return Err(PrismError::NoImages);
        }
        Ok((result, indices))
    }

    /// Undoes Placeholder-Write: removes the pending entry and its user turn.
    ///
    /// A conversation created for this submission that never got a stored
    /// record is removed again.
    async fn rollback_placeholder(&self, timestamp: i64, entry_index: usize) {
        let mut state = self.ctx.state.lock().await;
        if !state.is_current(timestamp) {
            return;
        }
        if matches!(state.history.last(), Some(turn) if turn.role == ChatRole::User) {
            state.history.pop();
        }

        let Some(conversation) = state.current.as_mut() else {
            return;
        };
        if conversation
            .entries
            .get(entry_index)
            .is_some_and(ConversationEntry::is_pending)
        {
            conversation.entries.remove(entry_index);
        }
        self.ctx.sink.on_entry_finalized(conversation);

        if conversation.entries.is_empty() && self.ctx.repository.load(timestamp).await.is_none()
        {
            self.ctx.repository.delete(timestamp).await;
            state.clear();
        }
    }

    fn spawn_new_conversation_reconciliation(&self, timestamp: i64, api_key: &str, prompt: &str) {
        self.tasks.spawn(
            TaskKey::new(timestamp, TaskKind::Title),
            enrichment::reconcile_new_conversation(
                self.ctx.clone(),
                self.api.clone(),
                self.config.title.clone(),
                api_key.to_string(),
                prompt.to_string(),
                timestamp,
            ),
        );
    }

    fn spawn_count_reconciliation(&self, timestamp: i64) {
        self.tasks.spawn(
            TaskKey::new(timestamp, TaskKind::Summary),
            enrichment::reconcile_counts(self.ctx.clone(), timestamp),
        );
    }

    fn spawn_enrichment(&self, timestamp: i64, api_key: &str, generation_id: String) {
        self.tasks.spawn(
            TaskKey::new(timestamp, TaskKind::Enrichment(generation_id.clone())),
            enrichment::enrich_generation(
                self.ctx.clone(),
                self.api.clone(),
                self.config.enrichment.clone(),
                api_key.to_string(),
                timestamp,
                generation_id,
            ),
        );
    }

    fn spawn_balance_refresh(&self, timestamp: i64, api_key: &str) {
        self.tasks.spawn(
            TaskKey::new(timestamp, TaskKind::Balance),
            enrichment::refresh_balance(self.ctx.clone(), self.api.clone(), api_key.to_string()),
        );
    }
}
