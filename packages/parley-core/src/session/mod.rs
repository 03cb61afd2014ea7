//! Per-session orchestration: the state machine tying together the audio
//! buffer, the streaming transcriber, the suggestion engine, the inactivity
//! watchdog, and the end-of-session finalization pipeline.
//!
//! Sessions move `Init -> Attached -> Recording -> Ending -> Finalized`,
//! with `Failed` as the terminal alternate. A client may detach and reattach
//! any time before `Ending`; registry state survives, only the socket handle
//! is swapped. Stop is idempotent: the first caller claims the single
//! finalization run, later calls get the optimistic snapshot.

use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::audio::framer::{self, AudioData};
use crate::error::{ParleyError, ParleyResult};
use crate::events::{EventEmitter, QuestionView, SessionEvent};
use crate::model::{Session, SessionStatus, SuggestedQuestion, SummaryState, Transcript};
use crate::protocol_constants::{
    INACTIVITY_TIMEOUT_SECS, RECORDING_STATUS_INTERVAL_SECS, SUGGESTION_MIN_INTERVAL_SECS,
    SUGGESTION_MIN_WORDS, SUGGESTION_WINDOW_SECS, WATCHDOG_TICK_SECS,
};
use crate::providers::{QuestionBatch, SpeechToText, Summarizer};
use crate::registry::{SessionRegistry, SocketSender};
use crate::repos::Repositories;
use crate::suggest::{is_duplicate, SuggestionEngine};
use crate::summary::{
    fallback_content, no_speech_content, render_content, speaker_transcript, SummaryRequest,
};
use crate::transcribe::streaming::{ErrorCallback, PartialCallback, StreamingPartial};
use crate::transcribe::{FullAudioOptions, FullAudioTranscriber, StreamingTranscriber};
use crate::utils::{now_millis, word_count};

/// Optimistic response to a stop request; finalization runs asynchronously.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopReceipt {
    pub ended_at: u64,
    pub duration_seconds: u64,
    pub summary_pending: bool,
}

impl StopReceipt {
    fn from_session(session: &Session) -> Self {
        Self {
            ended_at: session.ended_at.unwrap_or(session.started_at),
            duration_seconds: session.duration_seconds.unwrap_or(0),
            summary_pending: matches!(
                session.summary_state,
                SummaryState::Pending | SummaryState::Generating
            ),
        }
    }
}

/// How committed questions are placed in the session's list.
enum QuestionPlacement {
    /// New questions go to the head, preserving the tail.
    Head,
    /// First question takes the answered question's slot, extras prepend.
    Replace { answered_id: String },
}

/// The per-session state machine and its collaborators.
pub struct SessionOrchestrator {
    registry: Arc<SessionRegistry>,
    repos: Repositories,
    stt: Arc<dyn SpeechToText>,
    full: FullAudioTranscriber,
    suggestions: SuggestionEngine,
    summarizer: Arc<dyn Summarizer>,
    emitter: Arc<dyn EventEmitter>,
    /// Root token for graceful shutdown; finalizations take child tokens.
    shutdown: CancellationToken,
    /// Language hint passed to the transcription provider.
    language: Option<String>,
}

impl SessionOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<SessionRegistry>,
        repos: Repositories,
        stt: Arc<dyn SpeechToText>,
        suggestions: SuggestionEngine,
        summarizer: Arc<dyn Summarizer>,
        emitter: Arc<dyn EventEmitter>,
        shutdown: CancellationToken,
        language: Option<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            repos,
            stt: Arc::clone(&stt),
            full: FullAudioTranscriber::new(stt),
            suggestions,
            summarizer,
            emitter,
            shutdown,
            language,
        })
    }

    /// Repository bundle, shared with the API layer.
    pub fn repos(&self) -> &Repositories {
        &self.repos
    }

    /// Registry handle, shared with the API layer.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    async fn load_session(&self, session_id: &str) -> ParleyResult<Session> {
        self.repos
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| ParleyError::SessionNotFound(session_id.to_string()))
    }

    /// Delivers an event to the attached socket (if any) and the emitter.
    async fn send(&self, session_id: &str, event: SessionEvent) {
        self.emitter.emit(session_id, &event);
        if let Some(entry) = self.registry.get(session_id) {
            let state = entry.lock().await;
            if let Some(socket) = &state.socket {
                // Receiver dropping mid-send is a normal detach race
                let _ = socket.send(event);
            }
        }
    }

    fn visible_views(session: &Session) -> Vec<QuestionView> {
        session
            .visible_questions()
            .into_iter()
            .map(QuestionView::from)
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Control API operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Creates an `Active` session for a deck.
    pub async fn start_session(&self, deck_id: &str, title: Option<String>) -> ParleyResult<Session> {
        let deck = self
            .repos
            .decks
            .get(deck_id)
            .await?
            .ok_or_else(|| ParleyError::DeckNotFound(deck_id.to_string()))?;
        let title = title.unwrap_or_else(|| format!("{} meeting", deck.title));
        let session = Session::new(&deck.id, &deck.tenant_id, &deck.owner_id, title);
        self.repos.sessions.insert(session.clone()).await?;
        log::info!(
            "[Orchestrator] Session {} started for deck {}",
            session.id,
            deck_id
        );
        Ok(session)
    }

    /// Stops a session. Idempotent: the first call claims the single
    /// finalization run; every call returns the optimistic snapshot.
    pub async fn stop(self: &Arc<Self>, session_id: &str) -> ParleyResult<StopReceipt> {
        match self.begin_stop(session_id).await? {
            Some(session) => {
                self.spawn_finalize(session_id);
                Ok(StopReceipt::from_session(&session))
            }
            None => {
                let session = self.load_session(session_id).await?;
                Ok(StopReceipt::from_session(&session))
            }
        }
    }

    /// Claims the stop transition. Returns the ended session on the first
    /// claim, `None` when the session is already stopped or inactive.
    async fn begin_stop(&self, session_id: &str) -> ParleyResult<Option<Session>> {
        let mut session = self.load_session(session_id).await?;
        if session.status != SessionStatus::Active {
            return Ok(None);
        }
        // Entry creation covers never-attached sessions; finalize removes it
        let entry = self.registry.create(session_id);
        {
            let mut state = entry.lock().await;
            if state.stopped {
                return Ok(None);
            }
            state.stopped = true;
            if let Some(token) = state.watchdog.take() {
                token.cancel();
            }
        }
        session.mark_ended(now_millis());
        self.repos.sessions.save(&session).await?;
        log::info!(
            "[Orchestrator] Session {} ending ({}s recorded)",
            session_id,
            session.duration_seconds.unwrap_or(0)
        );
        Ok(Some(session))
    }

    /// Marks a question answered (write-once) and schedules replacements.
    pub async fn mark_answered(
        self: &Arc<Self>,
        session_id: &str,
        question_id: &str,
    ) -> ParleyResult<()> {
        let entry = self.registry.get(session_id);
        let (session, newly_answered) = {
            // Question persistence is linearized under the session lock
            let _guard = match &entry {
                Some(entry) => Some(entry.lock().await),
                None => None,
            };
            let mut session = self.load_session(session_id).await?;
            let question = session
                .suggested_questions
                .iter_mut()
                .find(|q| q.id == question_id)
                .ok_or_else(|| ParleyError::QuestionNotFound(question_id.to_string()))?;
            let newly_answered = !question.answered;
            if newly_answered {
                question.answered = true;
                question.answered_at = Some(now_millis());
                self.repos.sessions.save(&session).await?;
            }
            (session, newly_answered)
        };

        if newly_answered && session.status == SessionStatus::Active {
            let this = Arc::clone(self);
            let session_id = session_id.to_string();
            let question_id = question_id.to_string();
            tokio::spawn(async move {
                this.run_replacement_suggestions(&session_id, &question_id)
                    .await;
            });
        }
        Ok(())
    }

    /// Soft-deletes a question (write-once) and pushes the updated list.
    pub async fn delete_question(
        self: &Arc<Self>,
        session_id: &str,
        question_id: &str,
    ) -> ParleyResult<()> {
        let entry = self.registry.get(session_id);
        let event = {
            let _guard = match &entry {
                Some(entry) => Some(entry.lock().await),
                None => None,
            };
            let mut session = self.load_session(session_id).await?;
            let question = session
                .suggested_questions
                .iter_mut()
                .find(|q| q.id == question_id)
                .ok_or_else(|| ParleyError::QuestionNotFound(question_id.to_string()))?;
            if !question.deleted {
                question.deleted = true;
                self.repos.sessions.save(&session).await?;
            }
            SessionEvent::SuggestedQuestionsUpdated {
                questions: Self::visible_views(&session),
            }
        };
        self.send(session_id, event).await;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Attach channel operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Idempotent attach: validates the session, swaps the socket handle in,
    /// starts the watchdog if needed, replays visible questions, and
    /// schedules initial suggestions once per session.
    pub async fn attach(self: &Arc<Self>, session_id: &str, socket: SocketSender) -> ParleyResult<()> {
        let session = self.load_session(session_id).await?;
        if session.status != SessionStatus::Active {
            return Err(ParleyError::SessionInactive(session_id.to_string()));
        }

        let entry = self.registry.create(session_id);
        self.registry.replace_socket(session_id, socket).await;
        let watchdog_token = CancellationToken::new();
        let (start_watchdog, need_initial) = {
            let mut state = entry.lock().await;
            let start_watchdog = if state.watchdog.is_none() {
                state.watchdog = Some(watchdog_token.clone());
                true
            } else {
                false
            };
            let need_initial = if !state.initial_suggestions_done && !state.suggestion_in_flight {
                state.suggestion_in_flight = true;
                true
            } else {
                false
            };
            (start_watchdog, need_initial)
        };

        if start_watchdog {
            let this = Arc::clone(self);
            let id = session_id.to_string();
            tokio::spawn(async move {
                this.watchdog_loop(id, watchdog_token).await;
            });
        }

        self.send(
            session_id,
            SessionEvent::SessionStatus {
                status: "active".to_string(),
                message: format!("Joined session {}", session_id),
            },
        )
        .await;
        // Replay the current visible list so reconnecting clients catch up
        self.send(
            session_id,
            SessionEvent::SuggestedQuestionsUpdated {
                questions: Self::visible_views(&session),
            },
        )
        .await;

        if need_initial {
            let this = Arc::clone(self);
            let id = session_id.to_string();
            tokio::spawn(async move {
                this.run_initial_suggestions(&id).await;
            });
        }

        log::info!("[Orchestrator] Client attached to session {}", session_id);
        Ok(())
    }

    /// Clears the socket handle if `socket` is still the attached one.
    /// Registry state and the watchdog survive the detach.
    pub async fn detach_if_current(&self, session_id: &str, socket: &SocketSender) {
        if let Some(entry) = self.registry.get(session_id) {
            let mut state = entry.lock().await;
            if state
                .socket
                .as_ref()
                .is_some_and(|current| current.same_channel(socket))
            {
                state.socket = None;
                log::info!("[Orchestrator] Client detached from session {}", session_id);
            }
        }
    }

    /// Handles one inbound audio frame: normalize, append, forward, report,
    /// and evaluate the rolling suggestion gate.
    ///
    /// Frames arriving after stop are accepted by the framer but discarded
    /// here; they are not represented in the final transcript.
    pub async fn handle_audio(self: &Arc<Self>, session_id: &str, data: &AudioData) -> ParleyResult<()> {
        let Some(pcm) = framer::normalize(data) else {
            return Ok(()); // malformed frames drop silently
        };
        self.accept_pcm(session_id, pcm).await
    }

    /// Binary-frame variant of [`Self::handle_audio`].
    pub async fn handle_audio_binary(
        self: &Arc<Self>,
        session_id: &str,
        bytes: &[u8],
    ) -> ParleyResult<()> {
        let Some(pcm) = framer::normalize_binary(bytes) else {
            return Ok(());
        };
        self.accept_pcm(session_id, pcm).await
    }

    async fn accept_pcm(self: &Arc<Self>, session_id: &str, pcm: Vec<u8>) -> ParleyResult<()> {
        let entry = self
            .registry
            .get(session_id)
            .ok_or_else(|| ParleyError::SessionNotFound(session_id.to_string()))?;

        // Lazy transcriber init needs the session document; fetch it before
        // taking the state lock so no repository read happens under it.
        let needs_init = {
            let state = entry.lock().await;
            if state.stopped {
                return Ok(());
            }
            state.streaming.is_none()
        };
        let session_meta = if needs_init {
            if !self.stt.is_configured() {
                // Refuse to enter recording; the caller surfaces the error
                return Err(ParleyError::ProviderKeyMissing);
            }
            let session = self.load_session(session_id).await?;
            Some((session.deck_id, session.tenant_id))
        } else {
            None
        };

        let mut events: Vec<SessionEvent> = Vec::new();
        let mut rolling_due = false;
        {
            let mut state = entry.lock().await;
            if state.stopped {
                return Ok(()); // stop won the race; drop the frame
            }
            if state.streaming.is_none() {
                if let Some((deck_id, tenant_id)) = session_meta {
                    state.streaming = Some(self.make_streaming_transcriber(
                        session_id, deck_id, tenant_id,
                    ));
                    log::info!("[Orchestrator] Session {} entered recording", session_id);
                }
            }

            state.pcm.append(&pcm);
            state.frames_received += 1;
            state.last_audio_at = Instant::now();
            if let Some(streaming) = &state.streaming {
                streaming.send(&pcm);
            }

            let status_due = state
                .last_status_emit
                .map_or(true, |at| {
                    at.elapsed() >= Duration::from_secs(RECORDING_STATUS_INTERVAL_SECS)
                });
            if status_due {
                state.last_status_emit = Some(Instant::now());
                events.push(SessionEvent::RecordingStatus {
                    audio_size_mb: state.pcm.size_mb(),
                    audio_chunks: state.pcm.chunk_count(),
                    estimated_duration_seconds: state.pcm.duration_seconds(),
                    message: format!("Recording: {:.1}s captured", state.pcm.duration_seconds()),
                });
            }

            let interval_ok = state
                .suggestion_last_run
                .map_or(true, |at| {
                    at.elapsed() >= Duration::from_secs(SUGGESTION_MIN_INTERVAL_SECS)
                });
            if state.initial_suggestions_done && !state.suggestion_in_flight && interval_ok {
                state.suggestion_in_flight = true;
                rolling_due = true;
            }
        }

        for event in events {
            self.send(session_id, event).await;
        }
        if rolling_due {
            let this = Arc::clone(self);
            let id = session_id.to_string();
            tokio::spawn(async move {
                this.run_rolling_suggestions(&id).await;
            });
        }
        Ok(())
    }

    /// Builds the lazily-initialized streaming transcriber. Its callbacks
    /// hold a weak back-reference; the orchestrator owns the handle.
    fn make_streaming_transcriber(
        self: &Arc<Self>,
        session_id: &str,
        deck_id: String,
        tenant_id: String,
    ) -> StreamingTranscriber {
        let weak: Weak<Self> = Arc::downgrade(self);
        let partial_weak = weak.clone();
        let partial_session = session_id.to_string();
        let on_partial: PartialCallback = Arc::new(move |partial| {
            let Some(this) = partial_weak.upgrade() else {
                return;
            };
            let session_id = partial_session.clone();
            let deck_id = deck_id.clone();
            tokio::spawn(async move {
                this.persist_partial(&session_id, &deck_id, partial).await;
            });
        });

        let error_session = session_id.to_string();
        let on_error: ErrorCallback = Arc::new(move |error| {
            let Some(this) = weak.upgrade() else {
                return;
            };
            let session_id = error_session.clone();
            let message = error.to_string();
            tokio::spawn(async move {
                let event = SessionEvent::Error {
                    message,
                    code: "TRANSCRIPTION_ERROR".to_string(),
                };
                this.send(&session_id, event).await;
            });
        });

        StreamingTranscriber::new(
            Arc::clone(&self.stt),
            self.language.clone(),
            Some(tenant_id),
            on_partial,
            on_error,
        )
    }

    /// Persists one streaming window and fans it out to the socket.
    async fn persist_partial(&self, session_id: &str, deck_id: &str, partial: StreamingPartial) {
        let transcript = Transcript {
            session_id: session_id.to_string(),
            deck_id: deck_id.to_string(),
            timestamp: partial.timestamp,
            text: partial.text.clone(),
            speaker: None,
            speaker_id: None,
            is_final: false,
            confidence: None,
            language_code: partial.language.clone(),
        };
        if let Err(e) = self.repos.transcripts.insert(transcript).await {
            log::error!(
                "[Orchestrator] Failed to persist partial for {}: {}",
                session_id,
                e
            );
        }
        // The window is stable: it will not be revised by later windows
        self.send(
            session_id,
            SessionEvent::Transcription {
                text: partial.text,
                is_final: true,
                timestamp: partial.timestamp,
                speaker: None,
                speaker_id: None,
                language_code: partial.language,
            },
        )
        .await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inactivity watchdog
    // ─────────────────────────────────────────────────────────────────────────

    /// Per-session silence monitor. Socket disconnects do not cancel it;
    /// only explicit stop or its own auto-stop does.
    async fn watchdog_loop(self: Arc<Self>, session_id: String, token: CancellationToken) {
        let mut tick = tokio::time::interval(Duration::from_secs(WATCHDOG_TICK_SECS));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tick.tick().await; // burn the immediate first tick

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tick.tick() => {
                    let Some(entry) = self.registry.get(&session_id) else {
                        break;
                    };
                    let silence = { entry.lock().await.last_audio_at.elapsed() };
                    if silence >= Duration::from_secs(INACTIVITY_TIMEOUT_SECS) {
                        log::info!(
                            "[Watchdog] Session {} silent for {}s, auto-stopping",
                            session_id,
                            silence.as_secs()
                        );
                        self.auto_stop(&session_id).await;
                        break;
                    }
                }
            }
        }
    }

    async fn auto_stop(self: &Arc<Self>, session_id: &str) {
        match self.begin_stop(session_id).await {
            Ok(Some(session)) => {
                self.send(
                    session_id,
                    SessionEvent::SessionAutoStopped {
                        reason: format!("inactive {}m", INACTIVITY_TIMEOUT_SECS / 60),
                        ended_at: session.ended_at.unwrap_or(session.started_at),
                        total_duration: session.duration_seconds.unwrap_or(0),
                    },
                )
                .await;
                self.spawn_finalize(session_id);
            }
            Ok(None) => {} // explicit stop won the race
            Err(e) => {
                log::warn!("[Watchdog] Auto-stop of {} failed: {}", session_id, e);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Finalization
    // ─────────────────────────────────────────────────────────────────────────

    /// Schedules finalization on its own task. Deliberately not tied to the
    /// socket: a detach during finalization must not cancel it.
    fn spawn_finalize(self: &Arc<Self>, session_id: &str) {
        let this = Arc::clone(self);
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = this.run_finalization(&session_id).await {
                log::error!(
                    "[Orchestrator] Finalization failed for {}: {}",
                    session_id,
                    e
                );
                this.mark_failed(&session_id).await;
            }
            this.registry.remove(&session_id);
        });
    }

    async fn run_finalization(&self, session_id: &str) -> ParleyResult<()> {
        let entry = self.registry.get(session_id).ok_or_else(|| {
            ParleyError::Internal(format!("registry state missing at finalize: {}", session_id))
        })?;

        let (streaming, pcm) = {
            let mut state = entry.lock().await;
            (state.streaming.take(), state.pcm.snapshot())
        };
        if let Some(streaming) = streaming {
            // Final flush of the remaining window; partials persist as usual
            streaming.close().await;
        }

        let mut session = self.load_session(session_id).await?;
        let opts = FullAudioOptions {
            language: self.language.clone(),
            tenant_id: Some(session.tenant_id.clone()),
            cancel: self.shutdown.child_token(),
        };
        let complete = self.full.transcribe_complete(&pcm, &opts).await?;

        for segment in &complete.segments {
            let transcript = Transcript {
                session_id: session.id.clone(),
                deck_id: session.deck_id.clone(),
                timestamp: session.started_at + (segment.start * 1000.0) as u64,
                text: segment.text.clone(),
                speaker: segment.speaker.clone(),
                speaker_id: segment.speaker_id,
                is_final: true,
                confidence: None,
                language_code: complete.language.clone(),
            };
            self.repos.transcripts.insert(transcript).await?;
        }
        if let Some(language) = &complete.language {
            if !session.detected_languages.contains(language) {
                session.detected_languages.push(language.clone());
            }
        }

        let duration_seconds = session
            .duration_seconds
            .unwrap_or(complete.duration as u64);

        if complete.text.trim().is_empty() {
            // Explicit record so transcript readers see the outcome
            self.repos
                .transcripts
                .insert(Transcript {
                    session_id: session.id.clone(),
                    deck_id: session.deck_id.clone(),
                    timestamp: session.started_at,
                    text: "No speech detected".to_string(),
                    speaker: None,
                    speaker_id: None,
                    is_final: true,
                    confidence: None,
                    language_code: None,
                })
                .await?;
            session.summary = Some(no_speech_content(duration_seconds));
            session.summary_state = SummaryState::Completed;
        } else {
            session.summary_state = SummaryState::Generating;
            self.repos.sessions.save(&session).await?;

            let (transcript_text, participants) = if complete.segments.is_empty() {
                (complete.text.clone(), Vec::new())
            } else {
                speaker_transcript(&complete.segments)
            };
            let request = SummaryRequest {
                transcript: transcript_text,
                duration_seconds,
                participants,
                languages: session.detected_languages.clone(),
                tenant_id: Some(session.tenant_id.clone()),
            };
            match self.summarizer.summarize(&request).await {
                Ok(summary) => {
                    session.summary = Some(render_content(&summary));
                }
                Err(e) => {
                    log::warn!(
                        "[Orchestrator] Summary generation failed for {}: {}",
                        session_id,
                        e
                    );
                    session.summary = Some(fallback_content(
                        request.duration_seconds,
                        &request.participants,
                        &request.transcript,
                    ));
                }
            }
            session.summary_state = SummaryState::Completed;
        }

        session.transcript_count = self.repos.transcripts.count_final(session_id).await?;
        self.repos.sessions.save(&session).await?;
        log::info!(
            "[Orchestrator] Session {} finalized: {} transcript(s), {:.1}s",
            session_id,
            session.transcript_count,
            complete.duration
        );
        Ok(())
    }

    /// Terminal failure path: the session keeps its partial transcripts, the
    /// summary is marked failed, and the registry entry is cleaned up by the
    /// caller.
    async fn mark_failed(&self, session_id: &str) {
        match self.repos.sessions.get(session_id).await {
            Ok(Some(mut session)) => {
                if session.ended_at.is_none() {
                    session.mark_ended(now_millis());
                }
                session.status = SessionStatus::Failed;
                session.summary_state = SummaryState::Failed;
                if let Err(e) = self.repos.sessions.save(&session).await {
                    log::error!("[Orchestrator] Failed to persist failure state: {}", e);
                }
            }
            other => {
                log::error!(
                    "[Orchestrator] Cannot mark {} failed: {:?}",
                    session_id,
                    other.err()
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Suggestions
    // ─────────────────────────────────────────────────────────────────────────

    async fn run_initial_suggestions(self: &Arc<Self>, session_id: &str) {
        if let Err(e) = self
            .generate_and_commit(session_id, "", QuestionPlacement::Head, true)
            .await
        {
            log::warn!(
                "[Suggestions] Initial generation failed for {}: {}",
                session_id,
                e
            );
        }
        if let Some(entry) = self.registry.get(session_id) {
            let mut state = entry.lock().await;
            state.initial_suggestions_done = true;
            state.suggestion_in_flight = false;
        }
    }

    async fn run_rolling_suggestions(self: &Arc<Self>, session_id: &str) {
        let since = now_millis().saturating_sub(SUGGESTION_WINDOW_SECS * 1000);
        let gate_passed = match self
            .suggestions
            .recent_transcript_text(session_id, since)
            .await
        {
            Ok(recent) if word_count(&recent) >= SUGGESTION_MIN_WORDS => Some(recent),
            Ok(_) => None,
            Err(e) => {
                log::warn!("[Suggestions] Window read failed for {}: {}", session_id, e);
                None
            }
        };

        let invoked = if let Some(recent) = gate_passed {
            if let Err(e) = self
                .generate_and_commit(session_id, &recent, QuestionPlacement::Head, false)
                .await
            {
                log::warn!(
                    "[Suggestions] Rolling generation failed for {}: {}",
                    session_id,
                    e
                );
            }
            true
        } else {
            false
        };

        if let Some(entry) = self.registry.get(session_id) {
            let mut state = entry.lock().await;
            if invoked {
                // Rate limit counts generator invocations, not gate checks
                state.suggestion_last_run = Some(Instant::now());
            }
            state.suggestion_in_flight = false;
        }
    }

    async fn run_replacement_suggestions(self: &Arc<Self>, session_id: &str, question_id: &str) {
        if let Err(e) = self
            .generate_and_commit(
                session_id,
                "",
                QuestionPlacement::Replace {
                    answered_id: question_id.to_string(),
                },
                false,
            )
            .await
        {
            log::warn!(
                "[Suggestions] Replacement generation failed for {}: {}",
                session_id,
                e
            );
        }
    }

    /// Runs one generator invocation and commits the surviving questions
    /// under the session's mutation lock.
    async fn generate_and_commit(
        self: &Arc<Self>,
        session_id: &str,
        recent_transcript: &str,
        placement: QuestionPlacement,
        initial: bool,
    ) -> ParleyResult<()> {
        let session = self.load_session(session_id).await?;
        if session.status != SessionStatus::Active {
            return Ok(());
        }
        let kb_context = self
            .suggestions
            .assemble_kb(&session.deck_id, &session.tenant_id)
            .await?;
        let update = self
            .suggestions
            .generate(&session, &kb_context, recent_transcript)
            .await?;
        if update.added.is_empty() {
            log::debug!("[Suggestions] No novel questions for {}", session_id);
            return Ok(());
        }

        let entry = self.registry.create(session_id);
        let event = {
            let state = entry.lock().await;
            if state.stopped {
                return Ok(());
            }
            // Reload and re-filter: the list may have changed while the
            // generator was running
            let mut fresh = self.load_session(session_id).await?;
            let existing: Vec<String> = fresh
                .visible_questions()
                .iter()
                .map(|q| q.text.clone())
                .collect();
            let surviving: Vec<SuggestedQuestion> = update
                .added
                .into_iter()
                .filter(|q| !is_duplicate(&q.text, existing.iter().map(String::as_str)))
                .collect();
            if surviving.is_empty() {
                return Ok(());
            }
            let changed = match &placement {
                QuestionPlacement::Head => SuggestionEngine::apply_head_insert(&mut fresh, surviving),
                QuestionPlacement::Replace { answered_id } => {
                    SuggestionEngine::apply_replacement(&mut fresh, answered_id, surviving)
                }
            };
            if !changed {
                return Ok(());
            }
            self.repos.sessions.save(&fresh).await?;
            Self::build_suggestion_event(&fresh, &update.batch, initial)
        };
        self.send(session_id, event).await;
        Ok(())
    }

    fn build_suggestion_event(
        session: &Session,
        batch: &QuestionBatch,
        initial: bool,
    ) -> SessionEvent {
        let questions = Self::visible_views(session);
        if initial {
            SessionEvent::Suggestion {
                questions,
                context: batch.context.clone(),
                topics: batch.topics.clone(),
                timestamp: now_millis(),
            }
        } else {
            SessionEvent::SuggestedQuestionsUpdated { questions }
        }
    }
}
