//! Session lifecycle and per-session turn serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use chrono::{Local, NaiveDate, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::model::{ConversationSession, Diagnostic, SessionId, SessionStatus, SessionSummary};
use super::store::ConversationStore;
use crate::agent::prompts::FALLBACK_REPLY;
use crate::agent::{Strategy, StrategyKind, Turn, TurnReply};
use crate::config::SessionConfig;
use crate::context::{EngineContext, TurnContext};
use crate::error::{ComposerError, ProviderErrorKind, Result, WorkflowError, WorkflowErrorKind};
use crate::event::{EventDraft, EventPublisher, PublishedEvent};
use crate::tools::ToolInvocation;
use crate::types::{ChatMessage, ToolCall};
use crate::workflow::EventCreationState;

/// What `post_message` hands back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    pub reply: String,
    pub draft: Option<EventDraft>,
    pub status: SessionStatus,
    /// The reply is the scripted fallback.
    pub fallback: bool,
    pub provider_id: Option<String>,
}

enum TurnOutcome {
    Replied(EventCreationState, TurnReply),
    Failed(Diagnostic),
    Cancelled,
}

/// Owns sessions and runs their turns.
///
/// Turns of one session run one at a time, in arrival order; different
/// sessions run concurrently.
pub struct SessionManager {
    engine: Arc<EngineContext>,
    store: Arc<dyn ConversationStore>,
    config: SessionConfig,
    default_strategy: StrategyKind,
    reference_date: Option<NaiveDate>,
    locks: StdMutex<HashMap<SessionId, Arc<Mutex<()>>>>,
    in_flight: StdMutex<HashMap<SessionId, CancellationToken>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .field("default_strategy", &self.default_strategy)
            .finish()
    }
}

impl SessionManager {
    pub fn new(engine: Arc<EngineContext>, store: Arc<dyn ConversationStore>, config: SessionConfig) -> Self {
        Self {
            default_strategy: engine.agent.default_strategy,
            engine,
            store,
            config,
            reference_date: None,
            locks: StdMutex::new(HashMap::new()),
            in_flight: StdMutex::new(HashMap::new()),
        }
    }

    /// Pin "today" instead of reading the local clock.
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    pub fn with_default_strategy(mut self, kind: StrategyKind) -> Self {
        self.default_strategy = kind;
        self
    }

    pub fn engine(&self) -> &Arc<EngineContext> {
        &self.engine
    }

    /// "Today" for relative dates and date checks.
    pub fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Local::now().date_naive())
    }

    fn lock_for(&self, id: SessionId) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_default()
            .clone()
    }

    async fn load(&self, id: SessionId) -> Result<ConversationSession> {
        self.store
            .load(id)
            .await?
            .ok_or(ComposerError::SessionNotFound(id))
    }

    /// Load an open session under its turn lock. An unknown id drops the
    /// lock entry `lock_for` just made for it.
    async fn load_open(&self, id: SessionId) -> Result<ConversationSession> {
        let session = self.load_locked(id).await?;
        if !session.status.is_open() {
            return Err(ComposerError::InvalidState(format!(
                "session {id} is {}",
                session.status
            )));
        }
        Ok(session)
    }

    async fn load_locked(&self, id: SessionId) -> Result<ConversationSession> {
        let loaded = self.load(id).await;
        if let Err(ComposerError::SessionNotFound(_)) = &loaded {
            self.forget(id);
        }
        loaded
    }

    pub async fn start_session(&self, user_id: &str) -> Result<SessionId> {
        let session = ConversationSession::new(user_id, self.default_strategy);
        self.store.save(&session).await?;
        info!(session_id = %session.id, user_id, strategy = %session.strategy, "session started");
        Ok(session.id)
    }

    /// Run one turn and persist its result.
    ///
    /// Provider and tool failures, and turns that exceed the turn timeout,
    /// produce the fallback reply and mark the session `errored`; history
    /// and the previous draft are kept. A cancelled turn commits nothing.
    pub async fn post_message(&self, id: SessionId, text: &str) -> Result<TurnResult> {
        let lock = self.lock_for(id);
        let _turn = lock.lock().await;
        let mut session = self.load_open(id).await?;

        let cancel = CancellationToken::new();
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, cancel.clone());
        let outcome = self.run_turn(&session, text, cancel).await;
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        let result = match outcome {
            TurnOutcome::Cancelled => {
                info!(session_id = %id, "turn cancelled");
                return Err(WorkflowError::cancelled(session.state.current_step).into());
            }
            TurnOutcome::Replied(state, reply) => {
                session.record_invocations(&state.invocations);
                session.messages.push(ChatMessage::user(text));
                session.messages.extend(tool_exchange(&state.invocations));
                session.messages.push(ChatMessage::assistant(reply.reply.clone()));
                session.state = state;
                session.status = SessionStatus::Active;
                TurnResult {
                    reply: reply.reply,
                    draft: session.state.draft.clone(),
                    status: session.status,
                    fallback: false,
                    provider_id: reply.provider_id,
                }
            }
            TurnOutcome::Failed(diagnostic) => {
                warn!(session_id = %id, category = ?diagnostic.category, error = %diagnostic.message, "turn fell back");
                session.record_diagnostic(diagnostic);
                session.messages.push(ChatMessage::user(text));
                session.messages.push(ChatMessage::assistant(FALLBACK_REPLY));
                session.status = SessionStatus::Errored;
                TurnResult {
                    reply: FALLBACK_REPLY.to_string(),
                    draft: session.state.draft.clone(),
                    status: session.status,
                    fallback: true,
                    provider_id: None,
                }
            }
        };

        session.touch();
        self.store.save(&session).await?;
        Ok(result)
    }

    async fn run_turn(&self, session: &ConversationSession, text: &str, cancel: CancellationToken) -> TurnOutcome {
        let ctx = TurnContext::new(Arc::clone(&self.engine), self.today())
            .with_provider_slot(session.provider_slot.clone())
            .with_cancel(cancel.clone());
        let turn = Turn {
            text,
            history: &session.messages,
        };

        let attempt = async {
            let mut kind = session.strategy;
            loop {
                let strategy = match Strategy::from_config(kind, &self.engine.agent, self.config.history_window) {
                    Ok(strategy) => strategy,
                    Err(e) => return Err(e),
                };
                let mut state = session.state.clone();
                match strategy.handle(&mut state, turn, &ctx).await {
                    Ok(reply) => return Ok((state, reply)),
                    Err(ComposerError::Provider(e))
                        if e.kind == ProviderErrorKind::CapabilityUnsupported
                            && kind == StrategyKind::ReactLoop =>
                    {
                        debug!(session_id = %session.id, provider = %e.provider, "no native tool calling, retrying turn directly");
                        kind = StrategyKind::Direct;
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let timeout = self.config.turn_timeout();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => TurnOutcome::Cancelled,
            result = tokio::time::timeout(timeout, attempt) => match result {
                Ok(Ok((state, reply))) => TurnOutcome::Replied(state, reply),
                Ok(Err(ComposerError::Workflow(e))) if e.kind == WorkflowErrorKind::Cancelled => {
                    TurnOutcome::Cancelled
                }
                Ok(Err(e)) => TurnOutcome::Failed(Diagnostic::from_error(&e)),
                Err(_) => TurnOutcome::Failed(Diagnostic::timeout(self.config.turn_timeout_ms)),
            },
        }
    }

    pub async fn get_status(&self, id: SessionId) -> Result<SessionSummary> {
        Ok(self.load(id).await?.summary())
    }

    pub async fn history(&self, id: SessionId) -> Result<Vec<ChatMessage>> {
        Ok(self.load(id).await?.messages)
    }

    /// Mark the session completed and return its draft, if every required
    /// field is set.
    pub async fn finalize(&self, id: SessionId) -> Result<EventDraft> {
        let lock = self.lock_for(id);
        let _turn = lock.lock().await;
        let mut session = self.load_open(id).await?;
        let draft = finalizable(&session)?;

        session.status = SessionStatus::Completed;
        session.touch();
        self.store.save(&session).await?;
        info!(session_id = %id, "draft finalized");
        Ok(draft)
    }

    /// Finalize and hand the draft to `publisher`. The session is only
    /// marked completed when publishing succeeds.
    pub async fn publish(&self, id: SessionId, publisher: &dyn EventPublisher) -> Result<PublishedEvent> {
        let lock = self.lock_for(id);
        let _turn = lock.lock().await;
        let mut session = self.load_open(id).await?;
        let draft = finalizable(&session)?;

        let published = publisher.publish(&draft).await?;
        session.status = SessionStatus::Completed;
        session.touch();
        self.store.save(&session).await?;
        info!(session_id = %id, event_id = %published.event_id, "event published");
        Ok(published)
    }

    /// Cancel the in-flight turn, if any.
    pub fn cancel(&self, id: SessionId) -> bool {
        match self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
        {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn close(&self, id: SessionId) -> Result<()> {
        self.cancel(id);
        let lock = self.lock_for(id);
        let _turn = lock.lock().await;
        let mut session = self.load_locked(id).await?;
        session.status = SessionStatus::Expired;
        self.store.save(&session).await?;
        self.forget(id);
        info!(session_id = %id, "session closed");
        Ok(())
    }

    /// Expire open sessions idle longer than the inactivity timeout.
    pub async fn expire_idle(&self) -> Result<Vec<SessionId>> {
        let cutoff = Utc::now() - self.config.inactivity_timeout();
        let mut expired = Vec::new();
        for id in self.store.list_ids().await? {
            let lock = self.lock_for(id);
            let _turn = lock.lock().await;
            let Some(mut session) = self.store.load(id).await? else {
                self.forget(id);
                continue;
            };
            if session.status.is_open() && session.is_idle_since(cutoff) {
                session.status = SessionStatus::Expired;
                self.store.save(&session).await?;
                expired.push(id);
            }
        }
        for id in &expired {
            self.forget(*id);
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "expired idle sessions");
        }
        Ok(expired)
    }

    pub async fn switch_strategy(&self, id: SessionId, kind: StrategyKind) -> Result<()> {
        let lock = self.lock_for(id);
        let _turn = lock.lock().await;
        let mut session = self.load_open(id).await?;
        session.strategy = kind;
        self.store.save(&session).await?;
        info!(session_id = %id, strategy = %kind, "strategy switched");
        Ok(())
    }

    /// Pin the session to a provider slot, or follow the active slot with
    /// `None`.
    pub async fn set_provider_slot(&self, id: SessionId, slot: Option<String>) -> Result<()> {
        if let Some(slot) = &slot {
            if !self.engine.gateway.registry().contains(slot) {
                return Err(ComposerError::Configuration(format!("unknown provider slot '{slot}'")));
            }
        }
        let lock = self.lock_for(id);
        let _turn = lock.lock().await;
        let mut session = self.load_open(id).await?;
        session.provider_slot = slot;
        self.store.save(&session).await?;
        Ok(())
    }

    fn forget(&self, id: SessionId) {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

/// A turn's tool calls as one assistant request followed by a result
/// message per call, in execution order.
fn tool_exchange(invocations: &[ToolInvocation]) -> Vec<ChatMessage> {
    if invocations.is_empty() {
        return Vec::new();
    }
    let calls = invocations
        .iter()
        .map(|inv| ToolCall::new(inv.call_id.clone(), inv.tool.clone(), inv.input.clone()))
        .collect();
    let mut messages = vec![ChatMessage::assistant_tool_calls("", calls)];
    messages.extend(
        invocations
            .iter()
            .map(|inv| ChatMessage::tool_result(inv.call_id.clone(), &inv.observation())),
    );
    messages
}

fn finalizable(session: &ConversationSession) -> Result<EventDraft> {
    let missing = session.state.missing_fields();
    match session.draft() {
        Some(draft) if missing.is_empty() => Ok(draft.clone()),
        _ => Err(ComposerError::IncompleteDraft { missing }),
    }
}
