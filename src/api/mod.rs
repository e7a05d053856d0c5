//! Transport-agnostic chat API.
//!
//! [`ChatService`] mirrors the web layer's endpoints (`/chat/start`,
//! `/chat/{id}/message`, `/chat/{id}/create-event`, `/chat/{id}/status`,
//! `/health` and the model admin calls) as plain async methods over the
//! session manager. Routing is left to the embedding application.

use std::sync::Arc;

use bon::Builder;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{EngineConfig, StoreKind};
use crate::context::EngineContext;
use crate::error::{ComposerError, Result};
use crate::event::{AvailabilityCalendar, EventDraft, EventPublisher, InMemoryCalendar, InMemoryPublisher};
use crate::health::{HealthCheckResult, HealthService, HealthStatus, SystemHealth};
use crate::provider::{ProviderGateway, ProviderRegistry};
use crate::session::{
    ConversationStore, FileStore, InMemoryStore, SessionId, SessionManager, SessionStatus,
};
use crate::tools::default_registry;
use crate::tools::event_tools::draft_issues;
use crate::util::retry::RetryPolicy;
use crate::workflow::StepName;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartChatRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartChatResponse {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub reply: String,
    pub draft_snapshot: Option<EventDraft>,
    pub status: SessionStatus,
    #[serde(default)]
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CreateEventResponse {
    Created { event_id: String, title: String },
    Invalid { errors: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: SessionStatus,
    pub current_step: StepName,
    pub missing_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCurrentModelRequest {
    pub provider_id: String,
}

/// Collaborators to use instead of the ones derived from configuration.
#[derive(Default, Builder)]
pub struct ServiceOptions {
    registry: Option<Arc<ProviderRegistry>>,
    store: Option<Arc<dyn ConversationStore>>,
    calendar: Option<Arc<dyn AvailabilityCalendar>>,
    publisher: Option<Arc<dyn EventPublisher>>,
    /// Pin "today" instead of reading the local clock.
    reference_date: Option<NaiveDate>,
}

pub struct ChatService {
    sessions: SessionManager,
    health: Arc<HealthService>,
    registry: Arc<ProviderRegistry>,
    publisher: Arc<dyn EventPublisher>,
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("sessions", &self.sessions)
            .field("registry", &self.registry)
            .finish()
    }
}

impl ChatService {
    /// Build every collaborator from `config`.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        Self::new(config, ServiceOptions::default())
    }

    pub fn new(config: EngineConfig, options: ServiceOptions) -> Result<Self> {
        let registry = match options.registry {
            Some(registry) => registry,
            None => Arc::new(ProviderRegistry::from_config(&config)?),
        };
        let store: Arc<dyn ConversationStore> = match (options.store, config.store.kind) {
            (Some(store), _) => store,
            (None, StoreKind::Memory) => Arc::new(InMemoryStore::new()),
            (None, StoreKind::File) => {
                let dir = config.store.resolved_dir().ok_or_else(|| {
                    ComposerError::Configuration("no directory available for the session store".into())
                })?;
                Arc::new(FileStore::new(dir))
            }
        };

        let health = HealthService::new(Arc::clone(&registry), config.health.clone());
        let gateway = ProviderGateway::new(
            Arc::clone(&registry),
            health.handle(),
            RetryPolicy::from(&config.agent.retry),
            config.agent.failover,
        );
        let engine = Arc::new(EngineContext {
            gateway,
            tools: Arc::new(default_registry(config.agent.tool_timeout())),
            calendar: options
                .calendar
                .unwrap_or_else(|| Arc::new(InMemoryCalendar::new())),
            agent: config.agent.clone(),
        });

        let mut sessions = SessionManager::new(engine, store, config.session.clone());
        if let Some(date) = options.reference_date {
            sessions = sessions.with_reference_date(date);
        }

        Ok(Self {
            sessions,
            health,
            registry,
            publisher: options
                .publisher
                .unwrap_or_else(|| Arc::new(InMemoryPublisher::new())),
        })
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn health_service(&self) -> &Arc<HealthService> {
        &self.health
    }

    /// Start periodic probing until `cancel` fires.
    pub fn spawn_health_monitor(&self, cancel: CancellationToken) -> JoinHandle<()> {
        Arc::clone(&self.health).spawn(cancel)
    }

    /// `POST /chat/start`
    pub async fn start(&self, request: StartChatRequest) -> Result<StartChatResponse> {
        let session_id = self.sessions.start_session(&request.user_id).await?;
        Ok(StartChatResponse { session_id })
    }

    /// `POST /chat/{session_id}/message`
    pub async fn message(&self, session_id: SessionId, request: MessageRequest) -> Result<MessageResponse> {
        let turn = self.sessions.post_message(session_id, &request.text).await?;
        Ok(MessageResponse {
            reply: turn.reply,
            draft_snapshot: turn.draft,
            status: turn.status,
            fallback: turn.fallback,
        })
    }

    /// `POST /chat/{session_id}/create-event`
    ///
    /// An incomplete or inconsistent draft is reported as validation
    /// errors rather than as a failure.
    pub async fn create_event(&self, session_id: SessionId) -> Result<CreateEventResponse> {
        let summary = self.sessions.get_status(session_id).await?;
        if let Some(draft) = &summary.draft {
            let issues = draft_issues(draft, self.sessions.today());
            if !issues.is_empty() {
                return Ok(CreateEventResponse::Invalid { errors: issues });
            }
        }

        match self.sessions.publish(session_id, self.publisher.as_ref()).await {
            Ok(event) => Ok(CreateEventResponse::Created {
                event_id: event.event_id,
                title: event.title,
            }),
            Err(ComposerError::IncompleteDraft { missing }) => Ok(CreateEventResponse::Invalid {
                errors: missing
                    .into_iter()
                    .map(|field| format!("missing required field: {field}"))
                    .collect(),
            }),
            Err(e) => Err(e),
        }
    }

    /// `GET /chat/{session_id}/status`
    pub async fn status(&self, session_id: SessionId) -> Result<StatusResponse> {
        let summary = self.sessions.get_status(session_id).await?;
        Ok(StatusResponse {
            status: summary.status,
            current_step: summary.current_step,
            missing_fields: summary.missing_fields,
        })
    }

    /// `GET /health`
    pub fn health(&self) -> SystemHealth {
        self.health.handle().system_health()
    }

    /// `POST /admin/models/set-current`
    pub fn set_current_model(&self, request: SetCurrentModelRequest) -> Result<()> {
        self.registry.set_active(&request.provider_id)?;
        info!(provider = %request.provider_id, "current model changed");
        Ok(())
    }

    /// `POST /admin/models/{id}/test`
    pub async fn test_model(&self, provider_id: &str) -> Result<HealthCheckResult> {
        self.health.test_provider(provider_id).await
    }

    /// Override a provider's status; `Unavailable` opens its breaker.
    pub async fn force_model_status(&self, provider_id: &str, status: HealthStatus) -> Result<()> {
        self.health.force_status(provider_id, status).await
    }
}
