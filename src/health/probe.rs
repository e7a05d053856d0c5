//! Provider probing.
//!
//! A probe runs up to three checks in order and stops at the first hard
//! failure: connectivity, a minimal generation, and (only when the slot
//! claims it) tool calling.
//!
//! Tool calling is judged on the normalized response: the provider passes
//! when a request offering only [`PROBE_TOOL`] comes back with a call to
//! that tool, whether the backend produced it natively or as JSON text.

use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::time::Instant;

use crate::config::HealthConfig;
use crate::error::ProviderError;
use crate::provider::{invoke, ModelProvider, ProviderRequest, ToolDefinition, ToolMode};
use crate::types::{ChatMessage, GenerationSettings};
use crate::util::timeout::with_timeout;

use super::{HealthCheckResult, HealthStatus, ProbeCheck, ProbeKind};

/// Name of the tool offered by the tool-calling check.
pub const PROBE_TOOL: &str = "report_status";

fn probe_tool() -> ToolDefinition {
    ToolDefinition {
        name: PROBE_TOOL.to_string(),
        description: "Report the assistant's status.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "status": {"type": "string", "enum": ["ok"]}
            },
            "required": ["status"]
        }),
    }
}

fn probe_settings() -> GenerationSettings {
    GenerationSettings {
        max_tokens: Some(32),
        temperature: Some(0.0),
        response_format: None,
    }
}

/// Run a full probe against `provider`.
pub async fn probe_provider(provider: &dyn ModelProvider, config: &HealthConfig) -> HealthCheckResult {
    let id = provider.describe().id.clone();
    let timeout = config.probe_timeout();
    let mut checks = Vec::new();

    let (ping, ping_ms) = timed(with_timeout(&id, timeout, provider.ping())).await;
    checks.push(check(ProbeKind::Connectivity, &ping, ping_ms));
    if let Err(e) = ping {
        return finish(id, HealthStatus::Unavailable, ping_ms, Some(e.to_string()), checks);
    }

    let request = ProviderRequest::new(vec![ChatMessage::user("Reply with the single word OK.")])
        .with_settings(probe_settings());
    let (generated, gen_ms) = timed(invoke(provider, &request, ToolMode::Auto, timeout)).await;
    checks.push(check(ProbeKind::Generation, &generated, gen_ms));
    if let Err(e) = generated {
        return finish(id, HealthStatus::Unavailable, gen_ms, Some(e.to_string()), checks);
    }

    let mut status = HealthStatus::Healthy;
    let mut detail = None;

    if provider.capabilities().supports_tools {
        let request = ProviderRequest::new(vec![ChatMessage::user(format!(
            "Call the {PROBE_TOOL} tool with status \"ok\"."
        ))])
        .with_settings(probe_settings())
        .with_tools(vec![probe_tool()]);
        let (called, tool_ms) = timed(invoke(provider, &request, ToolMode::Auto, timeout)).await;
        let outcome = match called {
            Ok(response) if response.tool_calls.iter().any(|c| c.name == PROBE_TOOL) => Ok(()),
            Ok(_) => Err(format!("claims tool calling but did not call {PROBE_TOOL}")),
            Err(e) => Err(e.to_string()),
        };
        checks.push(ProbeCheck {
            kind: ProbeKind::ToolCalling,
            passed: outcome.is_ok(),
            latency_ms: tool_ms,
            detail: outcome.as_ref().err().cloned(),
        });
        if let Err(reason) = outcome {
            status = HealthStatus::Degraded;
            detail = Some(reason);
        }
    }

    if status == HealthStatus::Healthy && gen_ms > config.degraded_latency_ms {
        status = HealthStatus::Degraded;
        detail = Some(format!(
            "generation took {gen_ms}ms (threshold {}ms)",
            config.degraded_latency_ms
        ));
    }

    finish(id, status, gen_ms, detail, checks)
}

async fn timed<T>(future: impl std::future::Future<Output = T>) -> (T, u64) {
    let started = Instant::now();
    let value = future.await;
    (value, elapsed_ms(started.elapsed()))
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn check<T>(kind: ProbeKind, result: &Result<T, ProviderError>, latency_ms: u64) -> ProbeCheck {
    ProbeCheck {
        kind,
        passed: result.is_ok(),
        latency_ms,
        detail: result.as_ref().err().map(ToString::to_string),
    }
}

fn finish(
    provider_id: String,
    status: HealthStatus,
    latency_ms: u64,
    detail: Option<String>,
    checks: Vec<ProbeCheck>,
) -> HealthCheckResult {
    HealthCheckResult {
        provider_id,
        checked_at: Utc::now(),
        status,
        latency_ms,
        detail,
        checks,
    }
}
