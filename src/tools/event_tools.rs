//! The event-authoring tool catalogue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};

use super::arguments::ToolArguments;
use super::registry::ToolRegistry;
use super::tool::{Idempotency, Tool, ToolContext};
use super::types::{ParameterBuilder, ToolParameters};
use crate::error::{ComposerError, ToolValidationError};
use crate::event::{EventDraft, EventFields, TicketAdd, TicketTier};

pub const CREATE_EVENT_DRAFT: &str = "create_event_draft";
pub const UPDATE_EVENT_DRAFT: &str = "update_event_draft";
pub const ADD_TICKET_TYPE: &str = "add_ticket_type";
pub const CHECK_DATE_AVAILABILITY: &str = "check_date_availability";
pub const VALIDATE_EVENT_DATA: &str = "validate_event_data";
pub const GET_DRAFT_SUMMARY: &str = "get_draft_summary";

pub const MAX_AGE: i64 = 99;
pub const MAX_CAPACITY: i64 = 10_000;
pub const MAX_TICKET_PRICE: f64 = 10_000.0;

/// Registry holding every event tool.
pub fn default_registry(timeout: Duration) -> ToolRegistry {
    let mut registry = ToolRegistry::new().with_timeout(timeout);
    registry.register(Arc::new(CreateEventDraft::new()));
    registry.register(Arc::new(UpdateEventDraft::new()));
    registry.register(Arc::new(AddTicketType::new()));
    registry.register(Arc::new(CheckDateAvailability::new()));
    registry.register(Arc::new(ValidateEventData::new()));
    registry.register(Arc::new(GetDraftSummary::new()));
    registry
}

fn event_field_params(builder: ParameterBuilder, title_required: bool) -> ToolParameters {
    builder
        .non_empty_string("title", "Event title", title_required)
        .string("description", "Longer description", false)
        .date("start_date", "Event date, YYYY-MM-DD", false)
        .time("start_time", "Start time, HH:MM (24h)", false)
        .time("end_time", "End time, HH:MM (24h)", false)
        .string("location", "Where the event takes place", false)
        .integer("age_min", "Youngest allowed age", 0, MAX_AGE, false)
        .integer("age_max", "Oldest allowed age", 0, MAX_AGE, false)
        .integer("capacity", "Maximum attendees", 1, MAX_CAPACITY, false)
        .build()
}

/// Cross-field rules the schema cannot express.
fn check_consistency(tool: &str, draft: &EventDraft) -> Result<(), ToolValidationError> {
    if let (Some(min), Some(max)) = (draft.age_min, draft.age_max) {
        if min > max {
            return Err(ToolValidationError::new(
                tool,
                Some("age_min"),
                format!("age_min {min} is greater than age_max {max}"),
            ));
        }
    }
    if let (Some(start), Some(end)) = (draft.start_time, draft.end_time) {
        if end <= start {
            return Err(ToolValidationError::new(
                tool,
                Some("end_time"),
                format!(
                    "end_time {} must be after start_time {}",
                    end.format("%H:%M"),
                    start.format("%H:%M")
                ),
            ));
        }
    }
    Ok(())
}

fn draft_json(draft: &EventDraft) -> Result<Value, ComposerError> {
    Ok(serde_json::to_value(draft)?)
}

pub struct CreateEventDraft {
    params: ToolParameters,
}

impl CreateEventDraft {
    pub fn new() -> Self {
        Self {
            params: event_field_params(ToolParameters::object(), true),
        }
    }
}

impl Default for CreateEventDraft {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CreateEventDraft {
    fn name(&self) -> &str {
        CREATE_EVENT_DRAFT
    }

    fn description(&self) -> &str {
        "Start a new event draft. Fails if a draft already exists; use update_event_draft instead."
    }

    fn parameters(&self) -> &ToolParameters {
        &self.params
    }

    fn idempotency(&self) -> Idempotency {
        Idempotency::SideEffecting
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &mut ToolContext,
    ) -> Result<Value, ComposerError> {
        if ctx.draft.is_some() {
            return Err(ComposerError::tool_execution(
                CREATE_EVENT_DRAFT,
                "a draft already exists; use update_event_draft",
            ));
        }
        let fields: EventFields = args.deserialize()?;
        let draft = EventDraft::from_fields(&fields);
        check_consistency(CREATE_EVENT_DRAFT, &draft)?;

        let output = json!({
            "created": true,
            "draft": draft_json(&draft)?,
            "missing_fields": draft.missing_required_fields(),
        });
        ctx.draft = Some(draft);
        Ok(output)
    }
}

pub struct UpdateEventDraft {
    params: ToolParameters,
}

impl UpdateEventDraft {
    pub fn new() -> Self {
        Self {
            params: event_field_params(ToolParameters::object(), false),
        }
    }
}

impl Default for UpdateEventDraft {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for UpdateEventDraft {
    fn name(&self) -> &str {
        UPDATE_EVENT_DRAFT
    }

    fn description(&self) -> &str {
        "Change fields of the current event draft. Only the fields given are modified."
    }

    fn parameters(&self) -> &ToolParameters {
        &self.params
    }

    fn idempotency(&self) -> Idempotency {
        Idempotency::SideEffecting
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &mut ToolContext,
    ) -> Result<Value, ComposerError> {
        let fields: EventFields = args.deserialize()?;
        let draft = ctx.draft_mut(UPDATE_EVENT_DRAFT)?;

        let mut updated = draft.clone();
        updated.apply(&fields);
        check_consistency(UPDATE_EVENT_DRAFT, &updated)?;

        let changed: Vec<&str> = args
            .raw()
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, _)| k.as_str())
                    .collect()
            })
            .unwrap_or_default();
        *draft = updated;

        Ok(json!({
            "updated": changed,
            "draft": draft_json(draft)?,
            "missing_fields": draft.missing_required_fields(),
        }))
    }
}

pub struct AddTicketType {
    params: ToolParameters,
}

impl AddTicketType {
    pub fn new() -> Self {
        Self {
            params: ToolParameters::object()
                .non_empty_string("name", "Tier name, e.g. General Admission", true)
                .number("price", "Price in dollars; 0 for free", 0.0, MAX_TICKET_PRICE, true)
                .integer("capacity", "Seats in this tier", 1, MAX_CAPACITY, false)
                .build(),
        }
    }
}

impl Default for AddTicketType {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for AddTicketType {
    fn name(&self) -> &str {
        ADD_TICKET_TYPE
    }

    fn description(&self) -> &str {
        "Add a ticket tier to the draft. A tier with the same name and price is not added twice."
    }

    fn parameters(&self) -> &ToolParameters {
        &self.params
    }

    fn idempotency(&self) -> Idempotency {
        Idempotency::SideEffecting
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &mut ToolContext,
    ) -> Result<Value, ComposerError> {
        let name = args.get_str("name")?.trim().to_string();
        let price_cents = (args.get_f64("price")? * 100.0).round() as u64;
        let capacity = args
            .get_i64_opt("capacity")
            .and_then(|c| u32::try_from(c).ok());

        let draft = ctx.draft_mut(ADD_TICKET_TYPE)?;
        let tier = TicketTier {
            name,
            price_cents,
            capacity,
        };
        let status = match draft.add_ticket(tier.clone()) {
            TicketAdd::Added => "added",
            TicketAdd::Duplicate => "duplicate",
        };

        Ok(json!({
            "status": status,
            "ticket": tier,
            "ticket_count": draft.tickets().len(),
        }))
    }
}

pub struct CheckDateAvailability {
    params: ToolParameters,
}

impl CheckDateAvailability {
    pub fn new() -> Self {
        Self {
            params: ToolParameters::object()
                .date("date", "Date to check, YYYY-MM-DD", true)
                .build(),
        }
    }
}

impl Default for CheckDateAvailability {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CheckDateAvailability {
    fn name(&self) -> &str {
        CHECK_DATE_AVAILABILITY
    }

    fn description(&self) -> &str {
        "Check whether a date is free for a new event."
    }

    fn parameters(&self) -> &ToolParameters {
        &self.params
    }

    fn idempotency(&self) -> Idempotency {
        Idempotency::SafeToRetry
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &mut ToolContext,
    ) -> Result<Value, ComposerError> {
        let raw = args.get_str("date")?;
        let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
            ToolValidationError::new(CHECK_DATE_AVAILABILITY, Some("date"), e.to_string())
        })?;

        if date < ctx.reference_date {
            return Ok(json!({
                "date": raw,
                "available": false,
                "reason": "date is in the past",
                "conflicts": [],
            }));
        }

        let conflicts = ctx.calendar.conflicts(date).await?;
        let titles: Vec<&str> = conflicts.iter().map(|c| c.title.as_str()).collect();
        let mut output = json!({
            "date": raw,
            "available": conflicts.is_empty(),
            "conflicts": titles,
        });
        if !conflicts.is_empty() {
            output["reason"] = format!("{} other event(s) scheduled", conflicts.len()).into();
        }
        Ok(output)
    }
}

pub struct ValidateEventData {
    params: ToolParameters,
}

impl ValidateEventData {
    pub fn new() -> Self {
        Self {
            params: ToolParameters::empty(),
        }
    }
}

impl Default for ValidateEventData {
    fn default() -> Self {
        Self::new()
    }
}

/// Problems that do not block drafting but would block publishing.
pub fn draft_issues(draft: &EventDraft, today: NaiveDate) -> Vec<String> {
    let mut issues = Vec::new();
    if draft.start_date.is_some_and(|d| d < today) {
        issues.push("start_date is in the past".to_string());
    }
    if let Err(e) = check_consistency(VALIDATE_EVENT_DATA, draft) {
        issues.push(e.message);
    }
    if let Some(capacity) = draft.capacity {
        let seats: u64 = draft
            .tickets()
            .iter()
            .filter_map(|t| t.capacity)
            .map(u64::from)
            .sum();
        if seats > u64::from(capacity) {
            issues.push(format!(
                "ticket tiers offer {seats} seats but the event capacity is {capacity}"
            ));
        }
    }
    issues
}

#[async_trait]
impl Tool for ValidateEventData {
    fn name(&self) -> &str {
        VALIDATE_EVENT_DATA
    }

    fn description(&self) -> &str {
        "Report which required fields are missing and any other problems with the draft."
    }

    fn parameters(&self) -> &ToolParameters {
        &self.params
    }

    fn idempotency(&self) -> Idempotency {
        Idempotency::SafeToRetry
    }

    async fn execute(
        &self,
        _args: &ToolArguments,
        ctx: &mut ToolContext,
    ) -> Result<Value, ComposerError> {
        let (missing, issues) = match &ctx.draft {
            Some(draft) => (
                draft.missing_required_fields(),
                draft_issues(draft, ctx.reference_date),
            ),
            None => (
                EventDraft::default().missing_required_fields(),
                vec!["no draft has been created".to_string()],
            ),
        };
        Ok(json!({
            "valid": missing.is_empty() && issues.is_empty(),
            "missing_fields": missing,
            "issues": issues,
        }))
    }
}

pub struct GetDraftSummary {
    params: ToolParameters,
}

impl GetDraftSummary {
    pub fn new() -> Self {
        Self {
            params: ToolParameters::empty(),
        }
    }
}

impl Default for GetDraftSummary {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for GetDraftSummary {
    fn name(&self) -> &str {
        GET_DRAFT_SUMMARY
    }

    fn description(&self) -> &str {
        "Get a readable summary of the current draft."
    }

    fn parameters(&self) -> &ToolParameters {
        &self.params
    }

    fn idempotency(&self) -> Idempotency {
        Idempotency::SafeToRetry
    }

    async fn execute(
        &self,
        _args: &ToolArguments,
        ctx: &mut ToolContext,
    ) -> Result<Value, ComposerError> {
        Ok(match &ctx.draft {
            Some(draft) => json!({
                "summary": draft.summary(),
                "complete": draft.is_complete(),
                "missing_fields": draft.missing_required_fields(),
            }),
            None => json!({
                "summary": "No event draft yet.",
                "complete": false,
                "missing_fields": EventDraft::default().missing_required_fields(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InMemoryCalendar;
    use crate::tools::ToolOutcome;
    use crate::types::ToolCall;
    use pretty_assertions::assert_eq;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn ctx_with(calendar: InMemoryCalendar) -> ToolContext {
        ToolContext::new(None, Arc::new(calendar), today())
    }

    async fn call(
        registry: &ToolRegistry,
        ctx: &mut ToolContext,
        name: &str,
        args: Value,
    ) -> crate::tools::ToolInvocation {
        registry.dispatch(&ToolCall::new("t", name, args), ctx).await
    }

    #[tokio::test]
    async fn create_then_add_ticket_is_duplicate_safe() {
        let registry = default_registry(Duration::from_secs(1));
        let mut ctx = ctx_with(InMemoryCalendar::new());

        let created = call(
            &registry,
            &mut ctx,
            CREATE_EVENT_DRAFT,
            json!({"title": "Pottery Workshop", "start_date": "2026-10-24", "age_min": 5, "age_max": 8}),
        )
        .await;
        assert!(created.is_success());

        let args = json!({"name": "General Admission", "price": 20, "capacity": 15});
        let first = call(&registry, &mut ctx, ADD_TICKET_TYPE, args.clone()).await;
        let second = call(&registry, &mut ctx, ADD_TICKET_TYPE, args).await;

        assert_eq!(first.output().unwrap()["status"], "added");
        assert_eq!(second.output().unwrap()["status"], "duplicate");
        let draft = ctx.draft.unwrap();
        assert_eq!(draft.tickets().len(), 1);
        assert_eq!(draft.tickets()[0].price_cents, 2000);
        assert!(draft.is_complete());
    }

    #[tokio::test]
    async fn negative_capacity_is_rejected_before_execution() {
        let registry = default_registry(Duration::from_secs(1));
        let mut ctx = ctx_with(InMemoryCalendar::new());
        ctx.draft = Some(EventDraft::default());

        let inv = call(
            &registry,
            &mut ctx,
            ADD_TICKET_TYPE,
            json!({"name": "Child", "price": 10, "capacity": -5}),
        )
        .await;

        match inv.outcome {
            ToolOutcome::Rejected { error } => assert_eq!(error.field.as_deref(), Some("capacity")),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(ctx.draft.unwrap().tickets().is_empty());
    }

    #[tokio::test]
    async fn create_rejects_inverted_age_range() {
        let registry = default_registry(Duration::from_secs(1));
        let mut ctx = ctx_with(InMemoryCalendar::new());
        let inv = call(
            &registry,
            &mut ctx,
            CREATE_EVENT_DRAFT,
            json!({"title": "Chess", "age_min": 12, "age_max": 6}),
        )
        .await;
        assert!(matches!(inv.outcome, ToolOutcome::Rejected { .. }));
        assert!(ctx.draft.is_none());
    }

    #[tokio::test]
    async fn update_requires_a_draft_and_reports_changes() {
        let registry = default_registry(Duration::from_secs(1));
        let mut ctx = ctx_with(InMemoryCalendar::new());

        let missing = call(&registry, &mut ctx, UPDATE_EVENT_DRAFT, json!({"location": "Library"})).await;
        assert!(matches!(missing.outcome, ToolOutcome::Failed { .. }));

        ctx.draft = Some(EventDraft::default());
        let inv = call(
            &registry,
            &mut ctx,
            UPDATE_EVENT_DRAFT,
            json!({"location": "Library", "title": null}),
        )
        .await;
        assert_eq!(inv.output().unwrap()["updated"], json!(["location"]));
        assert_eq!(ctx.draft.unwrap().location.as_deref(), Some("Library"));
    }

    #[tokio::test]
    async fn availability_reports_past_dates_and_conflicts() {
        let registry = default_registry(Duration::from_secs(1));
        let calendar = InMemoryCalendar::new();
        calendar.book(NaiveDate::from_ymd_opt(2026, 10, 24).unwrap(), "Science Fair");
        let mut ctx = ctx_with(calendar);

        let past = call(&registry, &mut ctx, CHECK_DATE_AVAILABILITY, json!({"date": "2026-10-01"})).await;
        assert_eq!(past.output().unwrap()["available"], false);

        let busy = call(&registry, &mut ctx, CHECK_DATE_AVAILABILITY, json!({"date": "2026-10-24"})).await;
        assert_eq!(busy.output().unwrap()["conflicts"], json!(["Science Fair"]));

        let free = call(&registry, &mut ctx, CHECK_DATE_AVAILABILITY, json!({"date": "2026-10-25"})).await;
        assert_eq!(free.output().unwrap()["available"], true);

        let bad = call(&registry, &mut ctx, CHECK_DATE_AVAILABILITY, json!({"date": "next week"})).await;
        assert!(matches!(bad.outcome, ToolOutcome::Rejected { .. }));
    }

    #[tokio::test]
    async fn validate_flags_oversold_tiers() {
        let registry = default_registry(Duration::from_secs(1));
        let mut ctx = ctx_with(InMemoryCalendar::new());
        let mut draft = EventDraft::from_fields(&EventFields {
            title: Some("Robotics".into()),
            start_date: NaiveDate::from_ymd_opt(2026, 11, 2),
            capacity: Some(10),
            ..Default::default()
        });
        draft.add_ticket(TicketTier {
            name: "Student".into(),
            price_cents: 500,
            capacity: Some(12),
        });
        ctx.draft = Some(draft);

        let inv = call(&registry, &mut ctx, VALIDATE_EVENT_DATA, json!({})).await;
        let out = inv.output().unwrap();
        assert_eq!(out["valid"], false);
        assert_eq!(out["missing_fields"], json!([]));
        assert!(out["issues"][0].as_str().unwrap().contains("12 seats"));
    }
}
