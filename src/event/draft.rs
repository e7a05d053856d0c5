//! The event draft the engine fills in incrementally.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Field patch applied by the draft tools. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventFields {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    #[serde(with = "hm_opt")]
    pub start_time: Option<NaiveTime>,
    #[serde(with = "hm_opt")]
    pub end_time: Option<NaiveTime>,
    pub location: Option<String>,
    pub age_min: Option<u8>,
    pub age_max: Option<u8>,
    pub capacity: Option<u32>,
}

/// One ticket tier of a draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketTier {
    pub name: String,
    pub price_cents: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
}

/// Identity of a ticket tier: normalized name plus price.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TierKey {
    pub name: String,
    pub price_cents: u64,
}

impl TierKey {
    pub fn new(name: &str, price_cents: u64) -> Self {
        Self {
            name: name
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
            price_cents,
        }
    }
}

impl std::fmt::Display for TierKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.price_cents)
    }
}

impl TicketTier {
    pub fn key(&self) -> TierKey {
        TierKey::new(&self.name, self.price_cents)
    }
}

/// Result of adding a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketAdd {
    Added,
    /// A tier with the same identity already exists; the draft is unchanged.
    Duplicate,
}

/// Denormalized, partially valid event. Nothing here is visible to the
/// booking system until the draft is handed to a publisher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    #[serde(default, with = "hm_opt")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, with = "hm_opt")]
    pub end_time: Option<NaiveTime>,
    pub location: Option<String>,
    pub age_min: Option<u8>,
    pub age_max: Option<u8>,
    pub capacity: Option<u32>,
    #[serde(default)]
    tickets: Vec<TicketTier>,
}

impl EventDraft {
    pub fn from_fields(fields: &EventFields) -> Self {
        let mut draft = Self::default();
        draft.apply(fields);
        draft
    }

    /// Overwrite every field present in `fields`.
    pub fn apply(&mut self, fields: &EventFields) {
        fn set<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *slot = Some(v.clone());
            }
        }
        set(&mut self.title, &fields.title);
        set(&mut self.description, &fields.description);
        set(&mut self.start_date, &fields.start_date);
        set(&mut self.start_time, &fields.start_time);
        set(&mut self.end_time, &fields.end_time);
        set(&mut self.location, &fields.location);
        set(&mut self.age_min, &fields.age_min);
        set(&mut self.age_max, &fields.age_max);
        set(&mut self.capacity, &fields.capacity);
    }

    pub fn tickets(&self) -> &[TicketTier] {
        &self.tickets
    }

    /// Add a tier unless one with the same identity exists.
    ///
    /// Only the `add_ticket_type` tool calls this.
    pub(crate) fn add_ticket(&mut self, tier: TicketTier) -> TicketAdd {
        let key = tier.key();
        if self.tickets.iter().any(|t| t.key() == key) {
            return TicketAdd::Duplicate;
        }
        self.tickets.push(tier);
        TicketAdd::Added
    }

    pub fn has_ticket(&self, key: &TierKey) -> bool {
        self.tickets.iter().any(|t| &t.key() == key)
    }

    /// Fields that must be set before the draft can be published.
    pub fn missing_required_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.title.as_deref().map_or(true, |t| t.trim().is_empty()) {
            missing.push("title".to_string());
        }
        if self.start_date.is_none() {
            missing.push("start_date".to_string());
        }
        if self.tickets.is_empty() {
            missing.push("ticket_types".to_string());
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_required_fields().is_empty()
    }

    /// Human-readable multi-line summary.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!(
            "Title: {}",
            self.title.as_deref().unwrap_or("(not set)")
        ));
        if let Some(date) = self.start_date {
            let mut when = date.format("%A, %B %-d, %Y").to_string();
            match (self.start_time, self.end_time) {
                (Some(start), Some(end)) => {
                    when.push_str(&format!(", {}–{}", fmt_time(start), fmt_time(end)))
                }
                (Some(start), None) => when.push_str(&format!(", {}", fmt_time(start))),
                _ => {}
            }
            lines.push(format!("When: {when}"));
        } else {
            lines.push("When: (not set)".to_string());
        }
        if let Some(location) = &self.location {
            lines.push(format!("Where: {location}"));
        }
        match (self.age_min, self.age_max) {
            (Some(min), Some(max)) => lines.push(format!("Ages: {min}-{max}")),
            (Some(min), None) => lines.push(format!("Ages: {min}+")),
            (None, Some(max)) => lines.push(format!("Ages: up to {max}")),
            (None, None) => {}
        }
        if let Some(capacity) = self.capacity {
            lines.push(format!("Capacity: {capacity}"));
        }
        if self.tickets.is_empty() {
            lines.push("Tickets: (none)".to_string());
        } else {
            lines.push("Tickets:".to_string());
            for tier in &self.tickets {
                let mut line = format!("  - {}: {}", tier.name, fmt_price(tier.price_cents));
                if let Some(cap) = tier.capacity {
                    line.push_str(&format!(" ({cap} spots)"));
                }
                lines.push(line);
            }
        }
        lines.join("\n")
    }
}

fn fmt_time(time: NaiveTime) -> String {
    time.format("%-I:%M %p").to_string()
}

/// `$20` or `$12.50`.
pub fn fmt_price(cents: u64) -> String {
    if cents % 100 == 0 {
        format!("${}", cents / 100)
    } else {
        format!("${}.{:02}", cents / 100, cents % 100)
    }
}

/// `HH:MM` (de)serialization for optional times.
pub(crate) mod hm_opt {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(t) => s.serialize_str(&t.format("%H:%M").to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|s| super::parse_time(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid time '{s}'"))))
            .transpose()
    }
}

/// Parse `HH:MM` or `HH:MM:SS`.
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tier(name: &str, cents: u64) -> TicketTier {
        TicketTier {
            name: name.into(),
            price_cents: cents,
            capacity: Some(10),
        }
    }

    #[test]
    fn tier_identity_ignores_case_and_spacing() {
        let mut draft = EventDraft::default();
        assert_eq!(draft.add_ticket(tier("General Admission", 2000)), TicketAdd::Added);
        assert_eq!(
            draft.add_ticket(tier("  general   admission ", 2000)),
            TicketAdd::Duplicate
        );
        assert_eq!(draft.add_ticket(tier("General Admission", 2500)), TicketAdd::Added);
        assert_eq!(draft.tickets().len(), 2);
    }

    #[test]
    fn missing_fields_lists_required_gaps() {
        let mut draft = EventDraft::default();
        assert_eq!(
            draft.missing_required_fields(),
            vec!["title", "start_date", "ticket_types"]
        );

        draft.apply(&EventFields {
            title: Some("Pottery Workshop".into()),
            start_date: NaiveDate::from_ymd_opt(2026, 10, 24),
            ..Default::default()
        });
        draft.add_ticket(tier("General Admission", 2000));
        assert!(draft.is_complete());
    }

    #[test]
    fn apply_only_overwrites_present_fields() {
        let mut draft = EventDraft::from_fields(&EventFields {
            title: Some("Pottery".into()),
            location: Some("Studio".into()),
            ..Default::default()
        });
        draft.apply(&EventFields {
            location: Some("Library".into()),
            ..Default::default()
        });
        assert_eq!(draft.title.as_deref(), Some("Pottery"));
        assert_eq!(draft.location.as_deref(), Some("Library"));
    }

    #[test]
    fn summary_renders_times_and_prices() {
        let mut draft = EventDraft::from_fields(&EventFields {
            title: Some("Pottery Workshop".into()),
            start_date: NaiveDate::from_ymd_opt(2026, 10, 24),
            start_time: NaiveTime::from_hms_opt(9, 0, 0),
            end_time: NaiveTime::from_hms_opt(12, 0, 0),
            age_min: Some(5),
            age_max: Some(8),
            ..Default::default()
        });
        draft.add_ticket(tier("General Admission", 1250));

        let summary = draft.summary();
        assert!(summary.contains("Saturday, October 24, 2026, 9:00 AM–12:00 PM"));
        assert!(summary.contains("Ages: 5-8"));
        assert!(summary.contains("General Admission: $12.50 (10 spots)"));
    }

    #[test]
    fn draft_round_trips_with_hh_mm_times() {
        let draft = EventDraft::from_fields(&EventFields {
            start_time: NaiveTime::from_hms_opt(13, 30, 0),
            ..Default::default()
        });
        let json = serde_json::to_value(&draft).unwrap();
        assert_eq!(json["start_time"], "13:30");
        let back: EventDraft = serde_json::from_value(json).unwrap();
        assert_eq!(back, draft);
    }
}
