//! Structured fields extracted from free text.
//!
//! Values stay loosely typed (signed integers, float prices) so that
//! out-of-range input survives extraction and is rejected by the tool
//! validator instead of being silently clamped here.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::draft::{hm_opt, parse_time};

/// A ticket tier the user asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRequest {
    pub name: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<i64>,
}

impl TicketRequest {
    /// Arguments for the `add_ticket_type` tool.
    pub fn to_arguments(&self) -> Value {
        let mut args = json!({"name": self.name, "price": self.price});
        if let Some(capacity) = self.capacity {
            args["capacity"] = capacity.into();
        }
        args
    }
}

pub const DEFAULT_TIER_NAME: &str = "General Admission";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedDetails {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<NaiveDate>,
    #[serde(with = "hm_opt")]
    pub start_time: Option<NaiveTime>,
    #[serde(with = "hm_opt")]
    pub end_time: Option<NaiveTime>,
    pub location: Option<String>,
    pub age_min: Option<i64>,
    pub age_max: Option<i64>,
    pub capacity: Option<i64>,
    /// Single price for the whole event.
    pub price: Option<f64>,
    pub ticket_types: Vec<TicketRequest>,
}

impl ExtractedDetails {
    /// Read whatever usable fields a model put in `value`, ignoring the rest.
    pub fn from_json(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };
        Self {
            title: text(obj, "title"),
            description: text(obj, "description"),
            start_date: text(obj, "start_date")
                .or_else(|| text(obj, "date"))
                .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
            start_time: text(obj, "start_time").and_then(|t| parse_time(&t)),
            end_time: text(obj, "end_time").and_then(|t| parse_time(&t)),
            location: text(obj, "location"),
            age_min: integer(obj, "age_min"),
            age_max: integer(obj, "age_max"),
            capacity: integer(obj, "capacity"),
            price: obj.get("price").and_then(price),
            ticket_types: obj
                .get("ticket_types")
                .and_then(Value::as_array)
                .map(|tiers| tiers.iter().filter_map(ticket).collect())
                .unwrap_or_default(),
        }
    }

    /// Parse a model reply that should hold a JSON object, tolerating
    /// surrounding prose and code fences.
    pub fn from_model_reply(reply: &str) -> Option<Self> {
        let start = reply.find('{')?;
        let end = reply.rfind('}')?;
        if end < start {
            return None;
        }
        serde_json::from_str::<Value>(&reply[start..=end])
            .ok()
            .map(|v| Self::from_json(&v))
    }

    /// Fill every unset field from `other`; set fields are kept.
    pub fn merge_missing(&mut self, other: ExtractedDetails) {
        fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
            if slot.is_none() {
                *slot = value;
            }
        }
        fill(&mut self.title, other.title);
        fill(&mut self.description, other.description);
        fill(&mut self.start_date, other.start_date);
        fill(&mut self.start_time, other.start_time);
        fill(&mut self.end_time, other.end_time);
        fill(&mut self.location, other.location);
        fill(&mut self.age_min, other.age_min);
        fill(&mut self.age_max, other.age_max);
        fill(&mut self.capacity, other.capacity);
        fill(&mut self.price, other.price);
        if self.ticket_types.is_empty() {
            self.ticket_types = other.ticket_types;
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Whether any event field (as opposed to ticketing) was found.
    pub fn has_event_fields(&self) -> bool {
        !self.event_arguments().as_object().is_some_and(Map::is_empty)
    }

    /// Tiers to add: explicit ticket types, or one general tier for a
    /// single price sized to the event capacity.
    pub fn ticket_tiers(&self) -> Vec<TicketRequest> {
        if !self.ticket_types.is_empty() {
            return self.ticket_types.clone();
        }
        match self.price {
            Some(price) => vec![TicketRequest {
                name: DEFAULT_TIER_NAME.to_string(),
                price,
                capacity: self.capacity,
            }],
            None => Vec::new(),
        }
    }

    /// Arguments for `create_event_draft` / `update_event_draft`.
    pub fn event_arguments(&self) -> Value {
        let mut args = Map::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let Some(v) = value {
                args.insert(key.to_string(), v);
            }
        };
        put("title", self.title.clone().map(Value::from));
        put("description", self.description.clone().map(Value::from));
        put(
            "start_date",
            self.start_date.map(|d| d.format("%Y-%m-%d").to_string().into()),
        );
        put(
            "start_time",
            self.start_time.map(|t| t.format("%H:%M").to_string().into()),
        );
        put(
            "end_time",
            self.end_time.map(|t| t.format("%H:%M").to_string().into()),
        );
        put("location", self.location.clone().map(Value::from));
        put("age_min", self.age_min.map(Value::from));
        put("age_max", self.age_max.map(Value::from));
        put("capacity", self.capacity.map(Value::from));
        Value::Object(args)
    }
}

fn text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn integer(obj: &Map<String, Value>, key: &str) -> Option<i64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn price(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned = s.trim().trim_start_matches('$').trim();
            if cleaned.eq_ignore_ascii_case("free") {
                Some(0.0)
            } else {
                cleaned.parse().ok()
            }
        }
        _ => None,
    }
}

fn ticket(value: &Value) -> Option<TicketRequest> {
    let obj = value.as_object()?;
    Some(TicketRequest {
        name: text(obj, "name").unwrap_or_else(|| DEFAULT_TIER_NAME.to_string()),
        price: obj.get("price").and_then(price)?,
        capacity: integer(obj, "capacity"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json_tolerates_loose_types() {
        let details = ExtractedDetails::from_json(&json!({
            "title": "Pottery Workshop",
            "date": "2026-10-24",
            "start_time": "09:00",
            "capacity": "15",
            "price": "$20",
            "age_min": 5.0,
            "location": "",
            "mystery": true
        }));
        assert_eq!(details.title.as_deref(), Some("Pottery Workshop"));
        assert_eq!(details.start_date, NaiveDate::from_ymd_opt(2026, 10, 24));
        assert_eq!(details.capacity, Some(15));
        assert_eq!(details.price, Some(20.0));
        assert_eq!(details.age_min, Some(5));
        assert_eq!(details.location, None);
    }

    #[test]
    fn model_reply_may_wrap_json_in_prose() {
        let details =
            ExtractedDetails::from_model_reply("Here you go:\n```json\n{\"capacity\": -4}\n```")
                .unwrap();
        assert_eq!(details.capacity, Some(-4));
        assert!(ExtractedDetails::from_model_reply("no idea").is_none());
    }

    #[test]
    fn merge_keeps_existing_values() {
        let mut model = ExtractedDetails {
            title: Some("Clay Day".into()),
            ..Default::default()
        };
        model.merge_missing(ExtractedDetails {
            title: Some("Pottery Workshop".into()),
            capacity: Some(15),
            ..Default::default()
        });
        assert_eq!(model.title.as_deref(), Some("Clay Day"));
        assert_eq!(model.capacity, Some(15));
    }

    #[test]
    fn single_price_becomes_general_tier_with_event_capacity() {
        let details = ExtractedDetails {
            price: Some(20.0),
            capacity: Some(15),
            ..Default::default()
        };
        let tiers = details.ticket_tiers();
        assert_eq!(tiers.len(), 1);
        assert_eq!(tiers[0].name, DEFAULT_TIER_NAME);
        assert_eq!(tiers[0].to_arguments(), json!({"name": DEFAULT_TIER_NAME, "price": 20.0, "capacity": 15}));
    }

    #[test]
    fn event_arguments_skip_unset_fields() {
        let details = ExtractedDetails {
            title: Some("Pottery".into()),
            capacity: Some(-3),
            ..Default::default()
        };
        assert_eq!(
            details.event_arguments(),
            json!({"title": "Pottery", "capacity": -3})
        );
        assert!(ExtractedDetails::default().event_arguments().as_object().unwrap().is_empty());
    }
}
