//! Date availability collaborator.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Something already occupying a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub date: NaiveDate,
    pub title: String,
}

/// Source of existing bookings, consulted by `check_date_availability`.
#[async_trait]
pub trait AvailabilityCalendar: Send + Sync {
    /// Entries that conflict with an event on `date`.
    async fn conflicts(&self, date: NaiveDate) -> Result<Vec<CalendarEntry>>;
}

/// In-memory calendar.
#[derive(Debug, Default)]
pub struct InMemoryCalendar {
    entries: RwLock<Vec<CalendarEntry>>,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<CalendarEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn book(&self, date: NaiveDate, title: impl Into<String>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(CalendarEntry {
                date,
                title: title.into(),
            });
    }
}

#[async_trait]
impl AvailabilityCalendar for InMemoryCalendar {
    async fn conflicts(&self, date: NaiveDate) -> Result<Vec<CalendarEntry>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.date == date)
            .cloned()
            .collect())
    }
}
