//! Event domain: drafts, extracted details, heuristics and the external
//! calendar and publish collaborators.

pub mod calendar;
pub mod details;
pub mod draft;
pub mod heuristics;
pub mod publish;

pub use calendar::{AvailabilityCalendar, CalendarEntry, InMemoryCalendar};
pub use details::{ExtractedDetails, TicketRequest};
pub use draft::{EventDraft, EventFields, TicketAdd, TicketTier, TierKey};
pub use publish::{EventPublisher, InMemoryPublisher, PublishedEvent};
