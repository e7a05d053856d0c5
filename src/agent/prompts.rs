//! System prompts and templated replies.

use chrono::NaiveDate;

use crate::event::EventDraft;

/// Reply used whenever a turn cannot be completed.
pub const FALLBACK_REPLY: &str = "Sorry, the assistant is unavailable right now. Your draft so far is saved. \
You can switch to the manual event form to keep going, or try again in a moment.";

pub fn extraction_prompt(today: NaiveDate) -> String {
    format!(
        "You extract event details for a homeschool event booking site. Today is {today} ({weekday}).\n\
         Reply with a single JSON object and nothing else. Use only these keys, omitting any the user did not mention:\n\
         title, description, start_date (YYYY-MM-DD), start_time (HH:MM, 24h), end_time (HH:MM, 24h), location, \
         age_min, age_max, capacity, price (dollars; 0 for free), \
         ticket_types (array of {{\"name\", \"price\", \"capacity\"}}).\n\
         Resolve weekdays like \"Saturday\" to the next such date after today.",
        weekday = today.format("%A"),
    )
}

/// Prompt for the tool-using strategies.
pub fn agent_prompt(draft: Option<&EventDraft>, today: NaiveDate) -> String {
    let current = match draft {
        Some(draft) => format!("Current draft:\n{}", draft.summary()),
        None => "There is no draft yet; create one with create_event_draft.".to_string(),
    };
    format!(
        "You help a homeschool parent create an event listing. Today is {today} ({weekday}).\n\
         Use the tools to create and update the draft and to add ticket types. \
         Call each tool at most once per change. Dates are YYYY-MM-DD and times HH:MM (24h). \
         When a tool reports invalid input, fix the arguments or ask the user. \
         When you are done, reply with a short summary of the draft and what is still missing.\n\n\
         {current}",
        weekday = today.format("%A"),
    )
}

fn describe_missing(field: &str) -> &str {
    match field {
        "title" => "a title",
        "start_date" => "a date",
        "ticket_types" => "at least one ticket type",
        other => other,
    }
}

/// Summary reply for the current draft.
pub fn draft_reply(draft: Option<&EventDraft>, issues: &[String]) -> String {
    let mut reply = match draft {
        None => "I couldn't start an event draft yet. Tell me what the event is called and when it happens, \
                 for example \"Create a Saturday morning pottery workshop for ages 5-8, $20\"."
            .to_string(),
        Some(draft) => {
            let missing = draft.missing_required_fields();
            let next = if missing.is_empty() {
                "Everything required is filled in. Create the event when you're ready.".to_string()
            } else {
                let needed: Vec<&str> = missing.iter().map(|f| describe_missing(f)).collect();
                format!("Still needed: {}.", needed.join(", "))
            };
            format!("Here's the event draft so far:\n\n{}\n\n{next}", draft.summary())
        }
    };
    if !issues.is_empty() {
        reply.push_str("\n\nHeads up:");
        for issue in issues {
            reply.push_str("\n- ");
            reply.push_str(issue);
        }
    }
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventFields;

    #[test]
    fn reply_lists_missing_fields_in_plain_words() {
        let draft = EventDraft::from_fields(&EventFields {
            title: Some("Nature Walk".into()),
            ..Default::default()
        });
        let reply = draft_reply(Some(&draft), &["age_min 9 is greater than age_max 6".into()]);
        assert!(reply.contains("Title: Nature Walk"));
        assert!(reply.contains("Still needed: a date, at least one ticket type."));
        assert!(reply.ends_with("- age_min 9 is greater than age_max 6"));
    }

    #[test]
    fn extraction_prompt_names_today() {
        let prompt = extraction_prompt(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        assert!(prompt.contains("2026-10-19 (Monday)"));
    }

    #[test]
    fn fallback_points_to_the_manual_form() {
        assert!(FALLBACK_REPLY.contains("manual event form"));
    }
}
