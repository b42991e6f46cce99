//! Human-readable message text per event kind.

use casewatch_core::{EventKind, NotificationEvent, Priority};

fn quote(body: &str) -> String {
    body.lines()
        .map(|line| format!("> {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render(event: &NotificationEvent) -> String {
    let case = &event.case_number;
    match event.kind {
        EventKind::Closed => format!("Case {} has been closed.", case),
        EventKind::Comment => format!(
            "Case {} has a new comment from support:\n{}",
            case,
            quote(&event.payload)
        ),
        EventKind::Priority => {
            let label = event
                .payload
                .parse::<Priority>()
                .map(|p| p.label())
                .unwrap_or_else(|_| event.payload.clone());
            format!("Case {} priority changed to {}.", case, label)
        }
        EventKind::Escalated => format!("Case {} has been escalated.", case),
        EventKind::DeEscalated => format!("Case {} has been de-escalated.", case),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind, payload: &str) -> NotificationEvent {
        NotificationEvent {
            case_number: "321".to_string(),
            kind,
            payload: payload.to_string(),
        }
    }

    #[test]
    fn test_render_priority_uses_label() {
        assert_eq!(
            render(&event(EventKind::Priority, "1")),
            "Case 321 priority changed to P1."
        );
    }

    #[test]
    fn test_render_comment_quotes_every_line() {
        let text = render(&event(EventKind::Comment, "first\nsecond"));
        assert_eq!(
            text,
            "Case 321 has a new comment from support:\n> first\n> second"
        );
    }

    #[test]
    fn test_render_simple_kinds() {
        assert_eq!(
            render(&event(EventKind::Closed, "")),
            "Case 321 has been closed."
        );
        assert!(render(&event(EventKind::Escalated, "true")).contains("escalated"));
        assert!(render(&event(EventKind::DeEscalated, "false")).contains("de-escalated"));
    }
}
