//! Normalization of API payloads into `CaseRecord`.
//!
//! This is the validation boundary: any field that does not fit the case
//! model turns into `SourceError::Malformed`, and the caller drops the whole
//! batch.

use super::types::{ApiCase, ApiComment};
use casewatch_core::{
    sort_newest_first, CaseRecord, CaseState, Comment, CommentAuthor, FieldParseError, Priority,
    SourceError, Timestamp,
};
use chrono::{DateTime, Utc};

/// Split `{parent}/cases/{n}` into `(parent, n)`.
pub fn split_case_name(name: &str) -> Option<(String, String)> {
    let (parent, number) = name.rsplit_once("/cases/")?;
    if parent.is_empty() || number.is_empty() || number.contains('/') {
        return None;
    }
    Some((parent.to_string(), number.to_string()))
}

fn malformed(case_number: Option<&str>, reason: impl Into<String>) -> SourceError {
    SourceError::Malformed {
        case_number: case_number.map(str::to_string),
        reason: reason.into(),
    }
}

fn field_error(case_number: &str, err: FieldParseError) -> SourceError {
    malformed(Some(case_number), err.to_string())
}

fn parse_time(case_number: &str, field: &str, raw: Option<&str>) -> Result<Timestamp, SourceError> {
    let raw = raw.ok_or_else(|| malformed(Some(case_number), format!("missing {}", field)))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| malformed(Some(case_number), format!("invalid {} {:?}: {}", field, raw, e)))
}

pub fn normalize_comment(case_number: &str, comment: &ApiComment) -> Result<Comment, SourceError> {
    let creator = comment.creator.clone().unwrap_or_default();
    Ok(Comment {
        creator: CommentAuthor {
            display_name: creator.display_name,
            email: creator.email,
            google_support: creator.google_support,
        },
        body: comment.body.clone(),
        create_time: parse_time(case_number, "comment createTime", comment.create_time.as_deref())?,
    })
}

pub fn normalize_case(case: &ApiCase, comments: &[ApiComment]) -> Result<CaseRecord, SourceError> {
    let (parent, case_number) = split_case_name(&case.name)
        .ok_or_else(|| malformed(None, format!("unrecognized case name {:?}", case.name)))?;

    let state = CaseState::from_api_str(&case.state).map_err(|e| field_error(&case_number, e))?;

    let raw_priority = case
        .priority
        .as_deref()
        .or(case.severity.as_deref())
        .ok_or_else(|| malformed(Some(&case_number), "missing priority"))?;
    let priority: Priority = raw_priority
        .parse()
        .map_err(|e| field_error(&case_number, e))?;

    let update_time = parse_time(&case_number, "updateTime", case.update_time.as_deref())?;

    let mut comment_list = comments
        .iter()
        .map(|c| normalize_comment(&case_number, c))
        .collect::<Result<Vec<_>, _>>()?;
    sort_newest_first(&mut comment_list);

    Ok(CaseRecord {
        case_number,
        parent,
        display_name: case.display_name.clone(),
        state,
        priority,
        escalated: case.escalated,
        update_time,
        comment_list,
    })
}

/// Decode and normalize one case plus its comments from raw JSON.
pub fn parse_case_payload(case_json: &[u8], comments_json: &[u8]) -> Result<CaseRecord, SourceError> {
    let case: ApiCase = serde_json::from_slice(case_json)
        .map_err(|e| malformed(None, format!("case payload: {}", e)))?;
    let comments: Vec<ApiComment> = if comments_json.is_empty() {
        Vec::new()
    } else {
        serde_json::from_slice(comments_json)
            .map_err(|e| malformed(None, format!("comment payload: {}", e)))?
    };
    normalize_case(&case, &comments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::types::ApiActor;

    fn api_case() -> ApiCase {
        ApiCase {
            name: "projects/my-proj/cases/12345".to_string(),
            display_name: "VM unreachable".to_string(),
            state: "IN_PROGRESS_GOOGLE_SUPPORT".to_string(),
            priority: Some("P2".to_string()),
            severity: None,
            escalated: false,
            update_time: Some("2024-03-01T10:00:00.123456Z".to_string()),
            subscriber_email_addresses: vec![],
        }
    }

    fn api_comment(body: &str, at: &str, support: bool) -> ApiComment {
        ApiComment {
            name: String::new(),
            create_time: Some(at.to_string()),
            creator: Some(ApiActor {
                display_name: if support { "Google Support" } else { "Customer" }.to_string(),
                email: None,
                google_support: support,
            }),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_split_case_name() {
        assert_eq!(
            split_case_name("organizations/1/cases/99"),
            Some(("organizations/1".to_string(), "99".to_string()))
        );
        assert_eq!(split_case_name("cases/99"), None);
        assert_eq!(split_case_name("projects/p/cases/"), None);
        assert_eq!(split_case_name("projects/p/cases/1/comments/2"), None);
    }

    #[test]
    fn test_normalize_sorts_comments_newest_first() {
        let comments = vec![
            api_comment("older", "2024-03-01T08:00:00Z", false),
            api_comment("newest", "2024-03-01T09:30:00Z", true),
            api_comment("middle", "2024-03-01T09:00:00Z", false),
        ];
        let record = normalize_case(&api_case(), &comments).unwrap();
        assert_eq!(record.case_number, "12345");
        assert_eq!(record.parent, "projects/my-proj");
        assert_eq!(record.state, CaseState::Open);
        assert_eq!(record.priority.ordinal(), 2);
        let bodies: Vec<_> = record.comment_list.iter().map(|c| c.body.as_str()).collect();
        assert_eq!(bodies, vec!["newest", "middle", "older"]);
        assert!(record.newest_comment().unwrap().is_from_support());
    }

    #[test]
    fn test_severity_fallback() {
        let case = ApiCase {
            priority: None,
            severity: Some("S1".to_string()),
            ..api_case()
        };
        assert_eq!(normalize_case(&case, &[]).unwrap().priority.ordinal(), 1);
    }

    #[test]
    fn test_malformed_fields() {
        let bad_state = ApiCase {
            state: "UNKNOWN".to_string(),
            ..api_case()
        };
        let err = normalize_case(&bad_state, &[]).unwrap_err();
        assert!(matches!(
            err,
            SourceError::Malformed { case_number: Some(ref n), .. } if n == "12345"
        ));

        let bad_time = ApiCase {
            update_time: Some("yesterday".to_string()),
            ..api_case()
        };
        assert!(normalize_case(&bad_time, &[]).is_err());

        let no_priority = ApiCase {
            priority: None,
            ..api_case()
        };
        assert!(normalize_case(&no_priority, &[]).is_err());

        let bad_name = ApiCase {
            name: "garbage".to_string(),
            ..api_case()
        };
        assert!(matches!(
            normalize_case(&bad_name, &[]).unwrap_err(),
            SourceError::Malformed { case_number: None, .. }
        ));

        let undated = ApiComment {
            create_time: None,
            ..api_comment("x", "2024-01-01T00:00:00Z", true)
        };
        assert!(normalize_case(&api_case(), &[undated]).is_err());
    }

    #[test]
    fn test_parse_case_payload_json() {
        let case = br#"{
            "name": "organizations/77/cases/5",
            "state": "NEW",
            "priority": "P0",
            "escalated": true,
            "updateTime": "2024-05-05T05:05:05Z"
        }"#;
        let comments = br#"[{"body": "hi", "createTime": "2024-05-05T05:00:00Z",
                             "creator": {"displayName": "Ana", "googleSupport": true}}]"#;
        let record = parse_case_payload(case, comments).unwrap();
        assert!(record.escalated);
        assert_eq!(record.priority.ordinal(), 0);
        assert_eq!(record.comment_list.len(), 1);
        assert!(parse_case_payload(b"{not json", b"").is_err());
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Arbitrary bytes never panic the normalizer.
        #[test]
        fn prop_parse_never_panics(case in proptest::collection::vec(any::<u8>(), 0..256),
                                   comments in proptest::collection::vec(any::<u8>(), 0..128)) {
            let _ = parse_case_payload(&case, &comments);
        }

        #[test]
        fn prop_case_number_round_trips(parent in "projects/[a-z][a-z0-9-]{0,20}", number in "[0-9]{1,12}") {
            let name = format!("{}/cases/{}", parent, number);
            prop_assert_eq!(split_case_name(&name), Some((parent, number)));
        }
    }
}
