//! Field extraction: one raw project item in, one [`Item`] or a skip out.
//!
//! Project items arrive as loosely shaped GraphQL JSON. Decoding them into
//! the tagged types below is the only place that deals with unknown shapes;
//! everything downstream works with a well-typed [`Item`].

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::model::{Item, eq_casefold};

/// Result of extracting a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Item(Item),
    Skip(SkipReason),
}

/// Why a record contributed nothing to the item set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The record didn't decode as a project item at all.
    Malformed,
    /// Content is a draft, pull request, redacted item, or missing.
    NotAnIssue,
    MissingUrl,
    MissingId,
    /// No single-select value for the status field, or the value is empty.
    NoStatus,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Malformed => "malformed record",
            Self::NotAnIssue => "not an issue",
            Self::MissingUrl => "issue has no url",
            Self::MissingId => "item has no id",
            Self::NoStatus => "no status value",
        };
        f.write_str(reason)
    }
}

// ── Wire shapes ──

/// A `ProjectV2Item` node as requested by the items query.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawItem {
    id: Option<String>,
    content: Option<Content>,
    field_values: Option<Connection<FieldValue>>,
}

#[derive(Deserialize)]
struct Connection<T> {
    nodes: Option<Vec<Option<T>>>,
}

/// Item content, discriminated by GraphQL `__typename`.
#[derive(Deserialize)]
#[serde(tag = "__typename")]
enum Content {
    Issue(IssueContent),
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct IssueContent {
    url: Option<String>,
    title: Option<String>,
    number: Option<u64>,
    repository: Option<Repository>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Repository {
    name_with_owner: Option<String>,
}

/// One field value on an item. Only single-select values can carry a status.
#[derive(Deserialize)]
#[serde(tag = "__typename")]
enum FieldValue {
    #[serde(rename = "ProjectV2ItemFieldSingleSelectValue")]
    SingleSelect {
        name: Option<String>,
        field: Option<FieldRef>,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct FieldRef {
    name: Option<String>,
}

// ── Extraction ──

/// Extracts an [`Item`] from a raw record, reading its status from the
/// single-select field named `status_field` (case-insensitive).
///
/// When several fields share that name, the first one wins.
pub fn extract(raw: &Value, status_field: &str) -> Extraction {
    let Ok(record) = RawItem::deserialize(raw) else {
        return Extraction::Skip(SkipReason::Malformed);
    };

    let Some(Content::Issue(issue)) = record.content else {
        return Extraction::Skip(SkipReason::NotAnIssue);
    };
    let Some(url) = issue.url.filter(|u| !u.is_empty()) else {
        return Extraction::Skip(SkipReason::MissingUrl);
    };
    let Some(status) = find_status(record.field_values, status_field) else {
        return Extraction::Skip(SkipReason::NoStatus);
    };
    let Some(id) = record.id.filter(|id| !id.is_empty()) else {
        return Extraction::Skip(SkipReason::MissingId);
    };

    Extraction::Item(Item {
        id,
        status: Some(status),
        title: issue.title,
        url,
        repo: issue.repository.and_then(|r| r.name_with_owner),
        number: issue.number,
    })
}

fn find_status(values: Option<Connection<FieldValue>>, status_field: &str) -> Option<String> {
    let nodes = values?.nodes?;
    nodes
        .into_iter()
        .flatten()
        .find_map(|value| match value {
            FieldValue::SingleSelect {
                name,
                field: Some(FieldRef {
                    name: Some(field_name),
                }),
            } if eq_casefold(&field_name, status_field) => Some(name),
            _ => None,
        })
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn status_value(field: &str, value: &str) -> Value {
        json!({
            "__typename": "ProjectV2ItemFieldSingleSelectValue",
            "name": value,
            "field": { "__typename": "ProjectV2SingleSelectField", "name": field },
        })
    }

    fn issue_record(id: &str, field_values: Vec<Value>) -> Value {
        json!({
            "id": id,
            "content": {
                "__typename": "Issue",
                "id": "I_kwDO",
                "url": "https://github.com/acme/widgets/issues/42",
                "title": "Fix the widget",
                "number": 42,
                "repository": { "nameWithOwner": "acme/widgets" },
            },
            "fieldValues": { "nodes": field_values },
        })
    }

    fn expect_item(extraction: Extraction) -> Item {
        match extraction {
            Extraction::Item(item) => item,
            Extraction::Skip(reason) => panic!("expected item, skipped: {reason}"),
        }
    }

    #[test]
    fn extracts_issue_with_status() {
        let raw = issue_record("PVTI_1", vec![status_value("Status", "Todo")]);
        let item = expect_item(extract(&raw, "Status"));

        assert_eq!(
            item,
            Item {
                id: "PVTI_1".into(),
                status: Some("Todo".into()),
                title: Some("Fix the widget".into()),
                url: "https://github.com/acme/widgets/issues/42".into(),
                repo: Some("acme/widgets".into()),
                number: Some(42),
            }
        );
    }

    #[test]
    fn field_name_matches_case_insensitively() {
        let raw = issue_record("PVTI_1", vec![status_value("STATUS", "Todo")]);
        let item = expect_item(extract(&raw, "status"));

        assert_eq!(item.status.as_deref(), Some("Todo"));
    }

    #[test]
    fn first_matching_field_wins() {
        let raw = issue_record(
            "PVTI_1",
            vec![
                status_value("Priority", "P1"),
                status_value("Status", "In Progress"),
                status_value("status", "Todo"),
            ],
        );
        let item = expect_item(extract(&raw, "Status"));

        assert_eq!(item.status.as_deref(), Some("In Progress"));
    }

    #[test]
    fn ignores_other_field_value_kinds() {
        let raw = issue_record(
            "PVTI_1",
            vec![
                json!({ "__typename": "ProjectV2ItemFieldTextValue" }),
                json!(null),
                status_value("Status", "Done"),
            ],
        );
        let item = expect_item(extract(&raw, "Status"));

        assert_eq!(item.status.as_deref(), Some("Done"));
    }

    #[test]
    fn skips_pull_requests_and_drafts() {
        let raw = json!({
            "id": "PVTI_2",
            "content": { "__typename": "PullRequest" },
            "fieldValues": { "nodes": [status_value("Status", "Todo")] },
        });
        assert_eq!(extract(&raw, "Status"), Extraction::Skip(SkipReason::NotAnIssue));

        let raw = json!({ "id": "PVTI_3", "content": null, "fieldValues": { "nodes": [] } });
        assert_eq!(extract(&raw, "Status"), Extraction::Skip(SkipReason::NotAnIssue));
    }

    #[test]
    fn skips_issue_without_url() {
        let mut raw = issue_record("PVTI_1", vec![status_value("Status", "Todo")]);
        raw["content"]["url"] = Value::Null;

        assert_eq!(extract(&raw, "Status"), Extraction::Skip(SkipReason::MissingUrl));
    }

    #[test]
    fn skips_item_without_status_field() {
        let raw = issue_record("PVTI_1", vec![status_value("Priority", "P1")]);
        assert_eq!(extract(&raw, "Status"), Extraction::Skip(SkipReason::NoStatus));
    }

    #[test]
    fn skips_when_first_match_has_no_value() {
        let mut empty = status_value("Status", "unused");
        empty["name"] = Value::Null;
        let raw = issue_record("PVTI_1", vec![empty, status_value("Status", "Todo")]);

        assert_eq!(extract(&raw, "Status"), Extraction::Skip(SkipReason::NoStatus));
    }

    #[test]
    fn skips_item_without_id() {
        let mut raw = issue_record("PVTI_1", vec![status_value("Status", "Todo")]);
        raw["id"] = Value::Null;

        assert_eq!(extract(&raw, "Status"), Extraction::Skip(SkipReason::MissingId));
    }

    #[test]
    fn skips_malformed_record() {
        assert_eq!(
            extract(&json!("not an object"), "Status"),
            Extraction::Skip(SkipReason::Malformed)
        );
    }

    #[test]
    fn tolerates_missing_optional_issue_fields() {
        let raw = json!({
            "id": "PVTI_1",
            "content": { "__typename": "Issue", "url": "https://github.com/acme/widgets/issues/1" },
            "fieldValues": { "nodes": [status_value("Status", "Todo")] },
        });
        let item = expect_item(extract(&raw, "Status"));

        assert_eq!(item.title, None);
        assert_eq!(item.repo, None);
        assert_eq!(item.number, None);
    }
}
