//! Field value translation between the remote wire shapes and the local
//! SQLite column shapes.
//!
//! Download conversion is total: any value the remote sends becomes some
//! `SqlValue`, falling back to `Null` rather than aborting the record.
//! Upload conversion is driven by the remote schema's field kind.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use core_remote::{FieldKind, RemoteValue};
use core_store::SqlValue;
use tracing::warn;

/// Remote value → local column value.
///
/// Relations flatten to their id; id lists store as comma-joined text so
/// membership checks stay a LIKE away; booleans store as 0/1.
pub fn to_local(value: &RemoteValue) -> SqlValue {
    match value {
        RemoteValue::Null => SqlValue::Null,
        RemoteValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
        RemoteValue::Int(i) => SqlValue::Integer(*i),
        RemoteValue::Float(f) => SqlValue::Real(*f),
        RemoteValue::Text(s) => SqlValue::Text(s.clone()),
        RemoteValue::Relation(id, _) => SqlValue::Integer(*id),
        RemoteValue::IdList(ids) => SqlValue::Text(
            ids.iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(","),
        ),
    }
}

/// Kind-aware download conversion. The server sends `false` for any empty
/// field; outside boolean fields that means absent, not zero.
pub fn to_local_typed(value: &RemoteValue, kind: FieldKind) -> SqlValue {
    match (value, kind) {
        (RemoteValue::Bool(false), k) if k != FieldKind::Boolean => SqlValue::Null,
        _ => to_local(value),
    }
}

/// Local column value → remote value, shaped by the remote field kind.
/// A value that cannot take the required shape becomes `Null` with a
/// warning; the record still uploads with its other fields.
pub fn to_remote(field: &str, value: &SqlValue, kind: FieldKind) -> RemoteValue {
    match kind {
        FieldKind::Boolean => match value {
            SqlValue::Null => RemoteValue::Bool(false),
            SqlValue::Integer(i) => RemoteValue::Bool(*i != 0),
            SqlValue::Text(s) => RemoteValue::Bool(s.eq_ignore_ascii_case("true") || s == "1"),
            SqlValue::Real(f) => RemoteValue::Bool(*f != 0.0),
        },
        FieldKind::Integer | FieldKind::ManyToOne => match value {
            SqlValue::Null => RemoteValue::Null,
            SqlValue::Integer(i) => RemoteValue::Int(*i),
            SqlValue::Real(f) => RemoteValue::Int(*f as i64),
            SqlValue::Text(s) => match s.trim().parse::<i64>() {
                Ok(i) => RemoteValue::Int(i),
                Err(_) => {
                    warn!(field, value = %s, "Cannot shape text as id, sending null");
                    RemoteValue::Null
                }
            },
        },
        FieldKind::ManyToMany => match value {
            SqlValue::Null => RemoteValue::IdList(Vec::new()),
            SqlValue::Integer(i) => RemoteValue::IdList(vec![*i]),
            SqlValue::Text(s) => RemoteValue::IdList(parse_id_list(s)),
            SqlValue::Real(f) => RemoteValue::IdList(vec![*f as i64]),
        },
        FieldKind::Float => match value {
            SqlValue::Null => RemoteValue::Null,
            SqlValue::Integer(i) => RemoteValue::Float(*i as f64),
            SqlValue::Real(f) => RemoteValue::Float(*f),
            SqlValue::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(RemoteValue::Float)
                .unwrap_or(RemoteValue::Null),
        },
        FieldKind::Date | FieldKind::Datetime => match value {
            SqlValue::Text(s) => match sanitize_datetime(s) {
                Some(clean) => RemoteValue::Text(clean),
                None => {
                    warn!(field, value = %s, "Unparseable timestamp, sending null");
                    RemoteValue::Null
                }
            },
            SqlValue::Null => RemoteValue::Null,
            other => RemoteValue::Text(other.to_string()),
        },
        FieldKind::Char | FieldKind::Text | FieldKind::Selection | FieldKind::Other => {
            match value {
                SqlValue::Null => RemoteValue::Null,
                other => RemoteValue::Text(other.to_string()),
            }
        }
    }
}

/// Parse a comma-separated id list, skipping blanks and junk.
pub fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse::<i64>().ok())
        .collect()
}

/// Parse a stored timestamp. Accepts ISO-8601 with or without offset,
/// a trailing `Z`, and the server's `YYYY-MM-DD HH:MM:SS` form.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&trimmed.replace(' ', "T")) {
        return Some(dt.with_timezone(&Utc));
    }
    let zless = trimmed.trim_end_matches('Z');
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(zless, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(zless, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

/// Normalize a timestamp to the `YYYY-MM-DD HH:MM:SS` form the server
/// accepts, or `None` if it does not parse.
pub fn sanitize_datetime(raw: &str) -> Option<String> {
    parse_timestamp(raw).map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_flattens_relations_and_lists() {
        assert_eq!(
            to_local(&RemoteValue::Relation(7, "Website".to_string())),
            SqlValue::Integer(7)
        );
        assert_eq!(
            to_local(&RemoteValue::IdList(vec![1, 2, 3])),
            SqlValue::Text("1,2,3".to_string())
        );
        assert_eq!(to_local(&RemoteValue::Bool(true)), SqlValue::Integer(1));
        assert_eq!(to_local(&RemoteValue::Null), SqlValue::Null);
    }

    #[test]
    fn false_means_absent_outside_boolean_fields() {
        assert_eq!(
            to_local_typed(&RemoteValue::Bool(false), FieldKind::Char),
            SqlValue::Null
        );
        assert_eq!(
            to_local_typed(&RemoteValue::Bool(false), FieldKind::Boolean),
            SqlValue::Integer(0)
        );
        assert_eq!(
            to_local_typed(&RemoteValue::Bool(true), FieldKind::Char),
            SqlValue::Integer(1)
        );
    }

    #[test]
    fn upload_shapes_by_field_kind() {
        assert_eq!(
            to_remote("project_id", &SqlValue::Integer(9), FieldKind::ManyToOne),
            RemoteValue::Int(9)
        );
        assert_eq!(
            to_remote("user_ids", &SqlValue::Text("4,5".to_string()), FieldKind::ManyToMany),
            RemoteValue::IdList(vec![4, 5])
        );
        assert_eq!(
            to_remote("favorite", &SqlValue::Integer(1), FieldKind::Boolean),
            RemoteValue::Bool(true)
        );
    }

    #[test]
    fn bad_id_text_degrades_to_null() {
        assert_eq!(
            to_remote("project_id", &SqlValue::Text("n/a".to_string()), FieldKind::ManyToOne),
            RemoteValue::Null
        );
    }

    #[test]
    fn timestamp_forms() {
        assert!(parse_timestamp("2026-03-01 10:30:00").is_some());
        assert!(parse_timestamp("2026-03-01T10:30:00Z").is_some());
        assert!(parse_timestamp("2026-03-01T10:30:00+02:00").is_some());
        assert!(parse_timestamp("2026-03-01").is_some());
        assert!(parse_timestamp("next tuesday").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn sanitize_normalizes_offsets() {
        assert_eq!(
            sanitize_datetime("2026-03-01T10:30:00+02:00").as_deref(),
            Some("2026-03-01 08:30:00")
        );
        assert_eq!(sanitize_datetime("garbage"), None);
    }

    #[test]
    fn id_list_parsing_skips_junk() {
        assert_eq!(parse_id_list("1, 2, x, 3,"), vec![1, 2, 3]);
        assert!(parse_id_list("").is_empty());
    }
}
