//! Typed wire values for record payloads and schema introspection.
//!
//! The server's RPC layer is dynamically typed; these types give the sync
//! engine a closed set of shapes to match on instead of loose JSON. Singular
//! relations arrive as an `[id, display_name]` pair, multi relations as a
//! plain id list, and absent values as `false` (normalized to [`RemoteValue::Null`]
//! for non-boolean fields by the caller, which knows the field kind).

use serde_json::Value;
use std::collections::HashMap;

/// A single field value as carried on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Singular relation: target id plus its display name.
    Relation(i64, String),
    /// Multi relation: target ids.
    IdList(Vec<i64>),
}

impl RemoteValue {
    /// Decode a JSON wire value into its typed form.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => RemoteValue::Null,
            Value::Bool(b) => RemoteValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    RemoteValue::Int(i)
                } else {
                    RemoteValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => RemoteValue::Text(s.clone()),
            Value::Array(items) => Self::from_json_array(items),
            // Unexpected shapes fall back to their string rendering rather
            // than failing the whole record.
            other => RemoteValue::Text(other.to_string()),
        }
    }

    fn from_json_array(items: &[Value]) -> Self {
        // [id, "Display Name"] is a singular relation.
        if items.len() == 2 {
            if let (Some(id), Some(name)) = (items[0].as_i64(), items[1].as_str()) {
                return RemoteValue::Relation(id, name.to_string());
            }
        }
        if items.iter().all(|v| v.as_i64().is_some()) {
            return RemoteValue::IdList(items.iter().filter_map(|v| v.as_i64()).collect());
        }
        RemoteValue::Text(Value::Array(items.to_vec()).to_string())
    }

    /// Encode this value for an outgoing `create`/`write` call.
    pub fn to_json(&self) -> Value {
        match self {
            RemoteValue::Null => Value::Null,
            RemoteValue::Bool(b) => Value::Bool(*b),
            RemoteValue::Int(i) => Value::from(*i),
            RemoteValue::Float(f) => Value::from(*f),
            RemoteValue::Text(s) => Value::from(s.clone()),
            RemoteValue::Relation(id, _) => Value::from(*id),
            RemoteValue::IdList(ids) => Value::from(ids.clone()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RemoteValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RemoteValue::Int(i) => Some(*i),
            RemoteValue::Relation(id, _) => Some(*id),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RemoteValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One record as returned by `read`/`search_read`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    /// Server-assigned identifier; the only safe cross-sync join key.
    pub id: i64,
    pub values: HashMap<String, RemoteValue>,
}

impl RemoteRecord {
    pub fn get(&self, field: &str) -> Option<&RemoteValue> {
        self.values.get(field)
    }

    /// Decode a JSON record object. The `id` field is mandatory; everything
    /// else is decoded to [`RemoteValue`]s.
    pub fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let id = obj.get("id")?.as_i64()?;
        let values = obj
            .iter()
            .map(|(k, v)| (k.clone(), RemoteValue::from_json(v)))
            .collect();
        Some(RemoteRecord { id, values })
    }
}

/// Field type as reported by `fields_get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Char,
    Text,
    Boolean,
    Integer,
    Float,
    Date,
    Datetime,
    ManyToOne,
    ManyToMany,
    Selection,
    Other,
}

impl FieldKind {
    pub fn parse(type_name: &str) -> Self {
        match type_name {
            "char" => FieldKind::Char,
            "text" | "html" => FieldKind::Text,
            "boolean" => FieldKind::Boolean,
            "integer" => FieldKind::Integer,
            "float" | "monetary" => FieldKind::Float,
            "date" => FieldKind::Date,
            "datetime" => FieldKind::Datetime,
            "many2one" => FieldKind::ManyToOne,
            "many2many" | "one2many" => FieldKind::ManyToMany,
            "selection" => FieldKind::Selection,
            _ => FieldKind::Other,
        }
    }
}

/// Per-field schema entry.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub kind: FieldKind,
}

/// Entity schema snapshot: field name to descriptor.
pub type RemoteSchema = HashMap<String, FieldDescriptor>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_scalars() {
        assert_eq!(RemoteValue::from_json(&json!(null)), RemoteValue::Null);
        assert_eq!(RemoteValue::from_json(&json!(true)), RemoteValue::Bool(true));
        assert_eq!(RemoteValue::from_json(&json!(42)), RemoteValue::Int(42));
        assert_eq!(RemoteValue::from_json(&json!(1.5)), RemoteValue::Float(1.5));
        assert_eq!(
            RemoteValue::from_json(&json!("hello")),
            RemoteValue::Text("hello".to_string())
        );
    }

    #[test]
    fn decodes_relations() {
        assert_eq!(
            RemoteValue::from_json(&json!([7, "Internal Project"])),
            RemoteValue::Relation(7, "Internal Project".to_string())
        );
        assert_eq!(
            RemoteValue::from_json(&json!([1, 2, 3])),
            RemoteValue::IdList(vec![1, 2, 3])
        );
        // A two-element id list is indistinguishable from a relation only
        // when the second element is a string.
        assert_eq!(
            RemoteValue::from_json(&json!([4, 5])),
            RemoteValue::IdList(vec![4, 5])
        );
    }

    #[test]
    fn decodes_record() {
        let rec = RemoteRecord::from_json(&json!({
            "id": 10,
            "name": "Task A",
            "project_id": [3, "Website"],
        }))
        .unwrap();
        assert_eq!(rec.id, 10);
        assert_eq!(rec.get("name"), Some(&RemoteValue::Text("Task A".to_string())));
        assert_eq!(
            rec.get("project_id"),
            Some(&RemoteValue::Relation(3, "Website".to_string()))
        );
    }

    #[test]
    fn record_without_id_is_rejected() {
        assert!(RemoteRecord::from_json(&json!({"name": "x"})).is_none());
    }

    #[test]
    fn parses_field_kinds() {
        assert_eq!(FieldKind::parse("many2one"), FieldKind::ManyToOne);
        assert_eq!(FieldKind::parse("one2many"), FieldKind::ManyToMany);
        assert_eq!(FieldKind::parse("datetime"), FieldKind::Datetime);
        assert_eq!(FieldKind::parse("binary"), FieldKind::Other);
    }
}
