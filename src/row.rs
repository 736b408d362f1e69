//! Schema-free rows.
//!
//! A [`Row`] is an insertion-ordered bag of text fields keyed by header name,
//! plus the two pieces of metadata every collection carries: the row id and
//! the owner reference. The owner reference has been written under several
//! field names over time, so [`OwnerRefs`] keeps every alias that was present
//! instead of collapsing them.

use indexmap::IndexMap;
use serde_json::{Map, Value as JsonValue};

/// Owner field names in the order readers consult them.
pub const OWNER_ALIASES: [&str; 5] = ["owner_id", "ownerId", "_owner", "ownerID", "owner"];

/// Keys that never count as domain fields.
pub const INTERNAL_KEYS: [&str; 10] = [
    "id",
    "_id",
    "owner_id",
    "ownerId",
    "_owner",
    "ownerID",
    "owner",
    "_ownerEmail",
    "__meta",
    "__parsed_extra",
];

pub fn is_internal_key(key: &str) -> bool {
    INTERNAL_KEYS.contains(&key) || key.trim().is_empty()
}

pub fn is_owner_alias(key: &str) -> bool {
    OWNER_ALIASES.contains(&key)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerRefs {
    entries: Vec<(String, String)>,
}

impl OwnerRefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(value: impl Into<String>) -> Self {
        let mut refs = Self::new();
        refs.set(OWNER_ALIASES[0], value);
        refs
    }

    /// Records `value` under `alias`, replacing an earlier value for the same alias.
    pub fn set(&mut self, alias: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(name, _)| name == alias) {
            entry.1 = value;
        } else {
            self.entries.push((alias.to_string(), value));
        }
        self.entries.sort_by_key(|(name, _)| alias_rank(name));
    }

    pub fn get(&self, alias: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(name, _)| name == alias)
            .map(|(_, value)| value.as_str())
    }

    /// The authoritative owner: the first non-blank alias in priority order.
    pub fn primary(&self) -> Option<&str> {
        self.values().next()
    }

    /// Every non-blank owner value in priority order.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.values().next().is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

fn alias_rank(alias: &str) -> usize {
    OWNER_ALIASES
        .iter()
        .position(|candidate| *candidate == alias)
        .unwrap_or(OWNER_ALIASES.len())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    pub id: Option<String>,
    pub owner: OwnerRefs,
    pub fields: IndexMap<String, String>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Row {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Builds a row from `(header, value)` pairs, routing id and owner
    /// aliases into metadata and dropping parser artifacts.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut row = Row::new();
        for (key, value) in pairs {
            row.absorb(key.into(), value.into());
        }
        row
    }

    /// Builds a row from a loosely typed JSON object.
    pub fn from_json_map(map: &Map<String, JsonValue>) -> Self {
        Self::from_pairs(map.iter().map(|(k, v)| (k.clone(), coerce_json(v))))
    }

    fn absorb(&mut self, key: String, value: String) {
        match key.as_str() {
            "id" | "_id" => {
                if self.id.is_none() && !value.trim().is_empty() {
                    self.id = Some(value);
                }
            }
            alias if is_owner_alias(alias) => self.owner.set(alias, value),
            other if is_internal_key(other) => {}
            _ => {
                self.fields.insert(key, value);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|s| s.as_str())
    }

    /// Field value trimmed, or `""` when missing.
    pub fn text(&self, key: &str) -> &str {
        self.get(key).map(str::trim).unwrap_or("")
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if is_owner_alias(&key) {
            self.owner.set(&key, value);
        } else if key == "id" {
            self.id = Some(value.into());
        } else {
            self.fields.insert(key, value.into());
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.fields.values().any(|value| !value.trim().is_empty())
    }

    /// Domain fields as a JSON object, suitable for a `data` or `items` payload.
    pub fn to_data(&self) -> Map<String, JsonValue> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
            .collect()
    }
}

/// Renders a loosely typed JSON value as text.
pub fn coerce_json(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_pairs_routes_metadata_out_of_fields() {
        let row = Row::from_pairs([
            ("id", "p_1"),
            ("ownerId", "a@x.com"),
            ("_owner", "b@x.com"),
            ("Company", "Acme"),
            ("__parsed_extra", "junk"),
            ("  ", "blank header"),
        ]);
        assert_eq!(row.id.as_deref(), Some("p_1"));
        assert_eq!(row.owner.primary(), Some("a@x.com"));
        assert_eq!(row.owner.values().collect::<Vec<_>>(), ["a@x.com", "b@x.com"]);
        assert_eq!(row.fields.len(), 1);
        assert_eq!(row.get("Company"), Some("Acme"));
    }

    #[test]
    fn owner_priority_follows_alias_order() {
        let mut owner = OwnerRefs::new();
        owner.set("owner", "legacy@x.com");
        owner.set("owner_id", "current@x.com");
        assert_eq!(owner.primary(), Some("current@x.com"));
        owner.set("owner_id", " ");
        assert_eq!(owner.primary(), Some("legacy@x.com"));
    }

    #[test]
    fn json_values_are_coerced_to_text() {
        let value = json!({"Size, RUB mn": 12.5, "Relevant?": true, "Comments": null, "Tags": ["a"]});
        let row = Row::from_json_map(value.as_object().unwrap());
        assert_eq!(row.get("Size, RUB mn"), Some("12.5"));
        assert_eq!(row.get("Relevant?"), Some("true"));
        assert_eq!(row.get("Comments"), Some(""));
        assert_eq!(row.get("Tags"), Some("[\"a\"]"));
    }

    #[test]
    fn blank_values_make_an_empty_row() {
        let row = Row::from_pairs([("Company", " "), ("Date", ""), ("id", "x")]);
        assert!(row.is_empty());
        let row = Row::from_pairs([("Company", "Acme")]);
        assert!(!row.is_empty());
    }
}
