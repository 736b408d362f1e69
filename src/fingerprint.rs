//! Order-independent row fingerprints used for import deduplication.
//!
//! Internal keys (id, owner aliases, parser artifacts) are dropped, values are
//! trimmed, keys are sorted, and the canonical JSON rendering is digested with
//! SHA-256. Two rows share a fingerprint exactly when their domain content is
//! the same.

use std::{collections::BTreeMap, collections::HashSet, fmt};

use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use crate::row::{Row, is_internal_key};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn fingerprint(row: &Row) -> Fingerprint {
    fingerprint_fields(&row.fields)
}

pub fn fingerprint_fields(fields: &IndexMap<String, String>) -> Fingerprint {
    let canonical = canonical_form(fields);
    let digest = Sha256::digest(canonical.as_bytes());
    let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
    Fingerprint(hex)
}

/// Deterministic serialization of the domain fields.
pub fn canonical_form(fields: &IndexMap<String, String>) -> String {
    let sorted = fields
        .iter()
        .filter(|(key, _)| !is_internal_key(key))
        .map(|(key, value)| (key.as_str(), value.trim()))
        .collect::<BTreeMap<_, _>>();
    // A BTreeMap of strings always serializes.
    serde_json::to_string(&sorted).unwrap_or_default()
}

/// Fingerprints of a whole collection.
pub fn fingerprint_set<'a, I>(rows: I) -> HashSet<Fingerprint>
where
    I: IntoIterator<Item = &'a Row>,
{
    rows.into_iter().map(fingerprint).collect()
}

/// Keeps the rows whose fingerprint is not in `existing`, in input order.
pub fn novel_rows(candidates: Vec<Row>, existing: &HashSet<Fingerprint>) -> Vec<Row> {
    candidates
        .into_iter()
        .filter(|row| !existing.contains(&fingerprint(row)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_metadata_and_key_order() {
        let a = Row::from_pairs([("id", "1"), ("owner_id", "a@x.com"), ("Company", "Acme"), ("Status", "Won")]);
        let b = Row::from_pairs([("Status", " Won "), ("_owner", "b@x.com"), ("Company", "Acme"), ("id", "2")]);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn differs_on_domain_values() {
        let a = Row::from_pairs([("Company", "Acme"), ("Status", "Won")]);
        let b = Row::from_pairs([("Company", "Acme"), ("Status", "Lost")]);
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn key_value_boundaries_do_not_collide() {
        let a = Row::from_pairs([("a", "b,c")]);
        let b = Row::from_pairs([("a", "b"), ("c", "")]);
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn novel_rows_filters_known_fingerprints() {
        let known = Row::from_pairs([("Company", "Acme")]);
        let fresh = Row::from_pairs([("Company", "Globex")]);
        let existing = fingerprint_set([&known]);
        let novel = novel_rows(vec![known.clone(), fresh.clone()], &existing);
        assert_eq!(novel, vec![fresh]);
    }
}
