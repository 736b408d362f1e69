//! Derivation of one collection from another.
//!
//! A commercial pipeline sheet names the people behind each deal in a
//! contact-like column. [`derive_contacts`] turns those cells into a
//! deduplicated contacts collection; [`derive_deals`] goes the other way and
//! mirrors uploaded rows 1:1 into deals.

use std::{
    collections::HashSet,
    sync::OnceLock,
    time::{SystemTime, UNIX_EPOCH},
};

use regex::Regex;
use uuid::Uuid;

use crate::{
    fingerprint::{Fingerprint, fingerprint},
    headers::{CONTACT_HEADER_CANDIDATES, resolve_header},
    row::{OwnerRefs, Row},
};

pub const CONTACT_FIELD: &str = "contact";

/// How a derived collection is reconciled with the one already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationMode {
    /// Add derived rows not already present (by fingerprint).
    AppendUnique,
    /// Drop the stored collection and store the derived one.
    FullReplace,
}

const CONTACT_SEPARATORS: &str = r"(?i)[,;/]|\s+and\s+|\s+и\s+";

fn splitter() -> Option<&'static Regex> {
    static SPLITTER: OnceLock<Option<Regex>> = OnceLock::new();
    SPLITTER
        .get_or_init(|| Regex::new(CONTACT_SEPARATORS).ok())
        .as_ref()
}

/// Splits a contact cell into trimmed, non-empty names.
pub fn split_contacts(raw: &str) -> Vec<String> {
    let parts: Vec<&str> = match splitter() {
        Some(regex) => regex.split(raw).collect(),
        None => vec![raw],
    };
    parts
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn contact_row(name: &str, owner_id: Option<&str>) -> Row {
    let mut row = Row::with_id(format!("c_{}", Uuid::new_v4().simple()));
    row.fields.insert(CONTACT_FIELD.to_string(), name.to_string());
    if let Some(owner) = owner_id {
        row.owner = OwnerRefs::single(owner);
    }
    row
}

/// Deals to contacts: one row per distinct (case-insensitive) name.
///
/// The contact column is resolved per row, so sheets mixing layouts still
/// contribute every name they carry.
pub fn derive_contacts(rows: &[Row], owner_id: Option<&str>) -> Vec<Row> {
    let mut names = ContactNames::default();
    for row in rows {
        let headers = row.fields.keys().collect::<Vec<_>>();
        if let Some(column) = resolve_header(&headers, &CONTACT_HEADER_CANDIDATES) {
            names.extend(row.text(&column));
        }
    }
    names.into_rows(owner_id)
}

/// Contacts named in any of `columns`, across every row.
pub fn contacts_from_columns<S: AsRef<str>>(
    rows: &[Row],
    columns: &[S],
    owner_id: Option<&str>,
) -> Vec<Row> {
    let mut names = ContactNames::default();
    for row in rows {
        for column in columns {
            names.extend(row.text(column.as_ref()));
        }
    }
    names.into_rows(owner_id)
}

#[derive(Default)]
struct ContactNames {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl ContactNames {
    fn extend(&mut self, cell: &str) {
        for name in split_contacts(cell) {
            if self.seen.insert(name.to_lowercase()) {
                self.ordered.push(name);
            }
        }
    }

    fn into_rows(self, owner_id: Option<&str>) -> Vec<Row> {
        self.ordered
            .iter()
            .map(|name| contact_row(name, owner_id))
            .collect()
    }
}

/// Contacts to deals: passthrough with id and owner stamping.
///
/// Stamped ids only name rows locally. Import bodies never carry ids, so the
/// server assigns its own when the mirrored rows are stored.
pub fn derive_deals(rows: &[Row], owner_id: Option<&str>) -> Vec<Row> {
    let base = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    rows.iter()
        .enumerate()
        .map(|(idx, row)| {
            let mut stamped = row.clone();
            if stamped.id.is_none() {
                stamped.id = Some(format!("d_{base}_{idx}"));
            }
            if let Some(owner) = owner_id {
                stamped.owner = OwnerRefs::single(owner);
            }
            stamped
        })
        .collect()
}

/// The first of `columns` holding a value in any row, with the contacts it
/// names. A master deals sheet lists its people in exactly one such column.
pub fn contacts_from_column(
    rows: &[Row],
    columns: &[&str],
    owner_id: Option<&str>,
) -> Option<(String, Vec<Row>)> {
    let column = columns
        .iter()
        .find(|column| rows.iter().any(|row| !row.text(column).is_empty()))?;
    Some((column.to_string(), contacts_from_columns(rows, &[column], owner_id)))
}

/// What to send to the contacts collection for a derived set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactSyncPlan {
    pub clear_existing: bool,
    pub submit: Vec<Row>,
}

/// A full replace with nothing to submit clears nothing.
pub fn plan_contact_sync(existing: &[Row], derived: Vec<Row>, mode: DerivationMode) -> ContactSyncPlan {
    match mode {
        DerivationMode::FullReplace => ContactSyncPlan {
            clear_existing: !derived.is_empty(),
            submit: derived,
        },
        DerivationMode::AppendUnique => {
            let mut known = existing
                .iter()
                .map(contact_key)
                .collect::<HashSet<Fingerprint>>();
            let submit = derived
                .into_iter()
                .filter(|row| known.insert(contact_key(row)))
                .collect();
            ContactSyncPlan {
                clear_existing: false,
                submit,
            }
        }
    }
}

/// Contacts compare case-insensitively on the trimmed name.
fn contact_key(row: &Row) -> Fingerprint {
    let mut normalized = Row::new();
    normalized.fields.insert(
        CONTACT_FIELD.to_string(),
        row.text(CONTACT_FIELD).to_lowercase(),
    );
    fingerprint(&normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deal(source: &str) -> Row {
        Row::from_pairs([("Company", "Acme"), ("Source Name", source)])
    }

    #[test]
    fn splits_on_every_delimiter() {
        assert_eq!(
            split_contacts("Alice, Bob; Carol / Dan and Eve и Фёдор"),
            ["Alice", "Bob", "Carol", "Dan", "Eve", "Фёдор"]
        );
        assert_eq!(split_contacts("Alexander Andersen"), ["Alexander Andersen"]);
        assert!(split_contacts(" , ; ").is_empty());
    }

    #[test]
    fn derives_unique_contacts_regardless_of_order() {
        for rows in [vec![deal("Alice, Bob"), deal("Bob")], vec![deal("Bob"), deal("Alice, Bob")]] {
            let contacts = derive_contacts(&rows, Some("u_1"));
            let mut names = contacts
                .iter()
                .map(|c| c.get(CONTACT_FIELD).unwrap_or_default().to_string())
                .collect::<Vec<_>>();
            names.sort();
            assert_eq!(names, ["Alice", "Bob"]);
            assert!(contacts.iter().all(|c| c.owner.primary() == Some("u_1")));
            assert!(contacts.iter().all(|c| c.id.as_deref().is_some_and(|id| id.starts_with("c_"))));
        }
    }

    #[test]
    fn dedup_is_case_insensitive_but_keeps_first_casing() {
        let contacts = derive_contacts(&[deal("jane ROE"), deal("Jane Roe")], None);
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].get(CONTACT_FIELD), Some("jane ROE"));
        assert!(contacts[0].owner.is_empty());
    }

    #[test]
    fn rows_without_contact_column_are_skipped() {
        let rows = vec![Row::from_pairs([("Company", "Acme")])];
        assert!(derive_contacts(&rows, None).is_empty());
    }

    #[test]
    fn derive_deals_keeps_ids_and_stamps_owner() {
        let rows = vec![Row::from_pairs([("id", "keep"), ("contact", "A")]), Row::from_pairs([("contact", "B")])];
        let deals = derive_deals(&rows, Some("u_9"));
        assert_eq!(deals[0].id.as_deref(), Some("keep"));
        assert!(deals[1].id.as_deref().is_some_and(|id| id.starts_with("d_") && id.ends_with("_1")));
        assert!(deals.iter().all(|d| d.owner.primary() == Some("u_9")));
        assert_eq!(deals[1].get("contact"), Some("B"));
    }

    #[test]
    fn column_scan_prefers_first_populated_candidate() {
        let rows = vec![
            Row::from_pairs([("Investor", ""), ("Source Name", "Jane Roe")]),
            Row::from_pairs([("Investor", ""), ("Source Name", "jane roe; Max")]),
        ];
        let (column, contacts) =
            contacts_from_column(&rows, &["Investor", "Source Name"], None).unwrap();
        assert_eq!(column, "Source Name");
        let names = contacts
            .iter()
            .map(|c| c.text(CONTACT_FIELD))
            .collect::<Vec<_>>();
        assert_eq!(names, ["Jane Roe", "Max"]);
        assert!(contacts_from_column(&rows, &["Advisor"], None).is_none());
    }

    #[test]
    fn every_listed_column_contributes() {
        let rows = vec![Row::from_pairs([
            ("Advisor", "Ann"),
            ("Contact persons", "Ben / ann"),
            ("Company", "Acme"),
        ])];
        let contacts = contacts_from_columns(&rows, &["Advisor", "Contact persons", "Missing"], Some("u_1"));
        let names = contacts.iter().map(|c| c.text(CONTACT_FIELD)).collect::<Vec<_>>();
        assert_eq!(names, ["Ann", "Ben"]);
    }

    #[test]
    fn append_unique_skips_existing_contacts() {
        let existing = vec![contact_row("Alice", None)];
        let derived = vec![contact_row("alice ", None), contact_row("Bob", None)];
        let plan = plan_contact_sync(&existing, derived, DerivationMode::AppendUnique);
        assert!(!plan.clear_existing);
        assert_eq!(plan.submit.len(), 1);
        assert_eq!(plan.submit[0].get(CONTACT_FIELD), Some("Bob"));

        let plan = plan_contact_sync(&existing, vec![contact_row("Alice", None)], DerivationMode::FullReplace);
        assert!(plan.clear_existing);
        assert_eq!(plan.submit.len(), 1);
    }

    #[test]
    fn empty_full_replace_keeps_existing_contacts() {
        let existing = vec![contact_row("Alice", None)];
        let plan = plan_contact_sync(&existing, Vec::new(), DerivationMode::FullReplace);
        assert!(!plan.clear_existing);
        assert!(plan.submit.is_empty());
    }
}
