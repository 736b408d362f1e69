//! Synonym column merging.
//!
//! Sheets from different sources carry the same logical field under different
//! names ("Comments", "Comment", "Notes"). [`merge_columns`] folds each synonym
//! group into its canonical name for display and records which original
//! column supplied the value, so [`write_back`] can put an edited value back
//! where the source file had it.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::{
    headers::{DEFAULT_ALIASES, HeaderAliasTable},
    row::Row,
};

/// Canonical field name to synonym columns in priority order.
pub type SynonymGroups = IndexMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRow {
    pub row: Row,
    /// Column each canonical value came from; `None` when no column had one.
    pub provenance: BTreeMap<String, Option<String>>,
}

/// Builds synonym groups from an alias table, keyed by the first alias.
pub fn groups_from_aliases(table: &HeaderAliasTable, canonical: &[&str]) -> SynonymGroups {
    canonical
        .iter()
        .filter_map(|name| {
            let aliases = table.aliases(name);
            let display = aliases.first()?;
            Some((
                display.to_string(),
                aliases.iter().map(|a| a.to_string()).collect(),
            ))
        })
        .collect()
}

/// Alias groups folded into one column when rows are shown or edited.
///
/// `responsible` is not among them: a pipeline sheet carries "Seniot" and
/// "Junior team" as two distinct columns.
pub const DISPLAY_MERGED: [&str; 7] = [
    "contactPersons",
    "contactedPerson",
    "sourceName",
    "status",
    "type",
    "sector",
    "comments",
];

pub fn display_groups() -> SynonymGroups {
    groups_from_aliases(&DEFAULT_ALIASES, &DISPLAY_MERGED)
}

/// The column a merged view shows `column` under.
pub fn display_name<'a>(groups: &'a SynonymGroups, column: &'a str) -> &'a str {
    groups
        .iter()
        .find(|(_, synonyms)| synonyms.iter().any(|s| s == column))
        .map(|(canonical, _)| canonical.as_str())
        .unwrap_or(column)
}

pub fn merge_rows(rows: &[Row], groups: &SynonymGroups) -> Vec<Row> {
    rows.iter().map(|row| merge_columns(row, groups).row).collect()
}

pub fn merge_columns(row: &Row, groups: &SynonymGroups) -> MergedRow {
    let mut merged = row.clone();
    let mut provenance = BTreeMap::new();

    for (canonical, synonyms) in groups {
        let source = synonyms
            .iter()
            .find(|column| row.get(column).is_some_and(|v| !v.trim().is_empty()))
            .cloned();

        match &source {
            Some(column) => {
                let value = row.get(column).unwrap_or_default().to_string();
                for synonym in synonyms.iter().filter(|s| *s != canonical) {
                    merged.fields.shift_remove(synonym);
                }
                merged.fields.insert(canonical.clone(), value);
                provenance.insert(canonical.clone(), Some(column.clone()));
            }
            None => {
                let preserved = row
                    .get(canonical)
                    .filter(|value| !value.trim().is_empty())
                    .map(str::to_string);
                for synonym in synonyms.iter().filter(|s| *s != canonical) {
                    merged.fields.shift_remove(synonym);
                }
                match preserved {
                    Some(value) => {
                        merged.fields.insert(canonical.clone(), value);
                        provenance.insert(canonical.clone(), Some(canonical.clone()));
                    }
                    None => {
                        provenance.insert(canonical.clone(), None);
                    }
                }
            }
        }
    }

    MergedRow {
        row: merged,
        provenance,
    }
}

/// Produces the row to save after an edit of a merged row.
///
/// Canonical fields are written to the column recorded in `provenance`; the
/// rest of `edited` is copied verbatim over `original`. Metadata always comes
/// from `original`.
pub fn write_back(
    original: &Row,
    edited: &Row,
    provenance: &BTreeMap<String, Option<String>>,
) -> Row {
    let mut saved = original.clone();
    for (key, value) in &edited.fields {
        let target = match provenance.get(key) {
            Some(Some(column)) => column.clone(),
            _ => key.clone(),
        };
        saved.fields.insert(target, value.clone());
    }
    saved
}
