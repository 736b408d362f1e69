//! Column projection, faceted filtering, and sorting over loaded rows.
//!
//! These are the pure operations behind `list`: which columns to show and in
//! which order, the distinct values a column offers as filter options, and a
//! locale-aware single-key sort that never reorders equal rows. The deals
//! summary counts rows per alias-resolved field.

use std::{
    cmp::Ordering,
    collections::{BTreeSet, HashSet},
    str::FromStr,
};

use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;

use crate::{
    derive::CONTACT_FIELD,
    headers::HeaderAliasTable,
    row::{Row, is_internal_key},
};

/// Union of the domain keys across `rows`.
///
/// Observed preferred keys come first in `preferred` order; the remainder is
/// sorted case-insensitively with byte order breaking ties.
pub fn project_columns<S: AsRef<str>>(rows: &[Row], preferred: &[S]) -> Vec<String> {
    let observed = rows
        .iter()
        .flat_map(|row| row.fields.keys())
        .filter(|key| !is_internal_key(key))
        .cloned()
        .collect::<BTreeSet<String>>();

    let mut columns = Vec::with_capacity(observed.len());
    let mut placed = HashSet::new();
    for name in preferred {
        let name = name.as_ref();
        if observed.contains(name) && placed.insert(name.to_string()) {
            columns.push(name.to_string());
        }
    }

    let mut rest = observed
        .into_iter()
        .filter(|key| !placed.contains(key))
        .collect::<Vec<_>>();
    rest.sort_by(|a, b| {
        a.to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| a.cmp(b))
    });
    columns.extend(rest);
    columns
}

/// Trimmed, non-empty values of `column`, deduplicated and sorted with
/// [`locale_cmp`].
pub fn distinct_values(rows: &[Row], column: &str) -> Vec<String> {
    rows.iter()
        .map(|row| row.text(column))
        .filter(|value| !value.is_empty())
        .unique()
        .sorted_by(|a, b| locale_cmp(a, b).then_with(|| a.cmp(b)))
        .map(str::to_string)
        .collect()
}

/// Selected filter values per column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacetSelection {
    selections: IndexMap<String, BTreeSet<String>>,
}

impl FacetSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `value` (trimmed) to the selection for `column`.
    pub fn select(&mut self, column: impl Into<String>, value: &str) {
        self.selections
            .entry(column.into())
            .or_default()
            .insert(value.trim().to_string());
    }

    /// Registers `column` with no selected values; it constrains nothing.
    pub fn clear(&mut self, column: impl Into<String>) {
        self.selections.insert(column.into(), BTreeSet::new());
    }

    pub fn is_empty(&self) -> bool {
        self.selections.values().all(BTreeSet::is_empty)
    }

    /// Parses repeated `column=value` arguments.
    pub fn parse<S: AsRef<str>>(specs: &[S]) -> Result<Self, String> {
        let mut selection = Self::new();
        for spec in specs {
            let spec = spec.as_ref();
            let (column, value) = spec
                .split_once('=')
                .ok_or_else(|| format!("Filter '{spec}' must be written as column=value"))?;
            let column = column.trim();
            if column.is_empty() {
                return Err(format!("Filter '{spec}' is missing a column name"));
            }
            selection.select(column, value);
        }
        Ok(selection)
    }

    fn matches(&self, row: &Row) -> bool {
        self.selections
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .all(|(column, values)| values.contains(row.text(column)))
    }
}

/// Rows matching every non-empty column selection, in their original order.
pub fn apply_faceted_filter(rows: &[Row], selection: &FacetSelection) -> Vec<Row> {
    rows.iter()
        .filter(|row| selection.matches(row))
        .cloned()
        .collect()
}

/// Rows where any field value contains `query`, ignoring case.
pub fn search_rows(rows: &[Row], query: &str) -> Vec<Row> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return rows.to_vec();
    }
    rows.iter()
        .filter(|row| {
            row.fields
                .values()
                .any(|value| value.to_lowercase().contains(&needle))
        })
        .cloned()
        .collect()
}

/// Bucket for rows with no value in the counted field.
pub const UNSET_BUCKET: &str = "—";

/// Trimmed value under the first alias of `canonical` that `row` fills.
pub fn pick_first<'a>(row: &'a Row, table: &HeaderAliasTable, canonical: &str) -> Option<&'a str> {
    table
        .aliases(canonical)
        .iter()
        .map(|alias| row.text(alias))
        .find(|value| !value.is_empty())
}

/// Row counts per value of `canonical`, in first-seen order.
pub fn count_by(rows: &[Row], table: &HeaderAliasTable, canonical: &str) -> Vec<(String, usize)> {
    let mut counts = IndexMap::<String, usize>::new();
    for row in rows {
        let key = pick_first(row, table, canonical).unwrap_or(UNSET_BUCKET);
        *counts.entry(key.to_string()).or_default() += 1;
    }
    counts.into_iter().collect()
}

/// Headline numbers and per-field breakdowns of a deals collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DealsSummary {
    pub deals: usize,
    pub contacts: usize,
    /// Distinct responsible people, the unset bucket excluded.
    pub responsibles: usize,
    pub by_responsible: Vec<(String, usize)>,
    pub by_sector: Vec<(String, usize)>,
    pub by_status: Vec<(String, usize)>,
    pub by_type: Vec<(String, usize)>,
}

pub fn summarize_deals(deals: &[Row], contacts: &[Row], table: &HeaderAliasTable) -> DealsSummary {
    let by_responsible = count_by(deals, table, "responsible");
    let responsibles = by_responsible
        .iter()
        .filter(|(name, _)| name != UNSET_BUCKET)
        .count();
    DealsSummary {
        deals: deals.len(),
        contacts: unique_contacts(contacts, deals, table),
        responsibles,
        by_sector: count_by(deals, table, "sector"),
        by_status: count_by(deals, table, "status"),
        by_type: count_by(deals, table, "type"),
        by_responsible,
    }
}

/// Distinct people named by the contacts collection, or by the deals when
/// the contacts collection names nobody.
pub fn unique_contacts(contacts: &[Row], deals: &[Row], table: &HeaderAliasTable) -> usize {
    match people_named(contacts, Some(CONTACT_FIELD), table) {
        0 => people_named(deals, None, table),
        count => count,
    }
}

fn people_named(rows: &[Row], own_field: Option<&str>, table: &HeaderAliasTable) -> usize {
    let mut names = HashSet::new();
    for row in rows {
        let candidates = [
            own_field.map(|field| row.text(field)),
            pick_first(row, table, "contactPersons"),
            Some(row.text("Contacted person")),
        ];
        names.extend(candidates.into_iter().flatten().filter(|v| !v.is_empty()));
    }
    names.len()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            other => Err(format!("Unknown sort direction '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDirective {
    pub column: String,
    pub direction: SortDirection,
}

impl SortDirective {
    /// Parses `column` or `column:asc|desc`.
    pub fn parse(spec: &str) -> Result<Self, String> {
        // A suffix that is not a direction belongs to the column name.
        let (column, direction) = match spec.rsplit_once(':') {
            Some((column, suffix)) => match suffix.parse::<SortDirection>() {
                Ok(direction) if !suffix.trim().is_empty() => (column, direction),
                _ => (spec, SortDirection::Ascending),
            },
            None => (spec, SortDirection::Ascending),
        };
        let column = column.trim();
        if column.is_empty() {
            return Err("Sort column cannot be empty".to_string());
        }
        Ok(Self {
            column: column.to_string(),
            direction,
        })
    }
}

/// Stable sort on the trimmed value of `column`.
pub fn sort_rows(rows: &mut [Row], column: &str, direction: SortDirection) {
    rows.sort_by(|a, b| {
        let ordering = locale_cmp(a.text(column), b.text(column));
        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
}

/// Natural, case-insensitive comparison.
///
/// Digit runs compare by numeric value ("item 2" < "item 10"); other
/// characters compare by their lowercase form, with whitespace and
/// punctuation ordered before digits and digits before letters. Strings that
/// differ only in case compare equal.
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();
    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let l_run = take_digits(&mut left);
                let r_run = take_digits(&mut right);
                let ordering = compare_digit_runs(&l_run, &r_run);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(l), Some(r)) => {
                left.next();
                right.next();
                let ordering = char_class(l)
                    .cmp(&char_class(r))
                    .then_with(|| l.to_lowercase().cmp(r.to_lowercase()));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(ch) = chars.next_if(char::is_ascii_digit) {
        run.push(ch);
    }
    run
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn char_class(ch: char) -> u8 {
    if ch.is_whitespace() || ch.is_ascii_punctuation() {
        0
    } else if ch.is_numeric() {
        1
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::DEFAULT_ALIASES;

    fn rows() -> Vec<Row> {
        vec![
            Row::from_pairs([("id", "1"), ("status", "Won"), ("sector", "Retail")]),
            Row::from_pairs([("id", "2"), ("status", "Lost"), ("sector", "Retail")]),
            Row::from_pairs([("id", "3"), ("status", " Won "), ("sector", "Energy")]),
        ]
    }

    #[test]
    fn projection_puts_preferred_first_then_alphabetical() {
        let rows = vec![
            Row::from_pairs([("zeta", "1"), ("Company", "Acme"), ("owner_id", "a@x.com")]),
            Row::from_pairs([("alpha", "2"), ("Status", "Won"), ("Beta", "3")]),
        ];
        let columns = project_columns(&rows, &["Company", "Missing", "Status"]);
        assert_eq!(columns, ["Company", "Status", "alpha", "Beta", "zeta"]);
    }

    #[test]
    fn distinct_values_are_trimmed_unique_and_sorted() {
        let mut rows = rows();
        rows.push(Row::from_pairs([("status", "")]));
        assert_eq!(distinct_values(&rows, "status"), ["Lost", "Won"]);
        assert!(distinct_values(&rows, "missing").is_empty());
    }

    #[test]
    fn empty_selection_imposes_no_constraint() {
        let mut selection = FacetSelection::new();
        selection.select("status", "Won");
        selection.clear("sector");
        let filtered = apply_faceted_filter(&rows(), &selection);
        let ids = filtered.iter().filter_map(|r| r.id.as_deref()).collect::<Vec<_>>();
        assert_eq!(ids, ["1", "3"]);
    }

    #[test]
    fn selections_or_within_and_across_columns() {
        let selection = FacetSelection::parse(&["status=Won", "status=Lost", "sector=Retail"]).unwrap();
        let filtered = apply_faceted_filter(&rows(), &selection);
        let ids = filtered.iter().filter_map(|r| r.id.as_deref()).collect::<Vec<_>>();
        assert_eq!(ids, ["1", "2"]);
        assert!(FacetSelection::parse(&["status"]).is_err());
    }

    #[test]
    fn locale_comparison_is_natural_and_case_insensitive() {
        assert_eq!(locale_cmp("item 2", "item 10"), Ordering::Less);
        assert_eq!(locale_cmp("acme", "ACME"), Ordering::Equal);
        assert_eq!(locale_cmp("apple", "Banana"), Ordering::Less);
        assert_eq!(locale_cmp("007", "7"), Ordering::Equal);
        assert_eq!(locale_cmp("9 lives", "alpha"), Ordering::Less);
    }

    #[test]
    fn sort_keeps_equal_rows_in_place() {
        let mut rows = rows();
        sort_rows(&mut rows, "sector", SortDirection::Ascending);
        let ids = rows.iter().filter_map(|r| r.id.as_deref()).collect::<Vec<_>>();
        assert_eq!(ids, ["3", "1", "2"]);

        sort_rows(&mut rows, "sector", SortDirection::Descending);
        let ids = rows.iter().filter_map(|r| r.id.as_deref()).collect::<Vec<_>>();
        assert_eq!(ids, ["1", "2", "3"]);
    }

    #[test]
    fn sort_directive_parses_optional_direction() {
        let directive = SortDirective::parse("Size, RUB mn:desc").unwrap();
        assert_eq!(directive.column, "Size, RUB mn");
        assert_eq!(directive.direction, SortDirection::Descending);
        assert_eq!(SortDirective::parse("Company").unwrap().direction, SortDirection::Ascending);
        assert_eq!(SortDirective::parse("Time:zone").unwrap().column, "Time:zone");
        assert!(SortDirective::parse(":asc").is_err());
    }

    #[test]
    fn search_matches_any_field() {
        let found = search_rows(&rows(), "ENERGY");
        assert_eq!(found.len(), 1);
        assert_eq!(search_rows(&rows(), "  ").len(), 3);
    }

    fn deal(pairs: &[(&str, &str)]) -> Row {
        Row::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn counts_follow_the_first_filled_alias() {
        let deals = vec![
            deal(&[("Seniot", "Ivanov"), ("Junior team", "Petrov"), ("Статус", "Won")]),
            deal(&[("Seniot", ""), ("Junior team", "Petrov"), ("Status", "Won")]),
            deal(&[("Company", "Acme")]),
        ];
        let table = DEFAULT_ALIASES;
        assert_eq!(
            count_by(&deals, &table, "responsible"),
            [("Ivanov".to_string(), 1), ("Petrov".to_string(), 1), (UNSET_BUCKET.to_string(), 1)]
        );
        assert_eq!(
            count_by(&deals, &table, "status"),
            [("Won".to_string(), 2), (UNSET_BUCKET.to_string(), 1)]
        );
    }

    #[test]
    fn summary_counts_deals_people_and_contacts() {
        let deals = vec![
            deal(&[("Responsible", "Ivanov"), ("Sector", "Retail"), ("Contact persons", "Ann")]),
            deal(&[("Responsible", "Ivanov"), ("Sector", "Energy"), ("Contacted person", "Ben")]),
            deal(&[("Sector", "Retail")]),
        ];
        let contacts = vec![deal(&[("contact", "Carol")]), deal(&[("contact", " Carol ")])];

        let summary = summarize_deals(&deals, &contacts, &DEFAULT_ALIASES);
        assert_eq!(summary.deals, 3);
        assert_eq!(summary.contacts, 1);
        assert_eq!(summary.responsibles, 1);
        assert_eq!(summary.by_sector, [("Retail".to_string(), 2), ("Energy".to_string(), 1)]);

        // No stored contacts: fall back to the people the deals name.
        assert_eq!(summarize_deals(&deals, &[], &DEFAULT_ALIASES).contacts, 2);
    }
}
