//! Header resolution against alias tables.
//!
//! Uploaded sheets spell the same column differently from source to source
//! ("Source Name", "Contact persons", "Contacted person"). Resolution is two
//! phase: an exact case-insensitive match in candidate priority order, then a
//! substring match in the same order.

use crate::{backend::SheetKind, error::ValidationError};

/// Contact-like columns in priority order.
pub const CONTACT_HEADER_CANDIDATES: [&str; 5] = [
    "Source Name",
    "Contact persons",
    "Contacted person",
    "Contacts",
    "Contact",
];

/// Columns scanned for contacts when a deals sheet is imported, in priority order.
pub const DEAL_CONTACT_COLUMNS: [&str; 4] = [
    "Investor",
    "Source Name",
    "Contacted person",
    "Contact persons",
];

pub const PIPELINE_HEADERS: [&str; 12] = [
    "Company",
    "Date",
    "Sector",
    "Seniot",
    "Junior team",
    "Source",
    "Source Name",
    "Type",
    "Size, RUB mn",
    "Status",
    "Next connection",
    "Comments",
];

pub const COMPANIES_HEADERS: [&str; 6] = [
    "Company",
    "Sector",
    "Contacted person",
    "Methods to reach out",
    "Status",
    "Comments",
];

pub const ADVISORS_HEADERS: [&str; 7] = [
    "Advisor",
    "Contact persons",
    "Type",
    "Comment",
    "Responsible",
    "Date of the last meeting of the responsible person",
    "Months since the last meeting",
];

pub const INVESTORS_HEADERS: [&str; 9] = [
    "Investor",
    "Connection",
    "Target ticket",
    "Target sectors",
    "Relevant?",
    "Comments",
    "Discussed fund",
    "Discussed A3",
    "Discussed Lab Vkusa",
];

pub const USER_IMPORT_HEADERS: [&str; 2] = ["Email", "Password"];

/// Canonical field name to accepted header spellings, priority ordered.
#[derive(Debug, Clone, Copy)]
pub struct HeaderAliasTable {
    entries: &'static [(&'static str, &'static [&'static str])],
}

pub const DEFAULT_ALIASES: HeaderAliasTable = HeaderAliasTable {
    entries: &[
        (
            "contactPersons",
            &[
                "Contact persons",
                "Contact person",
                "Контакты",
                "Контакт",
            ],
        ),
        ("contactedPerson", &["Contacted person", "Связанный контакт"]),
        ("sourceName", &["Source Name", "Источник"]),
        ("status", &["Status", "Статус"]),
        ("type", &["Type", "Тип"]),
        ("sector", &["Sector", "Сектор"]),
        (
            "responsible",
            &[
                "Responsible",
                "Seniot",
                "Senior",
                "Owner",
                "Ответственный",
                "Junior team",
                "Junior",
                "Менеджер",
            ],
        ),
        ("comments", &["Comments", "Comment", "Notes"]),
    ],
};

impl HeaderAliasTable {
    pub const fn new(entries: &'static [(&'static str, &'static [&'static str])]) -> Self {
        Self { entries }
    }

    pub fn aliases(&self, canonical: &str) -> &'static [&'static str] {
        self.entries
            .iter()
            .find(|(name, _)| *name == canonical)
            .map(|(_, aliases)| *aliases)
            .unwrap_or(&[])
    }

    /// Resolves a canonical field against a concrete header list.
    pub fn resolve<S: AsRef<str>>(&self, headers: &[S], canonical: &str) -> Option<String> {
        resolve_header(headers, self.aliases(canonical))
    }
}

/// Returns the original spelling of the header matched by the first candidate,
/// exact matches taking precedence over substring matches.
pub fn resolve_header<S, C>(headers: &[S], candidates: &[C]) -> Option<String>
where
    S: AsRef<str>,
    C: AsRef<str>,
{
    let lowered = headers
        .iter()
        .map(|h| h.as_ref().trim().to_lowercase())
        .collect::<Vec<_>>();
    let candidates = candidates
        .iter()
        .map(|c| c.as_ref().trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>();

    for candidate in &candidates {
        if let Some(idx) = lowered.iter().position(|h| h == candidate) {
            return Some(headers[idx].as_ref().to_string());
        }
    }
    for candidate in &candidates {
        if let Some(idx) = lowered.iter().position(|h| h.contains(candidate.as_str())) {
            return Some(headers[idx].as_ref().to_string());
        }
    }
    None
}

/// Required headers that do not appear (case-insensitively) among `headers`.
pub fn missing_required<S: AsRef<str>>(headers: &[S], required: &[&str]) -> Vec<String> {
    let present = headers
        .iter()
        .map(|h| h.as_ref().trim().to_lowercase())
        .collect::<Vec<_>>();
    required
        .iter()
        .filter(|name| !present.contains(&name.trim().to_lowercase()))
        .map(|name| name.to_string())
        .collect()
}

pub fn required_headers(kind: SheetKind) -> &'static [&'static str] {
    match kind {
        SheetKind::Pipeline => &PIPELINE_HEADERS,
        SheetKind::Companies => &COMPANIES_HEADERS,
        SheetKind::Advisors => &ADVISORS_HEADERS,
        SheetKind::Investors => &INVESTORS_HEADERS,
        SheetKind::Deals => &[],
    }
}

/// Recognises one of the known sheet layouts from its headers.
pub fn infer_sheet_kind<S: AsRef<str>>(headers: &[S]) -> Result<SheetKind, ValidationError> {
    let lowered = headers
        .iter()
        .map(|h| h.as_ref().trim().to_lowercase())
        .collect::<Vec<_>>();
    let has = |name: &str| lowered.iter().any(|h| h == name);
    if has("advisor") {
        Ok(SheetKind::Advisors)
    } else if has("investor") {
        Ok(SheetKind::Investors)
    } else if has("methods to reach out") {
        Ok(SheetKind::Companies)
    } else if has("source name") {
        Ok(SheetKind::Pipeline)
    } else {
        Err(ValidationError::WrongTabContext)
    }
}

/// Preferred column order used when projecting a sheet of the given kind.
pub fn preferred_columns(kind: SheetKind) -> &'static [&'static str] {
    match kind {
        SheetKind::Deals => &PIPELINE_HEADERS,
        other => required_headers(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earlier_candidate_wins_when_both_present() {
        let headers = ["Source Name", "Contacted person"];
        let candidates = ["Investor", "Source Name", "Contacted person"];
        assert_eq!(
            resolve_header(&headers, &candidates).as_deref(),
            Some("Source Name")
        );
    }

    #[test]
    fn exact_match_beats_earlier_substring_match() {
        let headers = ["Main contact persons", "Contact"];
        let candidates = ["Contact persons", "Contact"];
        // "Contact" matches exactly, which outranks the substring hit for the
        // higher-priority candidate.
        assert_eq!(resolve_header(&headers, &candidates).as_deref(), Some("Contact"));
    }

    #[test]
    fn substring_match_returns_original_spelling() {
        let headers = ["Company", "  Primary SOURCE NAME "];
        assert_eq!(
            resolve_header(&headers, &CONTACT_HEADER_CANDIDATES).as_deref(),
            Some("  Primary SOURCE NAME ")
        );
        assert_eq!(resolve_header(&headers, &["Advisor"]), None);
    }

    #[test]
    fn alias_table_resolves_canonical_fields() {
        let headers = ["Company", "Статус", "Seniot"];
        assert_eq!(
            DEFAULT_ALIASES.resolve(&headers, "status").as_deref(),
            Some("Статус")
        );
        assert_eq!(
            DEFAULT_ALIASES.resolve(&headers, "responsible").as_deref(),
            Some("Seniot")
        );
        assert_eq!(DEFAULT_ALIASES.resolve(&headers, "unknown"), None);
    }

    #[test]
    fn missing_required_is_case_insensitive() {
        let headers = ["email", " PASSWORD "];
        assert!(missing_required(&headers, &USER_IMPORT_HEADERS).is_empty());
        let headers = ["Name", "Price"];
        assert_eq!(missing_required(&headers, &USER_IMPORT_HEADERS), ["Email", "Password"]);
    }

    #[test]
    fn infers_known_layouts() {
        assert_eq!(
            infer_sheet_kind(&["Advisor", "Type"]).unwrap(),
            SheetKind::Advisors
        );
        assert_eq!(
            infer_sheet_kind(&PIPELINE_HEADERS).unwrap(),
            SheetKind::Pipeline
        );
        assert_eq!(
            infer_sheet_kind(&["Name", "Price"]).unwrap_err(),
            ValidationError::WrongTabContext
        );
    }
}
