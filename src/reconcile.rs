//! Import reconciliation.
//!
//! Turns a parsed upload into backend writes:
//!
//! 1. reject unusable files, unknown layouts, and missing required headers
//!    before any backend call;
//! 2. drop empty rows;
//! 3. store the rows under the resource's policy (append-unique by
//!    fingerprint, or clear-then-import);
//! 4. refresh derived collections (contacts from deals/pipeline, deals
//!    mirrored from contacts), logging but not propagating failures there;
//! 5. publish the outcome on the event bus.
//!
//! Nothing here is transactional. If a bulk submit fails, whatever the server
//! already stored stays stored and the server's message is returned as is.

use std::path::Path;

use log::{debug, info, warn};
use serde_json::{Map, Value as JsonValue};

use crate::{
    backend::{CrmBackend, NewUser, ResourceKind, Role, SheetKind, load_rows, row_payload},
    derive::{self, CONTACT_FIELD, DerivationMode},
    error::{ApiError, SyncError, ValidationError},
    events::{EventBus, SyncEvent},
    fingerprint::{fingerprint_set, novel_rows},
    headers::{
        CONTACT_HEADER_CANDIDATES, DEAL_CONTACT_COLUMNS, USER_IMPORT_HEADERS, infer_sheet_kind,
        missing_required, required_headers, resolve_header,
    },
    row::Row,
    sheet::{ParsedSheet, SheetOptions, read_sheet},
};

/// Columns a contacts upload may name people in.
pub const CONTACT_IMPORT_COLUMNS: [&str; 5] = [
    CONTACT_FIELD,
    "Advisor",
    "Source Name",
    "Contacted person",
    "Contact persons",
];

/// How uploaded rows are combined with the stored collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    AppendUnique,
    FullReplace,
}

impl ImportMode {
    pub fn default_for(resource: ResourceKind) -> Self {
        match resource {
            ResourceKind::Deals => ImportMode::FullReplace,
            _ => ImportMode::AppendUnique,
        }
    }

    fn derivation(self) -> DerivationMode {
        match self {
            ImportMode::AppendUnique => DerivationMode::AppendUnique,
            ImportMode::FullReplace => DerivationMode::FullReplace,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportRequest {
    /// Target collection; inferred from the headers when `None`.
    pub resource: Option<ResourceKind>,
    /// Overrides the resource's default [`ImportMode`].
    pub mode: Option<ImportMode>,
    /// Refresh derived collections after the primary write.
    pub derive: bool,
    /// For contacts uploads: also replace deals with the uploaded rows.
    pub mirror_deals: bool,
    pub owner_id: Option<String>,
}

impl Default for ImportRequest {
    fn default() -> Self {
        Self {
            resource: None,
            mode: None,
            derive: true,
            mirror_deals: false,
            owner_id: None,
        }
    }
}

impl ImportRequest {
    pub fn for_resource(resource: ResourceKind) -> Self {
        Self {
            resource: Some(resource),
            ..Self::default()
        }
    }
}

/// A row the admin user import could not register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    /// Position of the row among the non-blank rows, the header being line 1.
    pub line: usize,
    pub email: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub resource: ResourceKind,
    pub added: usize,
    /// Uploaded rows already present in the collection.
    pub duplicates: usize,
    pub dropped_empty: usize,
    /// Contacts added by derivation; `None` unless derivation ran on a
    /// non-empty set and succeeded.
    pub derived_contacts: Option<usize>,
    /// Deals written by mirroring a contacts upload.
    pub mirrored_deals: Option<usize>,
    pub skipped: Vec<SkippedRow>,
}

impl ImportOutcome {
    fn new(resource: ResourceKind) -> Self {
        Self {
            resource,
            added: 0,
            duplicates: 0,
            dropped_empty: 0,
            derived_contacts: None,
            mirrored_deals: None,
            skipped: Vec::new(),
        }
    }

    pub fn message(&self) -> String {
        format!("Success {} rows added", self.added)
    }
}

pub struct Reconciler<'a, B: CrmBackend + ?Sized> {
    backend: &'a B,
    events: &'a EventBus,
}

impl<'a, B: CrmBackend + ?Sized> Reconciler<'a, B> {
    pub fn new(backend: &'a B, events: &'a EventBus) -> Self {
        Self { backend, events }
    }

    pub fn import_file(
        &self,
        path: &Path,
        options: &SheetOptions,
        request: &ImportRequest,
    ) -> Result<ImportOutcome, SyncError> {
        match read_sheet(path, options) {
            Ok(sheet) => self.import_sheet(sheet, request),
            Err(err) => {
                let err = SyncError::Sheet(format!("{err:#}"));
                self.publish_failure(request.resource, &err);
                Err(err)
            }
        }
    }

    pub fn import_sheet(
        &self,
        sheet: ParsedSheet,
        request: &ImportRequest,
    ) -> Result<ImportOutcome, SyncError> {
        let mut resource = request.resource;
        let result = self.reconcile(sheet, request, &mut resource);
        match &result {
            Ok(outcome) => {
                info!("{}: {}", outcome.resource, outcome.message());
                self.events.publish(SyncEvent::Imported {
                    resource: outcome.resource,
                    added: outcome.added,
                });
            }
            Err(err) => self.publish_failure(resource, err),
        }
        result
    }

    fn publish_failure(&self, resource: Option<ResourceKind>, err: &SyncError) {
        warn!("Import failed: {err}");
        self.events.publish(SyncEvent::ImportFailed {
            resource,
            message: err.to_string(),
        });
    }

    fn reconcile(
        &self,
        mut sheet: ParsedSheet,
        request: &ImportRequest,
        resolved: &mut Option<ResourceKind>,
    ) -> Result<ImportOutcome, SyncError> {
        if sheet.is_unusable() {
            return Err(ValidationError::EmptyOrUnrecognized.into());
        }
        let headers = sheet
            .named_headers()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let resource = match request.resource {
            Some(resource) => resource,
            None => infer_sheet_kind(&headers)?.into(),
        };
        *resolved = Some(resource);
        if resource == ResourceKind::Deals {
            // Deals accept any known layout, but only a known one.
            let layout = infer_sheet_kind(&headers)?;
            debug!("deals upload uses the {layout} layout");
        }
        check_required(resource, &headers)?;

        let mut outcome = ImportOutcome::new(resource);
        outcome.dropped_empty = sheet.drop_empty_rows();
        debug!(
            "{resource}: {} candidate row(s), {} empty row(s) dropped",
            sheet.rows.len(),
            outcome.dropped_empty
        );

        match resource {
            ResourceKind::Users => self.import_users(&sheet, &headers, &mut outcome),
            ResourceKind::Contacts => {
                self.import_contacts(&sheet, &headers, request, &mut outcome)?
            }
            other => match other.sheet() {
                Some(kind) => self.import_generic(kind, &sheet.rows, request, &mut outcome)?,
                None => return Err(ValidationError::WrongTabContext.into()),
            },
        }
        Ok(outcome)
    }

    fn import_generic(
        &self,
        kind: SheetKind,
        rows: &[Row],
        request: &ImportRequest,
        outcome: &mut ImportOutcome,
    ) -> Result<(), SyncError> {
        let mode = request
            .mode
            .unwrap_or_else(|| ImportMode::default_for(kind.into()));
        let owner = request.owner_id.as_deref();
        outcome.added = self.store_rows(kind, rows.to_vec(), mode, owner, &mut outcome.duplicates)?;

        if !request.derive {
            return Ok(());
        }
        let derived = match kind {
            SheetKind::Deals => derive::contacts_from_column(rows, &DEAL_CONTACT_COLUMNS, owner)
                .map(|(column, contacts)| {
                    debug!("Deriving contacts from '{column}'");
                    contacts
                }),
            SheetKind::Pipeline => Some(derive::derive_contacts(rows, owner)),
            _ => None,
        };
        // An upload naming nobody leaves the stored contacts alone.
        let derived = derived.filter(|contacts| !contacts.is_empty());
        if let Some(contacts) = derived {
            outcome.derived_contacts =
                self.sync_contacts_quietly(contacts, mode.derivation(), owner);
        }
        Ok(())
    }

    /// Writes `rows` under `mode`; returns how many the server stored.
    fn store_rows(
        &self,
        kind: SheetKind,
        rows: Vec<Row>,
        mode: ImportMode,
        owner: Option<&str>,
        duplicates: &mut usize,
    ) -> Result<usize, ApiError> {
        let submit = match mode {
            ImportMode::FullReplace => {
                self.backend.clear(kind)?;
                rows
            }
            ImportMode::AppendUnique => {
                let existing = self
                    .backend
                    .list(kind)?
                    .iter()
                    .map(|item| item.to_row())
                    .collect::<Vec<_>>();
                let known = fingerprint_set(&existing);
                let total = rows.len();
                let novel = novel_rows(rows, &known);
                *duplicates = total - novel.len();
                debug!(
                    "{kind}: {} existing row(s), {} novel, {} duplicate(s)",
                    existing.len(),
                    novel.len(),
                    *duplicates
                );
                novel
            }
        };
        if submit.is_empty() {
            return Ok(0);
        }
        let payload = submit.iter().map(row_payload).collect::<Vec<_>>();
        let created = self.backend.import(kind, &payload, owner)?;
        if mode == ImportMode::FullReplace {
            self.events.publish(SyncEvent::StoreUpdated {
                resource: kind.into(),
            });
        }
        Ok(created.len())
    }

    fn import_contacts(
        &self,
        sheet: &ParsedSheet,
        headers: &[String],
        request: &ImportRequest,
        outcome: &mut ImportOutcome,
    ) -> Result<(), SyncError> {
        let owner = request.owner_id.as_deref();
        let columns = contact_columns(headers);
        let contacts = derive::contacts_from_columns(&sheet.rows, &columns, owner);
        let mode = request.mode.unwrap_or(ImportMode::AppendUnique);
        let before = contacts.len();
        outcome.added = self.sync_contacts(contacts, mode.derivation(), owner)?;
        outcome.duplicates = before.saturating_sub(outcome.added);

        if request.mirror_deals {
            let deals = derive::derive_deals(&sheet.rows, owner);
            let mut ignored = 0;
            match self.store_rows(SheetKind::Deals, deals, ImportMode::FullReplace, owner, &mut ignored) {
                Ok(count) => outcome.mirrored_deals = Some(count),
                Err(err) => warn!("Mirroring deals failed: {err}"),
            }
        }
        Ok(())
    }

    fn sync_contacts_quietly(
        &self,
        contacts: Vec<Row>,
        mode: DerivationMode,
        owner: Option<&str>,
    ) -> Option<usize> {
        match self.sync_contacts(contacts, mode, owner) {
            Ok(added) => {
                info!("Derived {added} contact(s)");
                Some(added)
            }
            Err(err) => {
                warn!("Deriving contacts failed: {err}");
                None
            }
        }
    }

    fn sync_contacts(
        &self,
        contacts: Vec<Row>,
        mode: DerivationMode,
        owner: Option<&str>,
    ) -> Result<usize, ApiError> {
        let existing = match mode {
            DerivationMode::AppendUnique => load_rows(self.backend, ResourceKind::Contacts)?,
            DerivationMode::FullReplace => Vec::new(),
        };
        let plan = derive::plan_contact_sync(&existing, contacts, mode);
        if plan.clear_existing {
            self.backend.clear_contacts()?;
        }
        if plan.submit.is_empty() {
            return Ok(0);
        }
        let payload = plan
            .submit
            .iter()
            .map(|row| {
                let mut item = Map::new();
                item.insert(
                    CONTACT_FIELD.to_string(),
                    JsonValue::String(row.text(CONTACT_FIELD).to_string()),
                );
                item
            })
            .collect::<Vec<_>>();
        let created = self.backend.import_contacts(&payload, owner)?;
        self.events.publish(SyncEvent::StoreUpdated {
            resource: ResourceKind::Contacts,
        });
        Ok(created.len())
    }

    /// One registration per row. Failures are skipped and reported, never fatal.
    fn import_users(&self, sheet: &ParsedSheet, headers: &[String], outcome: &mut ImportOutcome) {
        let column = |name: &str| resolve_header(headers, &[name]);
        let email_col = column("Email");
        let password_col = column("Password");
        let name_col = column("Name");
        let role_col = column("Role");
        let text = |row: &Row, col: &Option<String>| {
            col.as_deref()
                .map(|c| row.text(c).to_string())
                .unwrap_or_default()
        };

        for (idx, row) in sheet.rows.iter().enumerate() {
            let line = idx + 2;
            let email = text(row, &email_col);
            let password = text(row, &password_col);
            let skip = |reason: String| SkippedRow {
                line,
                email: email.clone(),
                reason,
            };
            if email.is_empty() || password.is_empty() {
                outcome.skipped.push(skip("missing email or password".to_string()));
                continue;
            }
            let role = match text(row, &role_col).parse::<Role>() {
                Ok(role) => role,
                Err(reason) => {
                    outcome.skipped.push(skip(reason));
                    continue;
                }
            };
            let name = Some(text(row, &name_col))
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| email.clone());
            let user = NewUser {
                email: email.clone(),
                password,
                name,
                role: Some(role),
            };
            match self.backend.register(&user) {
                Ok(_) => outcome.added += 1,
                Err(err) => outcome.skipped.push(skip(err.to_string())),
            }
        }
        for skipped in &outcome.skipped {
            warn!(
                "Skipped user on line {} ({}): {}",
                skipped.line, skipped.email, skipped.reason
            );
        }
    }
}

fn check_required(resource: ResourceKind, headers: &[String]) -> Result<(), ValidationError> {
    let missing = match resource {
        ResourceKind::Users => missing_required(headers, &USER_IMPORT_HEADERS),
        ResourceKind::Contacts => {
            if contact_columns(headers).is_empty() {
                vec![CONTACT_FIELD.to_string()]
            } else {
                Vec::new()
            }
        }
        other => other
            .sheet()
            .map(|kind| missing_required(headers, required_headers(kind)))
            .unwrap_or_default(),
    };
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::SchemaMismatch { resource, missing })
    }
}

/// Upload headers (original spelling) matching a contact import column.
fn contact_columns(headers: &[String]) -> Vec<String> {
    let mut columns = CONTACT_IMPORT_COLUMNS
        .iter()
        .filter_map(|wanted| {
            headers
                .iter()
                .find(|h| h.trim().eq_ignore_ascii_case(wanted))
                .cloned()
        })
        .collect::<Vec<_>>();
    if columns.is_empty()
        && let Some(fallback) = resolve_header(headers, &CONTACT_HEADER_CANDIDATES)
    {
        columns.push(fallback);
    }
    columns
}
