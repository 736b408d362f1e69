//! Single-row edits and deletes.
//!
//! Edits replace the stored row wholesale: the row is merged for display,
//! the assignments are applied to the merged view, and the result is written
//! back through the merge provenance so values land in the columns the source
//! sheet used.

use anyhow::{Context, Result, anyhow, bail};
use log::info;

use crate::{
    authz::{self, Viewer},
    backend::{CrmBackend, ItemUpdate, ResourceKind, Role, UserUpdate, load_rows, row_payload},
    cli::{DeleteArgs, EditArgs, parse_assignments},
    derive::CONTACT_FIELD,
    events::SyncEvent,
    merge::{display_groups, merge_columns, write_back},
    row::Row,
    session::Session,
};

pub fn edit(session: &Session, args: &EditArgs) -> Result<()> {
    let assignments = parse_assignments(&args.assignments).map_err(|e| anyhow!(e))?;
    let viewer = session.viewer()?;
    let backend = &session.backend;

    match args.resource {
        ResourceKind::Users => {
            require_admin(&viewer)?;
            let update = user_update(&assignments)?;
            backend
                .update_user(&args.id, &update)
                .with_context(|| format!("Updating user {}", args.id))?;
        }
        ResourceKind::Contacts => {
            let row = find_row(backend, args.resource, &args.id)?;
            ensure_allowed(authz::can_edit(Some(&viewer), &row), "edit")?;
            let contact = assignments
                .iter()
                .rev()
                .find(|(column, _)| column.eq_ignore_ascii_case(CONTACT_FIELD))
                .map(|(_, value)| value.trim().to_string())
                .ok_or_else(|| anyhow!("Contacts only have a '{CONTACT_FIELD}' field"))?;
            backend
                .update_contact(&args.id, &contact)
                .with_context(|| format!("Updating contact {}", args.id))?;
        }
        resource => {
            let Some(kind) = resource.sheet() else {
                bail!("{resource} rows cannot be edited");
            };
            let row = find_row(backend, resource, &args.id)?;
            ensure_allowed(authz::can_edit(Some(&viewer), &row), "edit")?;
            let saved = apply_edit(&row, &assignments);
            let update = ItemUpdate {
                data: Some(row_payload(&saved)),
            };
            backend
                .update(kind, &args.id, &update)
                .with_context(|| format!("Updating {resource} row {}", args.id))?;
        }
    }
    session.events.publish(SyncEvent::StoreUpdated {
        resource: args.resource,
    });
    info!("Updated {} row {}", args.resource, args.id);
    Ok(())
}

pub fn delete(session: &Session, args: &DeleteArgs) -> Result<()> {
    let viewer = session.viewer()?;
    let backend = &session.backend;
    let deleted = match args.resource {
        ResourceKind::Users => {
            require_admin(&viewer)?;
            backend.delete_user(&args.id)
        }
        ResourceKind::Contacts => {
            let row = find_row(backend, args.resource, &args.id)?;
            ensure_allowed(authz::can_delete(Some(&viewer), &row), "delete")?;
            backend.delete_contact(&args.id)
        }
        resource => {
            let Some(kind) = resource.sheet() else {
                bail!("{resource} rows cannot be deleted");
            };
            let row = find_row(backend, resource, &args.id)?;
            ensure_allowed(authz::can_delete(Some(&viewer), &row), "delete")?;
            backend.delete(kind, &args.id)
        }
    };
    deleted.with_context(|| format!("Deleting {} row {}", args.resource, args.id))?;
    session.events.publish(SyncEvent::StoreUpdated {
        resource: args.resource,
    });
    info!("Deleted {} row {}", args.resource, args.id);
    Ok(())
}

/// Applies `column=value` assignments to the merged view of `original` and
/// returns the row to store.
pub fn apply_edit(original: &Row, assignments: &[(String, String)]) -> Row {
    let merged = merge_columns(original, &display_groups());
    let mut edited = merged.row.clone();
    for (column, value) in assignments {
        edited.set(column.clone(), value.clone());
    }
    write_back(original, &edited, &merged.provenance)
}

fn find_row<B: CrmBackend + ?Sized>(backend: &B, resource: ResourceKind, id: &str) -> Result<Row> {
    load_rows(backend, resource)
        .with_context(|| format!("Loading {resource}"))?
        .into_iter()
        .find(|row| row.id.as_deref() == Some(id))
        .ok_or_else(|| anyhow!("No {resource} row with id '{id}'"))
}

fn ensure_allowed(allowed: bool, action: &str) -> Result<()> {
    if !allowed {
        bail!("You can only {action} rows you own");
    }
    Ok(())
}

fn require_admin(viewer: &Viewer) -> Result<()> {
    if !viewer.is_admin() {
        bail!("Only administrators can manage users");
    }
    Ok(())
}

fn user_update(assignments: &[(String, String)]) -> Result<UserUpdate> {
    let mut update = UserUpdate::default();
    for (column, value) in assignments {
        match column.to_ascii_lowercase().as_str() {
            "email" => update.email = Some(value.trim().to_string()),
            "name" => update.name = Some(value.trim().to_string()),
            "role" => update.role = Some(value.parse::<Role>().map_err(|e| anyhow!(e))?),
            "verified" => {
                update.verified = Some(
                    value
                        .trim()
                        .parse::<bool>()
                        .with_context(|| format!("Invalid verified flag '{value}'"))?,
                )
            }
            other => bail!("Users have no editable field '{other}'"),
        }
    }
    Ok(update)
}
