//! Admin user management.

use std::time::Instant;

use anyhow::{Context, Result, bail};
use log::info;

use crate::{
    backend::{CrmBackend, ResourceKind, load_rows},
    cli::UsersCommand,
    events::StatusKind,
    reconcile::{ImportRequest, Reconciler},
    session::Session,
    sheet::{self, SheetOptions},
    table,
};

const USER_COLUMNS: &[&str] = &["id", "email", "name", "role", "verified", "created_at", "last_login"];

pub fn execute(session: &Session, command: &UsersCommand) -> Result<()> {
    let viewer = session.viewer()?;
    if !viewer.is_admin() {
        bail!("Only administrators can manage users");
    }
    let backend = &session.backend;
    match command {
        UsersCommand::List { table } => {
            let rows = load_rows(backend, ResourceKind::Users).context("Loading users")?;
            let columns = USER_COLUMNS.iter().map(|c| c.to_string()).collect::<Vec<_>>();
            if *table {
                table::print_rows(&columns, &rows);
            } else {
                sheet::write_csv(None, &columns, &rows, None)?;
            }
        }
        UsersCommand::Import {
            input,
            delimiter,
            input_encoding,
        } => {
            let options = SheetOptions {
                delimiter: *delimiter,
                encoding: input_encoding.clone(),
            };
            let request = ImportRequest::for_resource(ResourceKind::Users);
            let events = session.events.subscribe();
            let result =
                Reconciler::new(backend, &session.events).import_file(input, &options, &request);
            let mut board = session.status_board();
            for event in events.try_iter() {
                board.apply(&event, Instant::now());
            }
            if let Some((StatusKind::Success, text)) = board.current(Instant::now()) {
                println!("{text}");
            }
            let outcome = result?;
            for skipped in &outcome.skipped {
                println!(
                    "skipped line {}: {} ({})",
                    skipped.line, skipped.email, skipped.reason
                );
            }
        }
        UsersCommand::Delete { id } => {
            if *id == viewer.id {
                bail!("You cannot delete your own account");
            }
            backend
                .delete_user(id)
                .with_context(|| format!("Deleting user {id}"))?;
            info!("Deleted user {id}");
        }
        UsersCommand::Password { id, password } => {
            backend
                .set_user_password(id, password)
                .with_context(|| format!("Setting the password of user {id}"))?;
            info!("Password updated for user {id}");
        }
        UsersCommand::Audit => {
            let summary = backend.audit_summary().context("Fetching the audit summary")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}
