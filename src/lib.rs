pub mod authz;
pub mod backend;
pub mod cli;
pub mod columns;
pub mod config;
pub mod derive;
mod derive_cmd;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod headers;
mod import_cmd;
pub mod io_utils;
mod list_cmd;
pub mod merge;
pub mod reconcile;
pub mod row;
mod rows_cmd;
pub mod session;
pub mod sheet;
mod summary_cmd;
pub mod table;
mod users_cmd;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info, warn};

use crate::{
    backend::{CrmBackend, Credentials},
    cli::{Cli, Commands, LoginArgs},
    session::Session,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("crm_sync", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    if let Commands::Derive(args) = &cli.command {
        return derive_cmd::execute(args);
    }
    let mut session = Session::open(&cli.global)?;
    match cli.command {
        Commands::Login(args) => handle_login(&mut session, &args),
        Commands::Whoami => handle_whoami(&session),
        Commands::Logout => handle_logout(&mut session),
        Commands::Import(args) => import_cmd::execute(&session, &args),
        Commands::List(args) => list_cmd::execute(&session, &args),
        Commands::Export(args) => list_cmd::export(&session, &args),
        Commands::Edit(args) => rows_cmd::edit(&session, &args),
        Commands::Delete(args) => rows_cmd::delete(&session, &args),
        Commands::Summary(args) => summary_cmd::execute(&session, &args),
        Commands::Users(args) => users_cmd::execute(&session, &args.command),
        Commands::Derive(args) => derive_cmd::execute(&args),
    }
}

fn handle_login(session: &mut Session, args: &LoginArgs) -> Result<()> {
    let credentials = Credentials {
        email: args.email.trim().to_string(),
        password: args.password.clone(),
    };
    let response = session
        .backend
        .login(&credentials)
        .with_context(|| format!("Signing in as {}", credentials.email))?;
    info!(
        "Signed in as {} ({})",
        response.user.email,
        response.user.role.as_str()
    );
    if args.no_save {
        println!("{}", response.access_token);
    } else {
        let path = session.store_token(Some(response.access_token))?;
        info!("Token stored in {path:?}");
    }
    Ok(())
}

fn handle_whoami(session: &Session) -> Result<()> {
    let viewer = session.viewer()?;
    println!("{}\t{}\t{}", viewer.id, viewer.email, viewer.role.as_str());
    Ok(())
}

fn handle_logout(session: &mut Session) -> Result<()> {
    if let Err(err) = session.backend.logout() {
        warn!("Server-side logout failed: {err}");
    }
    let path = session.store_token(None)?;
    info!("Token removed from {path:?}");
    Ok(())
}
