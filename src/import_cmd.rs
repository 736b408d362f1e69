use std::time::Instant;

use anyhow::Result;
use log::info;

use crate::{
    cli::ImportArgs,
    events::StatusKind,
    reconcile::{ImportRequest, Reconciler},
    session::Session,
    sheet::SheetOptions,
};

pub fn execute(session: &Session, args: &ImportArgs) -> Result<()> {
    let options = SheetOptions {
        delimiter: args.delimiter,
        encoding: args.input_encoding.clone(),
    };
    let request = ImportRequest {
        resource: args.resource,
        mode: args.mode.map(Into::into),
        derive: !args.no_derive,
        mirror_deals: args.mirror_deals,
        owner_id: args.owner_id.clone(),
    };
    info!("Importing {:?}", args.input);

    let events = session.events.subscribe();
    let reconciler = Reconciler::new(&session.backend, &session.events);
    let result = reconciler.import_file(&args.input, &options, &request);

    let mut board = session.status_board();
    for event in events.try_iter() {
        board.apply(&event, Instant::now());
    }
    if let Some((StatusKind::Success, text)) = board.current(Instant::now()) {
        println!("{text}");
    }

    // Import errors already read as user-facing status text.
    let outcome = result?;
    if outcome.duplicates > 0 {
        info!("{} row(s) were already present", outcome.duplicates);
    }
    if let Some(count) = outcome.derived_contacts {
        info!("{count} contact(s) derived");
    }
    if let Some(count) = outcome.mirrored_deals {
        info!("{count} deal(s) mirrored");
    }
    for skipped in &outcome.skipped {
        println!(
            "skipped line {}: {} ({})",
            skipped.line, skipped.email, skipped.reason
        );
    }
    Ok(())
}
