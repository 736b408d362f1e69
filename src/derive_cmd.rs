use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::DeriveArgs,
    derive::{CONTACT_FIELD, derive_contacts},
    io_utils,
    sheet::{self, SheetOptions},
};

/// Derives contacts from a deals sheet on disk without touching the backend.
pub fn execute(args: &DeriveArgs) -> Result<()> {
    let options = SheetOptions {
        delimiter: args.delimiter,
        encoding: args.input_encoding.clone(),
    };
    let mut parsed = sheet::read_sheet(&args.input, &options)
        .with_context(|| format!("Reading deals from {:?}", args.input))?;
    parsed.drop_empty_rows();
    let contacts = derive_contacts(&parsed.rows, args.owner_id.as_deref());

    let output = args.output.as_deref().filter(|path| !io_utils::is_dash(path));
    sheet::write_csv(output, &[CONTACT_FIELD.to_string()], &contacts, None)?;
    info!(
        "Derived {} contact(s) from {} deal row(s)",
        contacts.len(),
        parsed.rows.len()
    );
    Ok(())
}
