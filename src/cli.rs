use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{backend::ResourceKind, reconcile::ImportMode};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Synchronize spreadsheet uploads with the CRM backend",
    long_about = None
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// API base URL (overrides configuration and host detection)
    #[arg(long = "api-url", global = true)]
    pub api_url: Option<String>,
    /// Bearer token to send with every request
    #[arg(long, global = true)]
    pub token: Option<String>,
    /// Settings file (defaults to ./crm-sync.yaml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Host the client runs on; decides between the local and deployed API
    #[arg(long, global = true)]
    pub host: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Sign in and store the access token in the settings file
    Login(LoginArgs),
    /// Show the signed-in account
    Whoami,
    /// Sign out and forget the stored token
    Logout,
    /// Import a CSV or XLSX sheet into a collection
    Import(ImportArgs),
    /// List a collection with optional filtering, searching, and sorting
    List(ListArgs),
    /// Export a collection to CSV or XLSX
    Export(ExportArgs),
    /// Edit one row, respecting ownership
    Edit(EditArgs),
    /// Delete one row, respecting ownership
    Delete(DeleteArgs),
    /// Count deals per responsible, sector, status, and type
    Summary(SummaryArgs),
    /// Derive a contacts sheet from a deals sheet without contacting the server
    Derive(DeriveArgs),
    /// Administer user accounts
    Users(UsersArgs),
}

#[derive(Debug, Args)]
pub struct LoginArgs {
    #[arg(short, long)]
    pub email: String,
    #[arg(short, long)]
    pub password: String,
    /// Print the token instead of saving it
    #[arg(long = "no-save")]
    pub no_save: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ImportModeArg {
    /// Add rows not already present
    Append,
    /// Clear the collection, then import every row
    Replace,
}

impl From<ImportModeArg> for ImportMode {
    fn from(value: ImportModeArg) -> Self {
        match value {
            ImportModeArg::Append => ImportMode::AppendUnique,
            ImportModeArg::Replace => ImportMode::FullReplace,
        }
    }
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// Sheet to upload (.csv, .tsv, .xlsx; '-' reads CSV from stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Target collection; inferred from the headers when omitted
    #[arg(short, long)]
    pub resource: Option<ResourceKind>,
    /// Override the collection's default import mode
    #[arg(long, value_enum)]
    pub mode: Option<ImportModeArg>,
    /// Skip refreshing derived collections
    #[arg(long = "no-derive")]
    pub no_derive: bool,
    /// For contacts: also replace deals with the uploaded rows
    #[arg(long = "mirror-deals")]
    pub mirror_deals: bool,
    /// Owner to record on imported rows (defaults to the signed-in user)
    #[arg(long = "owner-id")]
    pub owner_id: Option<String>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(short, long)]
    pub resource: ResourceKind,
    /// Keep rows whose column equals the value (column=value, repeatable)
    #[arg(short, long = "filter", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
    /// Sort by column, optionally suffixed with :asc or :desc
    #[arg(short, long)]
    pub sort: Option<String>,
    /// Case-insensitive text search across all fields
    #[arg(long)]
    pub search: Option<String>,
    /// Columns to show (defaults to every observed column)
    #[arg(short = 'C', long = "columns", value_delimiter = ',')]
    pub columns: Vec<String>,
    /// Render an aligned table instead of CSV
    #[arg(long)]
    pub table: bool,
    /// Only rows the signed-in user may edit
    #[arg(long)]
    pub editable: bool,
    /// Print the distinct values of a column instead of rows
    #[arg(long = "distinct")]
    pub distinct: Option<String>,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[arg(short, long)]
    pub resource: ResourceKind,
    /// Destination file; .xlsx writes a workbook, anything else CSV
    #[arg(short, long)]
    pub output: PathBuf,
    /// Character encoding for CSV output (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct SummaryArgs {
    #[arg(short, long, default_value = "deals")]
    pub resource: ResourceKind,
    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    #[arg(short, long)]
    pub resource: ResourceKind,
    #[arg(long)]
    pub id: String,
    /// Field assignment (column=value, repeatable)
    #[arg(long = "set", action = clap::ArgAction::Append, required = true)]
    pub assignments: Vec<String>,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    #[arg(short, long)]
    pub resource: ResourceKind,
    #[arg(long)]
    pub id: String,
}

#[derive(Debug, Args)]
pub struct DeriveArgs {
    /// Deals sheet to read
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Output contacts CSV (stdout when omitted or '-')
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Owner to stamp on derived contacts
    #[arg(long = "owner-id")]
    pub owner_id: Option<String>,
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct UsersArgs {
    #[command(subcommand)]
    pub command: UsersCommand,
}

#[derive(Debug, Subcommand)]
pub enum UsersCommand {
    /// List every account
    List {
        #[arg(long)]
        table: bool,
    },
    /// Register accounts from a sheet with Email and Password columns
    Import {
        #[arg(short = 'i', long = "input")]
        input: PathBuf,
        #[arg(long, value_parser = parse_delimiter)]
        delimiter: Option<u8>,
        #[arg(long = "input-encoding")]
        input_encoding: Option<String>,
    },
    /// Delete an account
    Delete {
        #[arg(long)]
        id: String,
    },
    /// Set an account's password
    Password {
        #[arg(long)]
        id: String,
        #[arg(long)]
        password: String,
    },
    /// Print the audit summary
    Audit,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

/// Splits `column=value` assignments.
pub fn parse_assignments(values: &[String]) -> Result<Vec<(String, String)>, String> {
    values
        .iter()
        .map(|raw| {
            let (column, value) = raw
                .split_once('=')
                .ok_or_else(|| format!("Assignment '{raw}' must be written as column=value"))?;
            let column = column.trim();
            if column.is_empty() {
                return Err(format!("Assignment '{raw}' is missing a column name"));
            }
            Ok((column.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_names_and_characters() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter(";"), Ok(b';'));
        assert!(parse_delimiter("ab").is_err());
        assert!(parse_delimiter("").is_err());
    }

    #[test]
    fn assignments_keep_equals_in_values() {
        let parsed = parse_assignments(&["Comments=a=b".to_string()]).unwrap();
        assert_eq!(parsed, [("Comments".to_string(), "a=b".to_string())]);
        assert!(parse_assignments(&["=x".to_string()]).is_err());
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "crm-sync",
            "import",
            "-i",
            "deals.csv",
            "--resource",
            "deals",
            "--mode",
            "append",
            "--api-url",
            "http://localhost:9000/api",
        ])
        .unwrap();
        assert_eq!(cli.global.api_url.as_deref(), Some("http://localhost:9000/api"));
        match cli.command {
            Commands::Import(args) => {
                assert_eq!(args.resource, Some(ResourceKind::Deals));
                assert_eq!(args.mode, Some(ImportModeArg::Append));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
