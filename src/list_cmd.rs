//! Listing and exporting collections.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use log::info;

use crate::{
    authz,
    backend::{ResourceKind, load_rows},
    cli::{ExportArgs, ListArgs},
    columns::{
        FacetSelection, SortDirective, apply_faceted_filter, distinct_values, project_columns,
        search_rows, sort_rows,
    },
    headers::preferred_columns,
    io_utils::{self, FileFormat},
    merge::{SynonymGroups, display_groups, display_name, merge_rows},
    row::Row,
    session::Session,
    sheet, table,
};

pub fn execute(session: &Session, args: &ListArgs) -> Result<()> {
    let selection = FacetSelection::parse(&args.filters).map_err(|e| anyhow!(e))?;
    let sort = args
        .sort
        .as_deref()
        .map(SortDirective::parse)
        .transpose()
        .map_err(|e| anyhow!(e))?;

    let mut rows = load_rows(&session.backend, args.resource)
        .with_context(|| format!("Loading {}", args.resource))?;
    let loaded = rows.len();

    if args.editable {
        let viewer = session.viewer()?;
        rows = authz::editable_rows(Some(&viewer), &rows)
            .into_iter()
            .cloned()
            .collect();
    }
    let groups = display_groups();
    rows = merge_rows(&rows, &groups);
    rows = apply_faceted_filter(&rows, &selection);
    if let Some(query) = &args.search {
        rows = search_rows(&rows, query);
    }
    if let Some(directive) = &sort {
        sort_rows(&mut rows, &directive.column, directive.direction);
    }

    if let Some(column) = &args.distinct {
        for value in distinct_values(&rows, column) {
            println!("{value}");
        }
        return Ok(());
    }

    let columns = if args.columns.is_empty() {
        display_columns(args.resource, &rows, &groups)
    } else {
        args.columns.clone()
    };
    if args.table {
        table::print_rows(&columns, &rows);
    } else {
        sheet::write_csv(None, &columns, &rows, None)?;
    }
    info!("Listed {} of {} row(s) from {}", rows.len(), loaded, args.resource);
    Ok(())
}

pub fn export(session: &Session, args: &ExportArgs) -> Result<()> {
    let rows = load_rows(&session.backend, args.resource)
        .with_context(|| format!("Loading {}", args.resource))?;
    let columns = default_columns(args.resource, &rows);
    write_export(&args.output, args.resource, &columns, &rows, args.output_encoding.as_deref())?;
    info!(
        "Exported {} row(s) from {} to {:?}",
        rows.len(),
        args.resource,
        args.output
    );
    Ok(())
}

fn write_export(
    path: &Path,
    resource: ResourceKind,
    columns: &[String],
    rows: &[Row],
    encoding: Option<&str>,
) -> Result<()> {
    match io_utils::detect_format(path) {
        FileFormat::Workbook => sheet::write_xlsx(path, resource.as_str(), columns, rows),
        FileFormat::Delimited => sheet::write_csv(Some(path), columns, rows, encoding),
    }
}

fn default_columns(resource: ResourceKind, rows: &[Row]) -> Vec<String> {
    let preferred = resource.sheet().map(preferred_columns).unwrap_or_default();
    project_columns(rows, preferred)
}

/// Column order for merged rows: preferred headers under their display names.
fn display_columns(resource: ResourceKind, rows: &[Row], groups: &SynonymGroups) -> Vec<String> {
    let preferred = resource
        .sheet()
        .map(preferred_columns)
        .unwrap_or_default()
        .iter()
        .map(|column| display_name(groups, column))
        .collect::<Vec<_>>();
    project_columns(rows, &preferred)
}
