//! Deal counts per responsible, sector, status, and type.

use std::fmt::Write as _;

use anyhow::{Context, Result, bail};
use log::info;

use crate::{
    backend::{ResourceKind, load_rows},
    cli::SummaryArgs,
    columns::{DealsSummary, summarize_deals},
    headers::DEFAULT_ALIASES,
    session::Session,
    table,
};

pub fn execute(session: &Session, args: &SummaryArgs) -> Result<()> {
    if args.resource.sheet().is_none() {
        bail!("{} cannot be summarized", args.resource);
    }
    let deals = load_rows(&session.backend, args.resource)
        .with_context(|| format!("Loading {}", args.resource))?;
    let contacts =
        load_rows(&session.backend, ResourceKind::Contacts).context("Loading contacts")?;
    let summary = summarize_deals(&deals, &contacts, &DEFAULT_ALIASES);
    info!("Summarized {} row(s) from {}", summary.deals, args.resource);

    if args.json {
        let json = serde_json::to_string_pretty(&summary).context("Serializing summary")?;
        println!("{json}");
    } else {
        print!("{}", render_summary(&summary));
    }
    Ok(())
}

pub fn render_summary(summary: &DealsSummary) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Contacts: {}", summary.contacts);
    let _ = writeln!(output, "Deals: {}", summary.deals);
    let _ = writeln!(output, "Responsibles: {}", summary.responsibles);
    for (label, counts) in [
        ("Responsible", &summary.by_responsible),
        ("Sector", &summary.by_sector),
        ("Status", &summary.by_status),
        ("Type", &summary.by_type),
    ] {
        let headers = vec![label.to_string(), "Deals".to_string()];
        let rows = counts
            .iter()
            .map(|(name, count)| vec![name.clone(), count.to_string()])
            .collect::<Vec<_>>();
        output.push('\n');
        output.push_str(&table::render_table(&headers, &rows));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_headline_numbers_and_breakdowns() {
        let summary = DealsSummary {
            deals: 3,
            contacts: 2,
            responsibles: 1,
            by_responsible: vec![("Ivanov".into(), 2), ("—".into(), 1)],
            by_sector: vec![("Retail".into(), 3)],
            by_status: Vec::new(),
            by_type: Vec::new(),
        };
        let rendered = render_summary(&summary);
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines[..3], ["Contacts: 2", "Deals: 3", "Responsibles: 1"]);
        assert!(rendered.contains("Responsible  Deals\n"));
        assert!(rendered.contains("Ivanov       2\n"));
        assert!(rendered.contains("Retail  3\n"));
    }
}
