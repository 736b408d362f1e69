use std::borrow::Cow;
use std::fmt::Write as _;

use crate::row::Row;

/// Cells wider than this are shortened with an ellipsis.
pub const MAX_CELL_WIDTH: usize = 40;

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let cells = rows
        .iter()
        .map(|row| row.iter().map(|cell| clip(cell)).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    for row in &cells {
        for (idx, cell) in row.iter().enumerate().take(widths.len()) {
            widths[idx] = widths[idx].max(display_width(cell));
        }
    }
    for width in &mut widths {
        *width = (*width).max(3);
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers.iter().map(String::as_str), &widths));
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(separator.iter().map(String::as_str), &widths));
    for row in &cells {
        let _ = writeln!(output, "{}", format_row(row.iter().map(|c| &**c), &widths));
    }
    output
}

/// Renders `rows` projected onto `columns`; missing fields are blank.
pub fn render_rows(columns: &[String], rows: &[Row]) -> String {
    let cells = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|column| row.get(column).unwrap_or_default().to_string())
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    render_table(columns, &cells)
}

pub fn print_rows(columns: &[String], rows: &[Row]) {
    print!("{}", render_rows(columns, rows));
}

fn format_row<'a, I>(values: I, widths: &[usize]) -> String
where
    I: Iterator<Item = &'a str>,
{
    let mut line = values
        .zip(widths)
        .map(|(value, width)| {
            let padding = width.saturating_sub(display_width(value));
            format!("{value}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.truncate(line.trim_end().len());
    line
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

/// Flattens line breaks and tabs, then shortens to [`MAX_CELL_WIDTH`].
fn clip(value: &str) -> Cow<'_, str> {
    let flattened: Cow<'_, str> = if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    };
    if display_width(&flattened) <= MAX_CELL_WIDTH {
        return flattened;
    }
    let mut shortened = flattened
        .chars()
        .take(MAX_CELL_WIDTH - 1)
        .collect::<String>();
    shortened.push('…');
    Cow::Owned(shortened)
}
