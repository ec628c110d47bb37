//! Items command: inspection listing of timeline items.

use std::io::Write;

use anyhow::Result;

use super::util::format_time;
use crate::App;

pub fn run<W: Write>(writer: &mut W, app: &App, limit: Option<usize>) -> Result<()> {
    let rows = app.timeline.admin_rows(app.feed_limit(limit))?;
    if rows.is_empty() {
        writeln!(writer, "No timeline items.")?;
        return Ok(());
    }

    let label_width = rows.iter().map(|row| row.label.len()).max().unwrap_or(0);
    let user_width = rows
        .iter()
        .map(|row| row.user.as_str().len())
        .max()
        .unwrap_or(0);
    let type_width = rows
        .iter()
        .map(|row| row.type_name.as_str().len())
        .max()
        .unwrap_or(0);

    for row in rows {
        writeln!(
            writer,
            "{:<label_width$}  {:<user_width$}  {:<type_width$}  {}",
            row.label,
            row.user.as_str(),
            row.type_name.as_str(),
            format_time(row.timestamp),
        )?;
    }
    Ok(())
}
