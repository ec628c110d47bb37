//! Resync command: reconcile the timeline with stored records.

use std::io::Write;

use anyhow::{Context, Result};
use tl_core::ResyncStats;

use crate::App;

pub fn run<W: Write>(writer: &mut W, app: &App, type_label: Option<&str>) -> Result<()> {
    let results = match type_label {
        Some(label) => {
            let type_name = App::type_name(label)?;
            let stats = app
                .sync
                .resync_type(&type_name)
                .with_context(|| format!("failed to resync {type_name}"))?;
            vec![(type_name, stats)]
        }
        None => app.sync.resync_all().context("failed to resync")?,
    };

    if results.is_empty() {
        writeln!(writer, "No followed types.")?;
        return Ok(());
    }

    let mut total = ResyncStats::default();
    for (type_name, stats) in &results {
        write_stats(writer, type_name.as_str(), stats)?;
        total += *stats;
    }
    if results.len() > 1 {
        write_stats(writer, "total", &total)?;
    }
    Ok(())
}

fn write_stats<W: Write>(writer: &mut W, name: &str, stats: &ResyncStats) -> Result<()> {
    writeln!(
        writer,
        "{name}: scanned {}, upserted {}, removed {}",
        stats.scanned, stats.upserted, stats.removed
    )?;
    Ok(())
}
