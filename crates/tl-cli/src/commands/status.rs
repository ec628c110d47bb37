//! Status command: followed types and their last update.

use std::io::Write;

use anyhow::Result;
use tl_core::ItemFilter;

use super::util::format_watermark;
use crate::App;

pub fn run<W: Write>(writer: &mut W, app: &App) -> Result<()> {
    writeln!(writer, "Timelines status")?;
    writeln!(writer, "Database: {}", app.config.database_path.display())?;

    let registry = app.registry();
    if registry.is_empty() {
        writeln!(writer, "No followed types.")?;
        return Ok(());
    }

    writeln!(writer, "Followed types:")?;
    for followed in registry.iter() {
        let config = &followed.config;
        let watermark = app
            .timeline
            .last_update(followed.type_name(), &ItemFilter::default())?;
        writeln!(
            writer,
            "- {} (set: {}, date: {}, user: {}): last update {}",
            followed.type_name(),
            config.set_name(),
            config.path(),
            config.user_field_name(),
            format_watermark(watermark),
        )?;
    }

    Ok(())
}
