//! Timeline command: the latest entries, globally or filtered.

use std::io::Write;

use anyhow::{Context, Result};
use tl_core::{TimelineEntry, UserId};

use super::util::format_time;
use crate::App;

/// Which feed to show.
#[derive(Debug, Clone, Default)]
pub struct Feed {
    pub user: Option<String>,
    pub type_name: Option<String>,
    pub limit: Option<usize>,
}

pub fn run<W: Write>(writer: &mut W, app: &App, feed: &Feed, json: bool) -> Result<()> {
    let entries = entries(app, feed)?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&entries)?)?;
        return Ok(());
    }

    if entries.is_empty() {
        writeln!(writer, "No timeline entries.")?;
        return Ok(());
    }

    for entry in &entries {
        write!(
            writer,
            "{}  {}  {}",
            format_time(entry.item.timestamp),
            entry.item.user,
            entry.label,
        )?;
        if let Some(link) = &entry.link {
            write!(writer, "  {link}")?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

fn entries(app: &App, feed: &Feed) -> Result<Vec<TimelineEntry>> {
    let limit = app.feed_limit(feed.limit);
    let user = feed
        .user
        .as_deref()
        .map(UserId::new)
        .transpose()
        .context("invalid user")?;
    let type_name = feed.type_name.as_deref().map(App::type_name).transpose()?;

    let entries = match (user, type_name) {
        (Some(user), Some(type_name)) => {
            let mut entries = app.timeline.latest_for_user(&user, usize::MAX)?;
            entries.retain(|entry| entry.item.source.type_name == type_name);
            entries.truncate(limit);
            entries
        }
        (Some(user), None) => app.timeline.latest_for_user(&user, limit)?,
        (None, Some(type_name)) => app.timeline.latest_for_type(&type_name, limit)?,
        (None, None) => app.timeline.latest(limit)?,
    };
    Ok(entries)
}
