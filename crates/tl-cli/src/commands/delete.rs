//! Delete command: remove a source record.

use std::io::Write;

use anyhow::{Context, Result};
use tl_core::{GenericRef, RecordId};

use crate::App;

pub fn run<W: Write>(writer: &mut W, app: &App, type_label: &str, id: i64) -> Result<()> {
    let source = GenericRef::new(App::type_name(type_label)?, RecordId::new(id)?);
    let removed = app
        .db
        .delete_record(&source)
        .with_context(|| format!("failed to delete {source}"))?;

    if removed.is_some() {
        writeln!(writer, "Deleted {source}")?;
    } else {
        writeln!(writer, "No record {source}")?;
    }
    Ok(())
}
