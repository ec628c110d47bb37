//! Last-update command: the watermark of one type.

use std::io::Write;

use anyhow::{Context, Result};
use tl_core::{ItemFilter, UserId};

use super::util::{format_watermark, parse_datetime};
use crate::App;

/// Optional narrowing of the watermark query, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Window {
    pub user: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
}

impl Window {
    fn to_filter(&self) -> Result<ItemFilter> {
        let mut filter = ItemFilter::default();
        if let Some(user) = &self.user {
            filter = filter.user(UserId::new(user.as_str()).context("invalid user")?);
        }
        if let Some(before) = &self.before {
            filter = filter.before(parse_datetime(before)?);
        }
        if let Some(after) = &self.after {
            filter = filter.after(parse_datetime(after)?);
        }
        Ok(filter)
    }
}

pub fn run<W: Write>(writer: &mut W, app: &App, type_label: &str, window: &Window) -> Result<()> {
    let type_name = App::type_name(type_label)?;
    let watermark = app.timeline.last_update(&type_name, &window.to_filter()?)?;
    writeln!(writer, "{}", format_watermark(watermark))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};
    use insta::assert_snapshot;
    use tl_core::{Record, TypeName};

    use crate::app::test_support;

    fn render(app: &App, window: &Window) -> String {
        let mut output = Vec::new();
        run(&mut output, app, "blog.Post", window).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn watermark_is_never_until_something_qualifies() {
        let app = test_support::app();
        assert_snapshot!(render(&app, &Window::default()), @"never");

        for (author, day) in [("alice", 1), ("bob", 3)] {
            let mut post = Record::new(TypeName::new("blog.post").unwrap())
                .with("author", UserId::new(author).unwrap())
                .with("published", true)
                .with("published_at", Utc.with_ymd_and_hms(2025, 2, day, 9, 0, 0).unwrap());
            app.db.save_record(&mut post).unwrap();
        }

        assert_snapshot!(render(&app, &Window::default()), @"2025-02-03T09:00:00Z");
        let alice = Window {
            user: Some("alice".to_string()),
            ..Window::default()
        };
        assert_snapshot!(render(&app, &alice), @"2025-02-01T09:00:00Z");
        let early = Window {
            before: Some("2025-02-01T00:00:00Z".to_string()),
            ..Window::default()
        };
        assert_snapshot!(render(&app, &early), @"never");
        let recent = Window {
            after: Some("1 day ago".to_string()),
            ..Window::default()
        };
        assert_snapshot!(render(&app, &recent), @"never");
    }
}
