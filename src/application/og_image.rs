//! Open Graph card rendering.
//!
//! Cards are 1200x630 SVG documents. The parameters double as the cache
//! fingerprint input, so optional fields are omitted when unset.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CARD_WIDTH: u32 = 1200;
pub const CARD_HEIGHT: u32 = 630;
pub const MAX_TITLE_CHARS: usize = 120;
pub const MAX_SUBTITLE_CHARS: usize = 200;
const TITLE_LINE_CHARS: usize = 28;
const MAX_TITLE_LINES: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    fn palette(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Theme::Light => ("#f8f7f4", "#1d1d1f", "#6e6e73"),
            Theme::Dark => ("#111114", "#f5f5f7", "#a1a1a6"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OgParams {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OgParamsError {
    #[error("title must not be empty")]
    EmptyTitle,
    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
}

impl OgParams {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subtitle: None,
            theme: None,
        }
    }

    pub fn validate(&self) -> Result<(), OgParamsError> {
        if self.title.trim().is_empty() {
            return Err(OgParamsError::EmptyTitle);
        }
        if self.title.chars().count() > MAX_TITLE_CHARS {
            return Err(OgParamsError::TooLong {
                field: "title",
                max: MAX_TITLE_CHARS,
            });
        }
        if let Some(subtitle) = self.subtitle.as_deref()
            && subtitle.chars().count() > MAX_SUBTITLE_CHARS
        {
            return Err(OgParamsError::TooLong {
                field: "subtitle",
                max: MAX_SUBTITLE_CHARS,
            });
        }
        Ok(())
    }
}

/// Render the SVG card for a validated parameter set.
pub fn render_card(params: &OgParams) -> String {
    let (background, foreground, muted) = params.theme.unwrap_or_default().palette();
    let mut svg = String::with_capacity(2048);

    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{CARD_WIDTH}" height="{CARD_HEIGHT}" viewBox="0 0 {CARD_WIDTH} {CARD_HEIGHT}">"#
    );
    let _ = write!(
        svg,
        r#"<rect width="100%" height="100%" fill="{background}"/>"#
    );
    svg.push_str(r#"<g font-family="Inter, Helvetica, Arial, sans-serif">"#);

    let lines = wrap_title(params.title.trim());
    let mut y = 180;
    for line in &lines {
        let _ = write!(
            svg,
            r#"<text x="80" y="{y}" font-size="64" font-weight="700" fill="{foreground}">{}</text>"#,
            escape_xml(line)
        );
        y += 78;
    }

    if let Some(subtitle) = params
        .subtitle
        .as_deref()
        .map(str::trim)
        .filter(|subtitle| !subtitle.is_empty())
    {
        let _ = write!(
            svg,
            r#"<text x="80" y="{}" font-size="34" fill="{muted}">{}</text>"#,
            y + 24,
            escape_xml(subtitle)
        );
    }

    svg.push_str("</g></svg>");
    svg
}

fn wrap_title(title: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in title.split_whitespace() {
        let needed = current.chars().count() + word.chars().count() + usize::from(!current.is_empty());
        if needed > TITLE_LINE_CHARS && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }

    if lines.len() > MAX_TITLE_LINES {
        lines.truncate(MAX_TITLE_LINES);
        if let Some(last) = lines.last_mut() {
            last.push('…');
        }
    }
    lines
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}
