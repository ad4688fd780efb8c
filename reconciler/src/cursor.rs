//! Cursor extraction from the `Link` response header of paged list endpoints.
//!
//! ```text
//! <https://sentry.io/api/0/organizations/acme/members/?&cursor=100:-1:1>; rel="previous"; results="false"; cursor="100:-1:1",
//! <https://sentry.io/api/0/organizations/acme/members/?&cursor=100:1:0>; rel="next"; results="true"; cursor="100:1:0"
//! ```
//!
//! The `next` link is always present; `results="false"` on it marks the last page.

use std::str::FromStr;

#[derive(Debug, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub rel: String,
    pub results: bool,
    pub cursor: String,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct LinkHeader {
    pub links: Vec<Link>,
}

impl LinkHeader {
    /// Cursor of the following page, or `None` on the last page.
    pub fn next_cursor(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|link| link.rel == "next")
            .filter(|link| link.results && !link.cursor.is_empty())
            .map(|link| link.cursor.as_str())
    }
}

/// Splits on `separator` wherever it is not inside a `<url>` or a quoted value.
fn split_unquoted(s: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_url = false;
    let mut in_quotes = false;

    for (i, c) in s.char_indices() {
        match c {
            '<' if !in_quotes => in_url = true,
            '>' if !in_quotes => in_url = false,
            '"' if !in_url => in_quotes = !in_quotes,
            c if c == separator && !in_url && !in_quotes => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

impl FromStr for LinkHeader {
    type Err = CursorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut links = Vec::new();

        for raw in split_unquoted(s, ',')
            .into_iter()
            .map(str::trim)
            .filter(|l| !l.is_empty())
        {
            let mut segments = split_unquoted(raw, ';').into_iter().map(str::trim);

            let url = segments
                .next()
                .and_then(|u| u.strip_prefix('<'))
                .and_then(|u| u.strip_suffix('>'))
                .ok_or_else(|| CursorError::MissingUrl(raw.to_string()))?;

            let mut link = Link {
                url: url.to_string(),
                rel: String::new(),
                results: false,
                cursor: String::new(),
            };

            for param in segments {
                let (key, value) = param
                    .split_once('=')
                    .ok_or_else(|| CursorError::MalformedParam(param.to_string()))?;
                let value = value.trim().trim_matches('"');
                match key.trim() {
                    "rel" => link.rel = value.to_string(),
                    "results" => link.results = value == "true",
                    "cursor" => link.cursor = value.to_string(),
                    // Unknown parameters are ignored
                    _ => {}
                }
            }

            links.push(link);
        }

        Ok(LinkHeader { links })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CursorError {
    #[error("link without a <url>: {0}")]
    MissingUrl(String),
    #[error("malformed link parameter: {0}")]
    MalformedParam(String),
}
