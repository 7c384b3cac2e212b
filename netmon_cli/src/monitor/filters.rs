//! Request type filters and free-text matching

use super::store::Record;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Request categories the list can be narrowed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    All,
    Html,
    Css,
    Js,
    Xhr,
    Fonts,
    Images,
    Media,
    Flash,
    Ws,
    Other,
}

impl FilterType {
    pub const ALL: [FilterType; 11] = [
        FilterType::All,
        FilterType::Html,
        FilterType::Css,
        FilterType::Js,
        FilterType::Xhr,
        FilterType::Fonts,
        FilterType::Images,
        FilterType::Media,
        FilterType::Flash,
        FilterType::Ws,
        FilterType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterType::All => "all",
            FilterType::Html => "html",
            FilterType::Css => "css",
            FilterType::Js => "js",
            FilterType::Xhr => "xhr",
            FilterType::Fonts => "fonts",
            FilterType::Images => "images",
            FilterType::Media => "media",
            FilterType::Flash => "flash",
            FilterType::Ws => "ws",
            FilterType::Other => "other",
        }
    }

    /// Whether a record belongs to this category
    pub fn matches(&self, r: &Record) -> bool {
        match self {
            FilterType::All => true,
            FilterType::Html => mime_contains(r, &["/html"]),
            FilterType::Css => mime_contains(r, &["/css"]),
            FilterType::Js => mime_contains(r, &["/ecmascript", "/javascript", "/x-javascript"]),
            FilterType::Xhr => r.is_xhr.unwrap_or(false),
            FilterType::Fonts => is_font(r),
            FilterType::Images => mime_contains(r, &["image/"]),
            FilterType::Media => is_media(r),
            FilterType::Flash => is_flash(r),
            FilterType::Ws => is_websocket(r),
            FilterType::Other => !FilterType::ALL[1..10].iter().any(|f| f.matches(r)),
        }
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown filter type '{0}'")]
pub struct UnknownFilterType(String);

impl FromStr for FilterType {
    type Err = UnknownFilterType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterType::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownFilterType(s.to_string()))
    }
}

fn mime_contains(r: &Record, needles: &[&str]) -> bool {
    r.mime_type
        .as_deref()
        .is_some_and(|mime| needles.iter().any(|n| mime.contains(n)))
}

fn url_path_ends_with(r: &Record, extensions: &[&str]) -> bool {
    let Some(url) = r.url.as_deref() else {
        return false;
    };
    let path = url.split(['?', '#']).next().unwrap_or_default().to_ascii_lowercase();
    extensions.iter().any(|ext| path.ends_with(ext))
}

fn is_font(r: &Record) -> bool {
    mime_contains(r, &["font/", "/font"])
        || url_path_ends_with(r, &[".woff", ".woff2", ".ttf", ".otf", ".eot"])
}

fn is_media(r: &Record) -> bool {
    mime_contains(
        r,
        &[
            "audio/",
            "video/",
            "model/",
            "application/vnd.apple.mpegurl",
            "application/x-mpegurl",
            "application/dash+xml",
        ],
    )
}

fn is_flash(r: &Record) -> bool {
    mime_contains(r, &["/x-flash", "/x-shockwave-flash"]) || url_path_ends_with(r, &[".swf"])
}

fn is_websocket(r: &Record) -> bool {
    let upgrade = r
        .request_headers
        .as_ref()
        .and_then(|h| h.get("upgrade"))
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    upgrade || r.status.as_deref() == Some("101")
}

/// Case-insensitive match of the URL and method against the filter text.
/// A leading `-` turns the text into an exclusion.
pub fn is_freetext_match(r: &Record, text: &str) -> bool {
    if text.is_empty() {
        return true;
    }

    let url = r.url.as_deref().unwrap_or_default().to_lowercase();
    let method = r.method.as_deref().unwrap_or_default().to_lowercase();
    let haystack_contains = |needle: &str| url.contains(needle) || method.contains(needle);

    let text = text.to_lowercase();
    match text.strip_prefix('-') {
        Some(excluded) if !excluded.is_empty() => !haystack_contains(excluded),
        _ => haystack_contains(&text),
    }
}

/// Enabled request categories plus the free-text filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    types: BTreeSet<FilterType>,
    text: String,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            types: BTreeSet::from([FilterType::All]),
            text: String::new(),
        }
    }
}

impl Filters {
    /// Filters with the given categories enabled (`all` when empty)
    pub fn with_types(types: impl IntoIterator<Item = FilterType>) -> Self {
        let mut filters = Self {
            types: types.into_iter().collect(),
            text: String::new(),
        };
        if filters.types.is_empty() || filters.types.contains(&FilterType::All) {
            filters.types = BTreeSet::from([FilterType::All]);
        }
        filters
    }

    pub fn active(&self) -> Vec<FilterType> {
        self.types.iter().copied().collect()
    }

    pub fn toggle(&mut self, filter: FilterType) {
        if filter == FilterType::All {
            self.enable_only(FilterType::All);
            return;
        }

        self.types.remove(&FilterType::All);
        if !self.types.remove(&filter) {
            self.types.insert(filter);
        }
        if self.types.is_empty() {
            self.types.insert(FilterType::All);
        }
    }

    pub fn enable_only(&mut self, filter: FilterType) {
        self.types = BTreeSet::from([filter]);
    }

    pub fn set_text(&mut self, text: String) {
        self.text = text;
    }

    /// A record passes when any enabled category matches it and it matches
    /// the free text.
    pub fn matches(&self, r: &Record) -> bool {
        self.types.iter().any(|f| f.matches(r)) && is_freetext_match(r, &self.text)
    }
}
