//! Column comparators for the request list

use super::store::Record;
use super::url_info::{abbreviated_mime_type, extract_url_info};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Sortable columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortType {
    Status,
    Method,
    File,
    Domain,
    Cause,
    Type,
    Transferred,
    Size,
    Waterfall,
}

impl SortType {
    pub const ALL: [SortType; 9] = [
        SortType::Status,
        SortType::Method,
        SortType::File,
        SortType::Domain,
        SortType::Cause,
        SortType::Type,
        SortType::Transferred,
        SortType::Size,
        SortType::Waterfall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortType::Status => "status",
            SortType::Method => "method",
            SortType::File => "file",
            SortType::Domain => "domain",
            SortType::Cause => "cause",
            SortType::Type => "type",
            SortType::Transferred => "transferred",
            SortType::Size => "size",
            SortType::Waterfall => "waterfall",
        }
    }

    /// Compare two records by this column. Ties on any column other than
    /// the waterfall fall back to start time.
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let primary = match self {
            SortType::Waterfall => Ordering::Equal,
            SortType::Status => status_code(a).cmp(&status_code(b)),
            SortType::Method => a.method.cmp(&b.method),
            SortType::File => file_name(a).cmp(&file_name(b)),
            SortType::Domain => domain(a).cmp(&domain(b)),
            SortType::Cause => cause(a).cmp(cause(b)),
            SortType::Type => mime_abbrev(a).cmp(mime_abbrev(b)),
            SortType::Transferred => a.transferred_size.cmp(&b.transferred_size),
            SortType::Size => a.content_size.cmp(&b.content_size),
        };
        primary.then_with(|| waterfall(a, b))
    }
}

impl fmt::Display for SortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown sort column '{0}'")]
pub struct UnknownSortType(String);

impl FromStr for SortType {
    type Err = UnknownSortType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownSortType(s.to_string()))
    }
}

/// Unknown start times sort first
fn waterfall(a: &Record, b: &Record) -> Ordering {
    match (a.started_millis, b.started_millis) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn status_code(r: &Record) -> Option<u16> {
    r.status.as_deref().and_then(|s| s.trim().parse().ok())
}

fn file_name(r: &Record) -> String {
    r.url
        .as_deref()
        .map(|url| extract_url_info(url).name_with_query.to_lowercase())
        .unwrap_or_default()
}

fn domain(r: &Record) -> String {
    r.url
        .as_deref()
        .map(|url| extract_url_info(url).host_port.to_lowercase())
        .unwrap_or_default()
}

fn cause(r: &Record) -> &str {
    r.cause.as_ref().map(|c| c.type_name()).unwrap_or_default()
}

fn mime_abbrev(r: &Record) -> &str {
    r.mime_type
        .as_deref()
        .map(abbreviated_mime_type)
        .unwrap_or_default()
}
