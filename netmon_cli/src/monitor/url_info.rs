//! Display fields derived from a request URL and mime type

use http::Uri;
use std::net::IpAddr;

/// Parts of a URL shown in the file and domain columns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlInfo {
    /// Last path segment plus query string, `/` for directory URLs
    pub name_with_query: String,
    /// Host, with the port when one was given explicitly
    pub host_port: String,
    /// Whether the host is loopback or on a private network
    pub is_local: bool,
}

/// Extract display fields from a URL. User input and odd schemes may not
/// parse; those yield empty fields rather than an error.
pub fn extract_url_info(url: &str) -> UrlInfo {
    let Ok(uri) = url.parse::<Uri>() else {
        return UrlInfo::default();
    };
    let Some(host) = uri.host() else {
        return UrlInfo::default();
    };

    let name = uri.path().rsplit('/').next().unwrap_or_default();
    let name = if name.is_empty() { "/" } else { name };
    let name_with_query = match uri.query() {
        Some(query) => format!("{}?{}", name, query),
        None => name.to_string(),
    };

    let host_port = match uri.port_u16() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    UrlInfo {
        name_with_query,
        host_port,
        is_local: is_local_host(host),
    }
}

fn is_local_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") || host.ends_with(".local") {
        return true;
    }
    match host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => ip.is_loopback() || ip.is_private() || ip.is_link_local(),
        Ok(IpAddr::V6(ip)) => ip.is_loopback(),
        Err(_) => false,
    }
}

/// Short form of a mime type for the type column, e.g. `javascript` → `js`
pub fn abbreviated_mime_type(mime_type: &str) -> &str {
    let essence = mime_type.split(';').next().unwrap_or_default();
    let subtype = essence.split('/').nth(1).unwrap_or_default();
    let subtype = subtype.split('+').next().unwrap_or_default().trim();
    match subtype {
        "ecmascript" | "javascript" | "x-javascript" => "js",
        other => other,
    }
}
