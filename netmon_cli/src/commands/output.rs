//! Terminal rendering of the request table and footer

use crate::monitor::{abbreviated_mime_type, extract_url_info, Record, Summary};
use console::{style, StyledObject};
use netmon_common::RequestId;
use std::sync::Arc;

/// Print the request table, marking the selected row
pub fn print_requests(requests: &[Arc<Record>], selected: Option<&RequestId>, scale: Option<f64>) {
    println!(
        "  {:<6} {:<7} {:<32} {:<24} {:<6} {:>9} {:>9}  {}",
        "STATUS", "METHOD", "FILE", "DOMAIN", "TYPE", "TRANSFER", "SIZE", "WATERFALL"
    );
    println!("{}", "-".repeat(110));

    for record in requests {
        let marker = if selected == Some(&record.id) { ">" } else { " " };
        let status = record.status.as_deref().unwrap_or("-");
        let method = record.method.as_deref().unwrap_or("-");
        let info = record
            .url
            .as_deref()
            .map(extract_url_info)
            .unwrap_or_default();
        let mime = record
            .mime_type
            .as_deref()
            .map(abbreviated_mime_type)
            .unwrap_or_default();
        let domain = truncate(&info.host_port, 24);
        let domain = if info.is_local {
            style(domain).cyan()
        } else {
            style(domain)
        };

        println!(
            "{} {:<6} {:<7} {:<32} {:<24} {:<6} {:>9} {:>9}  {}",
            marker,
            status_style(status),
            method_style(method),
            truncate(&info.name_with_query, 32),
            domain,
            truncate(mime, 6),
            record.transferred_size.map(format_size).unwrap_or_else(|| "-".into()),
            record.content_size.map(format_size).unwrap_or_else(|| "-".into()),
            waterfall(record, scale),
        );
    }
}

pub fn print_summary(summary: Summary, total: usize) {
    println!();
    println!("{}", style(format_summary(summary)).bold());
    if total != summary.count {
        println!("{}", style(format!("{} hidden by filters", total - summary.count)).dim());
    }
}

/// Footer text, e.g. `3 requests, 12.50 KB, 0.84 s`
pub fn format_summary(summary: Summary) -> String {
    if summary.count == 0 {
        return "No requests".to_string();
    }
    format!(
        "{} {}, {:.2} KB, {:.2} s",
        summary.count,
        if summary.count == 1 { "request" } else { "requests" },
        summary.bytes as f64 / 1024.0,
        summary.millis / 1000.0
    )
}

fn method_style(method: &str) -> StyledObject<&str> {
    match method {
        "GET" => style(method).green(),
        "POST" => style(method).yellow(),
        "PUT" => style(method).blue(),
        "PATCH" => style(method).magenta(),
        "DELETE" => style(method).red(),
        "HEAD" => style(method).cyan(),
        _ => style(method).white(),
    }
}

fn status_style(status: &str) -> StyledObject<&str> {
    match status.parse::<u16>() {
        Ok(code) if code >= 500 => style(status).red(),
        Ok(code) if code >= 400 => style(status).yellow(),
        Ok(code) if code >= 300 => style(status).cyan(),
        Ok(_) => style(status).green(),
        Err(_) => style(status).dim(),
    }
}

/// Offset and duration bar, one column per 10px of waterfall
fn waterfall(record: &Record, scale: Option<f64>) -> String {
    let (Some(scale), Some(delta)) = (scale, record.started_delta_millis) else {
        return String::new();
    };
    let offset = (delta * scale / 10.0).round() as usize;
    let width = record
        .total_time
        .map(|total| ((total * scale / 10.0).round() as usize).max(1))
        .unwrap_or(1);
    let duration = record
        .total_time
        .map(format_duration)
        .unwrap_or_default();
    format!("{}{} {}", " ".repeat(offset), "█".repeat(width), duration)
}

pub fn format_size(bytes: u64) -> String {
    if bytes >= 1_000_000 {
        format!("{:.1}MB", bytes as f64 / 1_000_000.0)
    } else if bytes >= 1_000 {
        format!("{:.1}KB", bytes as f64 / 1_000.0)
    } else {
        format!("{}B", bytes)
    }
}

pub fn format_duration(ms: f64) -> String {
    if ms >= 1000.0 {
        format!("{:.1}s", ms / 1000.0)
    } else {
        format!("{}ms", ms.round() as u64)
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() > max_len && max_len > 3 {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    } else {
        s.chars().take(max_len).collect()
    }
}
