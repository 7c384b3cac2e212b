//! Edit and resend a request from a capture

use super::{load_capture, output};
use crate::config::Config;
use crate::monitor::{
    BodyFetcher, CaptureFetcher, CustomEdit, HttpResendTransport, NetMonitor,
};
use anyhow::{bail, Context, Result};
use console::style;
use netmon_common::{Header, RequestId};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

pub struct ResendOptions {
    pub capture: PathBuf,
    pub id: String,
    pub method: Option<String>,
    pub url: Option<String>,
    pub headers: Vec<String>,
    pub body: Option<String>,
    pub dry_run: bool,
}

pub async fn run(opts: ResendOptions) -> Result<()> {
    let config = Config::load()?;
    let capture = load_capture(&opts.capture)?;

    let fetcher: Arc<dyn BodyFetcher> = Arc::new(CaptureFetcher::from_capture(&capture));
    let mut options = config.panel_options();
    options.lazy_update = false;
    let mut panel = NetMonitor::new(Arc::clone(&fetcher), options);

    for event in capture.events {
        panel.handle_event(event);
    }
    panel.settle().await;

    let Some(original) = panel.state().request_by_id(&opts.id).cloned() else {
        bail!("Request not found in capture: {}", opts.id);
    };

    panel.select_item(Some(RequestId::from(opts.id.as_str())));
    panel.clone_selected_request();

    let headers = if opts.headers.is_empty() {
        None
    } else {
        let mut headers = original
            .request_headers
            .as_ref()
            .map(|h| h.headers.clone())
            .unwrap_or_default();
        for raw in &opts.headers {
            set_header(&mut headers, parse_header(raw)?);
        }
        Some(headers)
    };
    panel.update_selected_custom(CustomEdit {
        method: opts.method,
        url: opts.url,
        headers,
        body: opts.body,
    });

    if opts.dry_run {
        if let Some(edited) = panel.state().selected_request().cloned() {
            output::print_requests(&[Arc::clone(&edited)], Some(&edited.id), None);
        }
        panel.remove_selected_custom_request();
        println!();
        println!("{}", style("Dry run, edited copy discarded").dim());
        panel.destroy();
        return Ok(());
    }

    let (tx, mut rx) = mpsc::channel(64);
    let transport = HttpResendTransport::new(fetcher, tx).context("Failed to create HTTP client")?;
    panel.send_custom_request(Arc::new(transport));
    panel.run(&mut rx).await;

    let Some(sent) = panel.state().selected_request().cloned() else {
        bail!("Request {} could not be resent", opts.id);
    };

    println!(
        "{} {} as {}",
        style("Resent").green().bold(),
        original.url.as_deref().unwrap_or_default(),
        style(&sent.id).cyan()
    );
    println!();
    output::print_requests(&[Arc::clone(&sent)], Some(&sent.id), panel.waterfall_scale());
    if let Some(total_time) = sent.total_time {
        println!();
        println!("Completed in {}", output::format_duration(total_time));
    }

    panel.destroy();
    Ok(())
}

/// Parse a `Name: value` header argument
fn parse_header(raw: &str) -> Result<Header> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("Invalid header '{}', expected 'Name: value'", raw);
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("Invalid header '{}', name is empty", raw);
    }
    Ok(Header::new(name, value.trim()))
}

/// Replace a header of the same name, or append it
fn set_header(headers: &mut Vec<Header>, header: Header) {
    match headers
        .iter_mut()
        .find(|h| h.name.eq_ignore_ascii_case(&header.name))
    {
        Some(existing) => existing.value = header.value,
        None => headers.push(header),
    }
}
