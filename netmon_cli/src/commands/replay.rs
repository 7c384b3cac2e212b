//! Replay a capture through the panel and print the resulting request list

use super::{load_capture, output};
use crate::config::Config;
use crate::monitor::{CaptureFetcher, FilterType, NetMonitor, PanelEvent, SortType};
use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::mpsc;
use tracing::debug;

pub struct ReplayOptions {
    pub capture: PathBuf,
    pub filters: Vec<FilterType>,
    pub only: Option<FilterType>,
    pub search: Option<String>,
    pub sort: Option<SortType>,
    pub descending: bool,
    pub sync: bool,
    pub width: Option<f64>,
    pub save_filters: bool,
}

pub async fn run(opts: ReplayOptions) -> Result<()> {
    let mut config = Config::load()?;
    let capture = load_capture(&opts.capture)?;

    let mut options = config.panel_options();
    if !opts.filters.is_empty() {
        options.filters = opts.filters;
    }
    options.lazy_update = !opts.sync;

    let fetcher = Arc::new(CaptureFetcher::from_capture(&capture));
    let mut panel = NetMonitor::new(fetcher, options);
    let mut events = panel.subscribe();

    if let Some(filter) = opts.only {
        panel.enable_filter_type_only(filter);
    }
    if let Some(text) = opts.search {
        panel.set_filter_text(text);
    }
    if let Some(sort) = opts.sort {
        panel.sort_by(sort);
        if opts.descending {
            panel.sort_by(sort);
        }
    }
    if let Some(width) = opts.width {
        panel.resize_waterfall(width);
    }

    let event_count = capture.events.len();
    let (tx, mut rx) = mpsc::channel(256);
    let feeder = tokio::spawn(async move {
        for event in capture.events {
            if tx.send(event).await.is_err() {
                break;
            }
        }
    });

    panel.run(&mut rx).await;
    feeder.await.context("Capture replay task failed")?;

    let mut added = 0;
    let mut thumbnails = 0;
    loop {
        match events.try_recv() {
            Ok(PanelEvent::RequestAdded(_)) => added += 1,
            Ok(PanelEvent::ThumbnailDisplayed(_)) => thumbnails += 1,
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }
    debug!(
        "Replayed {} events: {} requests added, {} thumbnails",
        event_count, added, thumbnails
    );

    let displayed = panel.displayed_requests();
    output::print_requests(
        &displayed,
        panel.state().selected_item(),
        panel.waterfall_scale(),
    );
    output::print_summary(panel.summary(), panel.state().requests().len());

    let filters = panel.destroy();
    if opts.save_filters {
        config.set_filters(filters);
        config.save()?;
        println!(
            "{} {}",
            style("Saved filters:").dim(),
            config
                .filters
                .iter()
                .map(FilterType::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    Ok(())
}
