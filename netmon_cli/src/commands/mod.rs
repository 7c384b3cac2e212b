//! Command implementations

pub mod config;
pub mod convert;
pub mod output;
pub mod replay;
pub mod resend;

use anyhow::{Context, Result};
use netmon_common::Capture;
use std::fs;
use std::path::Path;

fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Read a capture file: JSON for `.json`, MessagePack otherwise
pub fn load_capture(path: &Path) -> Result<Capture> {
    let capture = if is_json(path) {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read capture {}", path.display()))?;
        Capture::from_json(&content)
    } else {
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read capture {}", path.display()))?;
        Capture::from_bytes(&bytes)
    };
    capture.with_context(|| format!("Failed to parse capture {}", path.display()))
}

/// Write a capture file in the format its extension names
pub fn save_capture(capture: &Capture, path: &Path) -> Result<()> {
    let bytes = if is_json(path) {
        capture.to_json()?.into_bytes()
    } else {
        capture.to_bytes()?
    };
    fs::write(path, bytes).with_context(|| format!("Failed to write capture {}", path.display()))
}
