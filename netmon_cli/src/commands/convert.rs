//! Convert captures between JSON and MessagePack

use super::{load_capture, save_capture};
use anyhow::Result;
use console::style;
use std::path::Path;

pub fn run(input: &Path, output: &Path) -> Result<()> {
    let capture = load_capture(input)?;
    save_capture(&capture, output)?;

    println!(
        "{} {} events, {} long strings -> {}",
        style("Converted").green(),
        capture.events.len(),
        capture.long_strings.len(),
        output.display()
    );
    Ok(())
}
