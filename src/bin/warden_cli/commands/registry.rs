// ABOUTME: Registry command for warden-cli
// ABOUTME: Prints the build-time generated error registry as JSON or a table
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use anyhow::Context;
use serde_json::json;
use warden_core::errors::registry;

use crate::helpers::display::display_registry_table;
use crate::OutputFormat;

/// Print every registered code
pub fn print(format: OutputFormat) -> anyhow::Result<()> {
    let entries = registry::entries();
    match format {
        OutputFormat::Json => {
            let document = json!({
                "version": registry::version(),
                "entries": entries,
            });
            let rendered =
                serde_json::to_string_pretty(&document).context("rendering registry as JSON")?;
            println!("{rendered}");
        }
        OutputFormat::Table => display_registry_table(registry::version(), entries),
    }
    Ok(())
}
