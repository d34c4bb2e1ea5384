use std::path::Path;

use anyhow::{Context, Result};

use luminacal_core::backup::DateRange;
use luminacal_core::service::LuminaService;

use super::helpers::parse_optional_date;

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExportFormat {
    Csv,
    Json,
}

pub(crate) fn cmd_export(
    svc: &LuminaService,
    format: ExportFormat,
    from: Option<String>,
    to: Option<String>,
    out: Option<&Path>,
) -> Result<()> {
    let range = DateRange {
        from: parse_optional_date(from)?,
        to: parse_optional_date(to)?,
    };
    if let (Some(from), Some(to)) = (range.from, range.to) {
        anyhow::ensure!(from <= to, "--from must not be after --to");
    }

    let body = match format {
        ExportFormat::Csv => svc.export_csv(range)?,
        ExportFormat::Json => svc.export_json(range)?,
    };

    match out {
        Some(path) => {
            std::fs::write(path, &body)
                .with_context(|| format!("Failed to write export: {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None if body.ends_with('\n') => print!("{body}"),
        None => println!("{body}"),
    }
    Ok(())
}
