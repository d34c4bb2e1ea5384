use std::path::Path;

use anyhow::{Context, Result};

use luminacal_core::backup::{MergeStrategy, parse_backup};
use luminacal_core::service::LuminaService;

pub(crate) fn cmd_import(
    svc: &LuminaService,
    path: &Path,
    strategy: &str,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let strategy: MergeStrategy = strategy.parse()?;
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read backup: {}", path.display()))?;

    if dry_run {
        let backup = parse_backup(&contents)?;
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "dry_run": true,
                    "valid": true,
                    "export_date": backup.export_date,
                    "app_version": backup.app_version,
                    "meals": backup.meals.len(),
                    "weights": backup.weight_history.len(),
                })
            );
        } else {
            println!("Dry run — no changes made.\n");
            println!("  Exported:  {} (v{})", backup.export_date, backup.app_version);
            println!("  Meals:     {}", backup.meals.len());
            println!("  Weights:   {}", backup.weight_history.len());
        }
        return Ok(());
    }

    let summary = svc.import_json(&contents, strategy)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Import complete ({strategy}).\n");
        println!(
            "  Meals:   {} inserted, {} replaced, {} skipped",
            summary.meals_inserted, summary.meals_replaced, summary.meals_skipped
        );
        println!(
            "  Weights: {} inserted, {} replaced, {} skipped",
            summary.weights_inserted, summary.weights_replaced, summary.weights_skipped
        );
        println!(
            "  Profile: {}",
            if summary.health_metrics_applied {
                "replaced from backup"
            } else {
                "kept"
            }
        );
    }

    Ok(())
}
