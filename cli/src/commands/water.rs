use anyhow::Result;

use luminacal_core::service::LuminaService;

use super::helpers::{parse_date, timestamp_for};

pub(crate) fn cmd_water_add(
    svc: &LuminaService,
    amount_ml: i64,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let entry = svc.db().add_water(amount_ml, timestamp_for(date))?;
    let total = svc.db().water_total_for_date(date)?;
    let target = svc.db().health_metrics()?.water_target_ml;

    if json {
        println!(
            "{}",
            serde_json::json!({ "entry": entry, "total_ml": total, "target_ml": target })
        );
    } else {
        println!(
            "Added {amount_ml} ml for {} ({total} / {target} ml)",
            entry.date
        );
    }
    Ok(())
}

pub(crate) fn cmd_water_show(svc: &LuminaService, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let entries = svc.db().water_for_date(date)?;
    let total: i64 = entries.iter().map(|e| e.amount_ml).sum();
    let target = svc.db().health_metrics()?.water_target_ml;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "date": date.format("%Y-%m-%d").to_string(),
                "entries": entries,
                "total_ml": total,
                "target_ml": target,
            }))?
        );
        return Ok(());
    }

    #[allow(clippy::cast_precision_loss)]
    let pct = if target > 0 {
        total as f64 / target as f64 * 100.0
    } else {
        0.0
    };
    println!(
        "{}: {total} / {target} ml ({pct:.0}%) across {} entr{}",
        date.format("%Y-%m-%d"),
        entries.len(),
        if entries.len() == 1 { "y" } else { "ies" }
    );
    Ok(())
}

pub(crate) fn cmd_water_clear(
    svc: &LuminaService,
    date: Option<String>,
    all: bool,
    json: bool,
) -> Result<()> {
    let (deleted, scope) = if all {
        (svc.db().delete_all_water()?, "all days".to_string())
    } else {
        let date = parse_date(date)?;
        (
            svc.db().delete_water_for_date(date)?,
            date.format("%Y-%m-%d").to_string(),
        )
    };

    if json {
        println!("{}", serde_json::json!({ "deleted": deleted }));
    } else {
        println!("Deleted {deleted} water entr{} for {scope}", if deleted == 1 { "y" } else { "ies" });
    }
    Ok(())
}
