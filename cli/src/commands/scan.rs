use anyhow::Result;
use chrono::{DateTime, Local};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use luminacal_core::models::MealType;
use luminacal_core::scan::Detection;
use luminacal_core::service::LuminaService;

use super::helpers::{parse_date, report_validation, timestamp_for, truncate};

pub(crate) struct ScanConfirmation {
    pub detection: Detection,
    pub meal_type: String,
    pub image_url: Option<String>,
    pub date: Option<String>,
}

/// Accept a recognised food: log it as a meal and keep it in scan history.
pub(crate) fn cmd_scan_confirm(
    svc: &LuminaService,
    confirmation: ScanConfirmation,
    json: bool,
) -> Result<()> {
    let meal_type: MealType = confirmation.meal_type.parse()?;
    let date = parse_date(confirmation.date)?;
    let (meal, scan, check) = svc.confirm_scan(
        &confirmation.detection,
        meal_type,
        confirmation.image_url,
        timestamp_for(date),
    )?;
    report_validation("calories", &check);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "meal": meal, "scan": scan }))?
        );
    } else {
        println!(
            "Logged scanned {} ({:.0} kcal) for {} (meal {}, scan {})",
            meal.name, meal.calories, meal.meal_type, meal.id, scan.id
        );
    }
    Ok(())
}

pub(crate) fn cmd_scan_history(svc: &LuminaService, limit: i64, json: bool) -> Result<()> {
    let scans = svc.db().recent_scans(limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&scans)?);
        return Ok(());
    }
    if scans.is_empty() {
        eprintln!("No scans yet");
        return Ok(());
    }

    #[derive(Tabled)]
    struct ScanRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "When")]
        when: String,
        #[tabled(rename = "Food")]
        food: String,
        #[tabled(rename = "Serving")]
        serving: String,
        #[tabled(rename = "Calories")]
        calories: String,
    }

    let rows: Vec<ScanRow> = scans
        .iter()
        .map(|s| ScanRow {
            id: s.id,
            when: DateTime::from_timestamp_millis(s.timestamp)
                .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
            food: truncate(&s.food_name, 35),
            serving: s.serving_size.clone().unwrap_or_default(),
            calories: format!("{:.0}", s.calories),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_scan_clear(svc: &LuminaService, json: bool) -> Result<()> {
    let deleted = svc.db().clear_scan_history()?;
    if json {
        println!("{}", serde_json::json!({ "deleted": deleted }));
    } else {
        println!("Cleared {deleted} scan(s)");
    }
    Ok(())
}
