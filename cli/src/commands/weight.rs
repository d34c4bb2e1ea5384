use anyhow::{Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use luminacal_core::models::{NewWeightEntry, date_key, local_date};
use luminacal_core::service::LuminaService;

use super::helpers::{no_neg_zero, parse_date, report_validation, timestamp_for};

const LBS_PER_KG: f64 = 2.20462;
const KG_PER_LB: f64 = 0.453_592;

pub(crate) fn to_kg(value: f64, unit: &str) -> Result<f64> {
    match unit.to_lowercase().as_str() {
        "kg" => Ok(value),
        "lbs" | "lb" => Ok(no_neg_zero(value * KG_PER_LB)),
        _ => bail!("Invalid unit '{unit}'. Use 'kg' or 'lbs'"),
    }
}

pub(crate) fn cmd_weight_log(
    svc: &LuminaService,
    value: f64,
    unit: &str,
    date: Option<String>,
    note: Option<String>,
    json: bool,
) -> Result<()> {
    if value <= 0.0 {
        bail!("Weight must be greater than 0");
    }

    let weight_kg = to_kg(value, unit)?;
    if !unit.eq_ignore_ascii_case("kg") {
        eprintln!("Converting {value:.1} lbs → {weight_kg:.2} kg");
    }

    let date = parse_date(date)?;
    let (entry, check) = svc.log_weight(&NewWeightEntry {
        weight_kg,
        date: timestamp_for(date),
        note,
    })?;
    report_validation("weight", &check);

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!(
            "Logged {:.1} kg ({:.1} lbs) for {}",
            entry.weight_kg,
            entry.weight_kg * LBS_PER_KG,
            date_key(local_date(entry.date))
        );
        if let Some(ref n) = entry.note {
            println!("  Note: {n}");
        }
    }

    Ok(())
}

pub(crate) fn cmd_weight_history(svc: &LuminaService, limit: Option<u32>, json: bool) -> Result<()> {
    let entries = svc.db().weight_history(limit.map(i64::from))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        eprintln!("No weight entries found. Use `luminacal weight log` to record your weight.");
    } else {
        #[derive(Tabled)]
        struct WeightRow {
            #[tabled(rename = "ID")]
            id: i64,
            #[tabled(rename = "Date")]
            date: String,
            #[tabled(rename = "Weight (kg)")]
            kg: String,
            #[tabled(rename = "Weight (lbs)")]
            lbs: String,
            #[tabled(rename = "Note")]
            note: String,
        }

        let rows: Vec<WeightRow> = entries
            .iter()
            .map(|e| WeightRow {
                id: e.id,
                date: date_key(local_date(e.date)),
                kg: format!("{:.1}", e.weight_kg),
                lbs: format!("{:.1}", e.weight_kg * LBS_PER_KG),
                note: e.note.clone().unwrap_or_default(),
            })
            .collect();

        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }

    Ok(())
}

pub(crate) fn cmd_weight_delete(svc: &LuminaService, id: i64, json: bool) -> Result<()> {
    svc.db().delete_weight(id)?;

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted weight entry {id}");
    }

    Ok(())
}
