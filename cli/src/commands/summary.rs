use anyhow::Result;
use chrono::Local;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use luminacal_core::service::LuminaService;

use super::helpers::{no_neg_zero, parse_date};

pub(crate) fn cmd_summary(svc: &LuminaService, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let summary = svc.daily_summary(date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if summary.meals.is_empty() && summary.water_ml == 0 {
        let date = &summary.date;
        eprintln!("No entries for {date}");
        process::exit(2);
    }

    let date = &summary.date;
    println!("=== {date} ===\n");

    for group in &summary.meals {
        let label = group.meal_type.as_str().to_uppercase();
        let sub_cal = group.subtotal_calories;
        println!("  {label} ({sub_cal:.0} kcal)");
        for m in &group.meals {
            println!(
                "    [{}] {} {} — {:.0} kcal | P:{:.0}g C:{:.0}g F:{:.0}g",
                m.id, m.time, m.name, m.calories, m.protein, m.carbs, m.fat
            );
        }
        println!();
    }

    let total_cal = summary.total_calories;
    let total_p = summary.total_protein;
    let total_c = summary.total_carbs;
    let total_f = summary.total_fat;
    println!("  TOTAL: {total_cal:.0} kcal | P:{total_p:.0}g C:{total_c:.0}g F:{total_f:.0}g");
    println!("  TARGET: {} kcal", summary.target_calories);
    let remaining = no_neg_zero(summary.remaining_calories);
    println!("  REMAINING: {remaining:.0} kcal");
    println!("  WATER: {} / {} ml", summary.water_ml, summary.water_target_ml);

    Ok(())
}

pub(crate) fn cmd_history(svc: &LuminaService, days: u32, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Target")]
        target: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
        #[tabled(rename = "Water")]
        water: String,
    }

    let today = Local::now().date_naive();
    let mut summaries = Vec::new();

    for i in 0..days {
        let date = today - chrono::Duration::days(i64::from(i));
        summaries.push(svc.daily_summary(date)?);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.iter().all(|s| s.meals.is_empty() && s.water_ml == 0) {
        eprintln!("No entries in the last {days} days");
        process::exit(2);
    }

    let rows: Vec<HistoryRow> = summaries
        .iter()
        .map(|s| HistoryRow {
            date: s.date.clone(),
            calories: format!("{:.0}", no_neg_zero(s.total_calories)),
            target: s.target_calories.to_string(),
            protein: format!("{:.0}g", no_neg_zero(s.total_protein)),
            carbs: format!("{:.0}g", no_neg_zero(s.total_carbs)),
            fat: format!("{:.0}g", no_neg_zero(s.total_fat)),
            water: format!("{} ml", s.water_ml),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}
