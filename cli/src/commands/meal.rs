use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use luminacal_core::models::{MealType, NewMeal};
use luminacal_core::service::LuminaService;

use super::helpers::{json_error, parse_date, report_validation, timestamp_for, truncate};

pub(crate) struct MealInput {
    pub name: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub meal_type: String,
    pub date: Option<String>,
}

pub(crate) fn cmd_meal_log(svc: &LuminaService, input: MealInput, json: bool) -> Result<()> {
    let meal_type: MealType = input.meal_type.parse()?;
    let date = parse_date(input.date)?;
    let meal = NewMeal {
        name: input.name,
        time: String::new(),
        calories: input.calories,
        protein: input.protein,
        carbs: input.carbs,
        fat: input.fat,
        meal_type,
        timestamp: timestamp_for(date),
    };

    let (meal, check) = svc.log_meal(&meal)?;
    report_validation("calories", &check);

    if json {
        println!("{}", serde_json::to_string_pretty(&meal)?);
    } else {
        println!(
            "Logged {} ({:.0} kcal) for {} on {} at {}",
            meal.name,
            meal.calories,
            meal.meal_type,
            date.format("%Y-%m-%d"),
            meal.time
        );
    }
    Ok(())
}

pub(crate) fn cmd_meal_list(svc: &LuminaService, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let meals = svc.db().meals_for_date(date)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meals)?);
        return Ok(());
    }

    if meals.is_empty() {
        eprintln!("No meals for {}", date.format("%Y-%m-%d"));
        process::exit(2);
    }

    #[derive(Tabled)]
    struct MealRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Type")]
        meal_type: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "Protein")]
        protein: String,
        #[tabled(rename = "Carbs")]
        carbs: String,
        #[tabled(rename = "Fat")]
        fat: String,
    }

    let rows: Vec<MealRow> = meals
        .iter()
        .map(|m| MealRow {
            id: m.id,
            time: m.time.clone(),
            meal_type: m.meal_type.to_string(),
            name: truncate(&m.name, 35),
            calories: format!("{:.0}", m.calories),
            protein: format!("{:.1}g", m.protein),
            carbs: format!("{:.1}g", m.carbs),
            fat: format!("{:.1}g", m.fat),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_meal_delete(svc: &LuminaService, ids: &[i64], json: bool) -> Result<()> {
    let deleted = if let [id] = ids {
        usize::from(svc.db().delete_meal(*id)?)
    } else {
        svc.db().delete_meals(ids)?
    };

    if deleted == 0 {
        let message = format!("No meals found for id(s) {ids:?}");
        if json {
            println!("{}", json_error(&message));
        } else {
            eprintln!("{message}");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": deleted }));
    } else {
        println!("Deleted {deleted} meal(s)");
    }
    Ok(())
}

pub(crate) fn cmd_meal_clear(svc: &LuminaService, json: bool) -> Result<()> {
    let deleted = svc.db().delete_all_meals()?;
    if json {
        println!("{}", serde_json::json!({ "deleted": deleted }));
    } else {
        println!("Deleted all {deleted} meal(s)");
    }
    Ok(())
}
