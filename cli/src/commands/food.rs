use anyhow::Result;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use luminacal_core::models::{MealType, NewCustomFood};
use luminacal_core::service::LuminaService;

use super::helpers::{json_error, parse_date, timestamp_for, truncate};

pub(crate) fn cmd_food_add(svc: &LuminaService, food: &NewCustomFood, json: bool) -> Result<()> {
    let food = svc.db().insert_custom_food(food)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&food)?);
    } else {
        println!(
            "Added custom food: {} (ID: {}) — {:.0} kcal per {}",
            food.name, food.id, food.calories, food.serving_size
        );
    }
    Ok(())
}

pub(crate) fn cmd_food_list(svc: &LuminaService, search: Option<&str>, json: bool) -> Result<()> {
    let foods = svc.db().list_custom_foods(search)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&foods)?);
        return Ok(());
    }

    if foods.is_empty() {
        eprintln!("No custom foods found");
        process::exit(2);
    }

    #[derive(Tabled)]
    struct FoodRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "★")]
        favorite: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Serving")]
        serving: String,
        #[tabled(rename = "Calories")]
        calories: String,
        #[tabled(rename = "P")]
        protein: String,
        #[tabled(rename = "C")]
        carbs: String,
        #[tabled(rename = "F")]
        fat: String,
        #[tabled(rename = "Uses")]
        uses: i64,
    }

    let rows: Vec<FoodRow> = foods
        .iter()
        .map(|f| FoodRow {
            id: f.id,
            favorite: if f.is_favorite { "★".into() } else { String::new() },
            name: truncate(&f.name, 35),
            serving: truncate(&f.serving_size, 15),
            calories: format!("{:.0}", f.calories),
            protein: format!("{:.1}", f.protein),
            carbs: format!("{:.1}", f.carbs),
            fat: format!("{:.1}", f.fat),
            uses: f.use_count,
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_food_favorite(svc: &LuminaService, id: i64, json: bool) -> Result<()> {
    let food = svc.db().toggle_favorite(id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&food)?);
    } else if food.is_favorite {
        println!("Marked {} as favorite", food.name);
    } else {
        println!("Removed {} from favorites", food.name);
    }
    Ok(())
}

pub(crate) fn cmd_food_use(
    svc: &LuminaService,
    id: i64,
    servings: f64,
    meal_type: &str,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    let meal_type: MealType = meal_type.parse()?;
    let date = parse_date(date)?;
    let meal = svc.log_custom_food(id, meal_type, servings, timestamp_for(date))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&meal)?);
    } else {
        println!(
            "Logged {servings} × {} ({:.0} kcal) for {}",
            meal.name, meal.calories, meal.meal_type
        );
    }
    Ok(())
}

pub(crate) fn cmd_food_delete(svc: &LuminaService, id: i64, json: bool) -> Result<()> {
    if svc.db().delete_custom_food(id)? {
        if json {
            println!("{}", serde_json::json!({ "deleted": id }));
        } else {
            println!("Deleted custom food {id}");
        }
        Ok(())
    } else {
        if json {
            println!("{}", json_error(&format!("Custom food {id} not found")));
        } else {
            eprintln!("Custom food {id} not found");
        }
        process::exit(2);
    }
}
