mod commands;
mod config;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use crate::commands::{
    ExportFormat, MealInput, ProfileUpdate, ScanConfirmation, cmd_export, cmd_food_add,
    cmd_food_delete, cmd_food_favorite, cmd_food_list, cmd_food_use, cmd_history, cmd_import,
    cmd_meal_clear, cmd_meal_delete, cmd_meal_list, cmd_meal_log, cmd_profile_set,
    cmd_profile_show, cmd_scan_clear, cmd_scan_confirm, cmd_scan_history, cmd_summary,
    cmd_water_add, cmd_water_clear, cmd_water_show, cmd_weight_delete, cmd_weight_history,
    cmd_weight_log,
};
use crate::config::Config;
use luminacal_core::db::OpenOptions;
use luminacal_core::models::{NewCustomFood, SCAN_HISTORY_LIMIT};
use luminacal_core::scan::Detection;
use luminacal_core::service::LuminaService;

#[derive(Parser)]
#[command(
    name = "luminacal",
    version,
    about = "Track meals, water and weight from the terminal"
)]
struct Cli {
    /// Database file (default: platform data directory)
    #[arg(long, global = true, env = "LUMINACAL_DB", value_name = "PATH")]
    db: Option<PathBuf>,
    /// Drop and rebuild the database if its schema cannot be migrated. Deletes all data.
    #[arg(long, global = true)]
    reset_on_migration_failure: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log and manage meals
    Meal {
        #[command(subcommand)]
        command: MealCommands,
    },
    /// Track water intake
    Water {
        #[command(subcommand)]
        command: WaterCommands,
    },
    /// Track body weight
    Weight {
        #[command(subcommand)]
        command: WeightCommands,
    },
    /// Manage saved custom foods
    Food {
        #[command(subcommand)]
        command: FoodCommands,
    },
    /// Body metrics, goals and derived targets
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Show daily summary (defaults to today)
    Summary {
        /// Date to show (YYYY-MM-DD, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show summary for the last N days
    History {
        /// Number of days to show
        #[arg(short, long, default_value = "7")]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Confirm food scans and browse scan history
    Scan {
        #[command(subcommand)]
        command: ScanCommands,
    },
    /// Export meals as CSV or a full JSON backup
    Export {
        #[command(subcommand)]
        command: ExportCommands,
    },
    /// Import a JSON backup
    Import {
        /// Path to the backup file
        file: PathBuf,
        /// How to merge with existing data: skip, overwrite, combine
        #[arg(short, long, default_value = "skip")]
        strategy: String,
        /// Validate the file without making changes
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum MealCommands {
    /// Log a meal
    Log {
        /// Meal name
        name: String,
        /// Calories (kcal)
        #[arg(long)]
        calories: f64,
        /// Protein (g)
        #[arg(long, default_value = "0")]
        protein: f64,
        /// Carbs (g)
        #[arg(long, default_value = "0")]
        carbs: f64,
        /// Fat (g)
        #[arg(long, default_value = "0")]
        fat: f64,
        /// Meal type: breakfast, lunch, dinner, snack
        #[arg(short, long, default_value = "snack")]
        meal: String,
        /// Date to log for (YYYY-MM-DD or today/yesterday, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List meals for a date
    List {
        /// Date (YYYY-MM-DD or today/yesterday, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete one or more meals by ID
    Delete {
        /// Meal IDs
        #[arg(required = true, num_args = 1..)]
        ids: Vec<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete every logged meal
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WaterCommands {
    /// Add a drink
    Add {
        /// Amount in ml
        amount_ml: i64,
        /// Date (YYYY-MM-DD or today/yesterday, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show water intake for a date
    Show {
        /// Date (YYYY-MM-DD or today/yesterday, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete water entries for a date, or everything with --all
    Clear {
        /// Date (YYYY-MM-DD or today/yesterday, default: today)
        #[arg(long, conflicts_with = "all")]
        date: Option<String>,
        /// Delete entries for every day
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WeightCommands {
    /// Log a weight entry
    Log {
        /// Weight value (number)
        value: f64,
        /// Unit: kg or lbs (default: kg)
        #[arg(short, long, default_value = "kg")]
        unit: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Optional note
        #[arg(long)]
        note: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show weight history, newest first
    History {
        /// Number of entries to show (default: all)
        #[arg(short = 'n', long)]
        limit: Option<u32>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a weight entry by ID
    Delete {
        /// Weight entry ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum FoodCommands {
    /// Save a custom food
    Add {
        /// Food name
        name: String,
        /// Calories per serving
        #[arg(long)]
        calories: f64,
        /// Protein per serving (g)
        #[arg(long, default_value = "0")]
        protein: f64,
        /// Carbs per serving (g)
        #[arg(long, default_value = "0")]
        carbs: f64,
        /// Fat per serving (g)
        #[arg(long, default_value = "0")]
        fat: f64,
        /// Serving description, e.g. "1 cup" or "170 g"
        #[arg(long, default_value = "1 serving")]
        serving: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List custom foods (favorites first)
    List {
        /// Search query to filter foods
        #[arg(short, long)]
        search: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Toggle a food's favorite flag
    Favorite {
        /// Custom food ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log servings of a custom food as a meal
    Use {
        /// Custom food ID
        id: i64,
        /// Number of servings
        #[arg(long, default_value = "1")]
        servings: f64,
        /// Meal type: breakfast, lunch, dinner, snack
        #[arg(short, long, default_value = "snack")]
        meal: String,
        /// Date (YYYY-MM-DD or today/yesterday, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a custom food
    Delete {
        /// Custom food ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Update body metrics and goals
    Set {
        /// Weight in kg
        #[arg(long)]
        weight: Option<f64>,
        /// Height in cm
        #[arg(long)]
        height: Option<f64>,
        /// Age in years
        #[arg(long)]
        age: Option<i64>,
        /// Gender: male, female, other
        #[arg(long)]
        gender: Option<String>,
        /// Activity: sedentary, light, moderate, active, extra_active
        #[arg(long)]
        activity: Option<String>,
        /// Goal: lose, maintain, gain
        #[arg(long)]
        goal: Option<String>,
        /// Target weight in kg
        #[arg(long, conflicts_with = "clear_target_weight")]
        target_weight: Option<f64>,
        /// Remove the target weight
        #[arg(long)]
        clear_target_weight: bool,
        /// Daily water target in ml
        #[arg(long)]
        water_target: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show metrics with BMI, BMR, TDEE and targets
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ScanCommands {
    /// Log a recognised food as a meal and record it in scan history
    Confirm {
        /// Recognised food name
        name: String,
        /// Calories (kcal)
        #[arg(long)]
        calories: f64,
        /// Protein (g)
        #[arg(long, default_value = "0")]
        protein: f64,
        /// Carbs (g)
        #[arg(long, default_value = "0")]
        carbs: f64,
        /// Fat (g)
        #[arg(long, default_value = "0")]
        fat: f64,
        /// Serving description
        #[arg(long)]
        serving: Option<String>,
        /// Captured image location
        #[arg(long)]
        image_url: Option<String>,
        /// Meal type: breakfast, lunch, dinner, snack
        #[arg(short, long, default_value = "snack")]
        meal: String,
        /// Date (YYYY-MM-DD or today/yesterday, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recent scans
    History {
        /// Number of scans to show
        #[arg(short = 'n', long, default_value_t = SCAN_HISTORY_LIMIT as i64)]
        limit: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete all scan history
    Clear {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ExportCommands {
    /// Export meals as CSV
    Csv {
        /// First date to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Last date to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Export a JSON backup (profile, meals, weights)
    Json {
        /// First date to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// Last date to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.db)?;
    log::debug!("using database {}", config.db_path.display());
    let svc = LuminaService::open_with(
        &config.db_path,
        OpenOptions {
            destructive_fallback: cli.reset_on_migration_failure,
        },
    )?;

    match cli.command {
        Commands::Meal { command } => match command {
            MealCommands::Log {
                name,
                calories,
                protein,
                carbs,
                fat,
                meal,
                date,
                json,
            } => cmd_meal_log(
                &svc,
                MealInput {
                    name,
                    calories,
                    protein,
                    carbs,
                    fat,
                    meal_type: meal,
                    date,
                },
                json,
            ),
            MealCommands::List { date, json } => cmd_meal_list(&svc, date, json),
            MealCommands::Delete { ids, json } => cmd_meal_delete(&svc, &ids, json),
            MealCommands::Clear { yes, json } => {
                if !yes {
                    bail!("This deletes every logged meal. Re-run with --yes to confirm");
                }
                cmd_meal_clear(&svc, json)
            }
        },
        Commands::Water { command } => match command {
            WaterCommands::Add {
                amount_ml,
                date,
                json,
            } => cmd_water_add(&svc, amount_ml, date, json),
            WaterCommands::Show { date, json } => cmd_water_show(&svc, date, json),
            WaterCommands::Clear { date, all, json } => cmd_water_clear(&svc, date, all, json),
        },
        Commands::Weight { command } => match command {
            WeightCommands::Log {
                value,
                unit,
                date,
                note,
                json,
            } => cmd_weight_log(&svc, value, &unit, date, note, json),
            WeightCommands::History { limit, json } => cmd_weight_history(&svc, limit, json),
            WeightCommands::Delete { id, json } => cmd_weight_delete(&svc, id, json),
        },
        Commands::Food { command } => match command {
            FoodCommands::Add {
                name,
                calories,
                protein,
                carbs,
                fat,
                serving,
                json,
            } => cmd_food_add(
                &svc,
                &NewCustomFood {
                    name,
                    calories,
                    protein,
                    carbs,
                    fat,
                    serving_size: serving,
                },
                json,
            ),
            FoodCommands::List { search, json } => cmd_food_list(&svc, search.as_deref(), json),
            FoodCommands::Favorite { id, json } => cmd_food_favorite(&svc, id, json),
            FoodCommands::Use {
                id,
                servings,
                meal,
                date,
                json,
            } => cmd_food_use(&svc, id, servings, &meal, date, json),
            FoodCommands::Delete { id, json } => cmd_food_delete(&svc, id, json),
        },
        Commands::Profile { command } => match command {
            ProfileCommands::Set {
                weight,
                height,
                age,
                gender,
                activity,
                goal,
                target_weight,
                clear_target_weight,
                water_target,
                json,
            } => cmd_profile_set(
                &svc,
                ProfileUpdate {
                    weight_kg: weight,
                    height_cm: height,
                    age,
                    gender,
                    activity,
                    goal,
                    target_weight_kg: target_weight,
                    clear_target_weight,
                    water_target_ml: water_target,
                },
                json,
            ),
            ProfileCommands::Show { json } => cmd_profile_show(&svc, json),
        },
        Commands::Summary { date, json } => cmd_summary(&svc, date, json),
        Commands::History { days, json } => cmd_history(&svc, days, json),
        Commands::Scan { command } => match command {
            ScanCommands::Confirm {
                name,
                calories,
                protein,
                carbs,
                fat,
                serving,
                image_url,
                meal,
                date,
                json,
            } => cmd_scan_confirm(
                &svc,
                ScanConfirmation {
                    detection: Detection {
                        food_name: name,
                        calories,
                        protein,
                        carbs,
                        fat,
                        serving_size: serving,
                        confidence: None,
                    },
                    meal_type: meal,
                    image_url,
                    date,
                },
                json,
            ),
            ScanCommands::History { limit, json } => cmd_scan_history(&svc, limit, json),
            ScanCommands::Clear { json } => cmd_scan_clear(&svc, json),
        },
        Commands::Export { command } => match command {
            ExportCommands::Csv { from, to, out } => {
                cmd_export(&svc, ExportFormat::Csv, from, to, out.as_deref())
            }
            ExportCommands::Json { from, to, out } => {
                cmd_export(&svc, ExportFormat::Json, from, to, out.as_deref())
            }
        },
        Commands::Import {
            file,
            strategy,
            dry_run,
            json,
        } => cmd_import(&svc, &file, &strategy, dry_run, json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_meal_log() {
        let cli = Cli::try_parse_from([
            "luminacal",
            "--db",
            "/tmp/x.db",
            "meal",
            "log",
            "Oatmeal",
            "--calories",
            "150",
            "-m",
            "breakfast",
        ])
        .unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        match cli.command {
            Commands::Meal {
                command:
                    MealCommands::Log {
                        name,
                        calories,
                        meal,
                        ..
                    },
            } => {
                assert_eq!(name, "Oatmeal");
                assert!((calories - 150.0).abs() < f64::EPSILON);
                assert_eq!(meal, "breakfast");
            }
            _ => panic!("expected meal log"),
        }
    }

    #[test]
    fn test_parse_import_defaults_to_skip() {
        let cli = Cli::try_parse_from(["luminacal", "import", "backup.json"]).unwrap();
        match cli.command {
            Commands::Import {
                strategy, dry_run, ..
            } => {
                assert_eq!(strategy, "skip");
                assert!(!dry_run);
            }
            _ => panic!("expected import"),
        }
    }

    #[test]
    fn test_water_clear_date_conflicts_with_all() {
        let result = Cli::try_parse_from([
            "luminacal",
            "water",
            "clear",
            "--all",
            "--date",
            "today",
        ]);
        assert!(result.is_err());
    }
}
