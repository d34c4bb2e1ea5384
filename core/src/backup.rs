//! CSV/JSON export and JSON backup import.
//!
//! Imports are parse-then-commit: the whole file is deserialized and every
//! record validated before the first write, and all writes share one
//! transaction.

use std::collections::HashSet;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use chrono::{Local, NaiveDate};
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::Database;
use crate::models::{
    HealthMetrics, Meal, NewMeal, NewWeightEntry, Validation, WeightEntry, date_key, local_date,
    validate_calories, validate_health_metrics, validate_nutrition, validate_weight,
};

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const CSV_HEADER: [&str; 7] = ["Date", "Name", "Calories", "Protein", "Carbs", "Fat", "Type"];

/// Inclusive local-date range. Missing bounds are open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub export_date: String,
    pub app_version: String,
    pub health_metrics: HealthMetrics,
    #[serde(default)]
    pub meals: Vec<Meal>,
    #[serde(default)]
    pub weight_history: Vec<WeightEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Insert only records whose key is not already present.
    #[default]
    SkipDuplicates,
    /// Replace existing records that share a key.
    Overwrite,
    /// Keep everything and append the imported records.
    Combine,
}

impl MergeStrategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MergeStrategy::SkipDuplicates => "skip",
            MergeStrategy::Overwrite => "overwrite",
            MergeStrategy::Combine => "combine",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "skip" | "skip_duplicates" | "skip-duplicates" => Ok(MergeStrategy::SkipDuplicates),
            "overwrite" => Ok(MergeStrategy::Overwrite),
            "combine" => Ok(MergeStrategy::Combine),
            other => Err(anyhow!(
                "Invalid merge strategy '{other}'. Must be one of: skip, overwrite, combine"
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Invalid backup: {message}")]
    InvalidBackup { message: String },
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ImportError {
    fn invalid(message: impl Into<String>) -> Self {
        ImportError::InvalidBackup {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub strategy: MergeStrategy,
    pub meals_inserted: usize,
    pub meals_replaced: usize,
    pub meals_skipped: usize,
    pub weights_inserted: usize,
    pub weights_replaced: usize,
    pub weights_skipped: usize,
    pub health_metrics_applied: bool,
}

// --- Export ---

/// Write `meals` as CSV with a header row.
pub fn write_csv<W: Write>(meals: &[Meal], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(CSV_HEADER)?;
    for meal in meals {
        wtr.write_record([
            date_key(local_date(meal.timestamp)),
            meal.name.clone(),
            format!("{:.0}", meal.calories),
            format!("{:.1}", meal.protein),
            format!("{:.1}", meal.carbs),
            format!("{:.1}", meal.fat),
            meal.meal_type.to_string(),
        ])?;
    }
    wtr.flush().context("Failed to write CSV")?;
    Ok(())
}

pub fn export_csv(db: &Database, range: DateRange) -> Result<String> {
    let meals = db.meals_between(range.from, range.to)?;
    let mut buf = Vec::new();
    write_csv(&meals, &mut buf)?;
    String::from_utf8(buf).context("CSV output was not UTF-8")
}

pub fn export_backup(db: &Database, range: DateRange) -> Result<Backup> {
    Ok(Backup {
        export_date: Local::now().to_rfc3339(),
        app_version: APP_VERSION.to_string(),
        health_metrics: db.health_metrics()?,
        meals: db.meals_between(range.from, range.to)?,
        weight_history: db.weights_between(range.from, range.to)?,
    })
}

pub fn export_json(db: &Database, range: DateRange) -> Result<String> {
    let backup = export_backup(db, range)?;
    serde_json::to_string_pretty(&backup).context("Failed to serialize backup")
}

// --- Import ---

/// Deserialize and validate a backup without touching the database.
pub fn parse_backup(json: &str) -> Result<Backup, ImportError> {
    let backup: Backup =
        serde_json::from_str(json).map_err(|e| ImportError::invalid(e.to_string()))?;
    validate_backup(&backup)?;
    Ok(backup)
}

fn validate_backup(backup: &Backup) -> Result<(), ImportError> {
    if backup.app_version.trim().is_empty() {
        return Err(ImportError::invalid("appVersion is missing"));
    }
    if let Some(problem) = validate_health_metrics(&backup.health_metrics)
        .into_iter()
        .find(Validation::is_error)
    {
        let message = problem.message().unwrap_or_default();
        return Err(ImportError::invalid(format!("healthMetrics: {message}")));
    }
    if backup.health_metrics.water_target_ml <= 0 {
        return Err(ImportError::invalid(
            "healthMetrics: Water target must be positive",
        ));
    }
    for (i, meal) in backup.meals.iter().enumerate() {
        validate_nutrition(&meal.name, meal.calories, meal.protein, meal.carbs, meal.fat)
            .map_err(|e| ImportError::invalid(format!("meals[{i}]: {e}")))?;
        if let Validation::Error(message) = validate_calories(meal.calories) {
            return Err(ImportError::invalid(format!("meals[{i}]: {message}")));
        }
    }
    for (i, entry) in backup.weight_history.iter().enumerate() {
        let check = validate_weight(entry.weight_kg);
        if check.is_error() {
            let message = check.message().unwrap_or_default();
            return Err(ImportError::invalid(format!("weightHistory[{i}]: {message}")));
        }
    }
    Ok(())
}

fn meal_key(meal: &Meal) -> (NaiveDate, String) {
    (local_date(meal.timestamp), meal.name.trim().to_string())
}

pub fn import_json(
    db: &Database,
    json: &str,
    strategy: MergeStrategy,
) -> Result<ImportSummary, ImportError> {
    let backup = parse_backup(json)?;
    import_backup(db, &backup, strategy)
}

/// Merge a parsed backup into the database in a single transaction.
pub fn import_backup(
    db: &Database,
    backup: &Backup,
    strategy: MergeStrategy,
) -> Result<ImportSummary, ImportError> {
    validate_backup(backup)?;

    let summary = db.in_transaction(|db| {
        let mut summary = ImportSummary {
            strategy,
            ..ImportSummary::default()
        };
        import_meals(db, &backup.meals, strategy, &mut summary)?;
        import_weights(db, &backup.weight_history, strategy, &mut summary)?;
        if strategy != MergeStrategy::SkipDuplicates {
            db.save_health_metrics(&backup.health_metrics)?;
            summary.health_metrics_applied = true;
        }
        Ok(summary)
    })?;

    info!(
        "Imported backup ({strategy}): {} meals inserted, {} replaced, {} skipped; \
         {} weights inserted, {} replaced, {} skipped",
        summary.meals_inserted,
        summary.meals_replaced,
        summary.meals_skipped,
        summary.weights_inserted,
        summary.weights_replaced,
        summary.weights_skipped,
    );
    Ok(summary)
}

fn import_meals(
    db: &Database,
    meals: &[Meal],
    strategy: MergeStrategy,
    summary: &mut ImportSummary,
) -> Result<()> {
    let existing: HashSet<(NaiveDate, String)> = db.all_meals()?.iter().map(meal_key).collect();
    let mut present = existing.clone();
    let mut cleared: HashSet<(NaiveDate, String)> = HashSet::new();

    for meal in meals {
        let key = meal_key(meal);
        match strategy {
            MergeStrategy::SkipDuplicates => {
                if present.contains(&key) {
                    summary.meals_skipped += 1;
                    continue;
                }
                summary.meals_inserted += 1;
            }
            MergeStrategy::Overwrite => {
                if existing.contains(&key) {
                    if cleared.insert(key.clone()) {
                        db.delete_meals_on(key.0, &key.1)?;
                    }
                    summary.meals_replaced += 1;
                } else {
                    summary.meals_inserted += 1;
                }
            }
            MergeStrategy::Combine => summary.meals_inserted += 1,
        }
        db.insert_meal(&NewMeal::from(meal))?;
        present.insert(key);
    }
    Ok(())
}

fn import_weights(
    db: &Database,
    weights: &[WeightEntry],
    strategy: MergeStrategy,
    summary: &mut ImportSummary,
) -> Result<()> {
    let existing: HashSet<NaiveDate> = db
        .weight_history(None)?
        .iter()
        .map(|w| local_date(w.date))
        .collect();
    let mut present = existing.clone();
    let mut cleared: HashSet<NaiveDate> = HashSet::new();

    for entry in weights {
        let key = local_date(entry.date);
        match strategy {
            MergeStrategy::SkipDuplicates => {
                if present.contains(&key) {
                    summary.weights_skipped += 1;
                    continue;
                }
                summary.weights_inserted += 1;
            }
            MergeStrategy::Overwrite => {
                if existing.contains(&key) {
                    if cleared.insert(key) {
                        db.delete_weights_on(key)?;
                    }
                    summary.weights_replaced += 1;
                } else {
                    summary.weights_inserted += 1;
                }
            }
            MergeStrategy::Combine => summary.weights_inserted += 1,
        }
        db.insert_weight(&NewWeightEntry::from(entry))?;
        present.insert(key);
    }
    Ok(())
}
