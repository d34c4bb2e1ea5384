use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Local, NaiveDate, NaiveTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Implements the text mapping shared by every closed enumeration we persist:
/// `as_str`, `Display`, case-insensitive `FromStr`, and the rusqlite conversions.
macro_rules! text_enum {
    ($ty:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self> {
                let lower = s.trim().to_lowercase();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == lower)
                    .ok_or_else(|| {
                        let valid: Vec<&str> = Self::ALL.iter().map(|v| v.as_str()).collect();
                        anyhow!(
                            "Invalid {} '{s}'. Must be one of: {}",
                            $label,
                            valid.join(", ")
                        )
                    })
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: anyhow::Error| FromSqlError::Other(e.into()))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

text_enum!(MealType, "meal type", {
    Breakfast => "breakfast",
    Lunch => "lunch",
    Dinner => "dinner",
    Snack => "snack",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

text_enum!(Gender, "gender", {
    Male => "male",
    Female => "female",
    Other => "other",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    Moderate,
    Active,
    ExtraActive,
}

text_enum!(ActivityLevel, "activity level", {
    Sedentary => "sedentary",
    Light => "light",
    Moderate => "moderate",
    Active => "active",
    ExtraActive => "extra_active",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessGoal {
    Lose,
    Maintain,
    Gain,
}

text_enum!(FitnessGoal, "fitness goal", {
    Lose => "lose",
    Maintain => "maintain",
    Gain => "gain",
});

// --- Entities ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    /// Display time, e.g. "08:30".
    #[serde(default)]
    pub time: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub meal_type: MealType,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct NewMeal {
    pub name: String,
    pub time: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub meal_type: MealType,
    pub timestamp: i64,
}

impl From<&Meal> for NewMeal {
    fn from(meal: &Meal) -> Self {
        Self {
            name: meal.name.clone(),
            time: meal.time.clone(),
            calories: meal.calories,
            protein: meal.protein,
            carbs: meal.carbs,
            fat: meal.fat,
            meal_type: meal.meal_type,
            timestamp: meal.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterEntry {
    pub id: i64,
    pub amount_ml: i64,
    pub timestamp: i64,
    /// Grouping key, `YYYY-MM-DD` in local time.
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightEntry {
    #[serde(default)]
    pub id: i64,
    pub weight_kg: f64,
    /// Epoch milliseconds.
    pub date: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewWeightEntry {
    pub weight_kg: f64,
    pub date: i64,
    pub note: Option<String>,
}

impl From<&WeightEntry> for NewWeightEntry {
    fn from(entry: &WeightEntry) -> Self {
        Self {
            weight_kg: entry.weight_kg,
            date: entry.date,
            note: entry.note.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFood {
    pub id: i64,
    pub name: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub serving_size: String,
    pub is_favorite: bool,
    pub last_used: Option<i64>,
    pub use_count: i64,
}

#[derive(Debug, Clone)]
pub struct NewCustomFood {
    pub name: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub serving_size: String,
}

/// The user's body attributes and goals. Stored as a single row; everything
/// derived from it (BMI, BMR, targets) lives in [`crate::health`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetrics {
    pub weight_kg: f64,
    pub height_cm: f64,
    pub age: i64,
    pub gender: Gender,
    pub activity_level: ActivityLevel,
    pub fitness_goal: FitnessGoal,
    #[serde(default)]
    pub target_weight_kg: Option<f64>,
    #[serde(default = "default_water_target_ml")]
    pub water_target_ml: i64,
}

pub const DEFAULT_WATER_TARGET_ML: i64 = 2500;

fn default_water_target_ml() -> i64 {
    DEFAULT_WATER_TARGET_ML
}

impl Default for HealthMetrics {
    fn default() -> Self {
        Self {
            weight_kg: 70.0,
            height_cm: 170.0,
            age: 25,
            gender: Gender::Other,
            activity_level: ActivityLevel::Moderate,
            fitness_goal: FitnessGoal::Maintain,
            target_weight_kg: None,
            water_target_ml: DEFAULT_WATER_TARGET_ML,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub id: i64,
    pub food_name: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub image_url: Option<String>,
    pub serving_size: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct NewScanRecord {
    pub food_name: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub image_url: Option<String>,
    pub serving_size: Option<String>,
    pub timestamp: i64,
}

/// Number of scan history rows kept after every insert.
pub const SCAN_HISTORY_LIMIT: usize = 50;

// --- Dashboard types ---

#[derive(Debug, Clone, Serialize)]
pub struct MealGroup {
    pub meal_type: MealType,
    pub meals: Vec<Meal>,
    pub subtotal_calories: f64,
    pub subtotal_protein: f64,
    pub subtotal_carbs: f64,
    pub subtotal_fat: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailySummary {
    pub date: String,
    pub meals: Vec<MealGroup>,
    pub total_calories: f64,
    pub total_protein: f64,
    pub total_carbs: f64,
    pub total_fat: f64,
    pub target_calories: i64,
    pub remaining_calories: f64,
    pub water_ml: i64,
    pub water_target_ml: i64,
}

// --- Time helpers ---

/// Local calendar date of an epoch-millisecond timestamp.
#[must_use]
pub fn local_date(timestamp_ms: i64) -> NaiveDate {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .unwrap_or_default()
        .with_timezone(&Local)
        .date_naive()
}

/// `HH:MM` in local time, the display string stored alongside meals.
#[must_use]
pub fn local_time_label(timestamp_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .unwrap_or_default()
        .with_timezone(&Local)
        .format("%H:%M")
        .to_string()
}

/// Epoch milliseconds of local midnight starting `date`.
#[must_use]
pub fn day_start_millis(date: NaiveDate) -> i64 {
    let naive = date.and_time(NaiveTime::MIN);
    naive
        .and_local_timezone(Local)
        .earliest()
        .map_or_else(|| naive.and_utc().timestamp_millis(), |dt| dt.timestamp_millis())
}

/// Half-open `[start, end)` millisecond bounds of a local day.
#[must_use]
pub fn day_bounds(date: NaiveDate) -> (i64, i64) {
    let next = date + chrono::Duration::days(1);
    (day_start_millis(date), day_start_millis(next))
}

#[must_use]
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// --- Validation ---

/// Result of checking a user-entered value against plausible ranges.
/// Forms show warnings but still accept the value; errors block saving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum Validation {
    Valid,
    Warning(String),
    Error(String),
}

impl Validation {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Valid => None,
            Self::Warning(msg) | Self::Error(msg) => Some(msg),
        }
    }
}

#[must_use]
pub fn validate_weight(weight_kg: f64) -> Validation {
    if !weight_kg.is_finite() || weight_kg <= 0.0 || weight_kg > 500.0 {
        Validation::Error("Weight must be between 0 and 500 kg".to_string())
    } else if !(30.0..=300.0).contains(&weight_kg) {
        Validation::Warning(format!("{weight_kg:.1} kg is unusual, please double-check"))
    } else {
        Validation::Valid
    }
}

#[must_use]
pub fn validate_height(height_cm: f64) -> Validation {
    if !height_cm.is_finite() || height_cm <= 0.0 || height_cm > 300.0 {
        Validation::Error("Height must be between 0 and 300 cm".to_string())
    } else if !(100.0..=250.0).contains(&height_cm) {
        Validation::Warning(format!("{height_cm:.0} cm is unusual, please double-check"))
    } else {
        Validation::Valid
    }
}

#[must_use]
pub fn validate_age(age: i64) -> Validation {
    if !(1..=150).contains(&age) {
        Validation::Error("Age must be between 1 and 150".to_string())
    } else if !(13..=100).contains(&age) {
        Validation::Warning(format!(
            "Calorie formulas are calibrated for ages 13-100 (got {age})"
        ))
    } else {
        Validation::Valid
    }
}

#[must_use]
pub fn validate_calories(calories: f64) -> Validation {
    if !calories.is_finite() || calories < 0.0 || calories > 10_000.0 {
        Validation::Error("Calories must be between 0 and 10000".to_string())
    } else if calories > 5000.0 {
        Validation::Warning(format!("{calories:.0} kcal is a lot for one entry"))
    } else {
        Validation::Valid
    }
}

/// Validate every field of a health profile, keeping only the non-valid results.
#[must_use]
pub fn validate_health_metrics(metrics: &HealthMetrics) -> Vec<Validation> {
    let mut results = vec![
        validate_weight(metrics.weight_kg),
        validate_height(metrics.height_cm),
        validate_age(metrics.age),
    ];
    if let Some(target) = metrics.target_weight_kg {
        results.push(validate_weight(target));
    }
    results.retain(|v| !v.is_valid());
    results
}

/// Reject names that are blank and nutrition values that are negative or not finite.
pub fn validate_nutrition(
    name: &str,
    calories: f64,
    protein: f64,
    carbs: f64,
    fat: f64,
) -> Result<()> {
    if name.trim().is_empty() {
        bail!("Name must not be empty");
    }
    for (label, value) in [
        ("calories", calories),
        ("protein", protein),
        ("carbs", carbs),
        ("fat", fat),
    ] {
        if !value.is_finite() || value < 0.0 {
            bail!("{label} must not be negative");
        }
    }
    Ok(())
}
