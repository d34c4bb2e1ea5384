use std::path::Path;

use anyhow::{Result, bail};
use chrono::NaiveDate;
use log::{info, warn};
use serde::Serialize;

use crate::backup::{self, DateRange, ImportError, ImportSummary, MergeStrategy};
use crate::db::{Database, OpenOptions};
use crate::health::HealthReport;
use crate::models::{
    DailySummary, HealthMetrics, Meal, MealType, NewMeal, NewScanRecord, NewWeightEntry,
    ScanRecord, Validation, WeightEntry, local_date, local_time_label, validate_calories,
    validate_health_metrics, validate_weight,
};
use crate::scan::Detection;

/// Platform reminder delivery.
///
/// The core only decides what the daily summary says; scheduling and
/// presentation belong to the host (Android `WorkManager`, a desktop
/// notifier, or a test double).
pub trait NotificationScheduler {
    fn deliver_daily_summary(&self, notice: &DailySummaryNotice) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailySummaryNotice {
    pub date: String,
    pub calories_eaten: i64,
    pub target_calories: i64,
    pub remaining_calories: i64,
    pub water_ml: i64,
    pub water_target_ml: i64,
    pub meal_count: usize,
}

impl DailySummaryNotice {
    #[must_use]
    pub fn from_summary(summary: &DailySummary) -> Self {
        let calories_eaten = summary.total_calories.round() as i64;
        Self {
            date: summary.date.clone(),
            calories_eaten,
            target_calories: summary.target_calories,
            remaining_calories: summary.target_calories - calories_eaten,
            water_ml: summary.water_ml,
            water_target_ml: summary.water_target_ml,
            meal_count: summary.meals.iter().map(|g| g.meals.len()).sum(),
        }
    }

    #[must_use]
    pub fn message(&self) -> String {
        let calories = if self.remaining_calories >= 0 {
            format!(
                "{} of {} kcal eaten, {} left",
                self.calories_eaten, self.target_calories, self.remaining_calories
            )
        } else {
            format!(
                "{} of {} kcal eaten, {} over",
                self.calories_eaten, self.target_calories, -self.remaining_calories
            )
        };
        format!(
            "{calories}. Water: {} / {} ml.",
            self.water_ml, self.water_target_ml
        )
    }
}

/// The application's repository object. Construct once and pass by reference.
pub struct LuminaService {
    db: Database,
}

impl LuminaService {
    pub fn new(db_path: &Path) -> Result<Self> {
        Self::open_with(db_path, OpenOptions::default())
    }

    pub fn open_with(db_path: &Path, options: OpenOptions) -> Result<Self> {
        let db = Database::open_with(db_path, options)?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    #[must_use]
    pub fn from_database(db: Database) -> Self {
        Self { db }
    }

    #[must_use]
    pub fn db(&self) -> &Database {
        &self.db
    }

    // --- Meals ---

    /// Log a meal. Implausible calorie counts are rejected; merely unusual
    /// ones are logged and returned alongside the meal.
    pub fn log_meal(&self, meal: &NewMeal) -> Result<(Meal, Validation)> {
        let check = validate_calories(meal.calories);
        if let Validation::Error(msg) = &check {
            bail!("{msg}");
        }
        if let Validation::Warning(msg) = &check {
            warn!("Logging '{}': {msg}", meal.name);
        }
        let mut meal = meal.clone();
        if meal.time.is_empty() {
            meal.time = local_time_label(meal.timestamp);
        }
        Ok((self.db.insert_meal(&meal)?, check))
    }

    /// Log `servings` of a saved custom food and bump its usage stats.
    pub fn log_custom_food(
        &self,
        food_id: i64,
        meal_type: MealType,
        servings: f64,
        timestamp: i64,
    ) -> Result<Meal> {
        if !servings.is_finite() || servings <= 0.0 {
            bail!("Servings must be positive");
        }
        let food = self.db.get_custom_food(food_id)?;
        let meal = self.db.in_transaction(|db| {
            let meal = db.insert_meal(&NewMeal {
                name: food.name.clone(),
                time: local_time_label(timestamp),
                calories: food.calories * servings,
                protein: food.protein * servings,
                carbs: food.carbs * servings,
                fat: food.fat * servings,
                meal_type,
                timestamp,
            })?;
            db.record_food_use(food_id, timestamp)?;
            Ok(meal)
        })?;
        Ok(meal)
    }

    /// Turn an accepted scan result into a logged meal and a scan history row.
    /// Calorie plausibility is checked the same way as [`Self::log_meal`].
    pub fn confirm_scan(
        &self,
        detection: &Detection,
        meal_type: MealType,
        image_url: Option<String>,
        timestamp: i64,
    ) -> Result<(Meal, ScanRecord, Validation)> {
        let check = validate_calories(detection.calories);
        if let Validation::Error(msg) = &check {
            bail!("{msg}");
        }
        if let Validation::Warning(msg) = &check {
            warn!("Scanned '{}': {msg}", detection.food_name);
        }
        let (meal, scan) = self.db.in_transaction(|db| {
            let meal = db.insert_meal(&NewMeal {
                name: detection.food_name.clone(),
                time: local_time_label(timestamp),
                calories: detection.calories,
                protein: detection.protein,
                carbs: detection.carbs,
                fat: detection.fat,
                meal_type,
                timestamp,
            })?;
            let scan = db.insert_scan(&NewScanRecord {
                food_name: detection.food_name.clone(),
                calories: detection.calories,
                protein: detection.protein,
                carbs: detection.carbs,
                fat: detection.fat,
                image_url,
                serving_size: detection.serving_size.clone(),
                timestamp,
            })?;
            Ok((meal, scan))
        })?;
        Ok((meal, scan, check))
    }

    // --- Body metrics ---

    /// Record a weigh-in. When it is the newest entry, the profile weight
    /// follows so derived targets stay current.
    pub fn log_weight(&self, entry: &NewWeightEntry) -> Result<(WeightEntry, Validation)> {
        let check = validate_weight(entry.weight_kg);
        if let Validation::Error(msg) = &check {
            bail!("{msg}");
        }
        let saved = self.db.in_transaction(|db| {
            let saved = db.insert_weight(entry)?;
            let is_latest = db
                .latest_weight()?
                .is_some_and(|latest| latest.id == saved.id);
            if is_latest {
                let metrics = db.health_metrics()?;
                db.save_health_metrics(&HealthMetrics {
                    weight_kg: saved.weight_kg,
                    ..metrics
                })?;
            }
            Ok(saved)
        })?;
        Ok((saved, check))
    }

    /// Save the profile. Any out-of-range field rejects the whole update;
    /// warnings are returned.
    pub fn update_health_metrics(
        &self,
        metrics: &HealthMetrics,
    ) -> Result<(HealthMetrics, Vec<Validation>)> {
        let problems = validate_health_metrics(metrics);
        if let Some(Validation::Error(msg)) = problems.iter().find(|v| v.is_error()) {
            bail!("{msg}");
        }
        if metrics.water_target_ml <= 0 {
            bail!("Water target must be positive");
        }
        let saved = self.db.save_health_metrics(metrics)?;
        Ok((saved, problems))
    }

    pub fn health_report(&self) -> Result<HealthReport> {
        Ok(self.db.health_metrics()?.report())
    }

    // --- Dashboard ---

    pub fn daily_summary(&self, date: NaiveDate) -> Result<DailySummary> {
        self.db.build_daily_summary(date)
    }

    pub fn daily_summary_for(&self, timestamp: i64) -> Result<DailySummary> {
        self.daily_summary(local_date(timestamp))
    }

    /// Build the end-of-day notice for `date` and hand it to `scheduler`.
    pub fn send_daily_summary(
        &self,
        scheduler: &dyn NotificationScheduler,
        date: NaiveDate,
    ) -> Result<DailySummaryNotice> {
        let notice = DailySummaryNotice::from_summary(&self.daily_summary(date)?);
        scheduler.deliver_daily_summary(&notice)?;
        info!("Delivered daily summary for {}", notice.date);
        Ok(notice)
    }

    // --- Backups ---

    pub fn export_csv(&self, range: DateRange) -> Result<String> {
        backup::export_csv(&self.db, range)
    }

    pub fn export_json(&self, range: DateRange) -> Result<String> {
        backup::export_json(&self.db, range)
    }

    pub fn import_json(
        &self,
        json: &str,
        strategy: MergeStrategy,
    ) -> Result<ImportSummary, ImportError> {
        backup::import_json(&self.db, json, strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::models::{ActivityLevel, FitnessGoal, Gender, NewCustomFood, day_start_millis};

    struct RecordingScheduler {
        delivered: RefCell<Vec<DailySummaryNotice>>,
        fail: bool,
    }

    impl NotificationScheduler for RecordingScheduler {
        fn deliver_daily_summary(&self, notice: &DailySummaryNotice) -> Result<()> {
            if self.fail {
                bail!("notifications disabled");
            }
            self.delivered.borrow_mut().push(notice.clone());
            Ok(())
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(date: NaiveDate, hour: i64) -> i64 {
        day_start_millis(date) + hour * 3_600_000
    }

    fn meal(name: &str, calories: f64, timestamp: i64) -> NewMeal {
        NewMeal {
            name: name.to_string(),
            time: String::new(),
            calories,
            protein: 10.0,
            carbs: 10.0,
            fat: 10.0,
            meal_type: MealType::Dinner,
            timestamp,
        }
    }

    fn detection() -> Detection {
        Detection {
            food_name: "Margherita Pizza".to_string(),
            calories: 800.0,
            protein: 32.0,
            carbs: 90.0,
            fat: 30.0,
            serving_size: Some("1 pizza".to_string()),
            confidence: Some(0.82),
        }
    }

    #[test]
    fn test_log_meal_fills_time_and_validates() {
        let svc = LuminaService::new_in_memory().unwrap();
        let ts = at(day(2024, 6, 15), 19);
        let (logged, check) = svc.log_meal(&meal("Curry", 700.0, ts)).unwrap();
        assert!(check.is_valid());
        assert_eq!(logged.time, local_time_label(ts));

        let (_, check) = svc.log_meal(&meal("Feast", 6000.0, ts)).unwrap();
        assert!(matches!(check, Validation::Warning(_)));

        assert!(svc.log_meal(&meal("Impossible", 12_000.0, ts)).is_err());
        assert_eq!(svc.db().all_meals().unwrap().len(), 2);
    }

    #[test]
    fn test_log_custom_food_scales_and_counts_use() {
        let svc = LuminaService::new_in_memory().unwrap();
        let food = svc
            .db()
            .insert_custom_food(&NewCustomFood {
                name: "Rice".to_string(),
                calories: 200.0,
                protein: 4.0,
                carbs: 44.0,
                fat: 0.5,
                serving_size: "1 cup".to_string(),
            })
            .unwrap();

        let logged = svc
            .log_custom_food(food.id, MealType::Lunch, 1.5, 42_000)
            .unwrap();
        assert!((logged.calories - 300.0).abs() < 0.01);
        assert!((logged.carbs - 66.0).abs() < 0.01);

        let food = svc.db().get_custom_food(food.id).unwrap();
        assert_eq!(food.use_count, 1);
        assert_eq!(food.last_used, Some(42_000));
        assert!(svc.log_custom_food(food.id, MealType::Lunch, 0.0, 1).is_err());
    }

    #[test]
    fn test_confirm_scan_logs_meal_and_history() {
        let svc = LuminaService::new_in_memory().unwrap();
        let ts = at(day(2024, 6, 15), 20);
        let (logged, scan, check) = svc
            .confirm_scan(
                &detection(),
                MealType::Dinner,
                Some("file:///scans/1.jpg".to_string()),
                ts,
            )
            .unwrap();

        assert!(check.is_valid());
        assert_eq!(logged.name, "Margherita Pizza");
        assert_eq!(logged.meal_type, MealType::Dinner);
        assert_eq!(scan.serving_size.as_deref(), Some("1 pizza"));
        assert_eq!(scan.image_url.as_deref(), Some("file:///scans/1.jpg"));
        assert_eq!(svc.db().recent_scans(10).unwrap().len(), 1);

        let summary = svc.daily_summary_for(ts).unwrap();
        assert!((summary.total_calories - 800.0).abs() < 0.01);
    }

    #[test]
    fn test_confirm_scan_rejects_implausible_calories() {
        let svc = LuminaService::new_in_memory().unwrap();
        let feast = Detection {
            calories: 12_000.0,
            ..detection()
        };
        assert!(svc.confirm_scan(&feast, MealType::Dinner, None, 1_000).is_err());
        assert!(svc.db().all_meals().unwrap().is_empty());
        assert!(svc.db().recent_scans(10).unwrap().is_empty());

        let big = Detection {
            calories: 6000.0,
            ..detection()
        };
        let (_, _, check) = svc.confirm_scan(&big, MealType::Dinner, None, 2_000).unwrap();
        assert!(matches!(check, Validation::Warning(_)));
    }

    #[test]
    fn test_log_weight_is_atomic_with_profile_sync() {
        let svc = LuminaService::new_in_memory().unwrap();
        svc.db()
            .conn()
            .execute_batch(
                "CREATE TRIGGER lock_metrics BEFORE UPDATE ON health_metrics
                 BEGIN SELECT RAISE(ABORT, 'metrics locked'); END;",
            )
            .unwrap();

        let result = svc.log_weight(&NewWeightEntry {
            weight_kg: 68.0,
            date: at(day(2024, 6, 10), 7),
            note: None,
        });
        assert!(result.is_err());
        assert!(svc.db().weight_history(None).unwrap().is_empty());
        assert_eq!(svc.db().health_metrics().unwrap(), HealthMetrics::default());
    }

    #[test]
    fn test_log_weight_updates_profile_when_newest() {
        let svc = LuminaService::new_in_memory().unwrap();
        svc.log_weight(&NewWeightEntry {
            weight_kg: 68.0,
            date: at(day(2024, 6, 10), 7),
            note: None,
        })
        .unwrap();
        assert!((svc.db().health_metrics().unwrap().weight_kg - 68.0).abs() < 0.01);

        // Back-filled entry leaves the profile alone.
        svc.log_weight(&NewWeightEntry {
            weight_kg: 71.0,
            date: at(day(2024, 6, 1), 7),
            note: Some("forgot to log".to_string()),
        })
        .unwrap();
        assert!((svc.db().health_metrics().unwrap().weight_kg - 68.0).abs() < 0.01);

        assert!(
            svc.log_weight(&NewWeightEntry {
                weight_kg: 0.0,
                date: 0,
                note: None,
            })
            .is_err()
        );
    }

    #[test]
    fn test_update_health_metrics() {
        let svc = LuminaService::new_in_memory().unwrap();
        let metrics = HealthMetrics {
            weight_kg: 70.0,
            height_cm: 175.0,
            age: 25,
            gender: Gender::Male,
            activity_level: ActivityLevel::Moderate,
            fitness_goal: FitnessGoal::Maintain,
            target_weight_kg: None,
            water_target_ml: 2500,
        };
        let (_, warnings) = svc.update_health_metrics(&metrics).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(svc.health_report().unwrap().target_calories, 2593);

        let (_, warnings) = svc
            .update_health_metrics(&HealthMetrics { age: 12, ..metrics.clone() })
            .unwrap();
        assert_eq!(warnings.len(), 1);

        assert!(
            svc.update_health_metrics(&HealthMetrics {
                height_cm: 0.0,
                ..metrics
            })
            .is_err()
        );
        assert_eq!(svc.db().health_metrics().unwrap().age, 12);
    }

    #[test]
    fn test_send_daily_summary() {
        let svc = LuminaService::new_in_memory().unwrap();
        let d = day(2024, 6, 15);
        svc.log_meal(&meal("Lunch bowl", 650.0, at(d, 12))).unwrap();
        svc.log_meal(&meal("Dinner", 900.0, at(d, 19))).unwrap();
        svc.db().add_water(1500, at(d, 12)).unwrap();

        let scheduler = RecordingScheduler {
            delivered: RefCell::new(Vec::new()),
            fail: false,
        };
        let notice = svc.send_daily_summary(&scheduler, d).unwrap();
        assert_eq!(notice.calories_eaten, 1550);
        assert_eq!(notice.meal_count, 2);
        assert_eq!(notice.water_ml, 1500);
        assert_eq!(
            notice.remaining_calories,
            notice.target_calories - notice.calories_eaten
        );
        assert_eq!(scheduler.delivered.borrow().len(), 1);
        assert!(notice.message().contains("1550 of"));

        let failing = RecordingScheduler {
            delivered: RefCell::new(Vec::new()),
            fail: true,
        };
        assert!(svc.send_daily_summary(&failing, d).is_err());
    }

    #[test]
    fn test_notice_message_reports_overage() {
        let notice = DailySummaryNotice {
            date: "2024-06-15".to_string(),
            calories_eaten: 2700,
            target_calories: 2500,
            remaining_calories: -200,
            water_ml: 1000,
            water_target_ml: 2500,
            meal_count: 4,
        };
        assert_eq!(
            notice.message(),
            "2700 of 2500 kcal eaten, 200 over. Water: 1000 / 2500 ml."
        );
    }

    #[test]
    fn test_backup_round_trip_through_service() {
        let svc = LuminaService::new_in_memory().unwrap();
        svc.log_meal(&meal("Tacos", 500.0, at(day(2024, 6, 1), 18)))
            .unwrap();
        let json = svc.export_json(DateRange::all()).unwrap();

        let other = LuminaService::new_in_memory().unwrap();
        let summary = other.import_json(&json, MergeStrategy::Combine).unwrap();
        assert_eq!(summary.meals_inserted, 1);
        assert_eq!(other.export_csv(DateRange::all()).unwrap().lines().count(), 2);
    }
}
