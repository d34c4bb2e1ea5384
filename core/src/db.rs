use std::cell::RefCell;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use rusqlite::{Connection, params};
use tokio::sync::broadcast;

use crate::migrations;
use crate::models::{
    CustomFood, DailySummary, HealthMetrics, Meal, MealGroup, MealType, NewCustomFood, NewMeal,
    NewScanRecord, NewWeightEntry, SCAN_HISTORY_LIMIT, ScanRecord, WaterEntry, WeightEntry,
    date_key, day_bounds, day_start_millis, local_date, validate_nutrition,
};

/// Which table a write touched. Observers re-query on receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableChange {
    Meals,
    Water,
    Weight,
    CustomFoods,
    HealthMetrics,
    ScanHistory,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    /// Drop every table and rebuild when a migration fails or the file was
    /// written by a newer schema. Loses all data.
    pub destructive_fallback: bool,
}

const CHANGE_CHANNEL_CAPACITY: usize = 64;

pub struct Database {
    conn: Connection,
    changes: broadcast::Sender<TableChange>,
    /// Changes held back until the open `in_transaction` commits.
    pending: RefCell<Option<Vec<TableChange>>>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, OpenOptions::default())
    }

    pub fn open_with(path: &Path, options: OpenOptions) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        Self::init(conn, options)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, OpenOptions::default())
    }

    fn init(conn: Connection, options: OpenOptions) -> Result<Self> {
        migrations::migrate(&conn, options.destructive_fallback)?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Database {
            conn,
            changes,
            pending: RefCell::new(None),
        })
    }

    pub fn schema_version(&self) -> Result<u32> {
        migrations::user_version(&self.conn)
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Subscribe to table-level change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<TableChange> {
        self.changes.subscribe()
    }

    fn notify(&self, change: TableChange) {
        if let Some(pending) = self.pending.borrow_mut().as_mut() {
            if !pending.contains(&change) {
                pending.push(change);
            }
            return;
        }
        // No receivers is the common case outside the UI.
        let _ = self.changes.send(change);
    }

    /// Run `f` inside one transaction; any error rolls every write back.
    /// Change notifications are sent once, after a successful commit.
    pub fn in_transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        *self.pending.borrow_mut() = Some(Vec::new());
        let result = f(self).and_then(|out| {
            tx.commit()?;
            Ok(out)
        });
        let pending = self.pending.borrow_mut().take().unwrap_or_default();
        let out = result?;
        for change in pending {
            let _ = self.changes.send(change);
        }
        Ok(out)
    }

    // --- Row mappers ---

    fn meal_from_row(row: &rusqlite::Row) -> rusqlite::Result<Meal> {
        Ok(Meal {
            id: row.get(0)?,
            name: row.get(1)?,
            time: row.get(2)?,
            calories: row.get(3)?,
            protein: row.get(4)?,
            carbs: row.get(5)?,
            fat: row.get(6)?,
            meal_type: row.get(7)?,
            timestamp: row.get(8)?,
        })
    }

    fn water_from_row(row: &rusqlite::Row) -> rusqlite::Result<WaterEntry> {
        Ok(WaterEntry {
            id: row.get(0)?,
            amount_ml: row.get(1)?,
            timestamp: row.get(2)?,
            date: row.get(3)?,
        })
    }

    fn weight_from_row(row: &rusqlite::Row) -> rusqlite::Result<WeightEntry> {
        Ok(WeightEntry {
            id: row.get(0)?,
            weight_kg: row.get(1)?,
            date: row.get(2)?,
            note: row.get(3)?,
        })
    }

    fn custom_food_from_row(row: &rusqlite::Row) -> rusqlite::Result<CustomFood> {
        Ok(CustomFood {
            id: row.get(0)?,
            name: row.get(1)?,
            calories: row.get(2)?,
            protein: row.get(3)?,
            carbs: row.get(4)?,
            fat: row.get(5)?,
            serving_size: row.get(6)?,
            is_favorite: row.get(7)?,
            last_used: row.get(8)?,
            use_count: row.get(9)?,
        })
    }

    fn scan_from_row(row: &rusqlite::Row) -> rusqlite::Result<ScanRecord> {
        Ok(ScanRecord {
            id: row.get(0)?,
            food_name: row.get(1)?,
            calories: row.get(2)?,
            protein: row.get(3)?,
            carbs: row.get(4)?,
            fat: row.get(5)?,
            image_url: row.get(6)?,
            serving_size: row.get(7)?,
            timestamp: row.get(8)?,
        })
    }

    // --- Meals ---

    const MEAL_COLUMNS: &'static str =
        "id, name, time, calories, protein, carbs, fat, meal_type, timestamp";

    pub fn insert_meal(&self, meal: &NewMeal) -> Result<Meal> {
        validate_nutrition(&meal.name, meal.calories, meal.protein, meal.carbs, meal.fat)?;
        self.conn.execute(
            "INSERT INTO meals (name, time, calories, protein, carbs, fat, meal_type, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                meal.name.trim(),
                meal.time,
                meal.calories,
                meal.protein,
                meal.carbs,
                meal.fat,
                meal.meal_type,
                meal.timestamp,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.notify(TableChange::Meals);
        self.get_meal(id)
    }

    /// Insert a meal with an explicit id, replacing any existing row with that id.
    pub fn upsert_meal(&self, meal: &Meal) -> Result<Meal> {
        validate_nutrition(&meal.name, meal.calories, meal.protein, meal.carbs, meal.fat)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO meals (id, name, time, calories, protein, carbs, fat, meal_type, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                meal.id,
                meal.name.trim(),
                meal.time,
                meal.calories,
                meal.protein,
                meal.carbs,
                meal.fat,
                meal.meal_type,
                meal.timestamp,
            ],
        )?;
        self.notify(TableChange::Meals);
        self.get_meal(meal.id)
    }

    pub fn get_meal(&self, id: i64) -> Result<Meal> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM meals WHERE id = ?1", Self::MEAL_COLUMNS),
                params![id],
                Self::meal_from_row,
            )
            .context("Meal not found")
    }

    pub fn meals_for_date(&self, date: NaiveDate) -> Result<Vec<Meal>> {
        self.meals_between(Some(date), Some(date))
    }

    /// Meals whose local date falls in `[from, to]`, oldest first. `None` leaves
    /// that side of the range open.
    pub fn meals_between(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<Meal>> {
        let (start, end) = millis_range(from, to);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM meals WHERE timestamp >= ?1 AND timestamp < ?2
             ORDER BY timestamp, id",
            Self::MEAL_COLUMNS
        ))?;
        let meals = stmt
            .query_map(params![start, end], Self::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meals)
    }

    pub fn all_meals(&self) -> Result<Vec<Meal>> {
        self.meals_between(None, None)
    }

    pub fn delete_meal(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM meals WHERE id = ?1", params![id])?;
        if rows > 0 {
            self.notify(TableChange::Meals);
        }
        Ok(rows > 0)
    }

    pub fn delete_meals(&self, ids: &[i64]) -> Result<usize> {
        let mut deleted = 0;
        let mut stmt = self.conn.prepare("DELETE FROM meals WHERE id = ?1")?;
        for id in ids {
            deleted += stmt.execute(params![id])?;
        }
        if deleted > 0 {
            self.notify(TableChange::Meals);
        }
        Ok(deleted)
    }

    /// Delete meals logged on `date` under exactly `name`.
    pub fn delete_meals_on(&self, date: NaiveDate, name: &str) -> Result<usize> {
        let (start, end) = day_bounds(date);
        let rows = self.conn.execute(
            "DELETE FROM meals WHERE name = ?1 AND timestamp >= ?2 AND timestamp < ?3",
            params![name, start, end],
        )?;
        if rows > 0 {
            self.notify(TableChange::Meals);
        }
        Ok(rows)
    }

    pub fn delete_all_meals(&self) -> Result<usize> {
        let rows = self.conn.execute("DELETE FROM meals", [])?;
        self.notify(TableChange::Meals);
        Ok(rows)
    }

    // --- Water ---

    pub fn add_water(&self, amount_ml: i64, timestamp: i64) -> Result<WaterEntry> {
        if amount_ml <= 0 {
            bail!("Water amount must be positive");
        }
        let date = date_key(local_date(timestamp));
        self.conn.execute(
            "INSERT INTO water_entries (amount_ml, timestamp, date) VALUES (?1, ?2, ?3)",
            params![amount_ml, timestamp, date],
        )?;
        let id = self.conn.last_insert_rowid();
        self.notify(TableChange::Water);
        self.conn
            .query_row(
                "SELECT id, amount_ml, timestamp, date FROM water_entries WHERE id = ?1",
                params![id],
                Self::water_from_row,
            )
            .context("Water entry not found")
    }

    pub fn water_for_date(&self, date: NaiveDate) -> Result<Vec<WaterEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, amount_ml, timestamp, date FROM water_entries
             WHERE date = ?1 ORDER BY timestamp, id",
        )?;
        let entries = stmt
            .query_map(params![date_key(date)], Self::water_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn water_total_for_date(&self, date: NaiveDate) -> Result<i64> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(amount_ml), 0) FROM water_entries WHERE date = ?1",
            params![date_key(date)],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    pub fn delete_water_for_date(&self, date: NaiveDate) -> Result<usize> {
        let rows = self.conn.execute(
            "DELETE FROM water_entries WHERE date = ?1",
            params![date_key(date)],
        )?;
        if rows > 0 {
            self.notify(TableChange::Water);
        }
        Ok(rows)
    }

    pub fn delete_all_water(&self) -> Result<usize> {
        let rows = self.conn.execute("DELETE FROM water_entries", [])?;
        self.notify(TableChange::Water);
        Ok(rows)
    }

    // --- Weight Entries ---

    pub fn insert_weight(&self, entry: &NewWeightEntry) -> Result<WeightEntry> {
        if !entry.weight_kg.is_finite() || entry.weight_kg <= 0.0 {
            bail!("Weight must be positive");
        }
        self.conn.execute(
            "INSERT INTO weight_entries (weight_kg, date, note) VALUES (?1, ?2, ?3)",
            params![entry.weight_kg, entry.date, entry.note],
        )?;
        let id = self.conn.last_insert_rowid();
        self.notify(TableChange::Weight);
        self.conn
            .query_row(
                "SELECT id, weight_kg, date, note FROM weight_entries WHERE id = ?1",
                params![id],
                Self::weight_from_row,
            )
            .context("Weight entry not found")
    }

    /// Newest first, optionally capped at `limit` entries.
    pub fn weight_history(&self, limit: Option<i64>) -> Result<Vec<WeightEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, weight_kg, date, note FROM weight_entries
             ORDER BY date DESC, id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit.unwrap_or(-1)], Self::weight_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Entries in `[from, to]` by local date, oldest first.
    pub fn weights_between(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<WeightEntry>> {
        let (start, end) = millis_range(from, to);
        let mut stmt = self.conn.prepare(
            "SELECT id, weight_kg, date, note FROM weight_entries
             WHERE date >= ?1 AND date < ?2 ORDER BY date, id",
        )?;
        let entries = stmt
            .query_map(params![start, end], Self::weight_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn latest_weight(&self) -> Result<Option<WeightEntry>> {
        Ok(self.weight_history(Some(1))?.into_iter().next())
    }

    pub fn delete_weight(&self, id: i64) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM weight_entries WHERE id = ?1", params![id])?;
        if rows == 0 {
            bail!("Weight entry not found");
        }
        self.notify(TableChange::Weight);
        Ok(())
    }

    pub fn delete_weights_on(&self, date: NaiveDate) -> Result<usize> {
        let (start, end) = day_bounds(date);
        let rows = self.conn.execute(
            "DELETE FROM weight_entries WHERE date >= ?1 AND date < ?2",
            params![start, end],
        )?;
        if rows > 0 {
            self.notify(TableChange::Weight);
        }
        Ok(rows)
    }

    pub fn delete_all_weights(&self) -> Result<usize> {
        let rows = self.conn.execute("DELETE FROM weight_entries", [])?;
        self.notify(TableChange::Weight);
        Ok(rows)
    }

    // --- Custom Foods ---

    const CUSTOM_FOOD_COLUMNS: &'static str =
        "id, name, calories, protein, carbs, fat, serving_size, is_favorite, last_used, use_count";

    pub fn insert_custom_food(&self, food: &NewCustomFood) -> Result<CustomFood> {
        validate_nutrition(&food.name, food.calories, food.protein, food.carbs, food.fat)?;
        self.conn.execute(
            "INSERT INTO custom_foods (name, calories, protein, carbs, fat, serving_size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                food.name.trim(),
                food.calories,
                food.protein,
                food.carbs,
                food.fat,
                food.serving_size,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.notify(TableChange::CustomFoods);
        self.get_custom_food(id)
    }

    pub fn get_custom_food(&self, id: i64) -> Result<CustomFood> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM custom_foods WHERE id = ?1",
                    Self::CUSTOM_FOOD_COLUMNS
                ),
                params![id],
                Self::custom_food_from_row,
            )
            .context("Custom food not found")
    }

    /// Favorites first, then most recently used, then by name.
    pub fn list_custom_foods(&self, search: Option<&str>) -> Result<Vec<CustomFood>> {
        let order = "ORDER BY is_favorite DESC, last_used IS NULL, last_used DESC, name";
        let foods = if let Some(query) = search {
            let escaped = query
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_");
            let pattern = format!("%{escaped}%");
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {} FROM custom_foods WHERE name LIKE ?1 ESCAPE '\\' {order}",
                Self::CUSTOM_FOOD_COLUMNS
            ))?;
            stmt.query_map(params![pattern], Self::custom_food_from_row)?
                .collect::<Result<Vec<_>, _>>()?
        } else {
            let mut stmt = self.conn.prepare(&format!(
                "SELECT {} FROM custom_foods {order}",
                Self::CUSTOM_FOOD_COLUMNS
            ))?;
            stmt.query_map([], Self::custom_food_from_row)?
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(foods)
    }

    pub fn set_favorite(&self, id: i64, favorite: bool) -> Result<CustomFood> {
        let rows = self.conn.execute(
            "UPDATE custom_foods SET is_favorite = ?1 WHERE id = ?2",
            params![favorite, id],
        )?;
        if rows == 0 {
            bail!("Custom food not found");
        }
        self.notify(TableChange::CustomFoods);
        self.get_custom_food(id)
    }

    pub fn toggle_favorite(&self, id: i64) -> Result<CustomFood> {
        let food = self.get_custom_food(id)?;
        self.set_favorite(id, !food.is_favorite)
    }

    /// Bump the use count and stamp `last_used`.
    pub fn record_food_use(&self, id: i64, timestamp: i64) -> Result<CustomFood> {
        let rows = self.conn.execute(
            "UPDATE custom_foods SET use_count = use_count + 1, last_used = ?1 WHERE id = ?2",
            params![timestamp, id],
        )?;
        if rows == 0 {
            bail!("Custom food not found");
        }
        self.notify(TableChange::CustomFoods);
        self.get_custom_food(id)
    }

    pub fn delete_custom_food(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM custom_foods WHERE id = ?1", params![id])?;
        if rows > 0 {
            self.notify(TableChange::CustomFoods);
        }
        Ok(rows > 0)
    }

    // --- Health Metrics ---

    pub fn health_metrics(&self) -> Result<HealthMetrics> {
        self.conn
            .query_row(
                "SELECT weight_kg, height_cm, age, gender, activity_level, fitness_goal,
                        target_weight_kg, water_target_ml
                 FROM health_metrics WHERE id = 1",
                [],
                |row| {
                    Ok(HealthMetrics {
                        weight_kg: row.get(0)?,
                        height_cm: row.get(1)?,
                        age: row.get(2)?,
                        gender: row.get(3)?,
                        activity_level: row.get(4)?,
                        fitness_goal: row.get(5)?,
                        target_weight_kg: row.get(6)?,
                        water_target_ml: row.get(7)?,
                    })
                },
            )
            .context("Health metrics row missing")
    }

    pub fn save_health_metrics(&self, metrics: &HealthMetrics) -> Result<HealthMetrics> {
        self.conn.execute(
            "INSERT INTO health_metrics
                (id, weight_kg, height_cm, age, gender, activity_level, fitness_goal,
                 target_weight_kg, water_target_ml)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                weight_kg = excluded.weight_kg,
                height_cm = excluded.height_cm,
                age = excluded.age,
                gender = excluded.gender,
                activity_level = excluded.activity_level,
                fitness_goal = excluded.fitness_goal,
                target_weight_kg = excluded.target_weight_kg,
                water_target_ml = excluded.water_target_ml",
            params![
                metrics.weight_kg,
                metrics.height_cm,
                metrics.age,
                metrics.gender,
                metrics.activity_level,
                metrics.fitness_goal,
                metrics.target_weight_kg,
                metrics.water_target_ml,
            ],
        )?;
        self.notify(TableChange::HealthMetrics);
        self.health_metrics()
    }

    // --- Scan History ---

    pub fn insert_scan(&self, scan: &NewScanRecord) -> Result<ScanRecord> {
        validate_nutrition(&scan.food_name, scan.calories, scan.protein, scan.carbs, scan.fat)?;
        self.conn.execute(
            "INSERT INTO scan_history
                (food_name, calories, protein, carbs, fat, image_url, serving_size, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                scan.food_name.trim(),
                scan.calories,
                scan.protein,
                scan.carbs,
                scan.fat,
                scan.image_url,
                scan.serving_size,
                scan.timestamp,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.trim_scan_history(SCAN_HISTORY_LIMIT)?;
        self.notify(TableChange::ScanHistory);
        self.conn
            .query_row(
                "SELECT id, food_name, calories, protein, carbs, fat, image_url, serving_size, timestamp
                 FROM scan_history WHERE id = ?1",
                params![id],
                Self::scan_from_row,
            )
            .context("Scan record not found")
    }

    /// Keep only the `keep` most recent scans. Returns how many were removed.
    pub fn trim_scan_history(&self, keep: usize) -> Result<usize> {
        let keep = i64::try_from(keep).unwrap_or(i64::MAX);
        let rows = self.conn.execute(
            "DELETE FROM scan_history WHERE id NOT IN (
                SELECT id FROM scan_history ORDER BY timestamp DESC, id DESC LIMIT ?1
             )",
            params![keep],
        )?;
        if rows > 0 {
            self.notify(TableChange::ScanHistory);
        }
        Ok(rows)
    }

    pub fn recent_scans(&self, limit: i64) -> Result<Vec<ScanRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, food_name, calories, protein, carbs, fat, image_url, serving_size, timestamp
             FROM scan_history ORDER BY timestamp DESC, id DESC LIMIT ?1",
        )?;
        let scans = stmt
            .query_map(params![limit], Self::scan_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(scans)
    }

    pub fn delete_scan(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM scan_history WHERE id = ?1", params![id])?;
        if rows > 0 {
            self.notify(TableChange::ScanHistory);
        }
        Ok(rows > 0)
    }

    pub fn clear_scan_history(&self) -> Result<usize> {
        let rows = self.conn.execute("DELETE FROM scan_history", [])?;
        self.notify(TableChange::ScanHistory);
        Ok(rows)
    }

    // --- Dashboard ---

    pub fn build_daily_summary(&self, date: NaiveDate) -> Result<DailySummary> {
        let entries = self.meals_for_date(date)?;
        let mut meals: Vec<MealGroup> = Vec::new();

        for meal_type in MealType::ALL {
            let group: Vec<Meal> = entries
                .iter()
                .filter(|m| m.meal_type == *meal_type)
                .cloned()
                .collect();

            if group.is_empty() {
                continue;
            }

            meals.push(MealGroup {
                meal_type: *meal_type,
                subtotal_calories: group.iter().map(|m| m.calories).sum(),
                subtotal_protein: group.iter().map(|m| m.protein).sum(),
                subtotal_carbs: group.iter().map(|m| m.carbs).sum(),
                subtotal_fat: group.iter().map(|m| m.fat).sum(),
                meals: group,
            });
        }

        let total_calories: f64 = meals.iter().map(|m| m.subtotal_calories).sum();
        let total_protein: f64 = meals.iter().map(|m| m.subtotal_protein).sum();
        let total_carbs: f64 = meals.iter().map(|m| m.subtotal_carbs).sum();
        let total_fat: f64 = meals.iter().map(|m| m.subtotal_fat).sum();

        let metrics = self.health_metrics()?;
        let target_calories = metrics.target_calories();

        #[allow(clippy::cast_precision_loss)]
        let remaining_calories = target_calories as f64 - total_calories;

        Ok(DailySummary {
            date: date_key(date),
            meals,
            total_calories,
            total_protein,
            total_carbs,
            total_fat,
            target_calories,
            remaining_calories,
            water_ml: self.water_total_for_date(date)?,
            water_target_ml: metrics.water_target_ml,
        })
    }
}

fn millis_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> (i64, i64) {
    let start = from.map_or(i64::MIN, day_start_millis);
    let end = to.map_or(i64::MAX, |d| day_bounds(d).1);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::{MIGRATIONS, SCHEMA_VERSION, TABLES, run_chain};
    use crate::models::{ActivityLevel, FitnessGoal, Gender};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(date: NaiveDate, hour: i64) -> i64 {
        day_start_millis(date) + hour * 3_600_000
    }

    fn sample_meal(name: &str, calories: f64, timestamp: i64) -> NewMeal {
        NewMeal {
            name: name.to_string(),
            time: "12:00".to_string(),
            calories,
            protein: 20.0,
            carbs: 30.0,
            fat: 10.0,
            meal_type: MealType::Lunch,
            timestamp,
        }
    }

    fn sample_food() -> NewCustomFood {
        NewCustomFood {
            name: "Greek Yogurt".to_string(),
            calories: 100.0,
            protein: 17.0,
            carbs: 6.0,
            fat: 0.7,
            serving_size: "170 g".to_string(),
        }
    }

    #[test]
    fn test_open_in_memory_is_current() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
        assert_eq!(db.health_metrics().unwrap(), HealthMetrics::default());
    }

    #[test]
    fn test_insert_and_get_meal() {
        let db = Database::open_in_memory().unwrap();
        let ts = at(day(2024, 3, 1), 12);
        let meal = db.insert_meal(&sample_meal("Chicken Salad", 450.0, ts)).unwrap();

        assert_eq!(meal.name, "Chicken Salad");
        assert_eq!(meal.meal_type, MealType::Lunch);
        assert_eq!(meal.timestamp, ts);

        let fetched = db.get_meal(meal.id).unwrap();
        assert_eq!(fetched, meal);
    }

    #[test]
    fn test_insert_meal_rejects_negative_values() {
        let db = Database::open_in_memory().unwrap();
        let mut meal = sample_meal("Bad", 100.0, 0);
        meal.protein = -1.0;
        assert!(db.insert_meal(&meal).is_err());
        assert!(db.all_meals().unwrap().is_empty());
    }

    #[test]
    fn test_upsert_meal_replaces_by_id() {
        let db = Database::open_in_memory().unwrap();
        let meal = db.insert_meal(&sample_meal("Soup", 200.0, 1_000)).unwrap();
        let replaced = db
            .upsert_meal(&Meal {
                calories: 250.0,
                name: "Tomato Soup".to_string(),
                ..meal.clone()
            })
            .unwrap();
        assert_eq!(replaced.id, meal.id);
        assert_eq!(replaced.name, "Tomato Soup");
        assert_eq!(db.all_meals().unwrap().len(), 1);
    }

    #[test]
    fn test_get_meal_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db.get_meal(99).unwrap_err();
        assert!(err.to_string().contains("Meal not found"));
    }

    #[test]
    fn test_meals_for_date_uses_local_day() {
        let db = Database::open_in_memory().unwrap();
        let d1 = day(2024, 3, 1);
        let d2 = day(2024, 3, 2);
        db.insert_meal(&sample_meal("A", 100.0, at(d1, 8))).unwrap();
        db.insert_meal(&sample_meal("B", 200.0, at(d1, 20))).unwrap();
        db.insert_meal(&sample_meal("C", 300.0, at(d2, 9))).unwrap();

        let first = db.meals_for_date(d1).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].name, "A");
        assert_eq!(first[1].name, "B");
        assert_eq!(db.meals_for_date(d2).unwrap().len(), 1);
        assert_eq!(db.meals_between(Some(d1), None).unwrap().len(), 3);
        assert_eq!(db.meals_between(None, Some(d1)).unwrap().len(), 2);
    }

    #[test]
    fn test_delete_meals() {
        let db = Database::open_in_memory().unwrap();
        let a = db.insert_meal(&sample_meal("A", 100.0, 1)).unwrap();
        let b = db.insert_meal(&sample_meal("B", 100.0, 2)).unwrap();
        let c = db.insert_meal(&sample_meal("C", 100.0, 3)).unwrap();

        assert!(db.delete_meal(a.id).unwrap());
        assert!(!db.delete_meal(a.id).unwrap());
        assert_eq!(db.delete_meals(&[b.id, c.id, 999]).unwrap(), 2);
        assert!(db.all_meals().unwrap().is_empty());
    }

    #[test]
    fn test_delete_meals_on_matches_name_and_day() {
        let db = Database::open_in_memory().unwrap();
        let d = day(2024, 5, 10);
        db.insert_meal(&sample_meal("Pasta", 600.0, at(d, 12))).unwrap();
        db.insert_meal(&sample_meal("Pasta", 600.0, at(d, 19))).unwrap();
        db.insert_meal(&sample_meal("Pasta", 600.0, at(day(2024, 5, 11), 12)))
            .unwrap();
        db.insert_meal(&sample_meal("Salad", 200.0, at(d, 12))).unwrap();

        assert_eq!(db.delete_meals_on(d, "Pasta").unwrap(), 2);
        assert_eq!(db.all_meals().unwrap().len(), 2);
    }

    #[test]
    fn test_water_grouped_by_date() {
        let db = Database::open_in_memory().unwrap();
        let d = day(2024, 7, 4);
        db.add_water(250, at(d, 9)).unwrap();
        let entry = db.add_water(500, at(d, 15)).unwrap();
        db.add_water(300, at(day(2024, 7, 5), 9)).unwrap();

        assert_eq!(entry.date, "2024-07-04");
        assert_eq!(db.water_for_date(d).unwrap().len(), 2);
        assert_eq!(db.water_total_for_date(d).unwrap(), 750);
        assert_eq!(db.water_total_for_date(day(2024, 7, 6)).unwrap(), 0);

        assert_eq!(db.delete_water_for_date(d).unwrap(), 2);
        assert_eq!(db.water_total_for_date(d).unwrap(), 0);
        assert!(db.add_water(0, at(d, 9)).is_err());
    }

    #[test]
    fn test_weight_history_and_delete() {
        let db = Database::open_in_memory().unwrap();
        for (i, kg) in [80.0, 79.5, 79.0].iter().enumerate() {
            db.insert_weight(&NewWeightEntry {
                weight_kg: *kg,
                date: at(day(2024, 1, 1 + i as u32), 7),
                note: None,
            })
            .unwrap();
        }

        let history = db.weight_history(None).unwrap();
        assert_eq!(history.len(), 3);
        assert!((history[0].weight_kg - 79.0).abs() < 0.01);
        assert_eq!(db.weight_history(Some(2)).unwrap().len(), 2);
        assert!((db.latest_weight().unwrap().unwrap().weight_kg - 79.0).abs() < 0.01);

        let ascending = db
            .weights_between(Some(day(2024, 1, 2)), Some(day(2024, 1, 3)))
            .unwrap();
        assert_eq!(ascending.len(), 2);
        assert!((ascending[0].weight_kg - 79.5).abs() < 0.01);

        db.delete_weight(history[0].id).unwrap();
        assert!(db.delete_weight(history[0].id).is_err());
        assert_eq!(db.weight_history(None).unwrap().len(), 2);
    }

    #[test]
    fn test_insert_weight_rejects_non_positive() {
        let db = Database::open_in_memory().unwrap();
        let entry = NewWeightEntry {
            weight_kg: 0.0,
            date: 0,
            note: None,
        };
        assert!(db.insert_weight(&entry).is_err());
    }

    #[test]
    fn test_custom_food_favorites_and_use() {
        let db = Database::open_in_memory().unwrap();
        let yogurt = db.insert_custom_food(&sample_food()).unwrap();
        let oats = db
            .insert_custom_food(&NewCustomFood {
                name: "Oats".to_string(),
                ..sample_food()
            })
            .unwrap();
        assert!(!yogurt.is_favorite);
        assert_eq!(yogurt.use_count, 0);

        let used = db.record_food_use(oats.id, 5_000).unwrap();
        assert_eq!(used.use_count, 1);
        assert_eq!(used.last_used, Some(5_000));

        let listed = db.list_custom_foods(None).unwrap();
        assert_eq!(listed[0].name, "Oats");

        let fav = db.toggle_favorite(yogurt.id).unwrap();
        assert!(fav.is_favorite);
        let listed = db.list_custom_foods(None).unwrap();
        assert_eq!(listed[0].name, "Greek Yogurt");

        assert!(!db.toggle_favorite(yogurt.id).unwrap().is_favorite);
        assert!(db.set_favorite(999, true).is_err());
    }

    #[test]
    fn test_list_custom_foods_search_escapes_wildcards() {
        let db = Database::open_in_memory().unwrap();
        db.insert_custom_food(&sample_food()).unwrap();
        db.insert_custom_food(&NewCustomFood {
            name: "100% Juice".to_string(),
            ..sample_food()
        })
        .unwrap();

        assert_eq!(db.list_custom_foods(Some("yog")).unwrap().len(), 1);
        let pct = db.list_custom_foods(Some("%")).unwrap();
        assert_eq!(pct.len(), 1);
        assert_eq!(pct[0].name, "100% Juice");
        assert!(db.delete_custom_food(pct[0].id).unwrap());
    }

    #[test]
    fn test_health_metrics_upsert_keeps_single_row() {
        let db = Database::open_in_memory().unwrap();
        let metrics = HealthMetrics {
            weight_kg: 82.0,
            height_cm: 180.0,
            age: 34,
            gender: Gender::Male,
            activity_level: ActivityLevel::Active,
            fitness_goal: FitnessGoal::Lose,
            target_weight_kg: Some(76.0),
            water_target_ml: 3000,
        };
        db.save_health_metrics(&metrics).unwrap();
        db.save_health_metrics(&metrics).unwrap();
        assert_eq!(db.health_metrics().unwrap(), metrics);

        let rows: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM health_metrics", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_scan_history_trimmed() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..(SCAN_HISTORY_LIMIT as i64 + 5) {
            db.insert_scan(&NewScanRecord {
                food_name: format!("Scan {i}"),
                calories: 100.0,
                protein: 1.0,
                carbs: 1.0,
                fat: 1.0,
                image_url: None,
                serving_size: Some("1 plate".to_string()),
                timestamp: i * 1_000,
            })
            .unwrap();
        }
        let scans = db.recent_scans(1_000).unwrap();
        assert_eq!(scans.len(), SCAN_HISTORY_LIMIT);
        assert_eq!(scans[0].food_name, format!("Scan {}", SCAN_HISTORY_LIMIT + 4));
        assert_eq!(scans.last().unwrap().food_name, "Scan 5");

        assert!(db.delete_scan(scans[0].id).unwrap());
        assert_eq!(db.clear_scan_history().unwrap(), SCAN_HISTORY_LIMIT - 1);
    }

    #[test]
    fn test_build_daily_summary() {
        let db = Database::open_in_memory().unwrap();
        let d = day(2024, 2, 20);
        let mut breakfast = sample_meal("Eggs", 300.0, at(d, 8));
        breakfast.meal_type = MealType::Breakfast;
        db.insert_meal(&breakfast).unwrap();
        db.insert_meal(&sample_meal("Wrap", 500.0, at(d, 13))).unwrap();
        db.add_water(400, at(d, 10)).unwrap();

        let summary = db.build_daily_summary(d).unwrap();
        assert_eq!(summary.date, "2024-02-20");
        assert_eq!(summary.meals.len(), 2);
        assert_eq!(summary.meals[0].meal_type, MealType::Breakfast);
        assert!((summary.total_calories - 800.0).abs() < 0.01);
        assert_eq!(summary.water_ml, 400);
        assert_eq!(summary.water_target_ml, 2500);
        let target = HealthMetrics::default().target_calories();
        assert_eq!(summary.target_calories, target);
        #[allow(clippy::cast_precision_loss)]
        let expected_remaining = target as f64 - 800.0;
        assert!((summary.remaining_calories - expected_remaining).abs() < 0.01);
    }

    #[test]
    fn test_change_feed_reports_writes() {
        let db = Database::open_in_memory().unwrap();
        let mut rx = db.subscribe();
        db.insert_meal(&sample_meal("A", 100.0, 1)).unwrap();
        db.add_water(250, 1).unwrap();
        db.save_health_metrics(&HealthMetrics::default()).unwrap();

        assert_eq!(rx.try_recv().unwrap(), TableChange::Meals);
        assert_eq!(rx.try_recv().unwrap(), TableChange::Water);
        assert_eq!(rx.try_recv().unwrap(), TableChange::HealthMetrics);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_in_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<()> = db.in_transaction(|db| {
            db.insert_meal(&sample_meal("A", 100.0, 1))?;
            bail!("abort");
        });
        assert!(result.is_err());
        assert!(db.all_meals().unwrap().is_empty());

        db.in_transaction(|db| db.insert_meal(&sample_meal("B", 100.0, 1)))
            .unwrap();
        assert_eq!(db.all_meals().unwrap().len(), 1);
    }

    #[test]
    fn test_rolled_back_transaction_sends_no_changes() {
        let db = Database::open_in_memory().unwrap();
        let mut rx = db.subscribe();
        let result: Result<()> = db.in_transaction(|db| {
            db.save_health_metrics(&HealthMetrics::default())?;
            bail!("abort");
        });
        assert!(result.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_committed_transaction_sends_changes_once() {
        let db = Database::open_in_memory().unwrap();
        let mut rx = db.subscribe();
        db.in_transaction(|db| {
            db.insert_meal(&sample_meal("A", 100.0, 1))?;
            db.insert_meal(&sample_meal("B", 100.0, 2))?;
            db.add_water(250, 3)
        })
        .unwrap();
        assert_eq!(rx.try_recv().unwrap(), TableChange::Meals);
        assert_eq!(rx.try_recv().unwrap(), TableChange::Water);
        assert!(rx.try_recv().is_err());

        db.insert_meal(&sample_meal("C", 100.0, 4)).unwrap();
        assert_eq!(rx.try_recv().unwrap(), TableChange::Meals);
    }

    // --- Migration upgrades on disk ---

    fn snapshot(conn: &Connection) -> Vec<(String, Vec<Vec<String>>)> {
        TABLES
            .iter()
            .map(|table| {
                let mut stmt = conn
                    .prepare(&format!("SELECT * FROM {table} ORDER BY rowid"))
                    .unwrap();
                let columns = stmt.column_count();
                let rows = stmt
                    .query_map([], |row| {
                        (0..columns)
                            .map(|i| row.get_ref(i).map(|v| format!("{v:?}")))
                            .collect::<rusqlite::Result<Vec<_>>>()
                    })
                    .unwrap()
                    .collect::<Result<Vec<_>, _>>()
                    .unwrap();
                ((*table).to_string(), rows)
            })
            .collect()
    }

    #[test]
    fn test_upgrade_7_to_8_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("luminacal.db");

        {
            let conn = Connection::open(&path).unwrap();
            run_chain(&conn, MIGRATIONS, 7).unwrap();
            conn.execute_batch(
                "INSERT INTO meals (name, time, calories, protein, carbs, fat, meal_type, timestamp)
                     VALUES ('Porridge', '07:30', 320, 12, 54, 6, 'breakfast', 1700000000000);
                 INSERT INTO water_entries (amount_ml, timestamp, date)
                     VALUES (500, 1700000000000, '2023-11-14');
                 INSERT INTO weight_entries (weight_kg, date, note)
                     VALUES (72.4, 1700000000000, 'morning');
                 INSERT INTO custom_foods (name, calories, protein, carbs, fat, serving_size)
                     VALUES ('Protein Bar', 210, 20, 22, 7, '1 bar');
                 INSERT INTO scan_history (food_name, calories, protein, carbs, fat, timestamp)
                     VALUES ('Banana', 105, 1.3, 27, 0.4, 1700000000000);
                 UPDATE health_metrics SET weight_kg = 72.4, water_target_ml = 2800 WHERE id = 1;",
            )
            .unwrap();
        }

        let before = {
            let conn = Connection::open(&path).unwrap();
            snapshot(&conn)
        };

        let db = Database::open(&path).unwrap();
        assert_eq!(db.schema_version().unwrap(), 8);
        assert_eq!(snapshot(&db.conn), before);
        assert_eq!(db.health_metrics().unwrap().water_target_ml, 2800);
    }

    #[test]
    fn test_newer_schema_requires_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("luminacal.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", SCHEMA_VERSION + 3)
                .unwrap();
        }

        assert!(Database::open(&path).is_err());

        let db = Database::open_with(
            &path,
            OpenOptions {
                destructive_fallback: true,
            },
        )
        .unwrap();
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
        assert_eq!(db.health_metrics().unwrap(), HealthMetrics::default());
    }
}
