//! Ordered schema migrations tracked in SQLite's `user_version`.
//!
//! Every step is additive: new tables and indices, columns with defaults, and
//! `INSERT OR IGNORE` seeds. Re-running a step against a schema that already
//! contains its changes is harmless.

use anyhow::{Context, Result, bail};
use log::{info, warn};
use rusqlite::{Connection, params};

pub const SCHEMA_VERSION: u32 = 8;

/// Tables owned by the application, dropped by the destructive fallback.
pub const TABLES: &[&str] = &[
    "meals",
    "water_entries",
    "weight_entries",
    "custom_foods",
    "health_metrics",
    "scan_history",
];

#[derive(Debug)]
pub(crate) enum Step {
    /// Statements that are already idempotent (`IF NOT EXISTS`, `OR IGNORE`).
    Sql(&'static str),
    AddColumn {
        table: &'static str,
        column: &'static str,
        definition: &'static str,
    },
}

#[derive(Debug)]
pub(crate) struct Migration {
    pub from: u32,
    pub to: u32,
    pub steps: &'static [Step],
}

pub(crate) const MIGRATIONS: &[Migration] = &[
    Migration {
        from: 0,
        to: 1,
        steps: &[Step::Sql(
            "CREATE TABLE IF NOT EXISTS meals (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                name      TEXT NOT NULL,
                time      TEXT NOT NULL DEFAULT '',
                calories  REAL NOT NULL DEFAULT 0,
                protein   REAL NOT NULL DEFAULT 0,
                carbs     REAL NOT NULL DEFAULT 0,
                fat       REAL NOT NULL DEFAULT 0,
                timestamp INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS water_entries (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                amount_ml INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                date      TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_water_entries_date ON water_entries(date);",
        )],
    },
    Migration {
        from: 1,
        to: 2,
        steps: &[
            Step::AddColumn {
                table: "meals",
                column: "meal_type",
                definition: "TEXT NOT NULL DEFAULT 'snack'",
            },
            Step::Sql("CREATE INDEX IF NOT EXISTS idx_meals_timestamp ON meals(timestamp);"),
        ],
    },
    Migration {
        from: 2,
        to: 3,
        steps: &[Step::Sql(
            "CREATE TABLE IF NOT EXISTS weight_entries (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                weight_kg REAL NOT NULL,
                date      INTEGER NOT NULL,
                note      TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_weight_entries_date ON weight_entries(date);",
        )],
    },
    Migration {
        from: 3,
        to: 4,
        steps: &[Step::Sql(
            "CREATE TABLE IF NOT EXISTS custom_foods (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                name         TEXT NOT NULL,
                calories     REAL NOT NULL DEFAULT 0,
                protein      REAL NOT NULL DEFAULT 0,
                carbs        REAL NOT NULL DEFAULT 0,
                fat          REAL NOT NULL DEFAULT 0,
                serving_size TEXT NOT NULL DEFAULT '',
                is_favorite  INTEGER NOT NULL DEFAULT 0,
                last_used    INTEGER,
                use_count    INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_custom_foods_name ON custom_foods(name);",
        )],
    },
    Migration {
        from: 4,
        to: 5,
        steps: &[Step::Sql(
            "CREATE TABLE IF NOT EXISTS health_metrics (
                id               INTEGER PRIMARY KEY CHECK (id = 1),
                weight_kg        REAL NOT NULL,
                height_cm        REAL NOT NULL,
                age              INTEGER NOT NULL,
                gender           TEXT NOT NULL,
                activity_level   TEXT NOT NULL,
                fitness_goal     TEXT NOT NULL,
                target_weight_kg REAL
            );
            INSERT OR IGNORE INTO health_metrics
                (id, weight_kg, height_cm, age, gender, activity_level, fitness_goal, target_weight_kg)
            VALUES (1, 70.0, 170.0, 25, 'other', 'moderate', 'maintain', NULL);",
        )],
    },
    Migration {
        from: 5,
        to: 6,
        steps: &[Step::Sql(
            "CREATE TABLE IF NOT EXISTS scan_history (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                food_name    TEXT NOT NULL,
                calories     REAL NOT NULL DEFAULT 0,
                protein      REAL NOT NULL DEFAULT 0,
                carbs        REAL NOT NULL DEFAULT 0,
                fat          REAL NOT NULL DEFAULT 0,
                image_url    TEXT,
                serving_size TEXT,
                timestamp    INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_scan_history_timestamp ON scan_history(timestamp);",
        )],
    },
    Migration {
        from: 6,
        to: 7,
        steps: &[Step::AddColumn {
            table: "health_metrics",
            column: "water_target_ml",
            definition: "INTEGER NOT NULL DEFAULT 2500",
        }],
    },
    // Reserved; exercises the upgrade path without touching data.
    Migration {
        from: 7,
        to: 8,
        steps: &[],
    },
];

pub(crate) fn user_version(conn: &Connection) -> Result<u32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .context("Failed to read schema version")
}

/// Bring `conn` up to [`SCHEMA_VERSION`], rebuilding from scratch on failure
/// when `destructive_fallback` is set.
pub(crate) fn migrate(conn: &Connection, destructive_fallback: bool) -> Result<()> {
    match run_chain(conn, MIGRATIONS, SCHEMA_VERSION) {
        Ok(()) => Ok(()),
        Err(err) if destructive_fallback => {
            warn!("Schema migration failed ({err:#}); dropping all tables and rebuilding");
            reset(conn)?;
            run_chain(conn, MIGRATIONS, SCHEMA_VERSION)
        }
        Err(err) => Err(err),
    }
}

pub(crate) fn run_chain(conn: &Connection, chain: &[Migration], target: u32) -> Result<()> {
    let version = user_version(conn)?;
    let latest = chain.last().map_or(0, |m| m.to);
    if version > latest {
        bail!("Database schema version {version} is newer than supported version {latest}");
    }

    for migration in chain
        .iter()
        .filter(|m| m.from >= version && m.to <= target)
    {
        apply(conn, migration).with_context(|| {
            format!("Migration {} -> {} failed", migration.from, migration.to)
        })?;
    }
    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    info!(
        "Applying schema migration {} -> {}",
        migration.from, migration.to
    );
    let tx = conn.unchecked_transaction()?;
    for step in migration.steps {
        match step {
            Step::Sql(sql) => tx.execute_batch(sql)?,
            Step::AddColumn {
                table,
                column,
                definition,
            } => {
                if !column_exists(&tx, table, column)? {
                    tx.execute_batch(&format!(
                        "ALTER TABLE {table} ADD COLUMN {column} {definition};"
                    ))?;
                }
            }
        }
    }
    tx.pragma_update(None, "user_version", migration.to)?;
    tx.commit()?;
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn reset(conn: &Connection) -> Result<()> {
    let mut sql = String::new();
    for table in TABLES {
        sql.push_str(&format!("DROP TABLE IF EXISTS {table};\n"));
    }
    sql.push_str("PRAGMA user_version = 0;");
    conn.execute_batch(&sql)
        .context("Failed to drop tables for rebuild")
}
