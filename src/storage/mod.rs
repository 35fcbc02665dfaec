//! SQLite storage layer -- ingested telemetry points.

pub mod schema;

use std::path::Path;

use anyhow::{Context, Result};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};

use crate::telemetry::TelemetryPoint;

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &Path) -> Result<Pool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

/// Persist one validated point. Returns its row id.
pub fn save_point(pool: &Pool, point: &TelemetryPoint) -> Result<i64> {
    let conn = pool.get()?;
    let payload = serde_json::to_string(point)?;

    conn.execute(
        "INSERT INTO telemetry_points (timestamp, payload_json) VALUES (?1, ?2)",
        params![point.timestamp(), payload],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Persist a batch in one transaction; either every point is stored or none is.
pub fn save_points(pool: &Pool, points: &[TelemetryPoint]) -> Result<usize> {
    let mut conn = pool.get()?;
    let tx = conn.transaction()?;
    {
        let mut stmt =
            tx.prepare("INSERT INTO telemetry_points (timestamp, payload_json) VALUES (?1, ?2)")?;
        for point in points {
            let payload = serde_json::to_string(point)?;
            stmt.execute(params![point.timestamp(), payload])?;
        }
    }
    tx.commit().context("failed to commit telemetry batch")?;
    Ok(points.len())
}

/// Most recently ingested point, if any.
pub fn latest_point(pool: &Pool) -> Result<Option<TelemetryPoint>> {
    let conn = pool.get()?;
    let payload: Option<String> = conn
        .query_row(
            "SELECT payload_json FROM telemetry_points ORDER BY id DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    payload
        .map(|json| serde_json::from_str(&json).context("corrupt telemetry payload"))
        .transpose()
}

/// The last `limit` ingested points, oldest first.
pub fn recent_points(pool: &Pool, limit: usize) -> Result<Vec<TelemetryPoint>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT payload_json FROM telemetry_points ORDER BY id DESC LIMIT ?1",
    )?;

    let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;

    let mut points = Vec::new();
    for r in rows {
        let json = r?;
        match serde_json::from_str::<TelemetryPoint>(&json) {
            Ok(point) => points.push(point),
            Err(e) => tracing::error!(error = %e, "skipping corrupt telemetry payload"),
        }
    }
    points.reverse();
    Ok(points)
}

pub fn count_points(pool: &Pool) -> Result<usize> {
    let conn = pool.get()?;
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM telemetry_points", [], |row| row.get(0))?;
    Ok(count as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point(ts: &str, cpu: u32) -> TelemetryPoint {
        TelemetryPoint::try_from(json!({ "timestamp": ts, "cpu_usage": cpu })).unwrap()
    }

    #[test]
    fn test_save_and_read_back() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let pool = open_pool(&dir.path().join("nested/infrascope.db"))?;

        assert!(latest_point(&pool)?.is_none());

        for (i, cpu) in [40, 50, 60].into_iter().enumerate() {
            save_point(&pool, &point(&format!("2024-01-01T1{i}:00:00Z"), cpu))?;
        }

        assert_eq!(count_points(&pool)?, 3);
        assert_eq!(latest_point(&pool)?.unwrap().number("cpu_usage"), Some(60.0));

        let recent = recent_points(&pool, 2)?;
        let cpus: Vec<Option<f64>> = recent.iter().map(|p| p.number("cpu_usage")).collect();
        assert_eq!(cpus, vec![Some(50.0), Some(60.0)]);
        Ok(())
    }

    #[test]
    fn test_batch_is_all_or_nothing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let pool = open_pool(&dir.path().join("batch.db"))?;

        let stored = save_points(&pool, &[point("2024-01-01T10:00:00Z", 40), point("2024-01-01T11:00:00Z", 50)])?;
        assert_eq!(stored, 2);

        pool.get()?.execute_batch(
            "CREATE TRIGGER reject_marker BEFORE INSERT ON telemetry_points
             WHEN NEW.timestamp = 'reject' BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )?;
        let batch = [point("2024-01-01T12:00:00Z", 60), point("reject", 70)];
        assert!(save_points(&pool, &batch).is_err());

        assert_eq!(count_points(&pool)?, 2);
        assert_eq!(latest_point(&pool)?.unwrap().number("cpu_usage"), Some(50.0));
        Ok(())
    }

    #[test]
    fn test_payload_keeps_field_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let pool = open_pool(&dir.path().join("order.db"))?;
        let original = TelemetryPoint::try_from(json!({
            "timestamp": "2024-01-01T10:00:00Z",
            "uptime_seconds": 10,
            "cpu_usage": 1,
        }))?;
        save_point(&pool, &original)?;

        let loaded = latest_point(&pool)?.unwrap();
        assert_eq!(loaded, original);
        let names: Vec<&str> = loaded.fields().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["timestamp", "uptime_seconds", "cpu_usage"]);
        Ok(())
    }
}
