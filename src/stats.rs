//! Supplemented ingestion-event log, generalized from the teacher's
//! per-request timing table (`init_db`/`record_stat`/`stats_handler`
//! in the payload-pulverizer) into a per-crash-lifecycle-event log
//! backing the `/stats` endpoint.
//!
//! This is ambient observability bookkeeping, not the crash store of
//! record — the `CrashStorage`/`CrashPublish` capabilities own that.

use std::sync::Mutex;

use rusqlite::{params, Connection};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub struct StatsLog {
    conn: Mutex<Connection>,
}

impl StatsLog {
    pub fn open(db_path: &str) -> Result<Self, StatsError> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StatsError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StatsError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS crash_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                crash_id TEXT NOT NULL,
                event TEXT NOT NULL,
                detail TEXT,
                ts DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;
        Ok(StatsLog {
            conn: Mutex::new(conn),
        })
    }

    fn record(&self, crash_id: &str, event: &str, detail: Option<&str>) {
        let conn = self.conn.lock().unwrap();
        let _ = conn.execute(
            "INSERT INTO crash_events (crash_id, event, detail) VALUES (?1, ?2, ?3)",
            params![crash_id, event, detail],
        );
    }

    pub fn record_received(&self, crash_id: &str) {
        self.record(crash_id, "received", None);
    }

    pub fn record_saved(&self, crash_id: &str) {
        self.record(crash_id, "saved", None);
    }

    pub fn record_published(&self, crash_id: &str) {
        self.record(crash_id, "published", None);
    }

    pub fn record_dropped(&self, crash_id: &str, state: &str) {
        self.record(crash_id, "dropped", Some(state));
    }

    pub fn event_counts(&self) -> Result<Vec<EventCount>, StatsError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT event, COALESCE(detail, ''), COUNT(*) FROM crash_events GROUP BY event, detail",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(EventCount {
                event: row.get(0)?,
                detail: row.get(1)?,
                count: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[derive(Debug, Serialize)]
pub struct EventCount {
    pub event: String,
    pub detail: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    stats: Vec<EventCount>,
}

/// `GET /stats` — generalized from the teacher's `stats_handler`,
/// reporting per-crash-lifecycle-event counts instead of per-endpoint
/// request timings.
pub async fn stats_handler(
    stats: actix_web::web::Data<std::sync::Arc<StatsLog>>,
) -> actix_web::HttpResponse {
    match stats.event_counts() {
        Ok(stats) => actix_web::HttpResponse::Ok().json(StatsResponse { stats }),
        Err(err) => {
            actix_web::HttpResponse::InternalServerError().body(format!("stats error: {err}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_reads_back_event_counts() {
        let log = StatsLog::in_memory().unwrap();
        log.record_received("a");
        log.record_received("b");
        log.record_saved("a");
        log.record_dropped("c", "save");

        let counts = log.event_counts().unwrap();
        let received = counts.iter().find(|c| c.event == "received").unwrap();
        assert_eq!(received.count, 2);
        let dropped = counts.iter().find(|c| c.event == "dropped").unwrap();
        assert_eq!(dropped.detail, "save");
    }
}
