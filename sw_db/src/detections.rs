//! ABOUTME: Detection repository persisting one row per motion frame
//! ABOUTME: Runtime-checked queries over the detections table

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, SqlitePool};
use sw_core::{time::now_iso8601, Error, Id, Result};
use tracing::instrument;

/// Detection entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Detection {
    pub id: String,
    /// Groups the detections of one motion event
    pub event_id: String,
    pub detected_at: String,
    pub bbox_x: i64,
    pub bbox_y: i64,
    pub bbox_w: i64,
    pub bbox_h: i64,
    pub confidence: f64,
    pub change_percent: f64,
    pub img_path: Option<String>,
    pub created_at: String,
}

/// Request to record a new detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDetection {
    pub id: Option<String>,
    pub event_id: String,
    pub detected_at: String,
    pub bbox_x: i64,
    pub bbox_y: i64,
    pub bbox_w: i64,
    pub bbox_h: i64,
    pub confidence: f64,
    pub change_percent: f64,
    pub img_path: Option<String>,
}

/// Aggregate statistics over stored detections
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionStats {
    pub total: i64,
    /// Detections captured today (UTC)
    pub today: i64,
    pub earliest: Option<String>,
    pub latest: Option<String>,
}

/// Detection repository
pub struct DetectionRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> DetectionRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a detection
    #[instrument(skip(self, request))]
    pub async fn insert(&self, request: NewDetection) -> Result<Detection> {
        let id = request.id.unwrap_or_else(|| Id::new().to_string());
        let now = now_iso8601();

        let detection = sqlx::query_as::<_, Detection>(
            r#"
            INSERT INTO detections (
                id, event_id, detected_at, bbox_x, bbox_y, bbox_w, bbox_h,
                confidence, change_percent, img_path, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&request.event_id)
        .bind(&request.detected_at)
        .bind(request.bbox_x)
        .bind(request.bbox_y)
        .bind(request.bbox_w)
        .bind(request.bbox_h)
        .bind(request.confidence)
        .bind(request.change_percent)
        .bind(&request.img_path)
        .bind(&now)
        .fetch_one(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to record detection: {}", e)))?;

        Ok(detection)
    }

    /// Most recent detections, newest first
    pub async fn recent(&self, limit: i64) -> Result<Vec<Detection>> {
        sqlx::query_as::<_, Detection>(
            "SELECT * FROM detections ORDER BY detected_at DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list detections: {}", e)))
    }

    /// All detections of one event, in capture order
    pub async fn by_event(&self, event_id: &str) -> Result<Vec<Detection>> {
        sqlx::query_as::<_, Detection>(
            "SELECT * FROM detections WHERE event_id = ?1 ORDER BY detected_at",
        )
        .bind(event_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list event detections: {}", e)))
    }

    /// Detections captured on the given day (YYYY-MM-DD), oldest first
    pub async fn by_date(&self, date: &str) -> Result<Vec<Detection>> {
        sqlx::query_as::<_, Detection>(
            "SELECT * FROM detections WHERE substr(detected_at, 1, 10) = ?1 ORDER BY detected_at",
        )
        .bind(date)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list detections by date: {}", e)))
    }

    /// Aggregate counts and time range
    pub async fn stats(&self) -> Result<DetectionStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
             COALESCE(SUM(substr(detected_at, 1, 10) = date('now')), 0) AS today, \
             MIN(detected_at) AS earliest, MAX(detected_at) AS latest \
             FROM detections",
        )
        .fetch_one(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to gather detection stats: {}", e)))?;

        Ok(DetectionStats {
            total: row.get("total"),
            today: row.get("today"),
            earliest: row.get("earliest"),
            latest: row.get("latest"),
        })
    }

    /// Delete detections captured before the cutoff timestamp (RFC3339).
    /// Returns the number of rows removed.
    #[instrument(skip(self))]
    pub async fn cleanup_older_than(&self, cutoff: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM detections WHERE detected_at < ?1")
            .bind(cutoff)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to clean up detections: {}", e)))?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_db;

    fn detection_at(detected_at: &str) -> NewDetection {
        NewDetection {
            id: None,
            event_id: "01J0000000000000000000EVNT".to_string(),
            detected_at: detected_at.to_string(),
            bbox_x: 40,
            bbox_y: 80,
            bbox_w: 50,
            bbox_h: 50,
            confidence: 0.9,
            change_percent: 3.2,
            img_path: Some("frames/2024-06-01/120000_000.jpg".to_string()),
        }
    }

    #[tokio::test]
    async fn test_insert_round_trips() {
        let db = memory_db().await;
        let repo = DetectionRepository::new(db.pool());

        let stored = repo
            .insert(detection_at("2024-06-01T12:00:00Z"))
            .await
            .expect("insert should succeed");

        assert!(!stored.id.is_empty());
        assert_eq!(stored.event_id, "01J0000000000000000000EVNT");
        assert_eq!(stored.bbox_w, 50);
        assert_eq!(stored.change_percent, 3.2);
        assert_eq!(
            stored.img_path.as_deref(),
            Some("frames/2024-06-01/120000_000.jpg")
        );
        assert!(!stored.created_at.is_empty());
    }

    #[tokio::test]
    async fn test_recent_orders_newest_first() {
        let db = memory_db().await;
        let repo = DetectionRepository::new(db.pool());

        for ts in [
            "2024-06-01T10:00:00Z",
            "2024-06-01T12:00:00Z",
            "2024-06-01T11:00:00Z",
        ] {
            repo.insert(detection_at(ts)).await.unwrap();
        }

        let recent = repo.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].detected_at, "2024-06-01T12:00:00Z");
        assert_eq!(recent[1].detected_at, "2024-06-01T11:00:00Z");
    }

    #[tokio::test]
    async fn test_by_event_groups_and_orders() {
        let db = memory_db().await;
        let repo = DetectionRepository::new(db.pool());

        let mut other = detection_at("2024-06-01T09:00:00Z");
        other.event_id = "01J000000000000000000OTHER".to_string();
        repo.insert(other).await.unwrap();
        repo.insert(detection_at("2024-06-01T10:00:02Z")).await.unwrap();
        repo.insert(detection_at("2024-06-01T10:00:01Z")).await.unwrap();

        let event = repo.by_event("01J0000000000000000000EVNT").await.unwrap();
        assert_eq!(event.len(), 2);
        assert!(event[0].detected_at < event[1].detected_at);
    }

    #[tokio::test]
    async fn test_by_date_filters_on_day() {
        let db = memory_db().await;
        let repo = DetectionRepository::new(db.pool());

        repo.insert(detection_at("2024-06-01T10:00:00Z")).await.unwrap();
        repo.insert(detection_at("2024-06-02T10:00:00Z")).await.unwrap();
        repo.insert(detection_at("2024-06-01T15:00:00Z")).await.unwrap();

        let day = repo.by_date("2024-06-01").await.unwrap();
        assert_eq!(day.len(), 2);
        assert!(day.iter().all(|d| d.detected_at.starts_with("2024-06-01")));
        assert!(day[0].detected_at < day[1].detected_at);
    }

    #[tokio::test]
    async fn test_stats_reports_range_and_today() {
        let db = memory_db().await;
        let repo = DetectionRepository::new(db.pool());

        let empty = repo.stats().await.unwrap();
        assert_eq!(empty.total, 0);
        assert_eq!(empty.today, 0);
        assert!(empty.earliest.is_none());

        repo.insert(detection_at("2024-06-01T10:00:00Z")).await.unwrap();
        repo.insert(detection_at("2024-06-03T10:00:00Z")).await.unwrap();

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.today, 0);
        assert_eq!(stats.earliest.as_deref(), Some("2024-06-01T10:00:00Z"));
        assert_eq!(stats.latest.as_deref(), Some("2024-06-03T10:00:00Z"));

        repo.insert(detection_at(&now_iso8601())).await.unwrap();
        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.today, 1);
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_old_rows() {
        let db = memory_db().await;
        let repo = DetectionRepository::new(db.pool());

        repo.insert(detection_at("2024-05-01T10:00:00Z")).await.unwrap();
        repo.insert(detection_at("2024-06-01T10:00:00Z")).await.unwrap();

        let removed = repo.cleanup_older_than("2024-05-15T00:00:00Z").await.unwrap();
        assert_eq!(removed, 1);

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.earliest.as_deref(), Some("2024-06-01T10:00:00Z"));
    }
}
