//! SQLite storage layer for S-Life.
//!
//! # Tables
//!
//! - `profiles`: one JSON-encoded [`UserProfile`] per user
//! - `offline_records`: samples waiting to be synced to the remote store,
//!   kept in insertion order and trimmed to a fixed capacity
//! - `notifications`: alert history shown to the user
//! - `settings`: small key/value preferences (the SMS mode)
//!
//! Writes that touch several rows run in a transaction, so a crash leaves
//! either the old or the new state on disk.
//!
//! Contact details only ever live inside the profile JSON; nothing here logs
//! them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::warn;

use crate::channels::{SmsMode, SmsModeSource};
use crate::model::{AlertEvent, FallStatus, GeoPoint, Severity, UserProfile, VitalKind};
use crate::offline::SampleRecord;

const SMS_MODE_KEY: &str = "sms_mode";

/// Default number of notifications kept per user.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 500;

/// Where profiles are loaded from and saved to.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> anyhow::Result<Option<UserProfile>>;

    /// Save `profile`, stamping `last_updated`. Returns the stored profile.
    async fn save_profile(&self, user_id: &str, profile: &UserProfile)
    -> anyhow::Result<UserProfile>;
}

/// A stored alert, as listed by the notification history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationEntry {
    pub id: i64,
    #[serde(flatten)]
    pub event: AlertEvent,
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:slife.db?mode=rwc" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let mut options = SqlitePoolOptions::new().max_connections(5);
        if database_url.contains(":memory:") {
            // Every connection to an in-memory database gets its own empty
            // database, so keep exactly one alive for the pool's lifetime.
            options = options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = options.connect(database_url).await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY,
                profile_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS offline_records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                bpm INTEGER NOT NULL,
                spo2 INTEGER NOT NULL,
                temperature REAL NOT NULL,
                fall_status TEXT NOT NULL,
                latitude REAL,
                longitude REAL,
                speed REAL,
                distance REAL,
                recorded_at INTEGER NOT NULL,
                synced INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Pending records are always read in insertion order
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_offline_records_synced_seq
            ON offline_records(synced, seq)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                severity TEXT NOT NULL,
                vital_type TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                recommendation TEXT NOT NULL,
                ts INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========================================================================
    // Offline records
    // ========================================================================

    /// Insert `record` and trim the table to the newest `capacity` rows.
    ///
    /// Both steps run in one transaction. Returns how many rows were dropped.
    pub async fn enqueue_record(
        &self,
        record: &SampleRecord,
        capacity: usize,
    ) -> anyhow::Result<u64> {
        let capacity = i64::try_from(capacity.max(1))?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO offline_records
                (id, user_id, bpm, spo2, temperature, fall_status,
                 latitude, longitude, speed, distance, recorded_at, synced)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.user_id)
        .bind(i64::from(record.bpm))
        .bind(i64::from(record.spo2))
        .bind(record.temperature)
        .bind(record.fall_status.as_str())
        .bind(record.location.map(|p| p.lat))
        .bind(record.location.map(|p| p.lng))
        .bind(record.speed)
        .bind(record.distance)
        .bind(record.recorded_at.timestamp_millis())
        .bind(record.synced)
        .execute(&mut *tx)
        .await?;

        let dropped = sqlx::query(
            r#"
            DELETE FROM offline_records
            WHERE seq NOT IN (
                SELECT seq FROM offline_records ORDER BY seq DESC LIMIT ?
            )
            "#,
        )
        .bind(capacity)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        Ok(dropped)
    }

    /// Unsynced records, oldest first.
    pub async fn pending_records(&self, limit: u32) -> anyhow::Result<Vec<SampleRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, bpm, spo2, temperature, fall_status,
                   latitude, longitude, speed, distance, recorded_at, synced
            FROM offline_records
            WHERE synced = 0
            ORDER BY seq ASC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Number of records in the table, synced or not.
    pub async fn count_records(&self) -> anyhow::Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as total FROM offline_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("total"))
    }

    /// Flag `ids` as synced in one transaction.
    pub async fn mark_synced(&self, ids: &[uuid::Uuid]) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut updated = 0;
        for id in ids {
            updated += sqlx::query("UPDATE offline_records SET synced = 1 WHERE id = ?")
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        Ok(updated)
    }

    /// Delete every synced record. Returns how many were removed.
    pub async fn delete_synced(&self) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM offline_records WHERE synced = 1")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Store `event` and trim the user's history to the newest `capacity`
    /// entries, in one transaction.
    pub async fn insert_notification(
        &self,
        user_id: &str,
        event: &AlertEvent,
        capacity: usize,
    ) -> anyhow::Result<i64> {
        let capacity = i64::try_from(capacity.max(1))?;
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO notifications
                (user_id, severity, vital_type, title, description, recommendation, ts)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(event.severity.as_str())
        .bind(event.vital_type.as_str())
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.recommendation)
        .bind(event.timestamp.timestamp_millis())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query(
            r#"
            DELETE FROM notifications
            WHERE user_id = ?
              AND id NOT IN (
                SELECT id FROM notifications
                WHERE user_id = ?
                ORDER BY ts DESC, id DESC
                LIMIT ?
              )
            "#,
        )
        .bind(user_id)
        .bind(user_id)
        .bind(capacity)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Number of stored notifications for `user_id`.
    pub async fn count_notifications(&self, user_id: &str) -> anyhow::Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as total FROM notifications WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("total"))
    }

    /// Most recent notifications first.
    pub async fn list_notifications(
        &self,
        user_id: &str,
        limit: u32,
    ) -> anyhow::Result<Vec<NotificationEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, severity, vital_type, title, description, recommendation, ts
            FROM notifications
            WHERE user_id = ?
            ORDER BY ts DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| NotificationEntry {
                id: row.get("id"),
                event: AlertEvent {
                    severity: Severity::parse(row.get("severity")),
                    vital_type: VitalKind::parse(row.get("vital_type")),
                    title: row.get("title"),
                    description: row.get("description"),
                    recommendation: row.get("recommendation"),
                    timestamp: from_millis(row.get("ts")),
                },
            })
            .collect())
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// The stored SMS mode, or the default when none was saved.
    pub async fn get_sms_mode(&self) -> anyhow::Result<SmsMode> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(SMS_MODE_KEY)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .and_then(|r| SmsMode::parse(r.get::<&str, _>("value")))
            .unwrap_or_default())
    }

    pub async fn set_sms_mode(&self, mode: SmsMode) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(SMS_MODE_KEY)
        .bind(mode.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ProfileStore for Storage {
    async fn get_profile(&self, user_id: &str) -> anyhow::Result<Option<UserProfile>> {
        let row = sqlx::query("SELECT profile_json FROM profiles WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(serde_json::from_str(row.get("profile_json"))?)),
            None => Ok(None),
        }
    }

    async fn save_profile(
        &self,
        user_id: &str,
        profile: &UserProfile,
    ) -> anyhow::Result<UserProfile> {
        let now = Utc::now();
        let mut stored = profile.clone();
        stored.last_updated = Some(now);

        sqlx::query(
            r#"
            INSERT INTO profiles (user_id, profile_json, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                profile_json = excluded.profile_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(serde_json::to_string(&stored)?)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(stored)
    }
}

#[async_trait]
impl SmsModeSource for Storage {
    async fn sms_mode(&self) -> SmsMode {
        match self.get_sms_mode().await {
            Ok(mode) => mode,
            Err(e) => {
                warn!(error = %e, "Failed to read SMS mode, using default");
                SmsMode::default()
            }
        }
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn record_from_row(row: &SqliteRow) -> anyhow::Result<SampleRecord> {
    let latitude: Option<f64> = row.get("latitude");
    let longitude: Option<f64> = row.get("longitude");

    Ok(SampleRecord {
        id: row.get::<&str, _>("id").parse()?,
        user_id: row.get("user_id"),
        bpm: u32::try_from(row.get::<i64, _>("bpm"))?,
        spo2: u32::try_from(row.get::<i64, _>("spo2"))?,
        temperature: row.get("temperature"),
        fall_status: FallStatus::parse(row.get("fall_status")),
        location: latitude
            .zip(longitude)
            .map(|(lat, lng)| GeoPoint { lat, lng }),
        speed: row.get("speed"),
        distance: row.get("distance"),
        recorded_at: from_millis(row.get("recorded_at")),
        synced: row.get("synced"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Gender, MedicalConditions, SafeZoneConfig, VitalSample};

    fn profile() -> UserProfile {
        UserProfile {
            name: "Lan".to_string(),
            age: 72,
            gender: Gender::Female,
            email: "family@example.com".to_string(),
            emergency_contact: Some("+84901234567".to_string()),
            conditions: MedicalConditions {
                respiratory: true,
                ..Default::default()
            },
            safe_zone: Some(SafeZoneConfig {
                center_lat: 10.762622,
                center_lng: 106.660172,
                radius_meters: 500.0,
            }),
            last_updated: None,
        }
    }

    fn record(bpm: u32) -> SampleRecord {
        let sample = VitalSample {
            bpm,
            temperature: 36.6,
            spo2: 97,
            fall_status: FallStatus::Normal,
            location: Some(GeoPoint {
                lat: 10.77,
                lng: 106.66,
            }),
            speed: Some(0.4),
            distance: None,
            timestamp: Utc::now(),
        };
        SampleRecord::from_sample("user-1", &sample)
    }

    #[tokio::test]
    async fn test_profile_round_trip() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();

        assert!(storage.get_profile("user-1").await.unwrap().is_none());

        let saved = storage.save_profile("user-1", &profile()).await.unwrap();
        assert!(saved.last_updated.is_some());

        let loaded = storage.get_profile("user-1").await.unwrap().unwrap();
        assert_eq!(loaded, saved);

        let mut updated = profile();
        updated.age = 73;
        storage.save_profile("user-1", &updated).await.unwrap();
        let loaded = storage.get_profile("user-1").await.unwrap().unwrap();
        assert_eq!(loaded.age, 73);
    }

    #[tokio::test]
    async fn test_enqueue_trims_oldest() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();

        for bpm in 60..63 {
            assert_eq!(storage.enqueue_record(&record(bpm), 3).await.unwrap(), 0);
        }
        assert_eq!(storage.enqueue_record(&record(63), 3).await.unwrap(), 1);

        let pending = storage.pending_records(10).await.unwrap();
        let bpms: Vec<u32> = pending.iter().map(|r| r.bpm).collect();
        assert_eq!(bpms, vec![61, 62, 63]);
        assert_eq!(storage.count_records().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_record_columns_round_trip() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let original = record(72);
        storage.enqueue_record(&original, 10).await.unwrap();

        let loaded = storage.pending_records(10).await.unwrap().remove(0);
        assert_eq!(loaded.id, original.id);
        assert_eq!(loaded.location, original.location);
        assert_eq!(loaded.speed, Some(0.4));
        assert_eq!(loaded.distance, None);
        assert_eq!(
            loaded.recorded_at.timestamp_millis(),
            original.recorded_at.timestamp_millis()
        );
        assert!(!loaded.synced);
    }

    #[tokio::test]
    async fn test_mark_and_delete_synced() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let first = record(70);
        let second = record(71);
        storage.enqueue_record(&first, 10).await.unwrap();
        storage.enqueue_record(&second, 10).await.unwrap();

        assert_eq!(storage.mark_synced(&[first.id]).await.unwrap(), 1);

        let pending = storage.pending_records(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);

        assert_eq!(storage.delete_synced().await.unwrap(), 1);
        assert_eq!(storage.count_records().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_notifications_newest_first() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let now = Utc::now();

        for (offset, title) in [(0, "older"), (5, "newer")] {
            let event = AlertEvent {
                severity: Severity::Warning,
                vital_type: VitalKind::Spo2,
                title: title.to_string(),
                description: "SpO2 92%".to_string(),
                recommendation: "Breathe deeply".to_string(),
                timestamp: now + chrono::Duration::seconds(offset),
            };
            storage
                .insert_notification("user-1", &event, DEFAULT_NOTIFICATION_CAPACITY)
                .await
                .unwrap();
        }

        let listed = storage.list_notifications("user-1", 10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].event.title, "newer");
        assert_eq!(listed[0].event.vital_type, VitalKind::Spo2);

        assert_eq!(storage.list_notifications("user-1", 1).await.unwrap().len(), 1);
        assert!(storage.list_notifications("other", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notifications_are_capped_per_user() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        let start = Utc::now();

        for i in 0..5 {
            let event = AlertEvent {
                severity: Severity::Critical,
                vital_type: VitalKind::HeartRate,
                title: format!("alert {i}"),
                description: "Heart rate 130 bpm".to_string(),
                recommendation: "Rest".to_string(),
                timestamp: start + chrono::Duration::seconds(i),
            };
            storage.insert_notification("user-1", &event, 3).await.unwrap();
        }
        let other = AlertEvent {
            severity: Severity::Warning,
            vital_type: VitalKind::Zone,
            title: "other user".to_string(),
            description: String::new(),
            recommendation: String::new(),
            timestamp: start,
        };
        storage.insert_notification("user-2", &other, 3).await.unwrap();

        assert_eq!(storage.count_notifications("user-1").await.unwrap(), 3);
        assert_eq!(storage.count_notifications("user-2").await.unwrap(), 1);

        let titles: Vec<String> = storage
            .list_notifications("user-1", 10)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.event.title)
            .collect();
        assert_eq!(titles, vec!["alert 4", "alert 3", "alert 2"]);
    }

    #[tokio::test]
    async fn test_sms_mode_setting() {
        let storage = Storage::new("sqlite::memory:").await.unwrap();
        assert_eq!(storage.get_sms_mode().await.unwrap(), SmsMode::Auto);

        storage.set_sms_mode(SmsMode::Compose).await.unwrap();
        assert_eq!(storage.sms_mode().await, SmsMode::Compose);

        storage.set_sms_mode(SmsMode::Auto).await.unwrap();
        assert_eq!(storage.get_sms_mode().await.unwrap(), SmsMode::Auto);
    }
}
