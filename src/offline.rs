//! Offline queue for samples that could not reach the remote record store.
//!
//! Samples are kept in SQLite, capped at a fixed number of rows (oldest
//! dropped first). A flush sends the pending batch to a [`RecordSink`] and
//! marks the rows synced only after the sink confirms, so a failed flush
//! leaves everything pending for the next attempt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde::ser::SerializeStruct;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::model::{FallStatus, GeoPoint, VitalSample};
use crate::storage::Storage;

/// Default number of rows kept in the queue.
pub const DEFAULT_OFFLINE_CAPACITY: usize = 1000;

/// Default endpoint of the remote record store.
pub const DEFAULT_RECORDS_URL: &str = "http://127.0.0.1:54321/rest/v1/health_records";

/// Upper bound on one batch upload.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(15);

/// A sample as stored locally and uploaded remotely.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub id: Uuid,
    pub user_id: String,
    pub bpm: u32,
    pub spo2: u32,
    pub temperature: f64,
    pub fall_status: FallStatus,
    pub location: Option<GeoPoint>,
    pub speed: Option<f64>,
    pub distance: Option<f64>,
    pub recorded_at: DateTime<Utc>,
    pub synced: bool,
}

impl SampleRecord {
    pub fn from_sample(user_id: &str, sample: &VitalSample) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            bpm: sample.bpm,
            spo2: sample.spo2,
            temperature: sample.temperature,
            fall_status: sample.fall_status,
            location: sample.location,
            speed: sample.speed,
            distance: sample.distance,
            recorded_at: sample.timestamp,
            synced: false,
        }
    }
}

/// Remote row shape: flat coordinates and no local sync flag.
impl Serialize for SampleRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut row = serializer.serialize_struct("SampleRecord", 11)?;
        row.serialize_field("id", &self.id)?;
        row.serialize_field("user_id", &self.user_id)?;
        row.serialize_field("bpm", &self.bpm)?;
        row.serialize_field("spo2", &self.spo2)?;
        row.serialize_field("temperature", &self.temperature)?;
        row.serialize_field("fall_status", &self.fall_status)?;
        row.serialize_field("latitude", &self.location.map(|p| p.lat))?;
        row.serialize_field("longitude", &self.location.map(|p| p.lng))?;
        row.serialize_field("speed", &self.speed)?;
        row.serialize_field("distance", &self.distance)?;
        row.serialize_field("recorded_at", &self.recorded_at)?;
        row.end()
    }
}

// ============================================================================
// Remote sink
// ============================================================================

/// The remote record store.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Insert `records` as one batch. `Ok` means every record was accepted.
    async fn insert_batch(&self, records: &[SampleRecord]) -> anyhow::Result<()>;
}

/// Client for the hosted record table (PostgREST-style JSON array insert).
///
/// Rows are keyed by their client-generated `id` and inserted with
/// duplicates ignored: a row the server committed before the client saw a
/// transport error is queued again, and must not block the next flush.
#[derive(Clone)]
pub struct HttpRecordStore {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl Default for HttpRecordStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl HttpRecordStore {
    /// Create a client against [`DEFAULT_RECORDS_URL`].
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(DEFAULT_RECORDS_URL, api_key)
    }

    /// Create a client with a custom URL (for testing).
    pub fn with_base_url(url: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl RecordSink for HttpRecordStore {
    async fn insert_batch(&self, records: &[SampleRecord]) -> anyhow::Result<()> {
        let mut request = self
            .client
            .post(&self.url)
            .timeout(UPLOAD_TIMEOUT)
            .header("Prefer", "return=minimal,resolution=ignore-duplicates")
            .json(records);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key).header("apikey", key);
        }

        request.send().await?.error_for_status()?;
        Ok(())
    }
}

// ============================================================================
// Queue
// ============================================================================

/// Result of a flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// Records uploaded and marked synced.
    pub synced: usize,

    /// True when another flush was already running and this one did nothing.
    pub skipped: bool,
}

/// Durable, bounded queue of samples awaiting upload.
pub struct OfflineQueue {
    storage: Storage,
    capacity: usize,
    flushing: AtomicBool,
}

impl OfflineQueue {
    pub fn new(storage: Storage, capacity: usize) -> Self {
        Self {
            storage,
            capacity: capacity.max(1),
            flushing: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store `record`, dropping the oldest rows beyond capacity.
    pub async fn enqueue(&self, record: &SampleRecord) -> anyhow::Result<u64> {
        let dropped = self.storage.enqueue_record(record, self.capacity).await?;
        if dropped > 0 {
            warn!(dropped, capacity = self.capacity, "Offline queue full, dropped oldest records");
        } else {
            debug!(id = %record.id, "Sample queued offline");
        }
        Ok(dropped)
    }

    /// Unsynced records, oldest first.
    pub async fn pending(&self) -> anyhow::Result<Vec<SampleRecord>> {
        self.storage.pending_records(self.batch_limit()).await
    }

    /// Upload every pending record to `sink` and mark them synced.
    ///
    /// Rows are only marked after the sink accepted the whole batch. An error
    /// from the sink leaves the queue untouched.
    pub async fn flush(&self, sink: &dyn RecordSink) -> anyhow::Result<FlushReport> {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Flush already running");
            return Ok(FlushReport {
                synced: 0,
                skipped: true,
            });
        }

        let result = self.flush_pending(sink).await;
        self.flushing.store(false, Ordering::Release);
        result
    }

    async fn flush_pending(&self, sink: &dyn RecordSink) -> anyhow::Result<FlushReport> {
        let pending = self.pending().await?;
        if pending.is_empty() {
            return Ok(FlushReport::default());
        }

        sink.insert_batch(&pending).await?;

        let ids: Vec<Uuid> = pending.iter().map(|r| r.id).collect();
        self.storage.mark_synced(&ids).await?;
        info!(synced = ids.len(), "Offline records synced");

        Ok(FlushReport {
            synced: ids.len(),
            skipped: false,
        })
    }

    /// Remove records that have already been synced.
    pub async fn clear_synced(&self) -> anyhow::Result<u64> {
        self.storage.delete_synced().await
    }

    fn batch_limit(&self) -> u32 {
        u32::try_from(self.capacity).unwrap_or(u32::MAX)
    }
}
