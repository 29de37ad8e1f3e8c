//! Asynchronous audit trail.
//!
//! Recording is fire-and-forget: callers push a record into a bounded queue
//! and move on; a background writer drains the queue into the repository.
//! Neither a full queue nor a failing store may ever turn a successful
//! business operation into a failed response. Back-pressure policy is
//! shed-newest: when the queue is full the incoming record is dropped,
//! counted, and warned about; the request path never blocks on
//! observability.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use chrono::{Duration, Timelike};
use std::collections::HashMap;
use tokio::sync::{Mutex, mpsc};

use crate::{
    Error,
    audit::{AuditFilter, AuditOutcome, AuditRecord, AuditStats},
    clock::Clock,
    repositories::AuditRepository,
};

#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Capacity of the in-flight queue between request handlers and the
    /// writer task.
    pub queue_capacity: usize,
    /// Records older than this are eligible for automatic purge.
    pub retention: Duration,
    /// How often the retention task looks for purgeable records.
    pub purge_interval: std::time::Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            retention: Duration::days(90),
            purge_interval: std::time::Duration::from_secs(3600),
        }
    }
}

/// Cheap clonable handle for emitting audit records from request paths.
#[derive(Clone)]
pub struct AuditRecorder {
    tx: mpsc::Sender<AuditRecord>,
    dropped: Arc<AtomicU64>,
}

impl AuditRecorder {
    /// Enqueue a record without waiting. Never blocks, never fails the
    /// caller.
    pub fn record(&self, record: AuditRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(record)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    action = %record.action,
                    dropped_total = dropped,
                    "Audit queue full, shedding newest record"
                );
            }
            Err(mpsc::error::TrySendError::Closed(record)) => {
                tracing::warn!(action = %record.action, "Audit writer stopped, record lost");
            }
        }
    }

    /// Records shed because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub struct AuditTrail<R: AuditRepository> {
    repository: Arc<R>,
    config: AuditConfig,
    clock: Arc<dyn Clock>,
    tx: mpsc::Sender<AuditRecord>,
    // Held until the writer task claims it.
    rx: Mutex<Option<mpsc::Receiver<AuditRecord>>>,
    dropped: Arc<AtomicU64>,
}

impl<R: AuditRepository> AuditTrail<R> {
    pub fn new(repository: Arc<R>, config: AuditConfig, clock: Arc<dyn Clock>) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            repository,
            config,
            clock,
            tx,
            rx: Mutex::new(Some(rx)),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn recorder(&self) -> AuditRecorder {
        AuditRecorder {
            tx: self.tx.clone(),
            dropped: self.dropped.clone(),
        }
    }

    /// Start the background writer that drains the queue into the
    /// repository. Write failures are logged and absorbed.
    ///
    /// Panics if called twice: there is exactly one consumer.
    pub async fn start_writer_task(
        &self,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let mut rx = self
            .rx
            .lock()
            .await
            .take()
            .expect("audit writer task already started");
        let repository = Arc::clone(&self.repository);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = rx.recv() => {
                        match received {
                            Some(record) => {
                                if let Err(e) = repository.append(record).await {
                                    tracing::warn!(error = %e, "Audit write failed, record lost");
                                }
                            }
                            None => break,
                        }
                    }
                    _ = shutdown.changed() => {
                        // Drain whatever is already queued before stopping.
                        while let Ok(record) = rx.try_recv() {
                            if let Err(e) = repository.append(record).await {
                                tracing::warn!(error = %e, "Audit write failed during shutdown");
                            }
                        }
                        tracing::info!("Shutting down audit writer task");
                        break;
                    }
                }
            }
        })
    }

    /// Start the retention task: periodically purge records older than the
    /// configured horizon. The purge itself is audited.
    pub fn start_retention_task(
        &self,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let repository = Arc::clone(&self.repository);
        let retention = self.config.retention;
        let purge_interval = self.config.purge_interval;
        let clock = self.clock.clone();

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(purge_interval);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let cutoff = clock.now() - retention;
                        match repository.purge_before(cutoff).await {
                            Ok(count) if count > 0 => {
                                tracing::info!(count, "Purged expired audit records");
                                Self::append_purge_record(
                                    &repository,
                                    None,
                                    retention.num_days(),
                                    count,
                                    clock.now(),
                                )
                                .await;
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Audit retention purge failed");
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("Shutting down audit retention task");
                        break;
                    }
                }
            }
        })
    }

    /// Filtered, paginated retrieval, newest first.
    pub async fn query(
        &self,
        filter: &AuditFilter,
        page: usize,
        limit: usize,
    ) -> Result<(Vec<AuditRecord>, u64), Error> {
        self.repository.query(filter, page, limit).await
    }

    /// Aggregate statistics over the records matching `filter`.
    pub async fn stats(&self, filter: &AuditFilter) -> Result<AuditStats, Error> {
        let (records, total) = self.repository.query(filter, 1, usize::MAX).await?;

        let mut by_action: HashMap<String, u64> = HashMap::new();
        let mut by_resource_type: HashMap<String, u64> = HashMap::new();
        let mut by_outcome: HashMap<String, u64> = HashMap::new();
        let mut by_hour: HashMap<u32, u64> = HashMap::new();
        let mut by_actor: HashMap<String, u64> = HashMap::new();

        let mut successes = 0u64;
        let mut duration_sum = 0u64;
        let mut duration_count = 0u64;

        for record in &records {
            *by_action.entry(record.action.clone()).or_default() += 1;
            *by_resource_type
                .entry(record.resource_type.clone())
                .or_default() += 1;
            *by_outcome
                .entry(record.outcome.as_str().to_string())
                .or_default() += 1;
            *by_hour.entry(record.recorded_at.hour()).or_default() += 1;
            if let Some(actor) = &record.actor_id {
                *by_actor.entry(actor.to_string()).or_default() += 1;
            }

            if record.outcome == AuditOutcome::Success {
                successes += 1;
            }
            if let Some(ms) = record.duration_ms {
                duration_sum += ms;
                duration_count += 1;
            }
        }

        let success_rate = if total > 0 {
            successes as f64 / total as f64
        } else {
            0.0
        };
        let average_duration_ms = if duration_count > 0 {
            duration_sum as f64 / duration_count as f64
        } else {
            0.0
        };

        Ok(AuditStats {
            total,
            by_action: sorted_desc(by_action),
            by_resource_type: sorted_desc(by_resource_type),
            by_outcome: sorted_desc(by_outcome),
            success_rate,
            average_duration_ms,
            busiest_hours: sorted_desc(by_hour),
            most_active_actors: sorted_desc(by_actor),
        })
    }

    /// Export matching records as pretty JSON or delimited text.
    pub async fn export(&self, filter: &AuditFilter, format: ExportFormat) -> Result<String, Error> {
        let (records, _) = self.repository.query(filter, 1, usize::MAX).await?;

        match format {
            ExportFormat::Json => serde_json::to_string_pretty(&records).map_err(|e| {
                crate::error::StorageError::Backend(format!("Export serialization failed: {e}"))
                    .into()
            }),
            ExportFormat::Csv => {
                let mut out = String::from(
                    "id,recorded_at,actor_id,action,resource_type,resource_id,resource_name,outcome,ip,duration_ms\n",
                );
                for r in &records {
                    let fields = [
                        r.id.clone(),
                        r.recorded_at.to_rfc3339(),
                        r.actor_id.as_ref().map(|a| a.to_string()).unwrap_or_default(),
                        r.action.clone(),
                        r.resource_type.clone(),
                        r.resource_id.clone().unwrap_or_default(),
                        r.resource_name.clone().unwrap_or_default(),
                        r.outcome.as_str().to_string(),
                        r.ip.clone().unwrap_or_default(),
                        r.duration_ms.map(|d| d.to_string()).unwrap_or_default(),
                    ];
                    let row: Vec<String> = fields.iter().map(|f| csv_escape(f)).collect();
                    out.push_str(&row.join(","));
                    out.push('\n');
                }
                Ok(out)
            }
        }
    }

    /// Purge records older than `days`, on behalf of `actor`. The purge is
    /// itself recorded; failure to record it never fails the purge.
    pub async fn purge_older_than(
        &self,
        days: i64,
        actor: Option<crate::principal::PrincipalId>,
    ) -> Result<u64, Error> {
        let cutoff = self.clock.now() - Duration::days(days);
        let count = self.repository.purge_before(cutoff).await?;

        Self::append_purge_record(&self.repository, actor, days, count, self.clock.now()).await;

        Ok(count)
    }

    async fn append_purge_record(
        repository: &Arc<R>,
        actor: Option<crate::principal::PrincipalId>,
        days: i64,
        count: u64,
        recorded_at: chrono::DateTime<chrono::Utc>,
    ) {
        let record = AuditRecord::builder()
            .actor_id(actor)
            .action("audit.purge")
            .resource_type("audit")
            .after(Some(serde_json::json!({
                "older_than_days": days,
                "purged": count,
            })))
            .outcome(AuditOutcome::Success)
            .recorded_at(recorded_at)
            .build();

        match record {
            Ok(record) => {
                if let Err(e) = repository.append(record).await {
                    tracing::warn!(error = %e, "Failed to record audit purge");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to build audit purge record"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "json" => Some(ExportFormat::Json),
            "csv" => Some(ExportFormat::Csv),
            _ => None,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv",
        }
    }
}

fn sorted_desc<K: Ord>(map: HashMap<K, u64>) -> Vec<(K, u64)> {
    let mut entries: Vec<(K, u64)> = map.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
