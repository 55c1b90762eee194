//! Deploy orchestrator for parallel multi-artifact deployment.
//!
//! Clears the target, runs one job per artifact under a parallelism bound,
//! aggregates progress events, records the run in the history and supports
//! cancellation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;
use wds_object_store::{ObjectStore, delete_prefix};
use wds_protocol::{ArtifactError, DeployStatus, JobStatus, ProgressEvent, ProgressPhase};

use crate::config::{DeploymentOptions, PipelineConfig};
use crate::error::DeployError;
use crate::history::DeploymentHistory;
use crate::job::{JobContext, JobOutcome};
use crate::paths;
use crate::progress::ProgressTracker;
use crate::types::{ArtifactDescriptor, DeploymentReport};
use crate::version_guard::VersionCache;

/// Orchestrates one deployment run from a source store to a target store.
pub struct DeployOrchestrator {
    source: Arc<dyn ObjectStore>,
    target: Arc<dyn ObjectStore>,
    config: PipelineConfig,
    history: Option<Arc<dyn DeploymentHistory>>,
    version_cache: Option<Arc<VersionCache>>,
    operator: Option<String>,
    events_tx: mpsc::Sender<ProgressEvent>,
    events_rx: Option<mpsc::Receiver<ProgressEvent>>,
    cancel: CancellationToken,
}

/// Keeps the first occurrence of each key, in order.
fn dedup_keys(keys: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.into_iter().filter(|k| seen.insert(k.clone())).collect()
}

impl DeployOrchestrator {
    /// Creates a new orchestrator.
    pub fn new(
        source: Arc<dyn ObjectStore>,
        target: Arc<dyn ObjectStore>,
        config: PipelineConfig,
    ) -> Self {
        let config = config.normalized();
        let (events_tx, events_rx) = mpsc::channel(config.progress_buffer);
        Self {
            source,
            target,
            config,
            history: None,
            version_cache: None,
            operator: None,
            events_tx,
            events_rx: Some(events_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Appends every finished run to `history`.
    pub fn with_history(mut self, history: Arc<dyn DeploymentHistory>) -> Self {
        self.history = Some(history);
        self
    }

    /// Invalidates `cache` once the target has changed.
    pub fn with_version_cache(mut self, cache: Arc<VersionCache>) -> Self {
        self.version_cache = Some(cache);
        self
    }

    /// Name recorded as the operator in history entries.
    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<ProgressEvent>> {
        self.events_rx.take()
    }

    /// Returns a cancellation token for this deployment.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Deploys `artifact_keys` to the target store.
    ///
    /// Artifacts run independently; if any fails the others continue and
    /// the run ends `partial_success`, even when none succeeded. A cancelled
    /// run with errors ends `failed`. Returns `Err(DeployError::Aborted)`
    /// only when clearing the target failed, with the `failed` report
    /// attached.
    pub async fn deploy(
        self,
        artifact_keys: Vec<String>,
        options: DeploymentOptions,
    ) -> Result<DeploymentReport, DeployError> {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        let marker = self.config.marker_token.as_str();

        let keys = dedup_keys(artifact_keys);
        let descriptors: Vec<ArtifactDescriptor> = keys
            .iter()
            .map(|key| ArtifactDescriptor::from_key(key, marker))
            .collect();
        for d in &descriptors {
            if paths::parse_game_name(&d.key, marker).is_none() {
                warn!(
                    artifact = %d.key,
                    game = %d.game_name,
                    marker,
                    "artifact name has no marker, using fallback game name"
                );
            }
        }

        let tracker = Arc::new(ProgressTracker::new(self.events_tx.clone(), &descriptors));
        info!(deployment = %id, artifacts = keys.len(), "starting deployment");
        tracker.set_phase(
            ProgressPhase::Starting,
            format!("Starting deployment of {} artifacts", keys.len()),
        );

        let mut deleted_count = 0;
        if options.clear_before_deploy {
            tracker.set_phase(ProgressPhase::Clearing, "Clearing target");
            match self.clear_targets(&descriptors, &options).await {
                Ok(deleted) => deleted_count = deleted,
                Err(e) => {
                    error!(deployment = %id, error = %e, "clearing failed, aborting deployment");
                    let errors = keys
                        .iter()
                        .map(|key| ArtifactError {
                            artifact: key.clone(),
                            error: format!("not deployed: {e}"),
                        })
                        .collect();
                    let report = DeploymentReport {
                        id,
                        started_at,
                        finished_at: Utc::now(),
                        duration: clock.elapsed(),
                        artifact_keys: keys,
                        total_files: 0,
                        deleted_count: 0,
                        uploaded_keys: Vec::new(),
                        errors,
                        status: DeployStatus::Failed,
                        options,
                    };
                    self.finish(&tracker, &report).await;
                    return Err(DeployError::Aborted {
                        report: Box::new(report),
                        source: Box::new(e),
                    });
                }
            }
        }

        tracker.set_phase(
            ProgressPhase::Processing,
            format!("Processing {} artifacts", descriptors.len()),
        );
        let outcomes = self.process(&descriptors, &options, &tracker).await;

        tracker.set_phase(ProgressPhase::Finalizing, "Finalizing deployment");
        let unsettled = tracker
            .jobs()
            .iter()
            .filter(|job| !job.status.is_terminal())
            .count();
        if unsettled > 0 {
            warn!(deployment = %id, unsettled, "artifacts finished without a final status");
        }
        let mut uploaded_keys = Vec::new();
        let mut errors = Vec::new();
        for outcome in outcomes {
            uploaded_keys.extend(outcome.uploaded_keys);
            if let Some(error) = outcome.error {
                errors.push(ArtifactError {
                    artifact: outcome.key,
                    error,
                });
            }
        }

        // Once the target is cleared, artifact errors only make the run partial.
        let status = if errors.is_empty() {
            DeployStatus::Success
        } else if self.cancel.is_cancelled() {
            DeployStatus::Failed
        } else {
            DeployStatus::PartialSuccess
        };

        let report = DeploymentReport {
            id,
            started_at,
            finished_at: Utc::now(),
            duration: clock.elapsed(),
            artifact_keys: keys,
            total_files: uploaded_keys.len(),
            deleted_count,
            uploaded_keys,
            errors,
            status,
            options,
        };
        info!(
            deployment = %id,
            status = %report.status,
            files = report.total_files,
            deleted = report.deleted_count,
            failed = report.errors.len(),
            elapsed_ms = report.duration.as_millis() as u64,
            "deployment finished"
        );

        self.finish(&tracker, &report).await;
        Ok(report)
    }

    /// Deletes the prefixes this run writes, one after another.
    async fn clear_targets(
        &self,
        descriptors: &[ArtifactDescriptor],
        options: &DeploymentOptions,
    ) -> Result<usize, DeployError> {
        let prefixes = match paths::normalize_prefix(&options.custom_prefix) {
            Some(prefix) => vec![prefix],
            None => dedup_keys(
                descriptors
                    .iter()
                    .map(|d| format!("{}/", d.game_name))
                    .collect(),
            ),
        };

        let mut deleted = 0;
        for prefix in prefixes {
            info!(prefix = %prefix, "clearing target prefix");
            deleted += delete_prefix(&*self.target, &prefix)
                .await
                .map_err(|source| DeployError::Clear { prefix, source })?;
        }
        Ok(deleted)
    }

    /// Runs one task per artifact and waits for all of them.
    async fn process(
        &self,
        descriptors: &[ArtifactDescriptor],
        options: &DeploymentOptions,
        tracker: &Arc<ProgressTracker>,
    ) -> Vec<JobOutcome> {
        let permits = Arc::new(Semaphore::new(self.config.max_parallel_artifacts));
        let mut handles = Vec::with_capacity(descriptors.len());

        for descriptor in descriptors {
            let ctx = JobContext {
                source: Arc::clone(&self.source),
                target: Arc::clone(&self.target),
                tracker: Arc::clone(tracker),
                permits: Arc::clone(&permits),
                cancel: self.cancel.clone(),
                upload_concurrency: self.config.upload_concurrency,
                prefix: paths::target_prefix(descriptor, options),
                extract: options.extract_archives,
            };
            let key = descriptor.key.clone();
            handles.push((key, tokio::spawn(ctx.run(descriptor.clone()))));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (key, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let message = DeployError::Join(e.to_string()).to_string();
                    error!(artifact = %key, error = %message, "artifact task aborted");
                    tracker.update(&key, |job| {
                        job.status = JobStatus::Failed;
                        job.error = Some(message.clone());
                    });
                    JobOutcome {
                        key,
                        uploaded_keys: Vec::new(),
                        error: Some(message),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Invalidates caches, records history and emits the final event.
    async fn finish(&self, tracker: &ProgressTracker, report: &DeploymentReport) {
        if let Some(cache) = &self.version_cache {
            cache.invalidate();
        }

        if let Some(history) = &self.history {
            let record = report.to_history_record(self.operator.clone());
            if let Err(e) = history.append(record).await {
                warn!(deployment = %report.id, error = %e, "failed to record deployment history");
            }
        }

        match report.status {
            DeployStatus::Failed => tracker.set_phase(
                ProgressPhase::Failed,
                format!("Deployment failed: {} errors", report.errors.len()),
            ),
            status => tracker.set_phase(
                ProgressPhase::Completed,
                format!("Deployment {status}: {} files", report.total_files),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use wds_object_store::{ListPage, MemoryStore, StoreError, StoreFuture};
    use wds_protocol::HistoryRecord;

    use super::*;
    use crate::archive::tests::build_zip;
    use crate::error::HistoryError;
    use crate::history::HistoryFuture;

    /// Wraps a memory store and fails selected operations.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_get: Vec<String>,
        fail_put_containing: Option<String>,
        fail_list: bool,
    }

    impl ObjectStore for FlakyStore {
        fn list_page<'a>(
            &'a self,
            prefix: &'a str,
            continuation: Option<&'a str>,
        ) -> StoreFuture<'a, ListPage> {
            if self.fail_list {
                return Box::pin(async {
                    Err::<ListPage, _>(StoreError::Backend("list unavailable".into()))
                });
            }
            self.inner.list_page(prefix, continuation)
        }

        fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
            if self.fail_get.iter().any(|k| k == key) {
                return Box::pin(async move {
                    Err::<Vec<u8>, _>(StoreError::Backend(format!("get {key} failed")))
                });
            }
            self.inner.get(key)
        }

        fn put<'a>(
            &'a self,
            key: &'a str,
            data: Vec<u8>,
            content_type: &'a str,
        ) -> StoreFuture<'a, ()> {
            if self
                .fail_put_containing
                .as_deref()
                .is_some_and(|needle| key.contains(needle))
            {
                return Box::pin(async {
                    Err::<(), _>(StoreError::Backend("503 slow down".into()))
                });
            }
            self.inner.put(key, data, content_type)
        }

        fn delete_objects<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, usize> {
            self.inner.delete_objects(keys)
        }
    }

    #[derive(Default)]
    struct RecordingHistory {
        records: Mutex<Vec<HistoryRecord>>,
        fail: bool,
    }

    impl DeploymentHistory for RecordingHistory {
        fn append(&self, record: HistoryRecord) -> HistoryFuture<'_> {
            Box::pin(async move {
                if self.fail {
                    return Err(HistoryError::Join("disk gone".into()));
                }
                self.records.lock().unwrap().push(record);
                Ok(())
            })
        }
    }

    fn game_zip(game: &str) -> Vec<u8> {
        let index = format!("{game}/index.html");
        let app = format!("{game}/js/app.js");
        build_zip(&[(&index, b"<html>"), (&app, b"app")])
    }

    fn seeded_source(games: &[&str]) -> MemoryStore {
        let source = MemoryStore::new();
        for game in games {
            source.insert(format!("20251003/{game}-prd-1.0.0.zip"), game_zip(game));
        }
        source
    }

    fn key(game: &str) -> String {
        format!("20251003/{game}-prd-1.0.0.zip")
    }

    fn drain(rx: &mut mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    fn orchestrator(
        source: impl ObjectStore + 'static,
        target: Arc<MemoryStore>,
    ) -> DeployOrchestrator {
        DeployOrchestrator::new(Arc::new(source), target, PipelineConfig::default())
    }

    #[tokio::test]
    async fn deploys_archive_into_game_directory() {
        let target = Arc::new(MemoryStore::new());
        target.insert("event-b/stale.js", b"old".to_vec());
        target.insert("other/keep.js", b"keep".to_vec());

        let mut orch = orchestrator(seeded_source(&["event-b"]), Arc::clone(&target));
        let mut rx = orch.take_events().unwrap();
        let report = orch
            .deploy(vec![key("event-b")], DeploymentOptions::default())
            .await
            .unwrap();

        assert_eq!(report.status, DeployStatus::Success);
        assert_eq!(report.total_files, 2);
        assert_eq!(report.deleted_count, 1);
        assert_eq!(
            target.keys(),
            vec!["event-b/index.html", "event-b/js/app.js", "other/keep.js"]
        );
        assert_eq!(target.object("event-b/index.html").unwrap().content_type, "text/html");

        let events = drain(&mut rx);
        let last = events.last().unwrap();
        assert_eq!(last.phase, ProgressPhase::Completed);
        assert_eq!(last.percentage, 100);
        assert_eq!(last.artifacts[0].status, JobStatus::Done);
    }

    #[tokio::test]
    async fn one_failed_download_is_partial_success() {
        let games = ["a", "b", "c", "d", "e"];
        let source = FlakyStore {
            inner: seeded_source(&games),
            fail_get: vec![key("c")],
            ..Default::default()
        };
        let target = Arc::new(MemoryStore::new());
        let orch = orchestrator(source, Arc::clone(&target));

        let keys = games.iter().map(|g| key(g)).collect();
        let report = orch.deploy(keys, DeploymentOptions::default()).await.unwrap();

        assert_eq!(report.status, DeployStatus::PartialSuccess);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].artifact, key("c"));
        assert_eq!(report.total_files, 8);
        assert!(target.object("c/index.html").is_none());
        assert!(target.object("e/js/app.js").is_some());
    }

    #[tokio::test]
    async fn every_artifact_failing_is_still_partial_success() {
        let source = FlakyStore {
            inner: seeded_source(&["a", "b"]),
            fail_get: vec![key("a"), key("b")],
            ..Default::default()
        };
        let target = Arc::new(MemoryStore::new());
        target.insert("a/stale.js", b"old".to_vec());
        let mut orch = orchestrator(source, Arc::clone(&target));
        let mut rx = orch.take_events().unwrap();
        let report = orch
            .deploy(vec![key("a"), key("b")], DeploymentOptions::default())
            .await
            .unwrap();

        assert_eq!(report.status, DeployStatus::PartialSuccess);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.total_files, 0);
        assert_eq!(report.deleted_count, 1);
        assert!(report.to_response().success);
        assert_eq!(drain(&mut rx).last().unwrap().phase, ProgressPhase::Completed);
    }

    #[tokio::test]
    async fn no_clear_leaves_existing_objects() {
        let target = Arc::new(MemoryStore::new());
        target.insert("a/stale.js", b"old".to_vec());
        let orch = orchestrator(seeded_source(&["a"]), Arc::clone(&target));

        let options = DeploymentOptions {
            clear_before_deploy: false,
            ..Default::default()
        };
        let report = orch.deploy(vec![key("a")], options).await.unwrap();

        assert_eq!(report.deleted_count, 0);
        assert!(target.delete_calls().is_empty());
        assert!(target.object("a/stale.js").is_some());
    }

    #[tokio::test]
    async fn clearing_large_prefix_is_chunked() {
        let target = Arc::new(MemoryStore::new());
        for i in 0..1200 {
            target.insert(format!("a/old/{i:04}.js"), Vec::new());
        }
        let orch = orchestrator(seeded_source(&["a"]), Arc::clone(&target));

        let report = orch.deploy(vec![key("a")], DeploymentOptions::default()).await.unwrap();
        assert_eq!(report.deleted_count, 1200);
        assert_eq!(target.delete_calls(), vec![1000, 200]);
    }

    #[tokio::test]
    async fn custom_prefix_clears_and_targets_one_directory() {
        let target = Arc::new(MemoryStore::new());
        target.insert("custom/old.js", Vec::new());
        target.insert("a/untouched.js", Vec::new());
        let orch = orchestrator(seeded_source(&["a", "b"]), Arc::clone(&target));

        let options = DeploymentOptions {
            custom_prefix: "custom".into(),
            ..Default::default()
        };
        let report = orch.deploy(vec![key("a")], options).await.unwrap();

        assert_eq!(report.deleted_count, 1);
        assert!(target.object("custom/index.html").is_some());
        assert!(target.object("a/untouched.js").is_some());
    }

    #[tokio::test]
    async fn raw_upload_when_extraction_disabled() {
        let target = Arc::new(MemoryStore::new());
        let orch = orchestrator(seeded_source(&["a"]), Arc::clone(&target));

        let options = DeploymentOptions {
            extract_archives: false,
            ..Default::default()
        };
        let report = orch.deploy(vec![key("a")], options).await.unwrap();

        assert_eq!(report.total_files, 1);
        assert_eq!(target.keys(), vec!["a/a-prd-1.0.0.zip"]);
        assert_eq!(
            target.object("a/a-prd-1.0.0.zip").unwrap().content_type,
            "application/zip"
        );
    }

    #[tokio::test]
    async fn failed_entry_marks_artifact_but_counts_uploaded() {
        let target = Arc::new(FlakyStore {
            fail_put_containing: Some("app.js".into()),
            ..Default::default()
        });
        let orch = DeployOrchestrator::new(
            Arc::new(seeded_source(&["a"])),
            Arc::clone(&target) as Arc<dyn ObjectStore>,
            PipelineConfig::default(),
        );

        let report = orch.deploy(vec![key("a")], DeploymentOptions::default()).await.unwrap();
        assert_eq!(report.status, DeployStatus::PartialSuccess);
        assert_eq!(report.total_files, 1);
        assert!(report.errors[0].error.contains("js/app.js"));
        assert!(target.inner.object("a/index.html").is_some());
    }

    #[tokio::test]
    async fn clearing_failure_aborts_with_report_and_history() {
        let history = Arc::new(RecordingHistory::default());
        let target = FlakyStore {
            fail_list: true,
            ..Default::default()
        };
        let orch = DeployOrchestrator::new(
            Arc::new(seeded_source(&["a"])),
            Arc::new(target),
            PipelineConfig::default(),
        )
        .with_history(Arc::clone(&history) as Arc<dyn DeploymentHistory>);

        let err = orch
            .deploy(vec![key("a")], DeploymentOptions::default())
            .await
            .unwrap_err();
        let DeployError::Aborted { report, source } = err else {
            panic!("expected aborted error");
        };
        assert_eq!(report.status, DeployStatus::Failed);
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(*source, DeployError::Clear { .. }));

        let records = history.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, DeployStatus::Failed);
    }

    #[tokio::test]
    async fn history_failure_does_not_fail_run() {
        let history = Arc::new(RecordingHistory {
            fail: true,
            ..Default::default()
        });
        let orch = orchestrator(seeded_source(&["a"]), Arc::new(MemoryStore::new()))
            .with_history(history)
            .with_operator("ci");

        let report = orch.deploy(vec![key("a")], DeploymentOptions::default()).await.unwrap();
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn history_records_rollback_flag_and_operator() {
        let history = Arc::new(RecordingHistory::default());
        let orch = orchestrator(seeded_source(&["a"]), Arc::new(MemoryStore::new()))
            .with_history(Arc::clone(&history) as Arc<dyn DeploymentHistory>)
            .with_operator("ci");

        let options = DeploymentOptions {
            is_rollback: true,
            ..Default::default()
        };
        let report = orch.deploy(vec![key("a")], options).await.unwrap();

        let records = history.records.lock().unwrap();
        assert_eq!(records[0].deployment_id, report.id.to_string());
        assert!(records[0].is_rollback);
        assert_eq!(records[0].operator.as_deref(), Some("ci"));
        assert_eq!(records[0].files_deployed, 2);
    }

    #[tokio::test]
    async fn duplicate_keys_deploy_once() {
        let target = Arc::new(MemoryStore::new());
        let orch = orchestrator(seeded_source(&["a"]), Arc::clone(&target));

        let report = orch
            .deploy(vec![key("a"), key("a")], DeploymentOptions::default())
            .await
            .unwrap();
        assert_eq!(report.artifact_keys.len(), 1);
        assert_eq!(report.total_files, 2);
    }

    #[tokio::test]
    async fn cancellation_fails_unfinished_artifacts() {
        let orch = orchestrator(seeded_source(&["a", "b"]), Arc::new(MemoryStore::new()));
        orch.cancel_token().cancel();

        let report = orch
            .deploy(vec![key("a"), key("b")], DeploymentOptions::default())
            .await
            .unwrap();
        assert_eq!(report.status, DeployStatus::Failed);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors.iter().all(|e| e.error.contains("cancelled")));
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_bounded() {
        let games = ["a", "b", "c"];
        let config = PipelineConfig {
            progress_buffer: 1024,
            max_parallel_artifacts: 2,
            upload_concurrency: 1,
            ..Default::default()
        };
        let mut orch = DeployOrchestrator::new(
            Arc::new(seeded_source(&games)),
            Arc::new(MemoryStore::new()),
            config,
        );
        let mut rx = orch.take_events().unwrap();
        let keys = games.iter().map(|g| key(g)).collect();
        orch.deploy(keys, DeploymentOptions::default()).await.unwrap();

        let pct: Vec<u8> = drain(&mut rx).iter().map(|e| e.percentage).collect();
        assert!(pct.len() > games.len());
        assert!(pct.windows(2).all(|w| w[0] <= w[1]), "{pct:?}");
        assert!(pct.iter().all(|p| *p <= 100));
        assert_eq!(pct.first(), Some(&0));
        assert_eq!(pct.last(), Some(&100));
    }

    #[tokio::test]
    async fn version_cache_is_invalidated() {
        let cache = Arc::new(VersionCache::new(Duration::from_secs(60)));
        cache.insert("a", Some("0.9.0".into()));
        let orch = orchestrator(seeded_source(&["a"]), Arc::new(MemoryStore::new()))
            .with_version_cache(Arc::clone(&cache));

        orch.deploy(vec![key("a")], DeploymentOptions::default()).await.unwrap();
        assert!(cache.get("a").is_none());
    }

    /// Counts concurrent `get` calls on the source.
    struct GaugedSource {
        inner: MemoryStore,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ObjectStore for GaugedSource {
        fn list_page<'a>(
            &'a self,
            prefix: &'a str,
            continuation: Option<&'a str>,
        ) -> StoreFuture<'a, ListPage> {
            self.inner.list_page(prefix, continuation)
        }

        fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
            Box::pin(async move {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                let result = self.inner.get(key).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                result
            })
        }

        fn put<'a>(
            &'a self,
            key: &'a str,
            data: Vec<u8>,
            content_type: &'a str,
        ) -> StoreFuture<'a, ()> {
            self.inner.put(key, data, content_type)
        }

        fn delete_objects<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, usize> {
            self.inner.delete_objects(keys)
        }
    }

    #[tokio::test]
    async fn artifact_parallelism_is_bounded() {
        let games = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let source = Arc::new(GaugedSource {
            inner: seeded_source(&games),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let config = PipelineConfig {
            max_parallel_artifacts: 3,
            ..Default::default()
        };
        let target = Arc::new(MemoryStore::new());
        let orch = DeployOrchestrator::new(
            Arc::clone(&source) as Arc<dyn ObjectStore>,
            Arc::clone(&target) as Arc<dyn ObjectStore>,
            config,
        );

        let keys = games.iter().map(|g| key(g)).collect();
        let report = orch.deploy(keys, DeploymentOptions::default()).await.unwrap();

        assert_eq!(report.status, DeployStatus::Success);
        assert_eq!(report.total_files, 16);
        let peak = source.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak {peak}");
        assert!(peak >= 2, "peak {peak}");
    }

    #[tokio::test]
    async fn large_archive_deploys_every_entry() {
        let names: Vec<String> = (0..1200).map(|i| format!("big/f{i:04}.js")).collect();
        let entries: Vec<(&str, &[u8])> =
            names.iter().map(|n| (n.as_str(), b"x".as_slice())).collect();
        let source = MemoryStore::new();
        source.insert(key("big"), build_zip(&entries));
        let target = Arc::new(MemoryStore::new());
        let orch = orchestrator(source, Arc::clone(&target));

        let report = orch.deploy(vec![key("big")], DeploymentOptions::default()).await.unwrap();

        assert_eq!(report.status, DeployStatus::Success);
        assert_eq!(report.total_files, 1200);
        assert_eq!(target.len(), 1200);
        assert!(target.object("big/f0000.js").is_some());
        assert!(target.object("big/f1199.js").is_some());
    }
}
