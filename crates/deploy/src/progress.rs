//! Shared per-artifact state and aggregated progress events.
//!
//! Every job task writes only its own entry; the tracker recomputes the
//! overall percentage on each change and pushes one self-contained
//! [`ProgressEvent`] to the channel.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::trace;
use wds_protocol::{ArtifactProgress, JobStatus, ProgressEvent, ProgressPhase};

use crate::types::ArtifactDescriptor;

/// Progress state of one artifact within a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactJob {
    pub descriptor: ArtifactDescriptor,
    pub status: JobStatus,
    pub uploaded_count: usize,
    pub total_count: usize,
    pub current_entry: Option<String>,
    pub error: Option<String>,
}

impl ArtifactJob {
    pub fn new(descriptor: ArtifactDescriptor) -> Self {
        Self {
            descriptor,
            status: JobStatus::Pending,
            uploaded_count: 0,
            total_count: 0,
            current_entry: None,
            error: None,
        }
    }

    /// Share of this job's work that is done, in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        match self.status {
            JobStatus::Pending | JobStatus::Downloading | JobStatus::Extracting => 0.0,
            JobStatus::Uploading if self.total_count == 0 => 0.0,
            JobStatus::Uploading => {
                (self.uploaded_count as f64 / self.total_count as f64).clamp(0.0, 1.0)
            }
            JobStatus::Done | JobStatus::Failed => 1.0,
        }
    }

    pub fn snapshot(&self) -> ArtifactProgress {
        let percentage = match self.status {
            JobStatus::Done => 100,
            _ if self.total_count == 0 => 0,
            _ => (self.uploaded_count.min(self.total_count) * 100 / self.total_count) as u8,
        };
        ArtifactProgress {
            artifact: self.descriptor.key.clone(),
            status: self.status,
            uploaded: self.uploaded_count,
            total: self.total_count,
            percentage,
            current_entry: self.current_entry.clone(),
            error: self.error.clone(),
        }
    }
}

struct TrackerInner {
    order: Vec<String>,
    jobs: HashMap<String, ArtifactJob>,
    phase: ProgressPhase,
    last_percentage: u8,
}

impl TrackerInner {
    fn computed_percentage(&self) -> u8 {
        match self.phase {
            ProgressPhase::Starting => 0,
            ProgressPhase::Clearing => 5,
            ProgressPhase::Processing => {
                let mean = if self.jobs.is_empty() {
                    1.0
                } else {
                    self.jobs.values().map(ArtifactJob::fraction).sum::<f64>()
                        / self.jobs.len() as f64
                };
                (10.0 + 80.0 * mean).floor() as u8
            }
            ProgressPhase::Finalizing => 90,
            ProgressPhase::Completed => 100,
            ProgressPhase::Failed => self.last_percentage,
        }
    }

    fn event(&mut self, message: String) -> ProgressEvent {
        let percentage = self.computed_percentage().max(self.last_percentage).min(100);
        self.last_percentage = percentage;
        ProgressEvent {
            phase: self.phase,
            percentage,
            message,
            artifacts: self
                .order
                .iter()
                .filter_map(|key| self.jobs.get(key))
                .map(ArtifactJob::snapshot)
                .collect(),
        }
    }
}

/// Aggregates job state and emits progress events for one run.
pub struct ProgressTracker {
    inner: Mutex<TrackerInner>,
    tx: mpsc::Sender<ProgressEvent>,
}

impl ProgressTracker {
    /// Registers every descriptor as a pending job.
    pub fn new(tx: mpsc::Sender<ProgressEvent>, descriptors: &[ArtifactDescriptor]) -> Self {
        let order = descriptors.iter().map(|d| d.key.clone()).collect();
        let jobs = descriptors
            .iter()
            .map(|d| (d.key.clone(), ArtifactJob::new(d.clone())))
            .collect();
        Self {
            inner: Mutex::new(TrackerInner {
                order,
                jobs,
                phase: ProgressPhase::Starting,
                last_percentage: 0,
            }),
            tx,
        }
    }

    /// Moves the run to `phase` and emits an event.
    pub fn set_phase(&self, phase: ProgressPhase, message: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        inner.phase = phase;
        let event = inner.event(message.into());
        self.emit(event);
    }

    /// Applies `f` to one job and emits an event. Unknown keys are ignored.
    pub fn update(&self, key: &str, f: impl FnOnce(&mut ArtifactJob)) {
        let mut inner = self.inner.lock().unwrap();
        let Some(job) = inner.jobs.get_mut(key) else {
            return;
        };
        f(job);
        let message = match (&job.status, &job.current_entry) {
            (JobStatus::Uploading, Some(entry)) => format!("Uploading {entry}"),
            (status, _) => format!("{key}: {}", status_label(*status)),
        };
        let event = inner.event(message);
        self.emit(event);
    }

    /// Returns copies of every job in registration order.
    pub fn jobs(&self) -> Vec<ArtifactJob> {
        let inner = self.inner.lock().unwrap();
        inner
            .order
            .iter()
            .filter_map(|key| inner.jobs.get(key).cloned())
            .collect()
    }

    pub fn last_percentage(&self) -> u8 {
        self.inner.lock().unwrap().last_percentage
    }

    fn emit(&self, event: ProgressEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                trace!(percentage = event.percentage, "progress channel full, event dropped");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Downloading => "downloading",
        JobStatus::Extracting => "extracting",
        JobStatus::Uploading => "uploading",
        JobStatus::Done => "done",
        JobStatus::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptors(keys: &[&str]) -> Vec<ArtifactDescriptor> {
        keys.iter()
            .map(|k| ArtifactDescriptor::from_key(k, "prd"))
            .collect()
    }

    fn drain(rx: &mut mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    #[test]
    fn phase_percentages() {
        let (tx, mut rx) = mpsc::channel(16);
        let tracker = ProgressTracker::new(tx, &descriptors(&["a-prd-1.zip"]));

        tracker.set_phase(ProgressPhase::Starting, "start");
        tracker.set_phase(ProgressPhase::Clearing, "clear");
        tracker.set_phase(ProgressPhase::Processing, "process");
        tracker.set_phase(ProgressPhase::Finalizing, "final");
        tracker.set_phase(ProgressPhase::Completed, "done");

        let pct: Vec<u8> = drain(&mut rx).iter().map(|e| e.percentage).collect();
        assert_eq!(pct, vec![0, 5, 10, 90, 100]);
    }

    #[test]
    fn processing_averages_job_fractions() {
        let (tx, mut rx) = mpsc::channel(16);
        let tracker = ProgressTracker::new(tx, &descriptors(&["a-prd-1.zip", "b-prd-1.zip"]));
        tracker.set_phase(ProgressPhase::Processing, "");

        tracker.update("a-prd-1.zip", |job| {
            job.status = JobStatus::Uploading;
            job.total_count = 4;
            job.uploaded_count = 2;
        });
        // (0.5 + 0) / 2 = 0.25 -> 10 + 20
        assert_eq!(tracker.last_percentage(), 30);

        tracker.update("b-prd-1.zip", |job| job.status = JobStatus::Failed);
        // (0.5 + 1) / 2 = 0.75 -> 10 + 60
        assert_eq!(tracker.last_percentage(), 70);

        let last = drain(&mut rx).pop().unwrap();
        assert_eq!(last.artifacts.len(), 2);
        assert_eq!(last.artifacts[0].percentage, 50);
        assert_eq!(last.artifacts[1].status, JobStatus::Failed);
    }

    #[test]
    fn percentage_never_decreases() {
        let (tx, mut rx) = mpsc::channel(64);
        let tracker = ProgressTracker::new(tx, &descriptors(&["a-prd-1.zip"]));
        tracker.set_phase(ProgressPhase::Processing, "");
        tracker.update("a-prd-1.zip", |job| {
            job.status = JobStatus::Uploading;
            job.total_count = 2;
            job.uploaded_count = 2;
        });
        // Back to 0 fraction must not lower the reported value.
        tracker.update("a-prd-1.zip", |job| job.uploaded_count = 0);
        tracker.set_phase(ProgressPhase::Failed, "boom");

        let pct: Vec<u8> = drain(&mut rx).iter().map(|e| e.percentage).collect();
        assert!(pct.windows(2).all(|w| w[0] <= w[1]), "{pct:?}");
        assert!(pct.iter().all(|p| *p <= 100));
        assert_eq!(*pct.last().unwrap(), 90);
    }

    #[test]
    fn full_channel_drops_events() {
        let (tx, mut rx) = mpsc::channel(1);
        let tracker = ProgressTracker::new(tx, &descriptors(&["a-prd-1.zip"]));
        tracker.set_phase(ProgressPhase::Starting, "");
        tracker.set_phase(ProgressPhase::Clearing, "");
        assert_eq!(drain(&mut rx).len(), 1);
        assert_eq!(tracker.last_percentage(), 5);
    }

    #[test]
    fn unknown_key_is_ignored() {
        let (tx, mut rx) = mpsc::channel(4);
        let tracker = ProgressTracker::new(tx, &descriptors(&["a-prd-1.zip"]));
        tracker.update("missing", |job| job.status = JobStatus::Done);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(tracker.jobs()[0].status, JobStatus::Pending);
    }

    #[test]
    fn closed_channel_is_harmless() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let tracker = ProgressTracker::new(tx, &descriptors(&["a-prd-1.zip"]));
        tracker.set_phase(ProgressPhase::Completed, "");
        assert_eq!(tracker.last_percentage(), 100);
    }
}
