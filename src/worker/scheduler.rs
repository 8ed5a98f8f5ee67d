//! Bounded admission of conversion jobs.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};
use crate::core::{
    BatchProgress, ConversionJob, ConversionRequest, ConversionResult, JobId, JobState, JobTicket,
    SourceFile,
};
use crate::utils::ConverterError;
use crate::worker::error::{WorkerError, WorkerResult};

/// Owns every job of a batch and decides which ones may run.
///
/// Each job lives in exactly one of `pending` (FIFO), `active` (at most
/// `max_concurrent`) or `finished` (append-only). The scheduler never runs a
/// conversion itself; admission hands out [`JobTicket`]s and the caller
/// reports back through [`BatchScheduler::on_job_finished`].
#[derive(Debug)]
pub struct BatchScheduler {
    max_concurrent: usize,
    next_id: u64,
    pending: VecDeque<ConversionJob>,
    active: Vec<ConversionJob>,
    finished: Vec<ConversionJob>,
    /// Failed jobs that already have a retry
    retried: HashSet<JobId>,
}

impl BatchScheduler {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = if max_concurrent == 0 {
            warn!("max_concurrent of 0 would stall the batch, using 1");
            1
        } else {
            max_concurrent
        };

        Self {
            max_concurrent,
            next_id: 1,
            pending: VecDeque::new(),
            active: Vec::with_capacity(max_concurrent),
            finished: Vec::new(),
            retried: HashSet::new(),
        }
    }

    /// Queues one job per file, in order, then admits as many as fit.
    pub fn enqueue(
        &mut self,
        files: Vec<SourceFile>,
        request: Arc<ConversionRequest>,
    ) -> (Vec<JobId>, Vec<JobTicket>) {
        let ids = files
            .into_iter()
            .map(|source| {
                let id = self.allocate_id();
                self.pending.push_back(ConversionJob::new(id, source, Arc::clone(&request)));
                id
            })
            .collect::<Vec<_>>();
        debug!("Queued {} jobs, {} pending", ids.len(), self.pending.len());

        (ids, self.admit())
    }

    /// Moves jobs from the head of `pending` into `active` while slots are free.
    pub fn admit(&mut self) -> Vec<JobTicket> {
        let mut tickets = Vec::new();
        while self.active.len() < self.max_concurrent {
            let Some(mut job) = self.pending.pop_front() else {
                break;
            };
            job.advance(JobState::Loading, JobState::Loading.milestone());
            debug!("Starting job {} ({})", job.id, job.file_name());
            tickets.push(job.ticket());
            self.active.push(job);
        }
        debug_assert!(self.active.len() <= self.max_concurrent);
        tickets
    }

    /// Applies a progress report to an active job. Returns whether it was accepted.
    pub fn record_progress(&mut self, id: JobId, state: JobState, progress: u8) -> bool {
        self.active
            .iter_mut()
            .find(|job| job.id == id)
            .is_some_and(|job| job.advance(state, progress))
    }

    /// Records the outcome of an active job and admits whatever can start next.
    pub fn on_job_finished(
        &mut self,
        id: JobId,
        outcome: Result<ConversionResult, ConverterError>,
    ) -> WorkerResult<Vec<JobTicket>> {
        let position = self
            .active
            .iter()
            .position(|job| job.id == id)
            .ok_or(WorkerError::UnknownJob(id))?;

        let mut job = self.active.remove(position);
        if let Err(e) = &outcome {
            warn!("Job {} ({}) failed: {}", job.id, job.file_name(), e);
        }
        job.finish(outcome);
        self.finished.push(job);

        Ok(self.admit())
    }

    /// Re-queues a failed job as a fresh job at the front of `pending`.
    ///
    /// The failed record stays in `finished` untouched. A job can be retried once;
    /// retry the new job if it fails again.
    pub fn retry(&mut self, id: JobId) -> WorkerResult<(JobId, Vec<JobTicket>)> {
        let Some(failed) = self.finished.iter().find(|job| job.id == id) else {
            return Err(match self.job(id) {
                Some(job) => WorkerError::NotRetryable { id, state: job.state },
                None => WorkerError::UnknownJob(id),
            });
        };
        if failed.state != JobState::Failed {
            return Err(WorkerError::NotRetryable { id, state: failed.state });
        }
        if self.retried.contains(&id) {
            return Err(WorkerError::AlreadyRetried(id));
        }

        let retry_id = JobId(self.next_id);
        let job = failed.retry(retry_id);
        self.next_id += 1;
        self.retried.insert(id);
        debug!("Retrying job {} as {}", id, retry_id);
        self.pending.push_front(job);

        Ok((retry_id, self.admit()))
    }

    pub fn job(&self, id: JobId) -> Option<&ConversionJob> {
        self.jobs().find(|job| job.id == id)
    }

    /// Every job: pending in queue order, then active, then finished.
    pub fn jobs(&self) -> impl Iterator<Item = &ConversionJob> {
        self.pending.iter().chain(&self.active).chain(&self.finished)
    }

    pub fn pending(&self) -> impl Iterator<Item = &ConversionJob> {
        self.pending.iter()
    }

    pub fn active(&self) -> &[ConversionJob] {
        &self.active
    }

    pub fn finished(&self) -> &[ConversionJob] {
        &self.finished
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn stats(&self) -> BatchProgress {
        let failed = self
            .finished
            .iter()
            .filter(|job| job.state == JobState::Failed)
            .count();
        BatchProgress {
            queued: self.pending.len(),
            processing: self.active.len(),
            completed: self.finished.len(),
            succeeded: self.finished.len() - failed,
            failed,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.active.is_empty()
    }

    /// Output file name and bytes of every succeeded job, in completion order.
    pub fn completed_outputs(&self) -> Vec<(&str, &[u8])> {
        self.finished
            .iter()
            .filter_map(|job| job.result.as_ref())
            .map(|result| (result.file_name.as_str(), result.bytes.as_slice()))
            .collect()
    }

    fn allocate_id(&mut self) -> JobId {
        let id = JobId(self.next_id);
        self.next_id += 1;
        id
    }
}
