use serde::Serialize;
use crate::core::{ConversionResult, JobId, JobState};
use crate::utils::ConverterError;

/// Lifecycle notification for one job.
///
/// Every job produces `Queued`, a run of `Progress` events with
/// non-decreasing percentages, then exactly one of `Succeeded` / `Failed`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JobEvent {
    #[serde(rename_all = "camelCase")]
    Queued {
        job_id: JobId,
        file_name: String,
        retry_of: Option<JobId>,
    },
    #[serde(rename_all = "camelCase")]
    Progress {
        job_id: JobId,
        state: JobState,
        progress: u8,
    },
    #[serde(rename_all = "camelCase")]
    Succeeded {
        job_id: JobId,
        result: ConversionResult,
    },
    #[serde(rename_all = "camelCase")]
    Failed {
        job_id: JobId,
        file_name: String,
        error: ConverterError,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            Self::Queued { job_id, .. }
            | Self::Progress { job_id, .. }
            | Self::Succeeded { job_id, .. }
            | Self::Failed { job_id, .. } => *job_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

/// Counts across the whole batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchProgress {
    pub fn status_line(&self) -> String {
        format!(
            "{} files in queue, {} processing, {} completed ({} failed)",
            self.queued, self.processing, self.completed, self.failed
        )
    }
}

/// Wraps a job's progress callback and keeps reported values monotonic.
pub struct ProgressReporter<'a> {
    last: u8,
    sink: &'a mut dyn FnMut(JobState, u8),
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a mut dyn FnMut(JobState, u8)) -> Self {
        Self { last: 0, sink }
    }

    /// Reports `state` at its milestone percentage.
    pub fn enter(&mut self, state: JobState) {
        self.report(state, state.milestone());
    }

    /// Reports `progress` within `state`; lower values than already reported are raised.
    pub fn report(&mut self, state: JobState, progress: u8) {
        let progress = progress.min(100).max(self.last);
        self.last = progress;
        (self.sink)(state, progress);
    }

    pub fn last(&self) -> u8 {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reporter_never_goes_backwards() {
        let mut seen = Vec::new();
        let mut sink = |state: JobState, p: u8| seen.push((state, p));
        let mut reporter = ProgressReporter::new(&mut sink);
        reporter.enter(JobState::Loading);
        reporter.enter(JobState::Planning);
        reporter.report(JobState::Planning, 3);
        reporter.report(JobState::Encoding, 250);
        assert_eq!(reporter.last(), 100);
        drop(reporter);

        assert_eq!(
            seen,
            vec![
                (JobState::Loading, 5),
                (JobState::Planning, 10),
                (JobState::Planning, 10),
                (JobState::Encoding, 100),
            ]
        );
    }

    #[test]
    fn status_line_matches_counts() {
        let progress = BatchProgress { queued: 2, processing: 3, completed: 4, succeeded: 3, failed: 1 };
        assert_eq!(progress.status_line(), "2 files in queue, 3 processing, 4 completed (1 failed)");
    }
}
