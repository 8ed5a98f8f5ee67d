//! Conversion job records.

use std::fmt;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::core::{ConversionRequest, ConversionResult, JobState, SourceFile};
use crate::utils::ConverterError;

/// Identifier of a job within one batch. Retries get a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One file's conversion request plus its lifecycle state.
///
/// Owned by the batch scheduler; the conversion itself runs on a
/// [`JobTicket`] and reports back through events.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub id: JobId,
    pub source: SourceFile,
    pub request: Arc<ConversionRequest>,
    pub state: JobState,
    /// 0-100, never decreases
    pub progress: u8,
    /// Present only in `Succeeded`
    pub result: Option<ConversionResult>,
    /// Present only in `Failed`
    pub error: Option<ConverterError>,
    /// The failed job this one retries
    pub retry_of: Option<JobId>,
}

impl ConversionJob {
    pub fn new(id: JobId, source: SourceFile, request: Arc<ConversionRequest>) -> Self {
        Self {
            id,
            source,
            request,
            state: JobState::Queued,
            progress: 0,
            result: None,
            error: None,
            retry_of: None,
        }
    }

    /// A fresh queued job with the same source and request.
    pub fn retry(&self, id: JobId) -> Self {
        Self {
            retry_of: Some(self.id),
            ..Self::new(id, self.source.clone(), Arc::clone(&self.request))
        }
    }

    /// Everything a worker needs to run the conversion.
    pub fn ticket(&self) -> JobTicket {
        JobTicket {
            id: self.id,
            source: self.source.clone(),
            request: Arc::clone(&self.request),
        }
    }

    /// Applies a progress report. Illegal transitions and regressions are ignored.
    pub fn advance(&mut self, state: JobState, progress: u8) -> bool {
        if !self.state.can_transition_to(state) || state.is_terminal() {
            return false;
        }
        self.state = state;
        self.progress = self.progress.max(progress.min(100));
        true
    }

    /// Records the terminal outcome.
    pub fn finish(&mut self, outcome: Result<ConversionResult, ConverterError>) {
        match outcome {
            Ok(result) => {
                self.state = JobState::Succeeded;
                self.progress = 100;
                self.result = Some(result);
                self.error = None;
            }
            Err(error) => {
                self.state = JobState::Failed;
                self.result = None;
                self.error = Some(error);
            }
        }
    }

    pub fn file_name(&self) -> &str {
        &self.source.name
    }
}

/// Detached copy of a job's inputs handed to a worker.
#[derive(Debug, Clone)]
pub struct JobTicket {
    pub id: JobId,
    pub source: SourceFile,
    pub request: Arc<ConversionRequest>,
}
