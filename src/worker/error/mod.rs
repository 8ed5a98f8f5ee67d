use crate::core::{JobId, JobState};
use crate::utils::ConverterError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkerError {
    #[error("No job {0} in this batch")]
    UnknownJob(JobId),

    #[error("Job {id} cannot be retried while {state:?}")]
    NotRetryable { id: JobId, state: JobState },

    #[error("Job {0} has already been retried")]
    AlreadyRetried(JobId),

    #[error(transparent)]
    Converter(#[from] ConverterError),
}

pub type WorkerResult<T> = Result<T, WorkerError>;
