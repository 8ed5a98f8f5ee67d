//! Lifecycle states of a conversion job.

use serde::{Deserialize, Serialize};

/// Where a job is in its conversion.
///
/// Transitions run strictly `Queued -> Loading -> Planning -> Encoding ->
/// {Succeeded | Failed}`; `Loading` may also fail directly on a decode error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
    Queued,
    Loading,
    Planning,
    Encoding,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Progress reported when the job enters this state.
    pub fn milestone(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Loading => 5,
            Self::Planning => 10,
            Self::Encoding => 30,
            Self::Succeeded => 100,
            // A failure keeps whatever progress was reached
            Self::Failed => 0,
        }
    }

    /// Whether `next` is a legal successor. Staying in the same state is allowed
    /// so repeated progress ticks within a phase are accepted.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (a, b) if *a == b => !a.is_terminal(),
            (Queued, Loading) => true,
            (Loading, Planning) | (Loading, Failed) => true,
            (Planning, Encoding) | (Planning, Failed) => true,
            (Encoding, Succeeded) | (Encoding, Failed) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_legal() {
        let path = [
            JobState::Queued,
            JobState::Loading,
            JobState::Planning,
            JobState::Encoding,
            JobState::Succeeded,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn no_skipping_or_going_back() {
        assert!(!JobState::Queued.can_transition_to(JobState::Encoding));
        assert!(!JobState::Encoding.can_transition_to(JobState::Loading));
        assert!(!JobState::Succeeded.can_transition_to(JobState::Failed));
        assert!(!JobState::Failed.can_transition_to(JobState::Queued));
        assert!(!JobState::Failed.can_transition_to(JobState::Failed));
        assert!(JobState::Encoding.can_transition_to(JobState::Encoding));
    }

    #[test]
    fn failures_from_working_states() {
        assert!(JobState::Loading.can_transition_to(JobState::Failed));
        assert!(JobState::Planning.can_transition_to(JobState::Failed));
        assert!(JobState::Encoding.can_transition_to(JobState::Failed));
        assert!(!JobState::Queued.can_transition_to(JobState::Failed));
    }
}
