//! Shared domain enumerations aligned with persisted queue values.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Running,
    Done,
    Failed,
    Killed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "Pending",
            JobState::Running => "Running",
            JobState::Done => "Done",
            JobState::Failed => "Failed",
            JobState::Killed => "Killed",
        }
    }

    /// Terminal states that never run again without manual intervention.
    pub fn is_dead_letter(self) -> bool {
        matches!(self, JobState::Failed | JobState::Killed)
    }
}

impl TryFrom<&str> for JobState {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "Pending" | "Latest" | "pending" => Ok(JobState::Pending),
            "Running" | "running" => Ok(JobState::Running),
            "Done" | "done" => Ok(JobState::Done),
            "Failed" | "failed" => Ok(JobState::Failed),
            "Killed" | "killed" => Ok(JobState::Killed),
            _ => Err(()),
        }
    }
}

/// State selector for job listings.
///
/// apalis marks a job `Killed` once its last allowed attempt fails and
/// `Failed` while attempts remain, so the dead-letter selector covers both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStateFilter {
    Exact(JobState),
    DeadLetter,
}

impl JobStateFilter {
    /// Parse a `?state=` value. `failed` and `dead` select every dead letter.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "failed" | "Failed" | "dead" => Some(Self::DeadLetter),
            other => JobState::try_from(other).ok().map(Self::Exact),
        }
    }

    pub fn matches(self, state: JobState) -> bool {
        match self {
            Self::Exact(expected) => state == expected,
            Self::DeadLetter => state.is_dead_letter(),
        }
    }

    /// Persisted status strings selected by this filter.
    pub fn statuses(self) -> Vec<&'static str> {
        match self {
            Self::Exact(state) => vec![state.as_str()],
            Self::DeadLetter => vec![JobState::Failed.as_str(), JobState::Killed.as_str()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    CompressImage,
}

impl JobType {
    /// Queue namespace used both when pushing rows and when registering workers.
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::CompressImage => "compress_image",
        }
    }
}

impl TryFrom<&str> for JobType {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "compress_image" => Ok(JobType::CompressImage),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_state_accepts_queue_and_query_spellings() {
        assert_eq!(JobState::try_from("Failed"), Ok(JobState::Failed));
        assert_eq!(JobState::try_from("failed"), Ok(JobState::Failed));
        assert_eq!(JobState::try_from("Latest"), Ok(JobState::Pending));
        assert!(JobState::try_from("unknown").is_err());
    }

    #[test]
    fn only_failed_and_killed_are_dead_letters() {
        assert!(JobState::Failed.is_dead_letter());
        assert!(JobState::Killed.is_dead_letter());
        assert!(!JobState::Done.is_dead_letter());
        assert!(!JobState::Running.is_dead_letter());
    }

    #[test]
    fn failed_filter_selects_killed_jobs_too() {
        let failed = JobStateFilter::parse("failed").expect("known filter");
        assert_eq!(failed, JobStateFilter::DeadLetter);
        assert!(failed.matches(JobState::Killed));
        assert!(failed.matches(JobState::Failed));
        assert!(!failed.matches(JobState::Done));
        assert_eq!(failed.statuses(), vec!["Failed", "Killed"]);

        let killed = JobStateFilter::parse("killed").expect("known filter");
        assert_eq!(killed, JobStateFilter::Exact(JobState::Killed));
        assert!(!killed.matches(JobState::Failed));
        assert!(JobStateFilter::parse("exploded").is_none());
    }
}
