//! Job identity, kind and lifecycle state

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque identifier returned at submission time
///
/// Carries no meaning beyond uniqueness; it is the lookup key for status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(Uuid);

impl JobHandle {
    /// Allocates a fresh handle
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for JobHandle {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobHandle {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Kind of test job
///
/// Determines which adapter runs the job and how its definition is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    ApiCase,
    ApiSuite,
    UiCase,
    Performance,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::ApiCase,
        JobKind::ApiSuite,
        JobKind::UiCase,
        JobKind::Performance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::ApiCase => "API_CASE",
            JobKind::ApiSuite => "API_SUITE",
            JobKind::UiCase => "UI_CASE",
            JobKind::Performance => "PERFORMANCE",
        }
    }

    /// Human-readable report title for a definition of this kind
    pub fn report_name(&self, definition_name: &str) -> String {
        let prefix = match self {
            JobKind::ApiCase => "API Test",
            JobKind::ApiSuite => "API Test Suite",
            JobKind::UiCase => "UI Test",
            JobKind::Performance => "Performance Test",
        };
        format!("{}: {}", prefix, definition_name)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    /// Accepts `API_CASE`, `api_case` and `api-case` spellings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        JobKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown job kind: {}", s))
    }
}

/// Lifecycle state of a submitted job
///
/// `Success`, `Failure` and `Cancelled` are terminal: no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Started,
    Progress,
    Success,
    Failure,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Success | JobState::Failure | JobState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Started => "STARTED",
            JobState::Progress => "PROGRESS",
            JobState::Success => "SUCCESS",
            JobState::Failure => "FAILURE",
            JobState::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobState::Pending),
            "STARTED" => Ok(JobState::Started),
            "PROGRESS" => Ok(JobState::Progress),
            "SUCCESS" => Ok(JobState::Success),
            "FAILURE" => Ok(JobState::Failure),
            "CANCELLED" => Ok(JobState::Cancelled),
            other => Err(format!("unknown job state: {}", other)),
        }
    }
}
