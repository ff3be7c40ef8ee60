use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle of a job as seen by status pollers.
///
/// `created → parsing → generating_hero | awaiting_approval → generating ⇄
/// verifying → complete`, with `error` reachable from every non-terminal
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Parsing,
    GeneratingHero,
    AwaitingApproval,
    Generating,
    Verifying,
    Complete,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Parsing => "parsing",
            Self::GeneratingHero => "generating_hero",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Generating => "generating",
            Self::Verifying => "verifying",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;

        if self.is_terminal() {
            return false;
        }
        if self == next || next == Error {
            return true;
        }
        matches!(
            (self, next),
            (Created, Parsing)
                | (Created, GeneratingHero)
                | (Parsing, GeneratingHero)
                | (Parsing, Generating)
                | (GeneratingHero, AwaitingApproval)
                | (GeneratingHero, Generating)
                | (AwaitingApproval, Parsing)
                | (AwaitingApproval, GeneratingHero)
                | (Generating, Verifying)
                | (Generating, Complete)
                | (Verifying, Generating)
                | (Verifying, Complete)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let status = match raw.trim().to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "parsing" => Self::Parsing,
            "generating_hero" => Self::GeneratingHero,
            "awaiting_approval" => Self::AwaitingApproval,
            "generating" => Self::Generating,
            "verifying" => Self::Verifying,
            "complete" => Self::Complete,
            "error" => Self::Error,
            other => anyhow::bail!("unknown job status '{other}'"),
        };
        Ok(status)
    }
}
