use serde::Serialize;

use crate::CodeHit;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceResult {
    /// Fetched and scanned; `candidates` is the number of distinct tokens found.
    Scanned { candidates: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceOutcome {
    pub url: String,
    #[serde(flatten)]
    pub result: SourceResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChannelResult {
    Delivered,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelOutcome {
    pub channel: String,
    #[serde(flatten)]
    pub result: ChannelResult,
}

impl ChannelOutcome {
    pub fn is_delivered(&self) -> bool {
        self.result == ChannelResult::Delivered
    }
}

/// Summary of one scan-store-notify cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RunReport {
    pub sources: Vec<SourceOutcome>,
    /// Distinct codes after cross-source aggregation, before the store.
    pub candidates: usize,
    pub new_codes: Vec<CodeHit>,
    pub channels: Vec<ChannelOutcome>,
}

impl RunReport {
    pub fn sources_scanned(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| matches!(s.result, SourceResult::Scanned { .. }))
            .count()
    }

    pub fn sources_failed(&self) -> usize {
        self.sources.len() - self.sources_scanned()
    }

    pub fn channels_failed(&self) -> usize {
        self.channels.iter().filter(|c| !c.is_delivered()).count()
    }

    /// One-line summary for logs and terminal output.
    pub fn summary(&self) -> String {
        format!(
            "sources scanned={} failed={} candidates={} new={} channels delivered={} failed={}",
            self.sources_scanned(),
            self.sources_failed(),
            self.candidates,
            self.new_codes.len(),
            self.channels.len() - self.channels_failed(),
            self.channels_failed(),
        )
    }
}
