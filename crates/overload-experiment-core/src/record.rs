use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::policy::{ExperimentMode, TaskType};
use crate::scoring::{elapsed_whole_seconds, pairwise_rank_agreement, tlx_average};
use crate::session::{Session, TlxRatings, TrialDecision};
use crate::{format_rfc3339, parse_rfc3339_utc, ExperimentError, Scenario};

pub const EXPORT_FILE_NAME: &str = "experiment_results.json";

/// One completed trial. Immutable once appended to a [`ResultLog`].
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ResultRecord {
    /// Scenario title as shown to the participant.
    pub scenario: String,
    pub mode: ExperimentMode,
    pub task: TaskType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ranking: Option<Vec<String>>,
    /// Single task: the chosen decision's ground truth. Ranking task: whether
    /// the submitted top entry matches the ideal top entry.
    pub correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank_score_pct: Option<u8>,
    pub time_sec: u64,
    pub clicks: u32,
    pub tlx: TlxRatings,
    pub tlx_avg_20: u8,
    pub timestamp: String,
}

impl ResultRecord {
    /// Builds the record for the trial that is being saved at `finished_at`.
    ///
    /// # Errors
    /// Returns [`ExperimentError::Validation`] when the session has no start
    /// time or no decision, or when the timestamp cannot be formatted.
    pub fn from_session(
        scenario: &Scenario,
        mode: ExperimentMode,
        session: &Session,
        finished_at: OffsetDateTime,
    ) -> Result<Self, ExperimentError> {
        let started_at = session.started_at().ok_or_else(|| {
            ExperimentError::Validation("trial MUST be started before recording".to_string())
        })?;
        let decision = session.decision().ok_or_else(|| {
            ExperimentError::Validation("trial MUST have a decision before recording".to_string())
        })?;

        let (choice, ranking, correct, rank_score_pct) = match decision {
            TrialDecision::Single {
                decision_id,
                correct,
            } => (Some(decision_id.clone()), None, *correct, None),
            TrialDecision::Ranking { top_choice_correct } => (
                None,
                Some(session.ranking().to_vec()),
                *top_choice_correct,
                pairwise_rank_agreement(&scenario.ideal_ranking, session.ranking()),
            ),
        };

        Ok(Self {
            scenario: scenario.title.clone(),
            mode,
            task: decision.task(),
            choice,
            ranking,
            correct,
            rank_score_pct,
            time_sec: elapsed_whole_seconds(started_at, finished_at),
            clicks: session.clicks(),
            tlx: *session.ratings(),
            tlx_avg_20: tlx_average(session.ratings()),
            timestamp: format_rfc3339(finished_at)?,
        })
    }

    /// # Errors
    /// Returns [`ExperimentError::Validation`] when a field violates the export contract.
    pub fn validate(&self) -> Result<(), ExperimentError> {
        match self.task {
            TaskType::Single if self.choice.is_none() || self.ranking.is_some() => {
                return Err(ExperimentError::Validation(
                    "single-choice record MUST carry choice and no ranking".to_string(),
                ));
            }
            TaskType::Ranking if self.ranking.is_none() || self.choice.is_some() => {
                return Err(ExperimentError::Validation(
                    "ranking record MUST carry ranking and no choice".to_string(),
                ));
            }
            _ => {}
        }
        if self.rank_score_pct.is_some_and(|score| score > 100) {
            return Err(ExperimentError::Validation(
                "rank_score_pct MUST be in [0, 100]".to_string(),
            ));
        }
        if self.tlx_avg_20 != tlx_average(&self.tlx) {
            return Err(ExperimentError::Validation(
                "tlx_avg_20 MUST equal the rounded mean of tlx".to_string(),
            ));
        }
        parse_rfc3339_utc(&self.timestamp)?;
        Ok(())
    }
}

/// Append-only log of completed trials, in completion order.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ResultLog {
    records: Vec<ResultRecord>,
}

impl ResultLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: ResultRecord) {
        self.records.push(record);
    }

    #[must_use]
    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&ResultRecord> {
        self.records.last()
    }
}

/// Serializes the records as a pretty-printed JSON array.
///
/// # Errors
/// Returns [`ExperimentError::Export`] when serialization fails.
pub fn export_json(records: &[ResultRecord]) -> Result<String, ExperimentError> {
    serde_json::to_string_pretty(records)
        .map_err(|err| ExperimentError::Export(format!("failed to serialize results: {err}")))
}

/// Parses and validates a previously exported results document.
///
/// # Errors
/// Returns [`ExperimentError::Export`] when the document is not a results array,
/// or [`ExperimentError::Validation`] when a record violates the contract.
pub fn parse_export(raw: &str) -> Result<Vec<ResultRecord>, ExperimentError> {
    let records: Vec<ResultRecord> = serde_json::from_str(raw)
        .map_err(|err| ExperimentError::Export(format!("invalid results document: {err}")))?;
    for record in &records {
        record.validate()?;
    }
    Ok(records)
}
