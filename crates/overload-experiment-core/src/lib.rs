use time::{OffsetDateTime, UtcOffset};

pub mod catalog;
pub mod experiment;
pub mod notices;
pub mod policy;
pub mod presentation;
pub mod record;
pub mod scoring;
pub mod session;

pub use catalog::{
    Artifact, ArtifactKind, Catalog, Decision, MicroNotice, Priority, Scenario,
    CATALOG_CONTRACT_VERSION,
};
pub use experiment::{DisplayedArtifact, Experiment, ExperimentView};
pub use notices::{
    draw_notice_text, plan_notices, Clock, ManualClock, NoticeSource, PlannedNotice, Scheduler,
    SystemClock, TimerEvent, TimerHandle, TimerQueue, SYNTHETIC_NOTICE_LIMIT,
};
pub use policy::{ExperimentMode, ModePolicy, TaskType};
pub use presentation::{body_collapsed, present_artifacts, CONSOLIDATED_MARKER};
pub use record::{export_json, parse_export, ResultLog, ResultRecord, EXPORT_FILE_NAME};
pub use scoring::{
    elapsed_whole_seconds, pairwise_rank_agreement, single_choice_correct, tlx_average,
    top_choice_matches,
};
pub use session::{
    ActionOutcome, Move, RejectReason, Session, SessionId, SessionPhase, TlxDimension,
    TlxRatings, TrialDecision, TLX_DEFAULT, TLX_MAX,
};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ExperimentError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("catalog error: {0}")]
    Catalog(String),
    #[error("export error: {0}")]
    Export(String),
}

/// Formats a timestamp as RFC3339 after normalizing to UTC.
///
/// # Errors
/// Returns [`ExperimentError::Validation`] when formatting fails.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, ExperimentError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| {
            ExperimentError::Validation(format!("failed to format RFC3339 timestamp: {err}"))
        })
}

/// Parses an RFC3339 timestamp and requires UTC (`Z`) offset.
///
/// # Errors
/// Returns [`ExperimentError::Validation`] when parsing fails or the
/// timestamp is not UTC.
pub fn parse_rfc3339_utc(value: &str) -> Result<OffsetDateTime, ExperimentError> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| ExperimentError::Validation(format!("invalid RFC3339 timestamp: {err}")))?;

    if parsed.offset() != UtcOffset::UTC {
        return Err(ExperimentError::Validation(
            "timestamp MUST use UTC offset Z".to_string(),
        ));
    }

    Ok(parsed)
}

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}
