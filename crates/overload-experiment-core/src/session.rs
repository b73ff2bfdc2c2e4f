use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

use crate::catalog::{Artifact, Scenario};
use crate::policy::{ModePolicy, TaskType};
use crate::scoring::{single_choice_correct, top_choice_matches};

pub const TLX_MAX: u8 = 20;
pub const TLX_DEFAULT: u8 = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SessionId(pub Ulid);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TlxDimension {
    Mental,
    Physical,
    Temporal,
    Performance,
    Effort,
    Frustration,
}

impl TlxDimension {
    pub const ALL: [Self; 6] = [
        Self::Mental,
        Self::Physical,
        Self::Temporal,
        Self::Performance,
        Self::Effort,
        Self::Frustration,
    ];

    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Mental => "mental",
            Self::Physical => "physical",
            Self::Temporal => "temporal",
            Self::Performance => "performance",
            Self::Effort => "effort",
            Self::Frustration => "frustration",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Mental => "Mental Demand",
            Self::Physical => "Physical Demand",
            Self::Temporal => "Temporal Demand",
            Self::Performance => "Perceived Performance",
            Self::Effort => "Effort",
            Self::Frustration => "Frustration",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|dimension| dimension.key() == value)
    }
}

/// NASA-TLX style workload ratings; every value stays within `0..=TLX_MAX`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(try_from = "RawTlxRatings")]
pub struct TlxRatings {
    mental: u8,
    physical: u8,
    temporal: u8,
    performance: u8,
    effort: u8,
    frustration: u8,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTlxRatings {
    mental: u8,
    physical: u8,
    temporal: u8,
    performance: u8,
    effort: u8,
    frustration: u8,
}

impl TryFrom<RawTlxRatings> for TlxRatings {
    type Error = String;

    fn try_from(raw: RawTlxRatings) -> Result<Self, Self::Error> {
        let ratings = Self {
            mental: raw.mental,
            physical: raw.physical,
            temporal: raw.temporal,
            performance: raw.performance,
            effort: raw.effort,
            frustration: raw.frustration,
        };
        if ratings.values().iter().any(|value| *value > TLX_MAX) {
            return Err(format!("tlx ratings MUST be in [0, {TLX_MAX}]"));
        }
        Ok(ratings)
    }
}

impl Default for TlxRatings {
    fn default() -> Self {
        Self {
            mental: TLX_DEFAULT,
            physical: TLX_DEFAULT,
            temporal: TLX_DEFAULT,
            performance: TLX_DEFAULT,
            effort: TLX_DEFAULT,
            frustration: TLX_DEFAULT,
        }
    }
}

impl TlxRatings {
    #[must_use]
    pub fn get(&self, dimension: TlxDimension) -> u8 {
        match dimension {
            TlxDimension::Mental => self.mental,
            TlxDimension::Physical => self.physical,
            TlxDimension::Temporal => self.temporal,
            TlxDimension::Performance => self.performance,
            TlxDimension::Effort => self.effort,
            TlxDimension::Frustration => self.frustration,
        }
    }

    /// Sets one rating. Returns `false` and leaves the ratings untouched when
    /// `value` exceeds [`TLX_MAX`].
    pub fn set(&mut self, dimension: TlxDimension, value: u8) -> bool {
        if value > TLX_MAX {
            return false;
        }
        let slot = match dimension {
            TlxDimension::Mental => &mut self.mental,
            TlxDimension::Physical => &mut self.physical,
            TlxDimension::Temporal => &mut self.temporal,
            TlxDimension::Performance => &mut self.performance,
            TlxDimension::Effort => &mut self.effort,
            TlxDimension::Frustration => &mut self.frustration,
        };
        *slot = value;
        true
    }

    #[must_use]
    pub fn values(&self) -> [u8; 6] {
        TlxDimension::ALL.map(|dimension| self.get(dimension))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Running,
    AwaitingRating,
    Recorded,
}

impl SessionPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::AwaitingRating => "decided_awaiting_rating",
            Self::Recorded => "recorded",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Move {
    Up,
    Down,
}

/// What the participant committed to before rating.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TrialDecision {
    Single { decision_id: String, correct: bool },
    Ranking { top_choice_correct: bool },
}

impl TrialDecision {
    #[must_use]
    pub fn task(&self) -> TaskType {
        match self {
            Self::Single { .. } => TaskType::Single,
            Self::Ranking { .. } => TaskType::Ranking,
        }
    }
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    NotStarted,
    WrongTask,
    WrongPhase,
    GatedMustOpen { missing: Vec<String> },
    AlreadySubmitted,
    UnknownArtifact { id: String },
    UnknownDecision { id: String },
    UnknownScenario { id: String },
    MoveOutOfRange,
    RevealDisabled,
    RevealOutOfRange,
    RatingPanelClosed,
    RatingPanelAlreadyOpen,
    RatingOutOfRange { value: u8 },
}

impl RejectReason {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotStarted => "rejected.not_started",
            Self::WrongTask => "rejected.wrong_task",
            Self::WrongPhase => "rejected.wrong_phase",
            Self::GatedMustOpen { .. } => "rejected.gated.must_open",
            Self::AlreadySubmitted => "rejected.ranking.already_submitted",
            Self::UnknownArtifact { .. } => "rejected.unknown_artifact",
            Self::UnknownDecision { .. } => "rejected.unknown_decision",
            Self::UnknownScenario { .. } => "rejected.unknown_scenario",
            Self::MoveOutOfRange => "rejected.ranking.out_of_range",
            Self::RevealDisabled => "rejected.reveal.disabled",
            Self::RevealOutOfRange => "rejected.reveal.out_of_range",
            Self::RatingPanelClosed => "rejected.rating.panel_closed",
            Self::RatingPanelAlreadyOpen => "rejected.rating.panel_open",
            Self::RatingOutOfRange { .. } => "rejected.rating.out_of_range",
        }
    }
}

impl Display for RejectReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GatedMustOpen { missing } => {
                write!(f, "{}: open first: {}", self.code(), missing.join(", "))
            }
            Self::UnknownArtifact { id }
            | Self::UnknownDecision { id }
            | Self::UnknownScenario { id } => write!(f, "{}: {id}", self.code()),
            Self::RatingOutOfRange { value } => {
                write!(f, "{}: {value} not in [0, {TLX_MAX}]", self.code())
            }
            _ => f.write_str(self.code()),
        }
    }
}

/// Result of a user action. A rejected action leaves every piece of state unchanged.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    Applied,
    Rejected { reason: RejectReason },
}

impl ActionOutcome {
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    #[must_use]
    pub fn rejected(reason: RejectReason) -> Self {
        Self::Rejected { reason }
    }
}

impl From<Result<(), RejectReason>> for ActionOutcome {
    fn from(value: Result<(), RejectReason>) -> Self {
        match value {
            Ok(()) => Self::Applied,
            Err(reason) => Self::Rejected { reason },
        }
    }
}

/// Per-trial state. Created on scenario (re)start, discarded on reset or scenario change.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    id: SessionId,
    phase: SessionPhase,
    started_at: Option<OffsetDateTime>,
    clicks: u32,
    opened: BTreeSet<String>,
    ranking: Vec<String>,
    ranking_submitted: bool,
    decision: Option<TrialDecision>,
    reveal_cursor: usize,
    ratings: TlxRatings,
    rating_panel_open: bool,
}

impl Session {
    #[must_use]
    pub fn new(scenario: &Scenario) -> Self {
        Self {
            id: SessionId::new(),
            phase: SessionPhase::Idle,
            started_at: None,
            clicks: 0,
            opened: BTreeSet::new(),
            ranking: scenario.decision_ids(),
            ranking_submitted: false,
            decision: None,
            reveal_cursor: 0,
            ratings: TlxRatings::default(),
            rating_panel_open: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn started_at(&self) -> Option<OffsetDateTime> {
        self.started_at
    }

    #[must_use]
    pub fn clicks(&self) -> u32 {
        self.clicks
    }

    #[must_use]
    pub fn is_opened(&self, artifact_id: &str) -> bool {
        self.opened.contains(artifact_id)
    }

    #[must_use]
    pub fn ranking(&self) -> &[String] {
        &self.ranking
    }

    #[must_use]
    pub fn ranking_submitted(&self) -> bool {
        self.ranking_submitted
    }

    #[must_use]
    pub fn decision(&self) -> Option<&TrialDecision> {
        self.decision.as_ref()
    }

    #[must_use]
    pub fn reveal_cursor(&self) -> usize {
        self.reveal_cursor
    }

    #[must_use]
    pub fn ratings(&self) -> &TlxRatings {
        &self.ratings
    }

    #[must_use]
    pub fn rating_panel_open(&self) -> bool {
        self.rating_panel_open
    }

    /// True when the clock runs but nothing has been done since it started.
    #[must_use]
    pub fn untouched_since_start(&self) -> bool {
        self.phase == SessionPhase::Running && self.clicks == 0 && self.opened.is_empty()
    }

    /// Starts the clock on the first interaction. Returns `true` only for the
    /// `idle → running` transition itself.
    pub fn begin(&mut self, now: OffsetDateTime) -> bool {
        if self.started_at.is_some() {
            return false;
        }
        self.started_at = Some(now);
        self.phase = SessionPhase::Running;
        true
    }

    pub fn record_interaction(&mut self) {
        self.clicks = self.clicks.saturating_add(1);
    }

    /// Required artifacts not yet opened, in catalog order.
    #[must_use]
    pub fn missing_required_reads(&self, scenario: &Scenario) -> Vec<String> {
        scenario
            .must_open_ids
            .iter()
            .filter(|id| !self.opened.contains(id.as_str()))
            .cloned()
            .collect()
    }

    pub fn toggle_artifact(
        &mut self,
        artifact_id: &str,
        visible: &[Artifact],
        now: OffsetDateTime,
    ) -> ActionOutcome {
        if !visible.iter().any(|artifact| artifact.id == artifact_id) {
            return ActionOutcome::rejected(RejectReason::UnknownArtifact {
                id: artifact_id.to_string(),
            });
        }

        self.begin(now);
        if !self.opened.remove(artifact_id) {
            self.opened.insert(artifact_id.to_string());
        }
        ActionOutcome::Applied
    }

    pub fn move_entry(
        &mut self,
        decision_id: &str,
        direction: Move,
        task: TaskType,
        now: OffsetDateTime,
    ) -> ActionOutcome {
        if task != TaskType::Ranking {
            return ActionOutcome::rejected(RejectReason::WrongTask);
        }
        if self.ranking_submitted {
            return ActionOutcome::rejected(RejectReason::AlreadySubmitted);
        }
        let Some(index) = self.ranking.iter().position(|id| id == decision_id) else {
            return ActionOutcome::rejected(RejectReason::UnknownDecision {
                id: decision_id.to_string(),
            });
        };
        let target = match direction {
            Move::Up => index.checked_sub(1),
            Move::Down => Some(index + 1).filter(|next| *next < self.ranking.len()),
        };
        let Some(target) = target else {
            return ActionOutcome::rejected(RejectReason::MoveOutOfRange);
        };

        self.begin(now);
        self.ranking.swap(index, target);
        ActionOutcome::Applied
    }

    pub fn choose(
        &mut self,
        decision_id: &str,
        scenario: &Scenario,
        policy: &ModePolicy,
        task: TaskType,
    ) -> ActionOutcome {
        if task != TaskType::Single {
            return ActionOutcome::rejected(RejectReason::WrongTask);
        }
        match self.phase {
            SessionPhase::Idle => return ActionOutcome::rejected(RejectReason::NotStarted),
            SessionPhase::Recorded => return ActionOutcome::rejected(RejectReason::WrongPhase),
            SessionPhase::Running | SessionPhase::AwaitingRating => {}
        }
        if matches!(self.decision, Some(TrialDecision::Ranking { .. })) {
            return ActionOutcome::rejected(RejectReason::WrongPhase);
        }
        let Some(decision) = scenario.decision(decision_id) else {
            return ActionOutcome::rejected(RejectReason::UnknownDecision {
                id: decision_id.to_string(),
            });
        };
        if policy.require_open_for_single {
            let missing = self.missing_required_reads(scenario);
            if !missing.is_empty() {
                return ActionOutcome::rejected(RejectReason::GatedMustOpen { missing });
            }
        }

        self.decision = Some(TrialDecision::Single {
            decision_id: decision.id.clone(),
            correct: single_choice_correct(decision),
        });
        self.phase = SessionPhase::AwaitingRating;
        self.rating_panel_open = true;
        ActionOutcome::Applied
    }

    pub fn submit_ranking(
        &mut self,
        scenario: &Scenario,
        task: TaskType,
        now: OffsetDateTime,
    ) -> ActionOutcome {
        if task != TaskType::Ranking {
            return ActionOutcome::rejected(RejectReason::WrongTask);
        }
        if self.ranking_submitted {
            return ActionOutcome::rejected(RejectReason::AlreadySubmitted);
        }
        if !matches!(self.phase, SessionPhase::Idle | SessionPhase::Running) {
            return ActionOutcome::rejected(RejectReason::WrongPhase);
        }

        self.begin(now);
        self.ranking_submitted = true;
        self.decision = Some(TrialDecision::Ranking {
            top_choice_correct: top_choice_matches(&scenario.ideal_ranking, &self.ranking),
        });
        self.phase = SessionPhase::AwaitingRating;
        self.rating_panel_open = true;
        ActionOutcome::Applied
    }

    /// Reveals one more artifact; `candidates` is the count shown with no reveal limit.
    pub fn reveal_more(&mut self, policy: &ModePolicy, candidates: usize) -> ActionOutcome {
        if !policy.adaptive_reveal {
            return ActionOutcome::rejected(RejectReason::RevealDisabled);
        }
        if self.reveal_cursor.saturating_add(1) >= candidates {
            return ActionOutcome::rejected(RejectReason::RevealOutOfRange);
        }
        self.reveal_cursor += 1;
        ActionOutcome::Applied
    }

    pub fn reveal_less(&mut self, policy: &ModePolicy) -> ActionOutcome {
        if !policy.adaptive_reveal {
            return ActionOutcome::rejected(RejectReason::RevealDisabled);
        }
        let Some(previous) = self.reveal_cursor.checked_sub(1) else {
            return ActionOutcome::rejected(RejectReason::RevealOutOfRange);
        };
        self.reveal_cursor = previous;
        ActionOutcome::Applied
    }

    pub fn open_rating_panel(&mut self) -> ActionOutcome {
        if self.phase != SessionPhase::AwaitingRating {
            return ActionOutcome::rejected(RejectReason::WrongPhase);
        }
        if self.rating_panel_open {
            return ActionOutcome::rejected(RejectReason::RatingPanelAlreadyOpen);
        }
        self.rating_panel_open = true;
        ActionOutcome::Applied
    }

    pub fn close_rating_panel(&mut self) -> ActionOutcome {
        if !self.rating_panel_open {
            return ActionOutcome::rejected(RejectReason::RatingPanelClosed);
        }
        self.rating_panel_open = false;
        ActionOutcome::Applied
    }

    pub fn set_rating(&mut self, dimension: TlxDimension, value: u8) -> ActionOutcome {
        if !self.rating_panel_open {
            return ActionOutcome::rejected(RejectReason::RatingPanelClosed);
        }
        if !self.ratings.set(dimension, value) {
            return ActionOutcome::rejected(RejectReason::RatingOutOfRange { value });
        }
        ActionOutcome::Applied
    }

    /// Checks that saving the ratings is allowed right now.
    ///
    /// # Errors
    /// Returns the [`RejectReason`] when no decision awaits rating or the panel is closed.
    pub fn ready_to_record(&self) -> Result<(OffsetDateTime, &TrialDecision), RejectReason> {
        if self.phase != SessionPhase::AwaitingRating {
            return Err(RejectReason::WrongPhase);
        }
        if !self.rating_panel_open {
            return Err(RejectReason::RatingPanelClosed);
        }
        match (self.started_at, self.decision.as_ref()) {
            (Some(started_at), Some(decision)) => Ok((started_at, decision)),
            (None, _) => Err(RejectReason::NotStarted),
            (_, None) => Err(RejectReason::WrongPhase),
        }
    }

    /// `decided-awaiting-rating → recorded`. Decision and ranking stay visible.
    pub fn mark_recorded(&mut self) {
        self.phase = SessionPhase::Recorded;
        self.rating_panel_open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::policy::ExperimentMode;
    use crate::presentation::present_artifacts;
    use time::Duration;

    fn must_ok<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("expected Ok(..), got error: {err}"),
        }
    }

    fn s1() -> Scenario {
        let catalog = must_ok(Catalog::builtin());
        must_ok(catalog.scenario("S1")).clone()
    }

    fn t0() -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + Duration::days(20_000)
    }

    fn rejected_code(outcome: &ActionOutcome) -> Option<&'static str> {
        match outcome {
            ActionOutcome::Applied => None,
            ActionOutcome::Rejected { reason } => Some(reason.code()),
        }
    }

    #[test]
    fn new_session_is_idle_with_catalog_ranking_and_midpoint_ratings() {
        let scenario = s1();
        let session = Session::new(&scenario);
        assert_eq!(session.phase(), SessionPhase::Idle);
        assert_eq!(session.started_at(), None);
        assert_eq!(session.ranking(), scenario.decision_ids().as_slice());
        assert_eq!(session.ratings().values(), [TLX_DEFAULT; 6]);
    }

    #[test]
    fn begin_is_idempotent() {
        let scenario = s1();
        let mut session = Session::new(&scenario);
        assert!(session.begin(t0()));
        assert!(!session.begin(t0() + Duration::seconds(5)));
        assert_eq!(session.started_at(), Some(t0()));
        assert_eq!(session.phase(), SessionPhase::Running);
    }

    #[test]
    fn opening_an_artifact_starts_the_clock_and_toggles() {
        let scenario = s1();
        let visible = present_artifacts(&scenario, &ExperimentMode::Baseline.policy(), 0);
        let mut session = Session::new(&scenario);

        assert!(session.toggle_artifact("a1", &visible, t0()).is_applied());
        assert_eq!(session.phase(), SessionPhase::Running);
        assert!(session.is_opened("a1"));

        assert!(session.toggle_artifact("a1", &visible, t0()).is_applied());
        assert!(!session.is_opened("a1"));
        assert_eq!(
            rejected_code(&session.toggle_artifact("zz", &visible, t0())),
            Some("rejected.unknown_artifact")
        );
    }

    #[test]
    fn moving_the_top_entry_up_is_a_no_op() {
        let scenario = s1();
        let mut session = Session::new(&scenario);
        let before = session.clone();

        let outcome = session.move_entry("A", Move::Up, TaskType::Ranking, t0());
        assert_eq!(rejected_code(&outcome), Some("rejected.ranking.out_of_range"));
        assert_eq!(session, before);

        let outcome = session.move_entry("D", Move::Down, TaskType::Ranking, t0());
        assert_eq!(rejected_code(&outcome), Some("rejected.ranking.out_of_range"));
        assert_eq!(session, before);
    }

    #[test]
    fn moving_entries_keeps_a_permutation() {
        let scenario = s1();
        let mut session = Session::new(&scenario);
        assert!(session
            .move_entry("B", Move::Up, TaskType::Ranking, t0())
            .is_applied());
        assert!(session
            .move_entry("D", Move::Up, TaskType::Ranking, t0())
            .is_applied());
        assert_eq!(session.ranking(), ["B", "A", "D", "C"]);
        assert_eq!(session.phase(), SessionPhase::Running);

        let mut sorted = session.ranking().to_vec();
        sorted.sort();
        assert_eq!(sorted, scenario.decision_ids());
    }

    #[test]
    fn baseline_gating_blocks_choice_until_required_reads_are_opened() {
        let scenario = s1();
        let policy = ExperimentMode::Baseline.policy();
        let visible = present_artifacts(&scenario, &policy, 0);
        let mut session = Session::new(&scenario);
        session.begin(t0());

        for decision in ["A", "B", "C", "D"] {
            let outcome = session.choose(decision, &scenario, &policy, TaskType::Single);
            assert_eq!(
                outcome,
                ActionOutcome::rejected(RejectReason::GatedMustOpen {
                    missing: vec!["a1".to_string(), "a3".to_string()]
                })
            );
            assert_eq!(session.phase(), SessionPhase::Running);
        }

        assert!(session.toggle_artifact("a1", &visible, t0()).is_applied());
        assert_eq!(session.missing_required_reads(&scenario), vec!["a3"]);
        assert!(session.toggle_artifact("a3", &visible, t0()).is_applied());

        assert!(session
            .choose("B", &scenario, &policy, TaskType::Single)
            .is_applied());
        assert_eq!(session.phase(), SessionPhase::AwaitingRating);
        assert!(session.rating_panel_open());
        assert_eq!(
            session.decision(),
            Some(&TrialDecision::Single {
                decision_id: "B".to_string(),
                correct: true
            })
        );
    }

    #[test]
    fn filtered_and_adaptive_never_gate_the_choice() {
        let scenario = s1();
        for mode in [ExperimentMode::Filtered, ExperimentMode::Adaptive] {
            let mut session = Session::new(&scenario);
            session.begin(t0());
            assert!(session
                .choose("A", &scenario, &mode.policy(), TaskType::Single)
                .is_applied());
        }
    }

    #[test]
    fn choosing_before_the_clock_starts_is_rejected() {
        let scenario = s1();
        let mut session = Session::new(&scenario);
        let outcome = session.choose(
            "B",
            &scenario,
            &ExperimentMode::Adaptive.policy(),
            TaskType::Single,
        );
        assert_eq!(rejected_code(&outcome), Some("rejected.not_started"));
    }

    #[test]
    fn ranking_submission_records_top_choice_and_freezes_ranking() {
        let scenario = s1();
        let mut session = Session::new(&scenario);
        assert!(session
            .move_entry("B", Move::Up, TaskType::Ranking, t0())
            .is_applied());
        assert!(session
            .submit_ranking(&scenario, TaskType::Ranking, t0())
            .is_applied());
        assert_eq!(
            session.decision(),
            Some(&TrialDecision::Ranking {
                top_choice_correct: true
            })
        );
        assert_eq!(
            rejected_code(&session.submit_ranking(&scenario, TaskType::Ranking, t0())),
            Some("rejected.ranking.already_submitted")
        );
        assert_eq!(
            rejected_code(&session.move_entry("A", Move::Up, TaskType::Ranking, t0())),
            Some("rejected.ranking.already_submitted")
        );
    }

    #[test]
    fn submitting_from_idle_starts_the_clock() {
        let scenario = s1();
        let mut session = Session::new(&scenario);
        assert!(session
            .submit_ranking(&scenario, TaskType::Ranking, t0())
            .is_applied());
        assert_eq!(session.started_at(), Some(t0()));
        assert_eq!(
            session.decision(),
            Some(&TrialDecision::Ranking {
                top_choice_correct: false
            })
        );
    }

    #[test]
    fn reveal_cursor_is_floored_and_capped() {
        let scenario = s1();
        let adaptive = ExperimentMode::Adaptive.policy();
        let mut session = Session::new(&scenario);

        assert_eq!(
            rejected_code(&session.reveal_less(&adaptive)),
            Some("rejected.reveal.out_of_range")
        );
        assert!(session.reveal_more(&adaptive, 3).is_applied());
        assert!(session.reveal_more(&adaptive, 3).is_applied());
        assert_eq!(
            rejected_code(&session.reveal_more(&adaptive, 3)),
            Some("rejected.reveal.out_of_range")
        );
        assert_eq!(session.reveal_cursor(), 2);
        assert!(session.reveal_less(&adaptive).is_applied());
        assert_eq!(session.reveal_cursor(), 1);

        assert_eq!(
            rejected_code(&session.reveal_more(&ExperimentMode::Baseline.policy(), 3)),
            Some("rejected.reveal.disabled")
        );
    }

    #[test]
    fn ratings_require_open_panel_and_stay_in_range() {
        let scenario = s1();
        let mut session = Session::new(&scenario);
        assert_eq!(
            rejected_code(&session.set_rating(TlxDimension::Effort, 4)),
            Some("rejected.rating.panel_closed")
        );

        assert!(session
            .submit_ranking(&scenario, TaskType::Ranking, t0())
            .is_applied());
        assert!(session.set_rating(TlxDimension::Effort, 4).is_applied());
        assert_eq!(
            rejected_code(&session.set_rating(TlxDimension::Effort, 21)),
            Some("rejected.rating.out_of_range")
        );
        assert_eq!(session.ratings().get(TlxDimension::Effort), 4);
    }

    #[test]
    fn closing_and_reopening_the_rating_panel() {
        let scenario = s1();
        let mut session = Session::new(&scenario);
        assert_eq!(
            rejected_code(&session.open_rating_panel()),
            Some("rejected.wrong_phase")
        );
        assert!(session
            .submit_ranking(&scenario, TaskType::Ranking, t0())
            .is_applied());
        assert!(session.close_rating_panel().is_applied());
        assert_eq!(
            session.ready_to_record().err(),
            Some(RejectReason::RatingPanelClosed)
        );
        assert!(session.open_rating_panel().is_applied());
        assert!(session.ready_to_record().is_ok());

        session.mark_recorded();
        assert_eq!(session.phase(), SessionPhase::Recorded);
        assert!(!session.rating_panel_open());
        assert_eq!(session.ready_to_record().err(), Some(RejectReason::WrongPhase));
    }

    #[test]
    fn ratings_deserialization_rejects_out_of_range_values() {
        let raw = r#"{"mental":21,"physical":0,"temporal":0,"performance":0,"effort":0,"frustration":0}"#;
        assert!(serde_json::from_str::<TlxRatings>(raw).is_err());

        let raw = r#"{"mental":20,"physical":0,"temporal":0,"performance":0,"effort":0,"frustration":0}"#;
        let parsed = must_ok(serde_json::from_str::<TlxRatings>(raw));
        assert_eq!(parsed.get(TlxDimension::Mental), 20);
    }
}
