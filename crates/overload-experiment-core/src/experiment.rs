use rand::rngs::StdRng;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::catalog::{Artifact, ArtifactKind, Catalog, Priority, Scenario};
use crate::notices::{
    draw_notice_text, plan_notices, Clock, NoticeSource, Scheduler, SystemClock, TimerEvent,
    TimerHandle, TimerQueue,
};
use crate::policy::{ExperimentMode, ModePolicy, TaskType};
use crate::presentation::{body_collapsed, present_artifacts};
use crate::record::{export_json, ResultLog, ResultRecord};
use crate::scoring::elapsed_whole_seconds;
use crate::session::{
    ActionOutcome, Move, RejectReason, Session, SessionPhase, TlxDimension, TlxRatings,
    TrialDecision,
};
use crate::ExperimentError;

/// One artifact as currently shown to the participant.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct DisplayedArtifact {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub glyph: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub title: String,
    pub body: String,
    pub priority: Priority,
    pub decoy: bool,
    pub opened: bool,
    pub collapsed: bool,
}

impl DisplayedArtifact {
    #[must_use]
    pub fn new(artifact: Artifact, policy: &ModePolicy, opened: bool) -> Self {
        Self {
            collapsed: body_collapsed(policy, &artifact) && !opened,
            opened,
            glyph: artifact.kind.glyph(),
            id: artifact.id,
            kind: artifact.kind,
            time: artifact.time,
            title: artifact.title,
            body: artifact.body,
            priority: artifact.priority,
            decoy: artifact.decoy,
        }
    }
}

/// Read-only snapshot of the controller for rendering.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct ExperimentView {
    pub session_id: String,
    pub scenario: String,
    pub scenario_title: String,
    pub mode: ExperimentMode,
    pub task: TaskType,
    pub phase: SessionPhase,
    pub clicks: u32,
    /// Whole seconds since the trial started; stops at the decision instant.
    pub elapsed_sec: Option<u64>,
    pub artifacts: Vec<DisplayedArtifact>,
    pub reveal_cursor: usize,
    pub ranking: Vec<String>,
    pub ranking_submitted: bool,
    pub decision: Option<TrialDecision>,
    pub missing_required_reads: Vec<String>,
    pub current_notice: Option<String>,
    pub rating_panel_open: bool,
    pub ratings: TlxRatings,
    pub completed_trials: usize,
}

/// Owns the selections, the live trial and the result log, and routes every
/// user action and timer firing through them.
pub struct Experiment<C: Clock = SystemClock, S: Scheduler = TimerQueue> {
    catalog: Catalog,
    mode: ExperimentMode,
    task: TaskType,
    scenario: Scenario,
    session: Session,
    clock: C,
    scheduler: S,
    rng: StdRng,
    results: ResultLog,
    current_notice: Option<String>,
    pending_timers: Vec<TimerHandle>,
    generation: u64,
    decided_at: Option<OffsetDateTime>,
}

impl<C: Clock, S: Scheduler> Experiment<C, S> {
    /// Starts on the first catalog scenario in baseline mode with the single-choice task.
    ///
    /// # Errors
    /// Returns [`ExperimentError`] when the catalog fails validation.
    pub fn with_parts(
        catalog: Catalog,
        clock: C,
        scheduler: S,
        rng: StdRng,
    ) -> Result<Self, ExperimentError> {
        catalog.validate()?;
        let scenario = catalog
            .scenarios
            .first()
            .cloned()
            .ok_or_else(|| ExperimentError::Catalog("catalog has no scenarios".to_string()))?;
        let session = Session::new(&scenario);

        Ok(Self {
            catalog,
            mode: ExperimentMode::Baseline,
            task: TaskType::Single,
            scenario,
            session,
            clock,
            scheduler,
            rng,
            results: ResultLog::new(),
            current_notice: None,
            pending_timers: Vec::new(),
            generation: 0,
            decided_at: None,
        })
    }

    #[must_use]
    pub fn mode(&self) -> ExperimentMode {
        self.mode
    }

    #[must_use]
    pub fn task(&self) -> TaskType {
        self.task
    }

    #[must_use]
    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn results(&self) -> &ResultLog {
        &self.results
    }

    #[must_use]
    pub fn current_notice(&self) -> Option<&str> {
        self.current_notice.as_deref()
    }

    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.scheduler.pending()
    }

    /// Artifacts as displayed right now under the active mode and reveal cursor.
    #[must_use]
    pub fn presented(&self) -> Vec<Artifact> {
        present_artifacts(
            &self.scenario,
            &self.mode.policy(),
            self.session.reveal_cursor(),
        )
    }

    /// Required reads still blocking a single choice; empty when the mode does not gate.
    #[must_use]
    pub fn missing_required_reads(&self) -> Vec<String> {
        if self.mode.policy().require_open_for_single {
            self.session.missing_required_reads(&self.scenario)
        } else {
            Vec::new()
        }
    }

    /// Changes the mode and keeps the trial; pending notices follow the new cadence.
    pub fn set_mode(&mut self, mode: ExperimentMode) -> ActionOutcome {
        self.mode = mode;
        if self.session.phase() == SessionPhase::Running {
            self.cancel_notices();
            self.schedule_notices();
        }
        self.session.record_interaction();
        ActionOutcome::Applied
    }

    pub fn set_task(&mut self, task: TaskType) -> ActionOutcome {
        self.task = task;
        self.session.record_interaction();
        ActionOutcome::Applied
    }

    /// Switches scenario and discards the live trial.
    pub fn select_scenario(&mut self, scenario_id: &str) -> ActionOutcome {
        let Ok(scenario) = self.catalog.scenario(scenario_id) else {
            return ActionOutcome::rejected(RejectReason::UnknownScenario {
                id: scenario_id.to_string(),
            });
        };
        self.scenario = scenario.clone();
        self.discard_session();
        ActionOutcome::Applied
    }

    /// Begins a fresh running trial. A no-op while the current trial runs untouched.
    pub fn start(&mut self) -> ActionOutcome {
        if self.session.untouched_since_start() {
            return ActionOutcome::Applied;
        }
        self.discard_session();
        let before = self.session.phase();
        self.session.begin(self.clock.now());
        self.sync_timers(before);
        ActionOutcome::Applied
    }

    pub fn reset(&mut self) -> ActionOutcome {
        self.discard_session();
        ActionOutcome::Applied
    }

    pub fn toggle_artifact(&mut self, artifact_id: &str) -> ActionOutcome {
        let visible = self.presented();
        let before = self.session.phase();
        let outcome = self
            .session
            .toggle_artifact(artifact_id, &visible, self.clock.now());
        self.finish(before, outcome)
    }

    pub fn move_entry(&mut self, decision_id: &str, direction: Move) -> ActionOutcome {
        let before = self.session.phase();
        let outcome =
            self.session
                .move_entry(decision_id, direction, self.task, self.clock.now());
        self.finish(before, outcome)
    }

    pub fn choose(&mut self, decision_id: &str) -> ActionOutcome {
        let before = self.session.phase();
        let outcome = self.session.choose(
            decision_id,
            &self.scenario,
            &self.mode.policy(),
            self.task,
        );
        self.finish(before, outcome)
    }

    pub fn submit_ranking(&mut self) -> ActionOutcome {
        let before = self.session.phase();
        let outcome = self
            .session
            .submit_ranking(&self.scenario, self.task, self.clock.now());
        self.finish(before, outcome)
    }

    pub fn reveal_more(&mut self) -> ActionOutcome {
        let policy = self.mode.policy();
        let candidates = present_artifacts(&self.scenario, &policy, usize::MAX).len();
        let before = self.session.phase();
        let outcome = self.session.reveal_more(&policy, candidates);
        self.finish(before, outcome)
    }

    pub fn reveal_less(&mut self) -> ActionOutcome {
        let before = self.session.phase();
        let outcome = self.session.reveal_less(&self.mode.policy());
        self.finish(before, outcome)
    }

    pub fn open_rating_panel(&mut self) -> ActionOutcome {
        let before = self.session.phase();
        let outcome = self.session.open_rating_panel();
        self.finish(before, outcome)
    }

    pub fn close_rating_panel(&mut self) -> ActionOutcome {
        let before = self.session.phase();
        let outcome = self.session.close_rating_panel();
        self.finish(before, outcome)
    }

    /// Adjusts one workload slider. Slider movement is not counted as a click.
    pub fn set_rating(&mut self, dimension: TlxDimension, value: u8) -> ActionOutcome {
        self.session.set_rating(dimension, value)
    }

    /// Saves the ratings and appends the completed trial to the result log.
    ///
    /// The record's click count covers every interaction before this save.
    ///
    /// # Errors
    /// Returns [`ExperimentError::Validation`] when the record timestamp cannot be formatted.
    pub fn save_rating(&mut self) -> Result<ActionOutcome, ExperimentError> {
        if let Err(reason) = self.session.ready_to_record() {
            return Ok(ActionOutcome::rejected(reason));
        }

        let record =
            ResultRecord::from_session(&self.scenario, self.mode, &self.session, self.clock.now())?;
        info!(
            session_id = %self.session.id(),
            scenario = %self.scenario.id,
            mode = record.mode.as_str(),
            task = record.task.as_str(),
            correct = record.correct,
            time_sec = record.time_sec,
            clicks = record.clicks,
            "trial recorded"
        );
        self.results.append(record);

        let before = self.session.phase();
        self.session.record_interaction();
        self.session.mark_recorded();
        self.sync_timers(before);
        Ok(ActionOutcome::Applied)
    }

    /// Delivers every due timer event. Events owned by a superseded trial are dropped.
    /// Returns the number of notices that became current.
    pub fn poll_timers(&mut self) -> usize {
        let mut delivered = 0;
        for event in self.scheduler.take_due(self.clock.now()) {
            if event.session_id != self.session.id() || event.generation != self.generation {
                debug!(
                    session_id = %event.session_id,
                    generation = event.generation,
                    "stale notice discarded"
                );
                continue;
            }

            let text = match event.source {
                NoticeSource::Scenario => event.text,
                NoticeSource::Synthetic => draw_notice_text(&self.scenario, &mut self.rng),
            };
            if let Some(text) = text {
                debug!(session_id = %event.session_id, notice = %text, "notice fired");
                self.current_notice = Some(text);
                delivered += 1;
            }
        }
        delivered
    }

    /// Serializes the result log for download. The export itself is a counted click.
    ///
    /// # Errors
    /// Returns [`ExperimentError::Export`] when serialization fails.
    pub fn export(&mut self) -> Result<String, ExperimentError> {
        let body = export_json(self.results.records())?;
        self.session.record_interaction();
        Ok(body)
    }

    #[must_use]
    pub fn view(&self) -> ExperimentView {
        let policy = self.mode.policy();
        let artifacts = self
            .presented()
            .into_iter()
            .map(|artifact| {
                let opened = self.session.is_opened(&artifact.id);
                DisplayedArtifact::new(artifact, &policy, opened)
            })
            .collect();

        ExperimentView {
            session_id: self.session.id().to_string(),
            scenario: self.scenario.id.clone(),
            scenario_title: self.scenario.title.clone(),
            mode: self.mode,
            task: self.task,
            phase: self.session.phase(),
            clicks: self.session.clicks(),
            elapsed_sec: self.session.started_at().map(|started_at| {
                let until = self.decided_at.unwrap_or_else(|| self.clock.now());
                elapsed_whole_seconds(started_at, until)
            }),
            artifacts,
            reveal_cursor: self.session.reveal_cursor(),
            ranking: self.session.ranking().to_vec(),
            ranking_submitted: self.session.ranking_submitted(),
            decision: self.session.decision().cloned(),
            missing_required_reads: self.missing_required_reads(),
            current_notice: self.current_notice.clone(),
            rating_panel_open: self.session.rating_panel_open(),
            ratings: *self.session.ratings(),
            completed_trials: self.results.len(),
        }
    }

    fn finish(&mut self, before: SessionPhase, outcome: ActionOutcome) -> ActionOutcome {
        if outcome.is_applied() {
            self.session.record_interaction();
            self.sync_timers(before);
        }
        outcome
    }

    fn sync_timers(&mut self, before: SessionPhase) {
        let after = self.session.phase();
        if before == SessionPhase::Idle && after != SessionPhase::Idle {
            debug!(
                session_id = %self.session.id(),
                scenario = %self.scenario.id,
                mode = self.mode.as_str(),
                "session started"
            );
        }
        if before == SessionPhase::Idle && after == SessionPhase::Running {
            self.schedule_notices();
        }
        if matches!(before, SessionPhase::Idle | SessionPhase::Running)
            && matches!(after, SessionPhase::AwaitingRating | SessionPhase::Recorded)
        {
            self.decided_at = Some(self.clock.now());
            self.cancel_notices();
        }
    }

    fn schedule_notices(&mut self) {
        let now = self.clock.now();
        let plan = plan_notices(&self.scenario, &self.mode.policy(), &mut self.rng);
        for planned in plan {
            let event = TimerEvent {
                session_id: self.session.id(),
                generation: self.generation,
                source: planned.source,
                text: planned.text,
            };
            let handle = self.scheduler.schedule(now + planned.delay, event);
            self.pending_timers.push(handle);
        }
    }

    fn cancel_notices(&mut self) {
        for handle in self.pending_timers.drain(..) {
            self.scheduler.cancel(handle);
        }
        self.generation += 1;
    }

    fn discard_session(&mut self) {
        let dropped = self.scheduler.cancel_all();
        self.pending_timers.clear();
        self.generation += 1;
        self.current_notice = None;
        self.decided_at = None;
        self.session = Session::new(&self.scenario);
        debug!(
            session_id = %self.session.id(),
            scenario = %self.scenario.id,
            dropped_timers = dropped,
            "session reset"
        );
    }
}
