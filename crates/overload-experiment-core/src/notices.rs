use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::catalog::Scenario;
use crate::policy::ModePolicy;
use crate::session::SessionId;

/// Upper bound on synthetic notices scheduled per running session.
pub const SYNTHETIC_NOTICE_LIMIT: usize = 4;

pub trait Clock {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        crate::now_utc()
    }
}

/// Clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<OffsetDateTime>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn set(&self, at: OffsetDateTime) {
        self.now.set(at);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        self.now.get()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TimerHandle(pub u64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeSource {
    /// Fixed micro-notice from the scenario definition.
    Scenario,
    /// Randomized notice from the mode's cadence; text is drawn on firing.
    Synthetic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedNotice {
    pub delay: Duration,
    pub source: NoticeSource,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TimerEvent {
    pub session_id: SessionId,
    pub generation: u64,
    pub source: NoticeSource,
    pub text: Option<String>,
}

/// Delayed delivery of timer events, driven by an external notion of "now".
pub trait Scheduler {
    fn schedule(&mut self, due_at: OffsetDateTime, event: TimerEvent) -> TimerHandle;

    /// Returns `false` when the handle already fired or was cancelled.
    fn cancel(&mut self, handle: TimerHandle) -> bool;

    /// Cancels every pending timer and returns how many were dropped.
    fn cancel_all(&mut self) -> usize;

    /// Removes and returns every event due at or before `now`, earliest first.
    fn take_due(&mut self, now: OffsetDateTime) -> Vec<TimerEvent>;

    fn pending(&self) -> usize;
}

#[derive(Debug, Clone, Default)]
pub struct TimerQueue {
    entries: BTreeMap<(OffsetDateTime, u64), TimerEvent>,
    next_sequence: u64,
}

impl TimerQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn next_due(&self) -> Option<OffsetDateTime> {
        self.entries.keys().next().map(|(due_at, _)| *due_at)
    }
}

impl Scheduler for TimerQueue {
    fn schedule(&mut self, due_at: OffsetDateTime, event: TimerEvent) -> TimerHandle {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.entries.insert((due_at, sequence), event);
        TimerHandle(sequence)
    }

    fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(_, sequence), _| *sequence != handle.0);
        self.entries.len() != before
    }

    fn cancel_all(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        dropped
    }

    fn take_due(&mut self, now: OffsetDateTime) -> Vec<TimerEvent> {
        let mut due = Vec::new();
        while let Some(entry) = self.entries.first_entry() {
            if entry.key().0 > now {
                break;
            }
            due.push(entry.remove());
        }
        due
    }

    fn pending(&self) -> usize {
        self.entries.len()
    }
}

/// Builds the notice plan for one running session, ordered by delay from start.
///
/// Scenario micro-notices come first in catalog order; when the policy has a
/// nonzero interval and the scenario provides synthetic texts, up to
/// [`SYNTHETIC_NOTICE_LIMIT`] synthetic notices follow, each `interval +
/// uniform(0, jitter)` seconds after the previous one.
pub fn plan_notices<R: Rng>(
    scenario: &Scenario,
    policy: &ModePolicy,
    rng: &mut R,
) -> Vec<PlannedNotice> {
    let mut plan: Vec<PlannedNotice> = scenario
        .micro_notices
        .iter()
        .map(|notice| PlannedNotice {
            delay: Duration::milliseconds(i64::try_from(notice.delay_ms).unwrap_or(i64::MAX)),
            source: NoticeSource::Scenario,
            text: Some(notice.text.clone()),
        })
        .collect();

    if policy.synthetic_notices_enabled() && !scenario.notice_pool.is_empty() {
        let interval = f64::from(policy.notice_interval_sec);
        let jitter = f64::from(policy.notice_jitter_sec);
        let mut cumulative = 0.0_f64;
        for _ in 0..SYNTHETIC_NOTICE_LIMIT {
            cumulative += interval + rng.gen_range(0.0..=jitter);
            plan.push(PlannedNotice {
                delay: Duration::seconds_f64(cumulative),
                source: NoticeSource::Synthetic,
                text: None,
            });
        }
    }

    plan.sort_by_key(|notice| notice.delay);
    plan
}

/// Picks one synthetic notice text uniformly from the scenario pool.
pub fn draw_notice_text<R: Rng>(scenario: &Scenario, rng: &mut R) -> Option<String> {
    scenario.notice_pool.choose(rng).cloned()
}
