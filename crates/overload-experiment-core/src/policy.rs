use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentMode {
    Baseline,
    Filtered,
    Adaptive,
}

impl ExperimentMode {
    pub const ALL: [Self; 3] = [Self::Baseline, Self::Filtered, Self::Adaptive];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Filtered => "filtered",
            Self::Adaptive => "adaptive",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "baseline" => Some(Self::Baseline),
            "filtered" => Some(Self::Filtered),
            "adaptive" => Some(Self::Adaptive),
            _ => None,
        }
    }

    /// Participant-facing label.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Baseline => "Baseline",
            Self::Filtered => "Filtrerat",
            Self::Adaptive => "Adaptivt",
        }
    }

    #[must_use]
    pub fn policy(self) -> ModePolicy {
        ModePolicy::for_mode(self)
    }
}

impl Display for ExperimentMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Single,
    Ranking,
}

impl TaskType {
    pub const ALL: [Self; 2] = [Self::Single, Self::Ranking];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Ranking => "ranking",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "single" => Some(Self::Single),
            "ranking" => Some(Self::Ranking),
            _ => None,
        }
    }

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Single => "Enskilt val",
            Self::Ranking => "Rangordna",
        }
    }
}

impl Display for TaskType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Information-load parameters of one experiment mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct ModePolicy {
    pub decoys: usize,
    pub collapse_bodies: bool,
    pub require_open_for_single: bool,
    pub consolidate: bool,
    pub notice_interval_sec: u32,
    pub notice_jitter_sec: u32,
    pub adaptive_reveal: bool,
}

impl ModePolicy {
    pub const BASELINE: Self = Self {
        decoys: 3,
        collapse_bodies: true,
        require_open_for_single: true,
        consolidate: false,
        notice_interval_sec: 12,
        notice_jitter_sec: 5,
        adaptive_reveal: false,
    };

    pub const FILTERED: Self = Self {
        decoys: 1,
        collapse_bodies: false,
        require_open_for_single: false,
        consolidate: true,
        notice_interval_sec: 35,
        notice_jitter_sec: 8,
        adaptive_reveal: false,
    };

    pub const ADAPTIVE: Self = Self {
        decoys: 0,
        collapse_bodies: false,
        require_open_for_single: false,
        consolidate: false,
        notice_interval_sec: 0,
        notice_jitter_sec: 0,
        adaptive_reveal: true,
    };

    #[must_use]
    pub fn for_mode(mode: ExperimentMode) -> Self {
        match mode {
            ExperimentMode::Baseline => Self::BASELINE,
            ExperimentMode::Filtered => Self::FILTERED,
            ExperimentMode::Adaptive => Self::ADAPTIVE,
        }
    }

    #[must_use]
    pub fn synthetic_notices_enabled(&self) -> bool {
        self.notice_interval_sec > 0
    }
}
