use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ExperimentError;

pub const CATALOG_CONTRACT_VERSION: &str = "scenarios.v1";

const BUILTIN_CATALOG_JSON: &str = include_str!("../catalog/scenarios.v1.json");

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Email,
    Dashboard,
    Notice,
    Chat,
    Photo,
    Drawing,
}

// (kind, key, glyph)
const KIND_TABLE: [(ArtifactKind, &str, &str); 6] = [
    (ArtifactKind::Email, "email", "✉️"),
    (ArtifactKind::Dashboard, "dashboard", "📊"),
    (ArtifactKind::Notice, "notice", "⚠️"),
    (ArtifactKind::Chat, "chat", "💬"),
    (ArtifactKind::Photo, "photo", "🖼️"),
    (ArtifactKind::Drawing, "drawing", "📐"),
];

impl ArtifactKind {
    pub const ALL: [Self; 6] = [
        Self::Email,
        Self::Dashboard,
        Self::Notice,
        Self::Chat,
        Self::Photo,
        Self::Drawing,
    ];

    fn entry(self) -> (Self, &'static str, &'static str) {
        let index = match self {
            Self::Email => 0,
            Self::Dashboard => 1,
            Self::Notice => 2,
            Self::Chat => 3,
            Self::Photo => 4,
            Self::Drawing => 5,
        };
        KIND_TABLE[index]
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.entry().1
    }

    #[must_use]
    pub fn glyph(self) -> &'static str {
        self.entry().2
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        KIND_TABLE
            .iter()
            .find(|(_, key, _)| *key == value)
            .map(|(kind, _, _)| *kind)
    }
}

/// Artifact priority. Ordering is `Low < Medium < High`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Low" | "low" => Some(Self::Low),
            "Medium" | "medium" => Some(Self::Medium),
            "High" | "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Artifact {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub title: String,
    pub body: String,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub decoy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Decision {
    pub id: String,
    pub label: String,
    pub rationale: String,
    pub correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct MicroNotice {
    pub delay_ms: u64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Scenario {
    pub id: String,
    pub title: String,
    pub background: String,
    pub artifacts: Vec<Artifact>,
    pub decisions: Vec<Decision>,
    pub ideal_ranking: Vec<String>,
    pub must_open_ids: Vec<String>,
    #[serde(default)]
    pub micro_notices: Vec<MicroNotice>,
    #[serde(default)]
    pub decoy_pool: Vec<Artifact>,
    #[serde(default)]
    pub notice_pool: Vec<String>,
}

impl Scenario {
    #[must_use]
    pub fn decision(&self, id: &str) -> Option<&Decision> {
        self.decisions.iter().find(|decision| decision.id == id)
    }

    #[must_use]
    pub fn artifact(&self, id: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|artifact| artifact.id == id)
    }

    /// Decision identifiers in catalog order; the initial ranking of a session.
    #[must_use]
    pub fn decision_ids(&self) -> Vec<String> {
        self.decisions
            .iter()
            .map(|decision| decision.id.clone())
            .collect()
    }

    /// Validates identifier uniqueness and cross references.
    ///
    /// # Errors
    /// Returns [`ExperimentError::Validation`] naming the first violated rule.
    pub fn validate(&self) -> Result<(), ExperimentError> {
        if self.id.trim().is_empty() {
            return Err(ExperimentError::Validation(
                "scenario id MUST be provided".to_string(),
            ));
        }

        if self.artifacts.is_empty() {
            return Err(ExperimentError::Validation(format!(
                "scenario {} MUST define at least one artifact",
                self.id
            )));
        }

        let mut artifact_ids = BTreeSet::new();
        for artifact in &self.artifacts {
            if !artifact_ids.insert(artifact.id.as_str()) {
                return Err(ExperimentError::Validation(format!(
                    "scenario {} has duplicate artifact id {}",
                    self.id, artifact.id
                )));
            }
        }

        for artifact in &self.artifacts {
            if let Some(target) = artifact.duplicate_of.as_deref() {
                if target == artifact.id || !artifact_ids.contains(target) {
                    return Err(ExperimentError::Validation(format!(
                        "artifact {} duplicate_of MUST reference another artifact in {}",
                        artifact.id, self.id
                    )));
                }
            }
        }

        let mut decision_ids = BTreeSet::new();
        for decision in &self.decisions {
            if !decision_ids.insert(decision.id.as_str()) {
                return Err(ExperimentError::Validation(format!(
                    "scenario {} has duplicate decision id {}",
                    self.id, decision.id
                )));
            }
        }

        let ranking_ids: BTreeSet<&str> = self.ideal_ranking.iter().map(String::as_str).collect();
        if ranking_ids.len() != self.ideal_ranking.len() || ranking_ids != decision_ids {
            return Err(ExperimentError::Validation(format!(
                "ideal_ranking of {} MUST be a permutation of its decision ids",
                self.id
            )));
        }

        for id in &self.must_open_ids {
            if !artifact_ids.contains(id.as_str()) {
                return Err(ExperimentError::Validation(format!(
                    "must_open id {id} is not an artifact of {}",
                    self.id
                )));
            }
        }

        for decoy in &self.decoy_pool {
            if decoy.priority != Priority::Low {
                return Err(ExperimentError::Validation(format!(
                    "decoy {} in {} MUST be Low priority",
                    decoy.id, self.id
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Catalog {
    pub catalog_version: String,
    pub scenarios: Vec<Scenario>,
}

impl Catalog {
    /// Decodes the catalog compiled into the binary.
    ///
    /// # Errors
    /// Returns [`ExperimentError::Catalog`] if the embedded document fails to decode
    /// and [`ExperimentError::Validation`] if it violates catalog invariants.
    pub fn builtin() -> Result<Self, ExperimentError> {
        Self::from_json_str(BUILTIN_CATALOG_JSON)
    }

    /// Decodes and validates a catalog from JSON text.
    ///
    /// # Errors
    /// Returns [`ExperimentError::Catalog`] when decoding fails and
    /// [`ExperimentError::Validation`] when decoded values violate invariants.
    pub fn from_json_str(raw: &str) -> Result<Self, ExperimentError> {
        let catalog: Self = serde_json::from_str(raw)
            .map_err(|err| ExperimentError::Catalog(format!("invalid catalog JSON payload: {err}")))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Validates the catalog version and every scenario.
    ///
    /// # Errors
    /// Returns [`ExperimentError::Validation`] on the first violation found.
    pub fn validate(&self) -> Result<(), ExperimentError> {
        if self.catalog_version != CATALOG_CONTRACT_VERSION {
            return Err(ExperimentError::Validation(format!(
                "catalog_version MUST be {CATALOG_CONTRACT_VERSION}, got {}",
                self.catalog_version
            )));
        }

        if self.scenarios.is_empty() {
            return Err(ExperimentError::Validation(
                "catalog MUST contain at least one scenario".to_string(),
            ));
        }

        let mut ids = BTreeSet::new();
        for scenario in &self.scenarios {
            if !ids.insert(scenario.id.as_str()) {
                return Err(ExperimentError::Validation(format!(
                    "duplicate scenario id {}",
                    scenario.id
                )));
            }
            scenario.validate()?;
        }

        Ok(())
    }

    /// Looks up a scenario by identifier.
    ///
    /// # Errors
    /// Returns [`ExperimentError::Catalog`] when no scenario has that id.
    pub fn scenario(&self, id: &str) -> Result<&Scenario, ExperimentError> {
        self.scenarios
            .iter()
            .find(|scenario| scenario.id == id)
            .ok_or_else(|| ExperimentError::Catalog(format!("unknown scenario id {id}")))
    }

    #[must_use]
    pub fn scenario_ids(&self) -> Vec<&str> {
        self.scenarios
            .iter()
            .map(|scenario| scenario.id.as_str())
            .collect()
    }
}
