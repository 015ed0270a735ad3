//! Debate request and report types.
//!
//! Everything here is created and consumed inside one debate run and is
//! never mutated after construction.

use serde::{Deserialize, Serialize};

use crate::dispatch::{BackendId, DispatchError, FailureKind};
use crate::persona::PersonaId;

/// Input to a panel debate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateRequest {
    pub persona_id: PersonaId,
    pub user_input: String,
    pub bad_output: String,
    /// Panel seats in order; index 0 is the baseline.
    pub backends: Vec<BackendId>,
}

impl DebateRequest {
    pub fn new(
        persona_id: impl Into<PersonaId>,
        user_input: impl Into<String>,
        bad_output: impl Into<String>,
        backends: Vec<BackendId>,
    ) -> Self {
        Self {
            persona_id: persona_id.into(),
            user_input: user_input.into(),
            bad_output: bad_output.into(),
            backends,
        }
    }

    pub fn baseline(&self) -> Option<BackendId> {
        self.backends.first().copied()
    }

    /// Whether phase 2 applies (two or more seats).
    pub fn is_cross_examined(&self) -> bool {
        self.backends.len() >= 2
    }
}

/// One backend's phase-1 diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub backend: BackendId,
    pub report_text: String,
}

/// One backend's phase-2 commentary on the baseline verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Critique {
    pub by: BackendId,
    pub of: BackendId,
    pub text: String,
}

/// Marker left in a slot whose backend call failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelFailure {
    pub backend: BackendId,
    pub kind: FailureKind,
    pub message: String,
}

impl PanelFailure {
    pub fn from_error(backend: BackendId, error: &DispatchError) -> Self {
        Self {
            backend,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// A report position: either the panelist's output or its failure marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Slot<T> {
    Filled(T),
    Failed(PanelFailure),
}

impl<T> Slot<T> {
    pub fn filled(&self) -> Option<&T> {
        match self {
            Self::Filled(v) => Some(v),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&PanelFailure> {
        match self {
            Self::Filled(_) => None,
            Self::Failed(f) => Some(f),
        }
    }

    pub fn is_filled(&self) -> bool {
        matches!(self, Self::Filled(_))
    }
}

/// Why phase 2 did not run on a multi-seat panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The baseline verdict failed, so there is nothing to critique.
    BaselineFailed,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BaselineFailed => write!(f, "baseline_failed"),
        }
    }
}

/// Phase-2 section of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CrossExamination {
    /// Single-seat panel.
    NotApplicable,
    Skipped {
        reason: SkipReason,
    },
    Completed {
        baseline: Verdict,
        /// One per non-baseline seat, in seat order.
        critiques: Vec<Slot<Critique>>,
    },
}

/// Final output of a debate run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebateReport {
    pub persona_id: PersonaId,
    /// One per seat, in request order.
    pub verdicts: Vec<Slot<Verdict>>,
    pub cross_examination: CrossExamination,
}

impl DebateReport {
    /// Phase 2 was required but skipped.
    pub fn is_degraded(&self) -> bool {
        matches!(self.cross_examination, CrossExamination::Skipped { .. })
    }

    pub fn baseline(&self) -> Option<&Verdict> {
        match &self.cross_examination {
            CrossExamination::Completed { baseline, .. } => Some(baseline),
            _ => None,
        }
    }

    pub fn critiques(&self) -> &[Slot<Critique>] {
        match &self.cross_examination {
            CrossExamination::Completed { critiques, .. } => critiques,
            _ => &[],
        }
    }

    /// Backends with at least one failed slot, first-failure order, no repeats.
    pub fn failed_panelists(&self) -> Vec<BackendId> {
        let mut failed: Vec<BackendId> = Vec::new();
        let failures = self
            .verdicts
            .iter()
            .filter_map(Slot::failure)
            .chain(self.critiques().iter().filter_map(Slot::failure));
        for f in failures {
            if !failed.contains(&f.backend) {
                failed.push(f.backend);
            }
        }
        failed
    }

    /// Compact summary line for logs and CLI footers.
    pub fn summary_line(&self) -> String {
        let ok = self.verdicts.iter().filter(|v| v.is_filled()).count();
        let status = match &self.cross_examination {
            CrossExamination::NotApplicable => "SINGLE".to_string(),
            CrossExamination::Skipped { reason } => format!("DEGRADED({reason})"),
            CrossExamination::Completed { critiques, .. } => format!(
                "CROSS-EXAMINED({}/{})",
                critiques.iter().filter(|c| c.is_filled()).count(),
                critiques.len()
            ),
        };
        format!(
            "[{}] persona={} verdicts={}/{}",
            status,
            self.persona_id,
            ok,
            self.verdicts.len()
        )
    }
}
