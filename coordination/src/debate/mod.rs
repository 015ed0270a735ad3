//! Panel debate: multi-model diagnosis of a persona's bad output
//!
//! N backends diagnose the same (persona, input, output) triple
//! independently, then every non-baseline backend critiques the
//! baseline's diagnosis.
//!
//! # Debate Flow
//!
//! ```text
//! DebateRequest ─► Phase 1: diagnose × N (parallel)
//!                    │
//!                    ├─ N == 1 ─────────────► NotApplicable
//!                    ├─ baseline failed ───► Skipped(baseline_failed)
//!                    └─ baseline ok ───────► Phase 2: critique × (N-1) (parallel)
//!                                                 │
//!                                                 ▼
//!                                            DebateReport
//! ```

pub mod orchestrator;
pub mod prompts;
pub mod types;

pub use orchestrator::{DebateError, PanelConfig, PanelOrchestrator};
pub use prompts::{render, PromptTemplates};
pub use types::{
    Critique, CrossExamination, DebateReport, DebateRequest, PanelFailure, SkipReason, Slot,
    Verdict,
};
