//! Parenting Helper Coordination Library
//!
//! This library provides:
//! - Deterministic intent routing between the expert and soothing personas
//! - A multi-model panel that diagnoses a persona's bad output and
//!   cross-examines the baseline diagnosis
//! - Persona revision proposals and an in-memory chat session driver
//!
//! # Modules
//!
//! - [`router`]: keyword/emergency scoring, previous-decision tie-break
//! - [`persona`]: `PersonaId`, YAML persona store
//! - [`dispatch`]: `ModelDispatch` facade, backend registry, HTTP providers
//! - [`debate`]: two-phase panel orchestrator and report types
//! - [`tuning`]: persona rewrite proposals
//! - [`chat`]: routed conversation driver
//! - [`conversation`]: conversation store interface and in-memory store
//!
//! # Usage
//!
//! ```bash
//! # Route one message
//! helper-agents route --text "아기가 숨을 잘 못 쉬어요"
//!
//! # Run a three-model debate on a bad answer
//! helper-agents debate --persona parenting_expert_v1 \
//!     --input "..." --output "..." --backends openai gemini deepseek
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod chat;
pub mod conversation;
pub mod debate;
pub mod dispatch;
pub mod persona;
pub mod router;
pub mod tuning;

// Re-export routing types
pub use router::{IntentRouter, RouteReason, RouterConfig, RoutingDecision, RoutingSignal};

// Re-export persona types
pub use persona::{FsPersonaStore, InMemoryPersonaStore, Persona, PersonaError, PersonaId, PersonaStore};

// Re-export dispatch types
pub use dispatch::{
    BackendId, BackendRegistry, ChatMessage, CompletionBackend, DispatchError, FailureKind,
    ModelDispatch, RetryPolicy, Role, UnknownBackendId,
};

// Re-export debate types
pub use debate::{
    Critique, CrossExamination, DebateError, DebateReport, DebateRequest, PanelConfig,
    PanelFailure, PanelOrchestrator, PromptTemplates, SkipReason, Slot, Verdict,
};

// Re-export chat types
pub use chat::{ChatError, ChatReply, ChatSession, ChatTurn, PersonaSelection};

// Re-export conversation types
pub use conversation::{
    ConversationError, ConversationExport, ConversationId, ConversationStore,
    ConversationSummary, InMemoryConversationStore,
};

pub use tuning::propose_revision;
