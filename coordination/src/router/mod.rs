//! Persona Router Module
//!
//! Routes each chat turn to a persona based on:
//! - Emergency vocabulary (always wins)
//! - Informational vs. emotional-support keyword scores
//! - The previous turn's decision (tie-break, held by the caller)
//!
//! # Routing Table
//!
//! ```text
//! Signal                      | Persona
//! ----------------------------|------------------------
//! Emergency term anywhere     | parenting_expert_v1
//! info - emo >= 1             | parenting_expert_v1
//! emo - info >= 1             | soothing_expert_v1
//! Tie, previous decision      | previous decision
//! Tie, no previous            | parenting_expert_v1
//! ```

pub mod intent;

pub use intent::{IntentRouter, RouteReason, RouterConfig, RoutingDecision, RoutingSignal};
