//! In-memory chat session: one conversation, routed turn by turn.
//!
//! ```text
//! send(text)
//!   → "[아기 {age}개월]\n{text}" appended as a user turn
//!   → route(text, last 6 user turns, previous decision)   (auto mode)
//!   → system(persona.content) + last 12 turns → dispatch
//!   → assistant turn appended
//! ```
//!
//! With a [`ConversationStore`] attached, the full turn list is saved after
//! every appended turn.

use std::sync::Arc;

use chrono::Local;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::conversation::{ConversationError, ConversationId, ConversationStore};
use crate::dispatch::{BackendId, ChatMessage, DispatchError, ModelDispatch, Role};
use crate::persona::{PersonaError, PersonaId, PersonaStore};
use crate::router::{IntentRouter, RoutingDecision, RoutingSignal};

/// Stored messages scanned for routing history.
pub const ROUTING_HISTORY_WINDOW: usize = 6;
/// Stored messages sent to the model after the system prompt.
pub const CONTEXT_WINDOW: usize = 12;
/// Upper bound on the age prefix, in months.
pub const MAX_AGE_MONTHS: u32 = 72;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Persona(#[from] PersonaError),

    #[error(transparent)]
    Backend(#[from] DispatchError),

    #[error(transparent)]
    Conversation(#[from] ConversationError),
}

/// One stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    /// Local wall-clock time, `YYYY-MM-DD HH:MM`.
    pub timestamp: String,
}

/// How the answering persona is picked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersonaSelection {
    /// Ask the router every turn.
    Auto,
    /// Always use this persona.
    Manual(PersonaId),
}

/// Result of one `send`.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub text: String,
    pub persona: PersonaId,
    /// `None` when the persona was picked manually.
    pub decision: Option<RoutingDecision>,
}

pub struct ChatSession {
    router: IntentRouter,
    personas: Arc<dyn PersonaStore>,
    dispatch: Arc<dyn ModelDispatch>,
    backend: BackendId,
    age_months: u32,
    selection: PersonaSelection,
    turns: Vec<ChatTurn>,
    last_persona: Option<PersonaId>,
    conversation: Option<(Arc<dyn ConversationStore>, ConversationId)>,
}

impl ChatSession {
    pub fn new(
        router: IntentRouter,
        personas: Arc<dyn PersonaStore>,
        dispatch: Arc<dyn ModelDispatch>,
        backend: BackendId,
    ) -> Self {
        Self {
            router,
            personas,
            dispatch,
            backend,
            age_months: 3,
            selection: PersonaSelection::Auto,
            turns: Vec::new(),
            last_persona: None,
            conversation: None,
        }
    }

    /// Continue conversation `id`: load its turns and save every new one.
    pub async fn attach(
        mut self,
        store: Arc<dyn ConversationStore>,
        id: ConversationId,
    ) -> Result<Self, ChatError> {
        self.turns = store.load(&id).await?;
        debug!(conversation = %id, turns = self.turns.len(), "conversation attached");
        self.conversation = Some((store, id));
        Ok(self)
    }

    /// Clamped to [`MAX_AGE_MONTHS`].
    pub fn with_age_months(mut self, months: u32) -> Self {
        self.age_months = months.min(MAX_AGE_MONTHS);
        self
    }

    pub fn with_selection(mut self, selection: PersonaSelection) -> Self {
        self.selection = selection;
        self
    }

    /// Switch between automatic routing and a fixed persona mid-conversation.
    pub fn set_selection(&mut self, selection: PersonaSelection) {
        self.selection = selection;
    }

    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.conversation.as_ref().map(|(_, id)| id)
    }

    pub fn age_months(&self) -> u32 {
        self.age_months
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// Persona that answered the last turn; next turn's tie-breaker.
    pub fn last_persona(&self) -> Option<&PersonaId> {
        self.last_persona.as_ref()
    }

    /// Handle one user message and return the assistant reply.
    ///
    /// The user turn stays in history even when the persona lookup or the
    /// backend call fails.
    pub async fn send(&mut self, user_text: &str) -> Result<ChatReply, ChatError> {
        let text = format!("[아기 {}개월]\n{}", self.age_months, user_text);
        self.push(Role::User, text.clone()).await?;

        let (persona_id, decision) = match &self.selection {
            PersonaSelection::Manual(id) => (id.clone(), None),
            PersonaSelection::Auto => {
                let signal = RoutingSignal::new(text)
                    .with_history(self.routing_history())
                    .with_previous(self.last_persona.clone());
                let decision = self.router.route(signal);
                debug!(decision = %decision.summary(), "routed chat turn");
                (decision.persona.clone(), Some(decision))
            }
        };
        self.last_persona = Some(persona_id.clone());

        let persona = self.personas.get(&persona_id).await?;
        let messages = self.context_messages(&persona.content);
        info!(
            persona = %persona_id,
            backend = %self.backend,
            messages = messages.len(),
            "chat turn dispatched"
        );

        let reply = self.dispatch.complete(self.backend, &messages).await?;
        self.push(Role::Assistant, reply.clone()).await?;

        Ok(ChatReply {
            text: reply,
            persona: persona_id,
            decision,
        })
    }

    async fn push(&mut self, role: Role, content: String) -> Result<(), ConversationError> {
        self.turns.push(ChatTurn {
            role,
            content,
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
        });
        if let Some((store, id)) = &self.conversation {
            store.save(id, &self.turns).await?;
        }
        Ok(())
    }

    fn routing_history(&self) -> String {
        tail(&self.turns, ROUTING_HISTORY_WINDOW)
            .iter()
            .filter(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn context_messages(&self, system_prompt: &str) -> Vec<ChatMessage> {
        let mut messages = vec![ChatMessage::system(system_prompt)];
        messages.extend(
            tail(&self.turns, CONTEXT_WINDOW)
                .iter()
                .filter(|t| matches!(t.role, Role::User | Role::Assistant))
                .map(|t| ChatMessage {
                    role: t.role,
                    content: t.content.clone(),
                }),
        );
        messages
    }
}

fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}
