//! Persona revision proposals.
//!
//! Asks one backend to rewrite a persona YAML file toward a stated goal.
//! The caller decides where the proposal goes; nothing here touches disk.

use tracing::info;

use crate::debate::prompts::{render, PromptTemplates};
use crate::dispatch::{BackendId, ChatMessage, DispatchError, ModelDispatch};

/// Build the revision request for `goal` against `original_yaml`.
pub fn revision_messages(
    templates: &PromptTemplates,
    goal: &str,
    original_yaml: &str,
) -> Vec<ChatMessage> {
    let user = render(
        &templates.revision_user,
        &[("goal", goal), ("original", original_yaml)],
    );
    vec![
        ChatMessage::system(templates.revision_system.clone()),
        ChatMessage::user(user),
    ]
}

/// Request a rewritten persona file. Returns the YAML text only.
pub async fn propose_revision(
    dispatch: &dyn ModelDispatch,
    templates: &PromptTemplates,
    backend: BackendId,
    goal: &str,
    original_yaml: &str,
) -> Result<String, DispatchError> {
    info!(backend = %backend, goal_len = goal.len(), "requesting persona revision");
    let messages = revision_messages(templates, goal, original_yaml);
    let reply = dispatch.complete(backend, &messages).await?;
    let yaml = strip_code_fence(&reply);
    if yaml.is_empty() {
        return Err(DispatchError::invalid_response(
            backend,
            "revision reply was empty",
        ));
    }
    Ok(yaml.to_string())
}

/// Drop a surrounding markdown code fence, if any.
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string (`yaml`, `yml`, ...) up to the first newline.
    let body = match body.find('\n') {
        Some(nl) => &body[nl + 1..],
        None => body,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}
