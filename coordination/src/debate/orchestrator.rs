//! Panel debate orchestrator: fan-out diagnosis, then cross-examination.
//!
//! ```text
//! Phase 1: Independent diagnosis (fan-out)
//!   JoinSet::spawn(complete(backend_i, diagnosis)) × N
//!   → Vec<Slot<Verdict>> in seat order
//!
//! Phase 2: Cross-examination (fan-out, after phase 1 completes)
//!   baseline = verdicts[0]
//!   JoinSet::spawn(complete(backend_j, critique(baseline))) for j in 1..N
//!   → Vec<Slot<Critique>> in seat order
//! ```
//!
//! ## Partial failure policy
//!
//! A failed or timed-out call leaves a failure marker in its slot and the run
//! continues. If the baseline verdict fails, phase 2 is skipped and the report
//! is flagged degraded. Only a missing persona or an empty panel fails the
//! whole run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::prompts::{render, PromptTemplates};
use super::types::{
    Critique, CrossExamination, DebateReport, DebateRequest, PanelFailure, SkipReason, Slot,
    Verdict,
};
use crate::dispatch::{BackendId, ChatMessage, DispatchError, ModelDispatch};
use crate::persona::{Persona, PersonaError, PersonaId, PersonaStore};

/// Errors that fail a whole debate (or single diagnosis) run.
#[derive(Debug, Error)]
pub enum DebateError {
    #[error("debate needs at least one backend")]
    EmptyPanel,

    #[error(transparent)]
    Persona(#[from] PersonaError),

    /// Only returned by single-backend diagnosis; panel runs record these in slots.
    #[error(transparent)]
    Backend(#[from] DispatchError),

    #[error("debate cancelled")]
    Cancelled,
}

/// Runtime knobs for a panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Per-call deadline; expiry is recorded like any backend failure.
    #[serde(with = "secs")]
    pub call_timeout: Duration,
    /// Cap on concurrent calls within a phase. `None` = one per seat.
    pub max_parallel_calls: Option<usize>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(120),
            max_parallel_calls: None,
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Drives diagnosis and debate runs against a dispatch facade.
///
/// Holds no per-run state, so one orchestrator can serve concurrent runs.
#[derive(Clone)]
pub struct PanelOrchestrator {
    dispatch: Arc<dyn ModelDispatch>,
    personas: Arc<dyn PersonaStore>,
    templates: Arc<PromptTemplates>,
    config: PanelConfig,
}

impl PanelOrchestrator {
    pub fn new(dispatch: Arc<dyn ModelDispatch>, personas: Arc<dyn PersonaStore>) -> Self {
        Self {
            dispatch,
            personas,
            templates: Arc::new(PromptTemplates::default()),
            config: PanelConfig::default(),
        }
    }

    pub fn with_templates(mut self, templates: PromptTemplates) -> Self {
        self.templates = Arc::new(templates);
        self
    }

    pub fn with_config(mut self, config: PanelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn templates(&self) -> &PromptTemplates {
        &self.templates
    }

    /// Phase-1 messages. Identical for every seat.
    pub fn diagnosis_messages(
        &self,
        persona: &Persona,
        user_input: &str,
        bad_output: &str,
    ) -> Vec<ChatMessage> {
        let user = render(
            &self.templates.diagnosis_user,
            &[
                ("persona", &persona.raw),
                ("user_input", user_input),
                ("bad_output", bad_output),
            ],
        );
        vec![
            ChatMessage::system(self.templates.diagnosis_system.clone()),
            ChatMessage::user(user),
        ]
    }

    /// Phase-2 messages. Carry only the baseline text.
    pub fn critique_messages(&self, baseline: &Verdict) -> Vec<ChatMessage> {
        let user = render(
            &self.templates.critique_user,
            &[("baseline", &baseline.report_text)],
        );
        vec![
            ChatMessage::system(self.templates.critique_system.clone()),
            ChatMessage::user(user),
        ]
    }

    /// Single-backend diagnosis. Backend failures are returned, not recorded.
    pub async fn diagnose(
        &self,
        persona_id: &PersonaId,
        user_input: &str,
        bad_output: &str,
        backend: BackendId,
    ) -> Result<Verdict, DebateError> {
        let persona = self.personas.get(persona_id).await?;
        let messages = self.diagnosis_messages(&persona, user_input, bad_output);
        info!(persona = %persona_id, backend = %backend, "diagnosis started");

        let report_text =
            call_with_timeout(self.dispatch.as_ref(), backend, &messages, self.config.call_timeout)
                .await?;
        Ok(Verdict {
            backend,
            report_text,
        })
    }

    /// Run the two-phase debate.
    pub async fn run_debate(&self, request: DebateRequest) -> Result<DebateReport, DebateError> {
        let baseline_backend = request.baseline().ok_or(DebateError::EmptyPanel)?;
        let persona = self.personas.get(&request.persona_id).await?;
        let start = Instant::now();

        info!(
            persona = %request.persona_id,
            panel = request.backends.len(),
            baseline = %baseline_backend,
            "debate started"
        );

        // ── Phase 1 ──────────────────────────────────────────────────────
        let diagnosis = self.diagnosis_messages(&persona, &request.user_input, &request.bad_output);
        let calls = request
            .backends
            .iter()
            .map(|b| (*b, diagnosis.clone()))
            .collect();
        let verdicts: Vec<Slot<Verdict>> = self
            .fan_out(calls)
            .await
            .into_iter()
            .zip(&request.backends)
            .map(|(result, backend)| match result {
                Ok(report_text) => Slot::Filled(Verdict {
                    backend: *backend,
                    report_text,
                }),
                Err(e) => {
                    warn!(backend = %backend, kind = %e.kind(), error = %e, "verdict failed");
                    Slot::Failed(PanelFailure::from_error(*backend, &e))
                }
            })
            .collect();

        // ── Phase 2 ──────────────────────────────────────────────────────
        let cross_examination = if !request.is_cross_examined() {
            CrossExamination::NotApplicable
        } else {
            match verdicts.first().and_then(Slot::filled).cloned() {
                None => {
                    warn!(baseline = %baseline_backend, "baseline verdict failed, skipping cross-examination");
                    CrossExamination::Skipped {
                        reason: SkipReason::BaselineFailed,
                    }
                }
                Some(baseline) => {
                    let critique = self.critique_messages(&baseline);
                    let critics = &request.backends[1..];
                    let calls = critics.iter().map(|b| (*b, critique.clone())).collect();
                    let critiques = self
                        .fan_out(calls)
                        .await
                        .into_iter()
                        .zip(critics)
                        .map(|(result, by)| match result {
                            Ok(text) => Slot::Filled(Critique {
                                by: *by,
                                of: baseline.backend,
                                text,
                            }),
                            Err(e) => {
                                warn!(backend = %by, kind = %e.kind(), error = %e, "critique failed");
                                Slot::Failed(PanelFailure::from_error(*by, &e))
                            }
                        })
                        .collect();
                    CrossExamination::Completed {
                        baseline,
                        critiques,
                    }
                }
            }
        };

        let report = DebateReport {
            persona_id: request.persona_id,
            verdicts,
            cross_examination,
        };
        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            summary = %report.summary_line(),
            "debate finished"
        );
        Ok(report)
    }

    /// [`run_debate`](Self::run_debate) that stops as soon as `cancel` fires.
    ///
    /// In-flight calls are aborted when their `JoinSet` is dropped; this
    /// does not wait for them to finish.
    pub async fn run_debate_with_cancel(
        &self,
        request: DebateRequest,
        cancel: CancellationToken,
    ) -> Result<DebateReport, DebateError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("debate cancelled by caller");
                Err(DebateError::Cancelled)
            }
            result = self.run_debate(request) => result,
        }
    }

    /// Issue all calls concurrently; results come back in input order.
    async fn fan_out(
        &self,
        calls: Vec<(BackendId, Vec<ChatMessage>)>,
    ) -> Vec<Result<String, DispatchError>> {
        let limit = self
            .config
            .max_parallel_calls
            .unwrap_or(calls.len())
            .max(1);
        let sem = Arc::new(Semaphore::new(limit));
        let timeout = self.config.call_timeout;
        let backends: Vec<BackendId> = calls.iter().map(|(b, _)| *b).collect();
        let mut join_set: JoinSet<(usize, Result<String, DispatchError>)> = JoinSet::new();

        for (idx, (backend, messages)) in calls.into_iter().enumerate() {
            let sem = sem.clone();
            let dispatch = self.dispatch.clone();
            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let started = Instant::now();
                let result = call_with_timeout(dispatch.as_ref(), backend, &messages, timeout).await;
                debug!(
                    backend = %backend,
                    ok = result.is_ok(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "panel call finished"
                );
                (idx, result)
            });
        }

        let mut results: Vec<Option<Result<String, DispatchError>>> =
            backends.iter().map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, result)) => results[idx] = Some(result),
                Err(e) => warn!(error = %e, "panel call task panicked"),
            }
        }

        results
            .into_iter()
            .zip(backends)
            .map(|(result, backend)| {
                result.unwrap_or_else(|| {
                    Err(DispatchError::invalid_response(
                        backend,
                        "panel call task aborted",
                    ))
                })
            })
            .collect()
    }
}

async fn call_with_timeout(
    dispatch: &dyn ModelDispatch,
    backend: BackendId,
    messages: &[ChatMessage],
    timeout: Duration,
) -> Result<String, DispatchError> {
    match tokio::time::timeout(timeout, dispatch.complete(backend, messages)).await {
        Ok(result) => result,
        Err(_) => Err(DispatchError::Timeout {
            backend,
            after: timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::InMemoryPersonaStore;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl ModelDispatch for Echo {
        async fn complete(
            &self,
            backend: BackendId,
            messages: &[ChatMessage],
        ) -> Result<String, DispatchError> {
            Ok(format!("{backend}:{}", messages.len()))
        }
    }

    fn orchestrator() -> PanelOrchestrator {
        let store = InMemoryPersonaStore::new().with(Persona::new(
            "parenting_expert_v1",
            "expert",
            "# 역할\n정보 제공",
        ));
        PanelOrchestrator::new(Arc::new(Echo), Arc::new(store))
    }

    #[test]
    fn test_panel_config_default() {
        let config = PanelConfig::default();
        assert_eq!(config.call_timeout, Duration::from_secs(120));
        assert_eq!(config.max_parallel_calls, None);
    }

    #[test]
    fn test_diagnosis_messages_embed_persona_input_output() {
        let orch = orchestrator();
        let persona = Persona::new("p", "P", "RULES");
        let msgs = orch.diagnosis_messages(&persona, "INPUT", "OUTPUT");
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content, orch.templates().diagnosis_system);
        assert!(msgs[1].content.contains("RULES"));
        assert!(msgs[1].content.contains("INPUT"));
        assert!(msgs[1].content.contains("OUTPUT"));
    }

    #[test]
    fn test_critique_messages_only_carry_baseline() {
        let orch = orchestrator();
        let msgs = orch.critique_messages(&Verdict {
            backend: BackendId::OpenAi,
            report_text: "BASELINE".into(),
        });
        assert!(msgs[1].content.contains("BASELINE"));
        assert!(!msgs[1].content.contains("페르소나 규칙"));
    }

    #[tokio::test]
    async fn test_empty_panel_rejected() {
        let err = orchestrator()
            .run_debate(DebateRequest::new("parenting_expert_v1", "i", "o", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, DebateError::EmptyPanel));
    }

    #[tokio::test]
    async fn test_missing_persona_is_fatal() {
        let err = orchestrator()
            .run_debate(DebateRequest::new(
                "ghost",
                "i",
                "o",
                vec![BackendId::OpenAi],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, DebateError::Persona(PersonaError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_diagnose_single_backend() {
        let v = orchestrator()
            .diagnose(
                &PersonaId::parenting_expert(),
                "i",
                "o",
                BackendId::Anthropic,
            )
            .await
            .unwrap();
        assert_eq!(v.backend, BackendId::Anthropic);
        assert_eq!(v.report_text, "anthropic:2");
    }

    #[tokio::test]
    async fn test_single_seat_has_no_cross_examination() {
        let report = orchestrator()
            .run_debate(DebateRequest::new(
                "parenting_expert_v1",
                "i",
                "o",
                vec![BackendId::Gemini],
            ))
            .await
            .unwrap();
        assert_eq!(report.verdicts.len(), 1);
        assert_eq!(report.cross_examination, CrossExamination::NotApplicable);
        assert!(!report.is_degraded());
    }

    #[tokio::test]
    async fn test_parallelism_cap_of_one_still_completes() {
        let orch = orchestrator().with_config(PanelConfig {
            max_parallel_calls: Some(1),
            ..Default::default()
        });
        let report = orch
            .run_debate(DebateRequest::new(
                "parenting_expert_v1",
                "i",
                "o",
                vec![BackendId::OpenAi, BackendId::Gemini, BackendId::DeepSeek],
            ))
            .await
            .unwrap();
        assert_eq!(report.verdicts.len(), 3);
        assert_eq!(report.critiques().len(), 2);
    }
}
