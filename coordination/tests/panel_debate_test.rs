//! Panel debate integration test: full two-phase runs against scripted
//! backends (no network).
//!
//! Covers: persona store ↔ orchestrator ↔ dispatch facade, partial failure,
//! timeouts, cancellation, and prompt isolation between phases.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use coordination::debate::{
    CrossExamination, DebateError, DebateRequest, PanelConfig, PanelOrchestrator, SkipReason,
    Slot,
};
use coordination::dispatch::{BackendId, ChatMessage, DispatchError, FailureKind, ModelDispatch};
use coordination::persona::{InMemoryPersonaStore, Persona};
use tokio_util::sync::CancellationToken;

const PERSONA: &str = "parenting_expert_v1";
const PERSONA_RULES: &str = "# 역할\n육아 전문가\n# 출력 형식\n번호 목록";
const USER_INPUT: &str = "3개월 아기 수유량이 궁금해요";
const BAD_OUTPUT: &str = "힘내세요! 다 잘 될 거예요.";

#[derive(Clone)]
enum Script {
    Reply,
    Fail,
    Hang,
}

/// Scripted backend panel that records every call it receives.
struct ScriptedPanel {
    phase1: HashMap<BackendId, Script>,
    phase2: HashMap<BackendId, Script>,
    calls: Mutex<Vec<(BackendId, Vec<ChatMessage>)>>,
}

impl ScriptedPanel {
    fn healthy() -> Self {
        Self {
            phase1: HashMap::new(),
            phase2: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn diagnosis(mut self, backend: BackendId, script: Script) -> Self {
        self.phase1.insert(backend, script);
        self
    }

    fn critique(mut self, backend: BackendId, script: Script) -> Self {
        self.phase2.insert(backend, script);
        self
    }

    fn calls(&self) -> Vec<(BackendId, Vec<ChatMessage>)> {
        self.calls.lock().unwrap().clone()
    }
}

fn is_critique(messages: &[ChatMessage]) -> bool {
    messages
        .iter()
        .any(|m| m.content.contains("다른 AI의 진단 리포트"))
}

#[async_trait]
impl ModelDispatch for ScriptedPanel {
    async fn complete(
        &self,
        backend: BackendId,
        messages: &[ChatMessage],
    ) -> Result<String, DispatchError> {
        self.calls
            .lock()
            .unwrap()
            .push((backend, messages.to_vec()));

        let critique = is_critique(messages);
        let script = if critique {
            self.phase2.get(&backend)
        } else {
            self.phase1.get(&backend)
        };

        match script.cloned().unwrap_or(Script::Reply) {
            Script::Reply if critique => Ok(format!("critique by {backend}")),
            Script::Reply => Ok(format!("diagnosis by {backend}")),
            Script::Fail => Err(DispatchError::unreachable(backend, "connection refused")),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok("too late".to_string())
            }
        }
    }
}

fn orchestrator(panel: Arc<ScriptedPanel>) -> PanelOrchestrator {
    let store = InMemoryPersonaStore::new().with(Persona::new(PERSONA, "육아 전문가", PERSONA_RULES));
    PanelOrchestrator::new(panel, Arc::new(store))
}

fn request(backends: Vec<BackendId>) -> DebateRequest {
    DebateRequest::new(PERSONA, USER_INPUT, BAD_OUTPUT, backends)
}

const ABC: [BackendId; 3] = [BackendId::OpenAi, BackendId::Anthropic, BackendId::Gemini];

// ── Happy path ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_three_healthy_backends_full_report() {
    let panel = Arc::new(ScriptedPanel::healthy());
    let report = orchestrator(panel.clone())
        .run_debate(request(ABC.to_vec()))
        .await
        .unwrap();

    assert_eq!(report.verdicts.len(), 3);
    for (slot, backend) in report.verdicts.iter().zip(ABC) {
        assert_eq!(slot.filled().unwrap().backend, backend);
    }

    let baseline = report.baseline().unwrap();
    assert_eq!(baseline.backend, BackendId::OpenAi);
    assert_eq!(baseline.report_text, "diagnosis by openai");

    let critiques = report.critiques();
    assert_eq!(critiques.len(), 2);
    let by: Vec<_> = critiques.iter().map(|c| c.filled().unwrap().by).collect();
    assert_eq!(by, vec![BackendId::Anthropic, BackendId::Gemini]);
    assert!(critiques
        .iter()
        .all(|c| c.filled().unwrap().of == BackendId::OpenAi));

    assert!(!report.is_degraded());
    assert!(report.failed_panelists().is_empty());
    assert_eq!(panel.calls().len(), 5);
}

#[tokio::test]
async fn test_single_backend_has_no_phase_two() {
    let panel = Arc::new(ScriptedPanel::healthy());
    let report = orchestrator(panel.clone())
        .run_debate(request(vec![BackendId::DeepSeek]))
        .await
        .unwrap();

    assert_eq!(report.verdicts.len(), 1);
    assert_eq!(report.cross_examination, CrossExamination::NotApplicable);
    assert!(report.critiques().is_empty());
    assert_eq!(panel.calls().len(), 1);
}

// ── Partial failure ────────────────────────────────────────────────

#[tokio::test]
async fn test_baseline_failure_degrades_and_skips_critiques() {
    let panel = Arc::new(ScriptedPanel::healthy().diagnosis(BackendId::OpenAi, Script::Fail));
    let report = orchestrator(panel.clone())
        .run_debate(request(ABC.to_vec()))
        .await
        .unwrap();

    assert_eq!(report.verdicts.len(), 3);
    let failure = report.verdicts[0].failure().unwrap();
    assert_eq!(failure.backend, BackendId::OpenAi);
    assert_eq!(failure.kind, FailureKind::Unreachable);
    assert!(report.verdicts[1].is_filled());
    assert!(report.verdicts[2].is_filled());

    assert_eq!(
        report.cross_examination,
        CrossExamination::Skipped {
            reason: SkipReason::BaselineFailed
        }
    );
    assert!(report.is_degraded());
    assert!(report.critiques().is_empty());
    assert!(panel.calls().iter().all(|(_, m)| !is_critique(m)));
}

#[tokio::test]
async fn test_non_baseline_failure_keeps_other_critiques() {
    let panel = Arc::new(ScriptedPanel::healthy().diagnosis(BackendId::Anthropic, Script::Fail));
    let report = orchestrator(panel)
        .run_debate(request(ABC.to_vec()))
        .await
        .unwrap();

    assert!(matches!(report.verdicts[1], Slot::Failed(_)));
    assert!(!report.is_degraded());

    let critiques = report.critiques();
    assert_eq!(critiques.len(), 2);
    let gemini = critiques[1].filled().unwrap();
    assert_eq!(gemini.by, BackendId::Gemini);
    assert_eq!(gemini.text, "critique by gemini");
    assert_eq!(report.failed_panelists(), vec![BackendId::Anthropic]);
}

#[tokio::test]
async fn test_critique_failure_is_a_marker() {
    let panel = Arc::new(ScriptedPanel::healthy().critique(BackendId::Gemini, Script::Fail));
    let report = orchestrator(panel)
        .run_debate(request(ABC.to_vec()))
        .await
        .unwrap();

    let critiques = report.critiques();
    assert!(critiques[0].is_filled());
    assert_eq!(critiques[1].failure().unwrap().backend, BackendId::Gemini);
    assert!(report.summary_line().contains("CROSS-EXAMINED(1/2)"));
}

#[tokio::test(start_paused = true)]
async fn test_hanging_panelist_times_out() {
    let panel = Arc::new(ScriptedPanel::healthy().diagnosis(BackendId::Gemini, Script::Hang));
    let orch = orchestrator(panel).with_config(PanelConfig {
        call_timeout: Duration::from_secs(5),
        ..Default::default()
    });

    let report = orch.run_debate(request(ABC.to_vec())).await.unwrap();

    assert_eq!(
        report.verdicts[2].failure().unwrap().kind,
        FailureKind::Timeout
    );
    assert_eq!(report.critiques().len(), 2);
}

// ── Prompt isolation ───────────────────────────────────────────────

#[tokio::test]
async fn test_phase_one_prompts_identical_and_phase_two_carries_only_baseline() {
    let panel = Arc::new(ScriptedPanel::healthy());
    orchestrator(panel.clone())
        .run_debate(request(ABC.to_vec()))
        .await
        .unwrap();

    let calls = panel.calls();
    let (phase1, phase2): (Vec<_>, Vec<_>) = calls.iter().partition(|(_, m)| !is_critique(m));
    assert_eq!(phase1.len(), 3);
    assert!(phase1.windows(2).all(|w| w[0].1 == w[1].1));
    let diagnosis = &phase1[0].1[1].content;
    assert!(diagnosis.contains(PERSONA_RULES));
    assert!(diagnosis.contains(USER_INPUT));
    assert!(diagnosis.contains(BAD_OUTPUT));
    assert!(!diagnosis.contains("diagnosis by"));

    assert_eq!(phase2.len(), 2);
    for (_, messages) in phase2 {
        let text: String = messages.iter().map(|m| m.content.as_str()).collect();
        assert!(text.contains("diagnosis by openai"));
        assert!(!text.contains("diagnosis by anthropic"));
        assert!(!text.contains(USER_INPUT));
        assert!(!text.contains(BAD_OUTPUT));
        assert!(!text.contains(PERSONA_RULES));
    }
}

// ── Fatal errors and cancellation ──────────────────────────────────

#[tokio::test]
async fn test_unknown_persona_fails_whole_run() {
    let panel = Arc::new(ScriptedPanel::healthy());
    let err = orchestrator(panel.clone())
        .run_debate(DebateRequest::new("missing_v9", "i", "o", ABC.to_vec()))
        .await
        .unwrap_err();

    assert!(matches!(err, DebateError::Persona(_)));
    assert!(panel.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_returns_while_backends_hang() {
    let panel = Arc::new(
        ScriptedPanel::healthy()
            .diagnosis(BackendId::OpenAi, Script::Hang)
            .diagnosis(BackendId::Anthropic, Script::Hang),
    );
    let orch = orchestrator(panel);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = orch
        .run_debate_with_cancel(
            request(vec![BackendId::OpenAi, BackendId::Anthropic]),
            cancel,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DebateError::Cancelled));
}

#[tokio::test]
async fn test_independent_runs_share_one_orchestrator() {
    let panel = Arc::new(ScriptedPanel::healthy().diagnosis(BackendId::Gemini, Script::Fail));
    let orch = orchestrator(panel);

    let (a, b) = tokio::join!(
        orch.run_debate(request(vec![BackendId::Gemini, BackendId::OpenAi])),
        orch.run_debate(request(vec![BackendId::OpenAi, BackendId::Gemini])),
    );

    assert!(a.unwrap().is_degraded());
    let b = b.unwrap();
    assert!(!b.is_degraded());
    assert!(b.verdicts[1].failure().is_some());
}
