//! Intent router: picks which persona answers a chat turn.
//!
//! Pure function of (current text, recent history, previous decision).
//! Priority order:
//!
//! 1. Emergency vocabulary → expert persona, unconditionally.
//! 2. Count informational vs. emotional-support keyword hits.
//! 3. A margin of one or more picks the leading persona.
//! 4. Ties keep the previous decision, else the expert persona.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::persona::PersonaId;

static EMERGENCY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    build(
        r"(응급|119|(?:^|[^a-z])er(?:[^a-z]|$)|호흡\s*곤란|무호흡|청색증|탈수|경련|의식\s*소실|심한\s*구토|피\s*섞인\s*변|숨을\s*(잘\s*)?못\s*쉬|숨을\s*안\s*쉬|35(\.\d+)?°?\s*이하|40(\.\d+)?°?\s*이상)",
    )
});

static EMOTIONAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    build(r"(위로|격려|지쳐|힘들|버거워|자책|불안|좌절|멘탈|울컥|토닥|감정\s*정리)")
});

static INFORMATIONAL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    build(
        r"(모유|분유|수유|수면|낮잠|밤중수유|스케줄|계획|발진|아토피|체온|예방접종|변\s*색|트림|토|\b개월\b|\b주차\b|가이드|권고|루틴|졸업|스트랩|쪽쪽이)",
    )
});

fn build(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("router keyword pattern should compile")
}

/// Everything the router looks at for one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingSignal {
    pub current_text: String,
    pub recent_history: String,
    /// Last turn's decision, remembered by the caller.
    pub previous_decision: Option<PersonaId>,
}

impl RoutingSignal {
    pub fn new(current_text: impl Into<String>) -> Self {
        Self {
            current_text: current_text.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: impl Into<String>) -> Self {
        self.recent_history = history.into();
        self
    }

    pub fn with_previous(mut self, previous: Option<PersonaId>) -> Self {
        self.previous_decision = previous;
        self
    }
}

/// Which rule produced the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    Emergency,
    Informational,
    Emotional,
    TieKeptPrevious,
    TieDefault,
}

impl std::fmt::Display for RouteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Emergency => write!(f, "emergency"),
            Self::Informational => write!(f, "informational"),
            Self::Emotional => write!(f, "emotional"),
            Self::TieKeptPrevious => write!(f, "tie_kept_previous"),
            Self::TieDefault => write!(f, "tie_default"),
        }
    }
}

/// Routing result with the evidence behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub persona: PersonaId,
    pub reason: RouteReason,
    pub informational_score: usize,
    pub emotional_score: usize,
}

impl RoutingDecision {
    /// Compact summary for logging.
    pub fn summary(&self) -> String {
        format!(
            "persona={} reason={} info={} emo={}",
            self.persona, self.reason, self.informational_score, self.emotional_score
        )
    }
}

/// Persona ids the router chooses between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Expert persona; target of emergencies and the tie default.
    pub informational: PersonaId,
    pub emotional: PersonaId,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            informational: PersonaId::parenting_expert(),
            emotional: PersonaId::soothing_expert(),
        }
    }
}

/// Deterministic keyword router.
#[derive(Debug, Clone, Default)]
pub struct IntentRouter {
    config: RouterConfig,
}

impl IntentRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RouterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Route a turn. Never fails.
    pub fn route(&self, signal: RoutingSignal) -> RoutingDecision {
        let text = format!("{}\n{}", signal.recent_history, signal.current_text).to_lowercase();

        let informational_score = INFORMATIONAL_PATTERN.find_iter(&text).count();
        let emotional_score = EMOTIONAL_PATTERN.find_iter(&text).count();

        let (persona, reason) = if EMERGENCY_PATTERN.is_match(&text) {
            (self.config.informational.clone(), RouteReason::Emergency)
        } else if informational_score >= emotional_score + 1 {
            (self.config.informational.clone(), RouteReason::Informational)
        } else if emotional_score >= informational_score + 1 {
            (self.config.emotional.clone(), RouteReason::Emotional)
        } else if let Some(previous) = signal.previous_decision {
            (previous, RouteReason::TieKeptPrevious)
        } else {
            (self.config.informational.clone(), RouteReason::TieDefault)
        };

        RoutingDecision {
            persona,
            reason,
            informational_score,
            emotional_score,
        }
    }

    /// Route and return only the persona id.
    pub fn route_id(&self, signal: RoutingSignal) -> PersonaId {
        self.route(signal).persona
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> IntentRouter {
        IntentRouter::new()
    }

    #[test]
    fn test_breathing_distress_overrides_previous_soothing() {
        let d = router().route(
            RoutingSignal::new("아기가 숨을 잘 못 쉬어요")
                .with_previous(Some(PersonaId::soothing_expert())),
        );
        assert_eq!(d.persona, PersonaId::parenting_expert());
        assert_eq!(d.reason, RouteReason::Emergency);
    }

    #[test]
    fn test_emergency_beats_emotional_majority() {
        let d = router().route(RoutingSignal::new("너무 힘들고 불안하고 지쳐요. 경련을 해요"));
        assert_eq!(d.reason, RouteReason::Emergency);
        assert!(d.emotional_score > d.informational_score);
        assert_eq!(d.persona, PersonaId::parenting_expert());
    }

    #[test]
    fn test_emergency_in_history_still_counts() {
        let d = router().route(
            RoutingSignal::new("괜찮을까요")
                .with_history("어제 열이 40.2°이상 올랐어요")
                .with_previous(Some(PersonaId::soothing_expert())),
        );
        assert_eq!(d.reason, RouteReason::Emergency);
    }

    #[test]
    fn test_er_is_word_bounded() {
        let d = router().route(RoutingSignal::new("water bottle"));
        assert_ne!(d.reason, RouteReason::Emergency);
        let d = router().route(RoutingSignal::new("가까운 er 가야 하나요"));
        assert_eq!(d.reason, RouteReason::Emergency);
        let d = router().route(RoutingSignal::new("never mind"));
        assert_ne!(d.reason, RouteReason::Emergency);
    }

    #[test]
    fn test_er_followed_by_korean_particle_is_emergency() {
        for text in ["ER에 가야 하나요?", "ER로 바로 갈까요", "ER"] {
            let d = router().route(
                RoutingSignal::new(text).with_previous(Some(PersonaId::soothing_expert())),
            );
            assert_eq!(d.reason, RouteReason::Emergency, "{text}");
            assert_eq!(d.persona, PersonaId::parenting_expert(), "{text}");
        }
    }

    #[test]
    fn test_two_informational_terms_pick_expert() {
        let d = router().route(RoutingSignal::new("분유 양이랑 낮잠 시간이 궁금해요"));
        assert_eq!(d.informational_score, 2);
        assert_eq!(d.emotional_score, 0);
        assert_eq!(d.persona, PersonaId::parenting_expert());
        assert_eq!(d.reason, RouteReason::Informational);
    }

    #[test]
    fn test_emotional_margin_picks_soothing() {
        let d = router().route(RoutingSignal::new("요즘 너무 지쳐서 위로가 필요해요"));
        assert_eq!(d.emotional_score, 2);
        assert_eq!(d.persona, PersonaId::soothing_expert());
        assert_eq!(d.reason, RouteReason::Emotional);
    }

    #[test]
    fn test_tie_keeps_previous() {
        let signal = RoutingSignal::new("수유하다 너무 힘들어요")
            .with_previous(Some(PersonaId::soothing_expert()));
        let d = router().route(signal.clone());
        assert_eq!(d.informational_score, 1);
        assert_eq!(d.emotional_score, 1);
        assert_eq!(d.persona, PersonaId::soothing_expert());
        assert_eq!(d.reason, RouteReason::TieKeptPrevious);
        assert_eq!(router().route(signal), d);
    }

    #[test]
    fn test_tie_without_previous_defaults_to_expert() {
        let d = router().route(RoutingSignal::new("수유하다 너무 힘들어요"));
        assert_eq!(d.persona, PersonaId::parenting_expert());
        assert_eq!(d.reason, RouteReason::TieDefault);
    }

    #[test]
    fn test_empty_input_falls_to_tie_break() {
        let d = router().route(RoutingSignal::default());
        assert_eq!((d.informational_score, d.emotional_score), (0, 0));
        assert_eq!(d.reason, RouteReason::TieDefault);

        let d = router().route(RoutingSignal::default().with_previous(Some("custom".into())));
        assert_eq!(d.persona.as_str(), "custom");
    }

    #[test]
    fn test_month_term_needs_word_boundary() {
        let d = router().route(RoutingSignal::new("[아기 3개월]"));
        assert_eq!(d.informational_score, 0);
        let d = router().route(RoutingSignal::new("아기 3 개월 이에요"));
        assert_eq!(d.informational_score, 1);
    }

    #[test]
    fn test_counts_are_non_overlapping() {
        // "밤중수유" is one hit, not "밤중수유" + "수유".
        let d = router().route(RoutingSignal::new("밤중수유"));
        assert_eq!(d.informational_score, 1);
    }

    #[test]
    fn test_custom_persona_ids() {
        let r = IntentRouter::with_config(RouterConfig {
            informational: "info".into(),
            emotional: "care".into(),
        });
        assert_eq!(r.route_id(RoutingSignal::new("불안해요")).as_str(), "care");
        assert_eq!(r.route_id(RoutingSignal::new("119")).as_str(), "info");
    }

    #[test]
    fn test_summary_mentions_reason() {
        let d = router().route(RoutingSignal::new("낮잠"));
        assert!(d.summary().contains("reason=informational"));
    }
}
