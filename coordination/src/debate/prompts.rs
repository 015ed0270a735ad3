//! Prompt templates for diagnosis, critique, and persona revision.
//!
//! Templates are configuration: every field can be overridden from the
//! config file. User templates take `{name}` placeholders filled by
//! [`render`].

use serde::{Deserialize, Serialize};

const DIAGNOSIS_SYSTEM: &str = "\
당신은 LLM 페르소나의 문제점을 진단하는 '프롬프트 디버깅 전문 AI'입니다.
주어진 정보를 바탕으로 아래 [분석 단계]를 반드시 순서대로 따라 깊이 있게 사고하여 '진단 리포트'를 작성하세요.

[분석 단계]
1. 사용자 의도 파악: [사용자 입력]이 긴급한 의학적 질문인지, 일반적인 정보 문의인지, 감정적 위로를 구하는 것인지 핵심 의도를 파악합니다.
2. 출력물과 규칙 비교: 파악한 의도를 염두에 두고, [실제 출력물]이 [페르소나 규칙]의 각 항목(역할, 톤, 출력 형식 등)을 얼마나 지켰는지 또는 위반했는지 구체적인 근거와 함께 비교합니다.
3. 핵심 원인 진단: 1, 2단계를 종합하여 이런 결과가 나온 근본 원인을 추론합니다. (예: 규칙 간 충돌, 지시의 모호성, 불필요한 정보 포함)
4. 실용적인 권장 조치: 진단된 원인을 해결할 가장 효과적인 페르소나 수정안을 한 문장의 명확한 지시로 제안합니다.

[진단 리포트]
(위 분석 단계에 따른 결과만 출력)";

const DIAGNOSIS_USER: &str = "\
[페르소나 규칙]
---
{persona}
---

[사용자 입력]
---
{user_input}
---

[실제 출력물]
---
{bad_output}
---";

const CRITIQUE_SYSTEM: &str = "\
당신은 다른 AI의 분석을 날카롭게 비평하는 '수석 분석가'입니다.
아래 [다른 AI의 진단 리포트]를 읽고 그 진단의 논리적 허점, 놓친 부분, 더 나은 대안이 있다면 무엇인지 비평하세요.
비평은 간결하게 핵심만 짚어야 합니다.";

const CRITIQUE_USER: &str = "\
[다른 AI의 진단 리포트]
---
{baseline}";

const REVISION_SYSTEM: &str = "\
당신은 YAML 형식의 LLM 프롬프트 파일을 수정하는 전문 AI입니다.
사용자의 '수정 목표'와 '원본 YAML 파일 내용'을 바탕으로 목표를 가장 잘 달성하는 새 YAML 파일 내용을 생성하세요.
다른 설명 없이 수정된 YAML 파일 전체 내용만 코드 블록 없이 출력하세요.

[매우 중요한 규칙]
- '# 역할', '# 톤', '# 출력 형식' 등은 LLM에게 내리는 지시문 섹션입니다.
- 지시문 섹션을 실제 응답 예시로 채우지 마세요.
- 임무는 지시문의 내용을 목표에 맞게 개선하는 것이지, 지시문을 수행한 예시를 작성하는 것이 아닙니다.";

const REVISION_USER: &str = "\
[수정 목표]
{goal}

[원본 YAML 파일 내용]
---
{original}
---";

/// Fixed prompt texts exchanged with panel backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    /// Staged-reasoning instructions for phase-1 diagnosis.
    pub diagnosis_system: String,
    /// Placeholders: `{persona}`, `{user_input}`, `{bad_output}`.
    pub diagnosis_user: String,
    pub critique_system: String,
    /// Placeholder: `{baseline}`.
    pub critique_user: String,
    pub revision_system: String,
    /// Placeholders: `{goal}`, `{original}`.
    pub revision_user: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            diagnosis_system: DIAGNOSIS_SYSTEM.to_string(),
            diagnosis_user: DIAGNOSIS_USER.to_string(),
            critique_system: CRITIQUE_SYSTEM.to_string(),
            critique_user: CRITIQUE_USER.to_string(),
            revision_system: REVISION_SYSTEM.to_string(),
            revision_user: REVISION_USER.to_string(),
        }
    }
}

/// Substitute `{key}` placeholders in one pass.
///
/// Substituted values are not re-scanned, so user text containing
/// `{baseline}` or similar stays literal.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let key = &after[..close];
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });
        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
