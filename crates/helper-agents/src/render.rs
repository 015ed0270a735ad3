//! Markdown rendering of debate reports.
//!
//! Report bodies are quoted (`> `) so model output cannot break the
//! section structure.

use coordination::debate::{CrossExamination, DebateReport, PanelFailure, Slot, Verdict};

const CROSS_EXAMINATION_HEADING: &str = "\n### 2. 교차 검증 (Cross-Examination)\n";

/// Render a full debate report.
pub fn render_report(report: &DebateReport) -> String {
    let mut out = String::from("## 🤖 최종 토론 보고서\n");
    out.push_str(&format!("\n페르소나: `{}`\n", report.persona_id));

    out.push_str("\n### 1. 개별 진단 리포트\n");
    for slot in &report.verdicts {
        match slot {
            Slot::Filled(verdict) => out.push_str(&render_verdict(verdict)),
            Slot::Failed(failure) => out.push_str(&render_failure("진단 실패", failure)),
        }
    }

    match &report.cross_examination {
        CrossExamination::NotApplicable => {}
        CrossExamination::Skipped { reason } => {
            out.push_str(CROSS_EXAMINATION_HEADING);
            out.push_str(&format!(
                "\n> ⚠️ 기준 진단이 실패하여 교차 검증을 건너뛰었습니다 ({reason}).\n"
            ));
        }
        CrossExamination::Completed {
            baseline,
            critiques,
        } => {
            out.push_str(CROSS_EXAMINATION_HEADING);
            out.push_str(&format!(
                "\n#### 🎯 **주요 검토 대상: {}의 진단**\n{}\n",
                baseline.backend,
                quote(&baseline.report_text)
            ));
            for slot in critiques {
                match slot {
                    Slot::Filled(c) => {
                        out.push_str(&format!("\n#### 💬 **비평 by {}**\n{}\n", c.by, quote(&c.text)))
                    }
                    Slot::Failed(failure) => out.push_str(&render_failure("비평 실패", failure)),
                }
            }
        }
    }

    let failed = report.failed_panelists();
    if !failed.is_empty() {
        let names: Vec<String> = failed.iter().map(ToString::to_string).collect();
        out.push_str(&format!("\n**응답 실패 패널:** {}\n", names.join(", ")));
    }
    out.push_str(&format!("\n---\n`{}`\n", report.summary_line()));
    out
}

/// One diagnosis block; also the whole output of single-backend `debug`.
pub fn render_verdict(verdict: &Verdict) -> String {
    format!(
        "\n#### 📄 **진단 by {}**\n{}\n",
        verdict.backend,
        quote(&verdict.report_text)
    )
}

fn render_failure(label: &str, failure: &PanelFailure) -> String {
    format!(
        "\n#### ⚠️ **{label}: {}**\n> [{}] {}\n",
        failure.backend, failure.kind, failure.message
    )
}

fn quote(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return "> ".to_string();
    }
    text.lines()
        .map(|l| format!("> {l}"))
        .collect::<Vec<_>>()
        .join("\n")
}
