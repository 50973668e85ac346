//! The closed field set of an evidence card, and its fallback text.
//!
//! The central invariant of the whole pipeline lives here: by the time a
//! card reaches the caller, every field holds non-empty Arabic prose. The
//! synthesizer enforces that with the per-field merge and the fallback
//! builders below.

use schemars::JsonSchema;

use crate::{clean::snippet, prelude::*, recover::JsonObject};

/// Longest OCR snippet we interpolate into fallback templates.
const SNIPPET_MAX_CHARS: usize = 160;

/// The description fields of an evidence card.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct EvidenceFields {
    /// What the activity set out to achieve.
    pub goal: String,

    /// How it was carried out in the classroom.
    pub implementation: String,

    /// Tools and technologies used.
    pub tools: String,

    /// How learning was assessed.
    pub assessment: String,

    /// Observed or expected impact on students.
    pub impact: String,
}

impl EvidenceFields {
    /// Merge an LLM-provided object over fallback values, key by key.
    ///
    /// An LLM value wins only if it is present and non-empty after
    /// trimming; anything else keeps that key on its fallback.
    pub fn merge_llm(llm: &JsonObject, fallback: &EvidenceFields) -> EvidenceFields {
        let pick = |key: &str, fallback: &str| -> String {
            match llm.get(key).and_then(Value::as_str) {
                Some(value) if !value.trim().is_empty() => value.trim().to_owned(),
                _ => fallback.to_owned(),
            }
        };
        EvidenceFields {
            goal: pick("goal", &fallback.goal),
            implementation: pick("implementation", &fallback.implementation),
            tools: pick("tools", &fallback.tools),
            assessment: pick("assessment", &fallback.assessment),
            impact: pick("impact", &fallback.impact),
        }
    }

    /// Is every field non-empty after trimming?
    pub fn all_populated(&self) -> bool {
        [
            &self.goal,
            &self.implementation,
            &self.tools,
            &self.assessment,
            &self.impact,
        ]
        .iter()
        .all(|field| !field.trim().is_empty())
    }
}

/// The fixed canonical description: the floor of the fallback chain, used
/// when there is no OCR text to summarize. Always available, never fails.
pub fn canonical_fields() -> EvidenceFields {
    EvidenceFields {
        goal: "دعم تعلم الطلاب وتعزيز المهارات الأساسية المستهدفة في المادة."
            .to_owned(),
        implementation:
            "تم تنفيذ نشاط صفي داعم للتعلم داخل الفصل وفق خطوات منظمة وبمشاركة الطلاب."
                .to_owned(),
        tools: "أوراق عمل ووسائل تعليمية مساندة مناسبة لطبيعة الدرس.".to_owned(),
        assessment: "ملاحظة أداء الطلاب أثناء التنفيذ والتقويم الختامي للنشاط."
            .to_owned(),
        impact: "تقدير مهني عام: أسهم النشاط في رفع دافعية الطلاب وترسيخ المفاهيم المستهدفة."
            .to_owned(),
    }
}

/// Best-effort fields derived from cleaned OCR text without an LLM:
/// professional template prose with a short snippet of the evidence text
/// interpolated where it helps.
pub fn heuristic_fields(cleaned_text: &str) -> EvidenceFields {
    let snippet = snippet(cleaned_text, 3, SNIPPET_MAX_CHARS);
    if snippet.is_empty() {
        return canonical_fields();
    }
    EvidenceFields {
        goal: format!(
            "تنمية مهارات الطلاب ودعم تعلمهم من خلال نشاط موثق تضمّن: {snippet}."
        ),
        implementation: format!(
            "نُفذ النشاط داخل الصف وفق خطوات منظمة، وتشير الشواهد المرفقة إلى: {snippet}."
        ),
        tools: "أوراق عمل ووسائل تعليمية مساندة وأدوات صفية مناسبة لطبيعة النشاط."
            .to_owned(),
        assessment: "ملاحظة أداء الطلاب أثناء التنفيذ ومراجعة نواتجهم المكتوبة."
            .to_owned(),
        impact:
            "تقدير مهني عام: أسهم النشاط في رفع تفاعل الطلاب وترسيخ المفاهيم المستهدفة."
                .to_owned(),
    }
}

/// One proposed rubric-category match.
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct RubricMatch {
    /// The official category label. After filtering, always one of
    /// [`RUBRIC_CATEGORIES`].
    pub label: String,

    /// Why this evidence supports the category.
    pub justification: String,
}

/// The official evaluation categories. Labels the LLM proposes that are not
/// in this list are discarded, never renamed or invented.
pub const RUBRIC_CATEGORIES: [&str; 11] = [
    "أداء الواجبات الوظيفية",
    "التفاعل مع المجتمع المهني",
    "التفاعل مع أولياء الأمور",
    "تنويع استراتيجيات التدريس",
    "تحسين نواتج المتعلمين",
    "إعداد وتنفيذ خطة التعلم",
    "توظيف التقنيات والوسائل التعليمية",
    "تهيئة البيئة التعليمية",
    "الإدارة الصفية",
    "تحليل نتائج المتعلمين وتشخيص مستوياتهم",
    "تنويع أساليب التقويم",
];

/// Keep at most two proposed matches whose labels are official categories.
/// The list may legitimately shrink to zero.
pub fn filter_rubric(proposed: Vec<RubricMatch>) -> Vec<RubricMatch> {
    proposed
        .into_iter()
        .filter_map(|m| {
            let label = m.label.trim();
            if RUBRIC_CATEGORIES.contains(&label) {
                Some(RubricMatch {
                    label: label.to_owned(),
                    justification: m.justification,
                })
            } else {
                debug!(label, "dropping rubric label not in the official list");
                None
            }
        })
        .take(2)
        .collect()
}
