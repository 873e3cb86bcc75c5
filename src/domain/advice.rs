//! Recommendation text: rule-based advice and light markup.
//!
//! Advice is authored as short paragraphs with `**bold**` headings and stored
//! as minimal HTML (`<p>`, `<strong>`, `<br>`).

use std::sync::OnceLock;

use regex::Regex;

use super::metrics::Metrics;
use super::patient::PatientInput;

/// Placeholder stored when no recommendation could be produced.
pub const RECOMMENDATION_UNAVAILABLE: &str =
    "Unable to generate AI recommendations. Please try again.";

const BMI_OVERWEIGHT: f64 = 25.0;
const TYG_ELEVATED: f64 = 8.0;
const TG_HDL_ELEVATED: f64 = 3.5;
const HBA1C_DIABETIC: f64 = 6.5;

/// Deterministic advice derived from the thresholds alone.
///
/// Returns markdown-style text (`**Heading**: advice`, paragraphs separated by
/// blank lines). Follow-up advice is always present.
#[must_use]
pub fn rule_based_advice(input: &PatientInput, metrics: &Metrics) -> String {
    let mut paragraphs = Vec::new();

    if metrics.bmi > BMI_OVERWEIGHT {
        paragraphs.push(
            "**Weight Management**: Consider a structured weight loss program targeting 5-10% body weight reduction through caloric restriction and increased physical activity.",
        );
    }
    if metrics.tyg_index > TYG_ELEVATED {
        paragraphs.push(
            "**Metabolic Health**: Focus on low-glycemic index foods, reduce refined carbohydrates, and consider Mediterranean-style diet patterns.",
        );
    }
    if metrics.tg_hdl_ratio > TG_HDL_ELEVATED {
        paragraphs.push(
            "**Lipid Management**: Increase omega-3 fatty acids, reduce saturated fats, and consider aerobic exercise 150+ minutes per week.",
        );
    }
    if input.hba1c > HBA1C_DIABETIC {
        paragraphs.push(
            "**Glucose Control**: Monitor blood glucose regularly, consider continuous glucose monitoring, and maintain consistent meal timing.",
        );
    }
    paragraphs.push(
        "**Follow-up**: Schedule follow-up in 3-6 months to reassess metabolic markers and adjust treatment plan as needed.",
    );

    paragraphs.join("\n\n")
}

fn bold_pattern() -> &'static Regex {
    static BOLD: OnceLock<Regex> = OnceLock::new();
    BOLD.get_or_init(|| Regex::new(r"\*\*(.*?)\*\*").expect("Valid regex"))
}

fn tag_pattern() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]*>").expect("Valid regex"))
}

/// Convert `**bold**` markdown paragraphs into minimal HTML.
#[must_use]
pub fn format_recommendations(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let bolded = bold_pattern().replace_all(&text, "<strong>$1</strong>");
    let body = bolded.replace("\n\n", "</p><p>").replace('\n', "<br>");
    format!("<p>{body}</p>")
}

/// Strip the markup produced by [`format_recommendations`] for plain output.
#[must_use]
pub fn plain_text(html: &str) -> String {
    let spaced = html
        .replace("</p><p>", "\n\n")
        .replace("<br>", "\n")
        .replace("<br/>", "\n");
    let stripped = tag_pattern().replace_all(&spaced, "");
    stripped
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .trim()
        .to_string()
}
