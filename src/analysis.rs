//! The structured report returned by the inference boundary.
//!
//! An [`AnalysisResult`] is immutable once parsed. A new analysis replaces
//! it wholesale; nothing is merged or patched.

use serde::{Deserialize, Serialize};

/// Sentinel the model uses when the photo cannot be assessed.
pub const NOT_APPLICABLE: &str = "N/A";

/// A body-fat report as produced by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Range estimate such as `"12-15%"`, or [`NOT_APPLICABLE`].
    pub estimated_range: String,
    /// Confidence label such as `"High"`.
    pub confidence_level: String,
    /// Short observations ("visible abs", "shoulder striations").
    pub visual_cues: Vec<String>,
    /// Free-text explanation; holds the reason when the estimate is N/A.
    pub muscle_definition_analysis: String,
    pub health_tips: Vec<String>,
    pub disclaimer: String,
    /// Photo-improvement suggestions, present when the estimate is N/A.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
}

/// What the report panel should show for a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportView<'a> {
    /// Metric card, cues, explanation and tips.
    Metrics(&'a AnalysisResult),
    /// Failure-styled panel with the reason and suggestions; no metrics.
    Unavailable {
        reason: &'a str,
        suggestions: &'a [String],
    },
}

impl AnalysisResult {
    /// `true` when the model declined to estimate.
    pub fn is_not_applicable(&self) -> bool {
        self.estimated_range == NOT_APPLICABLE
    }

    pub fn suggestions(&self) -> &[String] {
        self.suggestions.as_deref().unwrap_or(&[])
    }

    /// Select the rendering path for this result.
    pub fn view(&self) -> ReportView<'_> {
        if self.is_not_applicable() {
            ReportView::Unavailable {
                reason: &self.muscle_definition_analysis,
                suggestions: self.suggestions(),
            }
        } else {
            ReportView::Metrics(self)
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_result(estimate: &str) -> AnalysisResult {
    AnalysisResult {
        estimated_range: estimate.to_string(),
        confidence_level: "High".to_string(),
        visual_cues: vec!["visible abs".to_string()],
        muscle_definition_analysis: "Clear abdominal separation.".to_string(),
        health_tips: vec!["Sleep 8 hours".to_string()],
        disclaimer: "Not medical advice.".to_string(),
        suggestions: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialises_camel_case_fields() {
        let json = r#"{
            "estimatedRange": "12-15%",
            "confidenceLevel": "Medium",
            "visualCues": ["visible abs"],
            "muscleDefinitionAnalysis": "Defined.",
            "healthTips": ["Walk daily"],
            "disclaimer": "Not medical advice."
        }"#;
        let r: AnalysisResult = serde_json::from_str(json).unwrap();
        assert_eq!(r.estimated_range, "12-15%");
        assert_eq!(r.suggestions, None);
        assert!(matches!(r.view(), ReportView::Metrics(_)));
    }

    #[test]
    fn not_applicable_selects_suggestions_panel() {
        let mut r = sample_result("N/A");
        r.muscle_definition_analysis = "Subject is fully clothed.".into();
        r.suggestions = Some(vec!["Use better lighting".into()]);
        match r.view() {
            ReportView::Unavailable { reason, suggestions } => {
                assert_eq!(reason, "Subject is fully clothed.");
                assert_eq!(suggestions, ["Use better lighting".to_string()]);
            }
            ReportView::Metrics(_) => panic!("N/A must never show the metric card"),
        }
    }

    #[test]
    fn not_applicable_without_suggestions_is_empty_list() {
        let r = sample_result("N/A");
        assert!(r.is_not_applicable());
        assert!(r.suggestions().is_empty());
    }

    #[test]
    fn sentinel_match_is_exact() {
        for estimate in ["n/a", " N/A ", "N/A%"] {
            let r = sample_result(estimate);
            assert!(!r.is_not_applicable(), "{estimate:?}");
            assert!(matches!(r.view(), ReportView::Metrics(_)));
        }
    }
}
