//! Instruction prompt sent alongside the photo.
//!
//! Kept in one place so the wording can change without touching the
//! timeout or parsing logic, and so tests can check the field list the
//! parser relies on.
//!
//! Callers can override the default via [`crate::config::LensConfig::system_prompt`].

/// Default instruction for estimating body fat from a photo.
pub const ANALYSIS_PROMPT: &str = r#"Analyze this image to estimate the body fat percentage of the person depicted.
Focus on visual cues such as muscle definition, vascularity, abdominal separation, and overall leanness.

Return a JSON object.
If the image does not clearly show a person's physique suitable for analysis (e.g., fully clothed, bad lighting, not a person),
set the estimatedRange to "N/A", explain why in the muscleDefinitionAnalysis, and list concrete ways to take a better photo in suggestions.

Required fields:
- estimatedRange: string (e.g., "12-15%")
- confidenceLevel: string (e.g., "High", "Medium", "Low")
- visualCues: array of strings (specific observations like "visible abs", "shoulder striations")
- muscleDefinitionAnalysis: string (a detailed paragraph explaining the assessment)
- healthTips: array of strings (3 general fitness/health tips relevant to this physique range)
- disclaimer: string (standard medical disclaimer)

Optional fields:
- suggestions: array of strings (only when estimatedRange is "N/A")

Output ONLY the JSON object. Do NOT add commentary."#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_every_required_field() {
        for field in [
            "estimatedRange",
            "confidenceLevel",
            "visualCues",
            "muscleDefinitionAnalysis",
            "healthTips",
            "disclaimer",
            "suggestions",
        ] {
            assert!(ANALYSIS_PROMPT.contains(field), "missing {field}");
        }
    }
}
