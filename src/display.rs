//! The value shown on the result card and its provenance.
//!
//! The model's estimate can be overridden by the user (for example with a
//! caliper or DEXA reading). The override state machine:
//!
//! ```text
//!        begin_edit            commit(non-blank)
//!   Ai ───────────▶ Editing ───────────────────▶ Overridden
//!   ▲                 │ cancel → prior state        │
//!   │                 ▼                             │
//!   └──────── reset / new result ◀──────────────────┘
//! ```
//!
//! A new analysis result always returns to `Ai`, whatever the prior state.

use crate::analysis::AnalysisResult;
use tracing::debug;

/// Where the displayed value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    /// The value mirrors the model's estimate.
    Ai,
    /// The user entered the value.
    UserOverride,
}

/// Override state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideState {
    Ai,
    /// The user is typing; cancel returns to `Overridden` if
    /// `was_overridden`, else to `Ai`.
    Editing { was_overridden: bool, draft: String },
    Overridden,
}

/// The mutable display value paired with the estimate it started from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayValue {
    estimate: String,
    value: String,
    state: OverrideState,
}

impl DisplayValue {
    pub fn new(estimate: impl Into<String>) -> Self {
        let estimate = estimate.into();
        Self {
            value: estimate.clone(),
            estimate,
            state: OverrideState::Ai,
        }
    }

    pub fn from_result(result: &AnalysisResult) -> Self {
        Self::new(result.estimated_range.clone())
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn estimate(&self) -> &str {
        &self.estimate
    }

    pub fn state(&self) -> &OverrideState {
        &self.state
    }

    /// `true` when the shown value differs from the model's estimate.
    pub fn is_adjusted(&self) -> bool {
        self.value != self.estimate
    }

    /// Provenance used for colour and label selection.
    ///
    /// Derived from the value itself: an override that happens to equal
    /// the estimate is still shown as the model's value. While editing, the
    /// card keeps showing the committed value.
    pub fn provenance(&self) -> Provenance {
        if self.is_adjusted() {
            Provenance::UserOverride
        } else {
            Provenance::Ai
        }
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.state, OverrideState::Editing { .. })
    }

    /// Enter `Editing`, seeding the draft with the current value.
    ///
    /// Returns `false` (and changes nothing) if already editing.
    pub fn begin_edit(&mut self) -> bool {
        if self.is_editing() {
            return false;
        }
        self.state = OverrideState::Editing {
            was_overridden: self.state == OverrideState::Overridden,
            draft: self.value.clone(),
        };
        true
    }

    /// Replace the draft text while editing.
    pub fn set_draft(&mut self, text: impl Into<String>) {
        if let OverrideState::Editing { draft, .. } = &mut self.state {
            *draft = text.into();
        }
    }

    /// Commit `text` as the override.
    ///
    /// Blank text (after trimming) is rejected: the value and state stay as
    /// they were and `false` is returned. Committing outside `Editing` is
    /// also rejected.
    pub fn commit(&mut self, text: &str) -> bool {
        if !self.is_editing() {
            return false;
        }
        let trimmed = text.trim();
        if trimmed.is_empty() {
            debug!("Rejected blank override");
            return false;
        }
        self.value = trimmed.to_string();
        self.state = OverrideState::Overridden;
        debug!("Override committed: {:?}", self.value);
        true
    }

    /// Commit the current draft.
    pub fn commit_draft(&mut self) -> bool {
        let draft = match &self.state {
            OverrideState::Editing { draft, .. } => draft.clone(),
            _ => return false,
        };
        self.commit(&draft)
    }

    /// Leave `Editing` without changing the value.
    pub fn cancel(&mut self) {
        if let OverrideState::Editing { was_overridden, .. } = self.state {
            self.state = if was_overridden {
                OverrideState::Overridden
            } else {
                OverrideState::Ai
            };
        }
    }

    /// Discard any override and show the estimate again.
    pub fn reset(&mut self) {
        self.value = self.estimate.clone();
        self.state = OverrideState::Ai;
    }

    /// A new result supersedes the old one: back to `Ai` with its estimate.
    pub fn replace_result(&mut self, result: &AnalysisResult) {
        *self = Self::from_result(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::sample_result;

    #[test]
    fn starts_mirroring_estimate() {
        let d = DisplayValue::new("12-15%");
        assert_eq!(d.value(), "12-15%");
        assert_eq!(d.provenance(), Provenance::Ai);
        assert!(!d.is_adjusted());
    }

    #[test]
    fn commit_overrides_value() {
        let mut d = DisplayValue::new("12-15%");
        assert!(d.begin_edit());
        assert!(d.commit("  20% "));
        assert_eq!(d.value(), "20%");
        assert_eq!(d.state(), &OverrideState::Overridden);
        assert!(d.is_adjusted());
    }

    #[test]
    fn cancel_restores_prior_state() {
        let mut d = DisplayValue::new("12-15%");
        d.begin_edit();
        d.commit("20%");
        let before = d.clone();

        d.begin_edit();
        d.set_draft("25%");
        assert_eq!(d.provenance(), Provenance::UserOverride);
        d.cancel();
        assert_eq!(d, before);
    }

    #[test]
    fn cancel_from_ai_keeps_ai() {
        let mut d = DisplayValue::new("12-15%");
        let before = d.clone();
        d.begin_edit();
        d.cancel();
        assert_eq!(d, before);
    }

    #[test]
    fn blank_commit_is_rejected() {
        let mut d = DisplayValue::new("12-15%");
        d.begin_edit();
        assert!(!d.commit("   \t"));
        assert_eq!(d.value(), "12-15%");
        assert!(d.is_editing());
        d.set_draft("");
        assert!(!d.commit_draft());
        assert_eq!(d.value(), "12-15%");
    }

    #[test]
    fn commit_requires_editing() {
        let mut d = DisplayValue::new("12-15%");
        assert!(!d.commit("20%"));
        assert_eq!(d.value(), "12-15%");
    }

    #[test]
    fn double_begin_is_rejected() {
        let mut d = DisplayValue::new("12-15%");
        assert!(d.begin_edit());
        d.set_draft("30%");
        assert!(!d.begin_edit());
        assert!(d.commit_draft());
        assert_eq!(d.value(), "30%");
    }

    #[test]
    fn reset_returns_to_estimate() {
        let mut d = DisplayValue::new("12-15%");
        d.begin_edit();
        d.commit("20%");
        d.reset();
        assert_eq!(d.value(), "12-15%");
        assert_eq!(d.provenance(), Provenance::Ai);
    }

    #[test]
    fn new_result_discards_override() {
        let mut d = DisplayValue::new("12-15%");
        d.begin_edit();
        d.commit("20%");
        d.replace_result(&sample_result("16-18%"));
        assert_eq!(d.value(), "16-18%");
        assert_eq!(d.state(), &OverrideState::Ai);
    }

    #[test]
    fn committing_the_estimate_is_not_an_adjustment() {
        let mut d = DisplayValue::new("12-15%");
        d.begin_edit();
        d.commit("12-15%");
        assert!(!d.is_adjusted());
        assert_eq!(d.state(), &OverrideState::Overridden);
        assert_eq!(d.provenance(), Provenance::Ai);
    }
}
