//! Refinement quality gate
//!
//! Language models sometimes answer with boilerplate ("Certainly, here is
//! the reformatted text...") or drift into another language and drop
//! content. The gate rejects those refinements and keeps the raw extraction,
//! so refinement can only improve stored text, never corrupt it.

use super::Refinement;
use tracing::{debug, warn};

/// Gate verdict: which text to persist and why
#[derive(Debug, Clone)]
pub struct QualityDecision {
    /// Text that should be stored and chunked
    pub text: String,
    /// True when the refined text passed; false means raw was kept
    pub accepted: bool,
    pub reason: Option<String>,
    /// Heuristic quality score of the chosen text, in [0, 1]
    pub score: f32,
}

/// Rejects template answers and suspicious language switches
#[derive(Debug, Clone)]
pub struct QualityGate {
    target_language: String,
    min_chars: usize,
    template_phrases: Vec<String>,
}

impl QualityGate {
    pub fn new(target_language: &str, min_chars: usize, template_phrases: &[String]) -> Self {
        Self {
            target_language: target_language.to_lowercase(),
            min_chars,
            template_phrases: template_phrases.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    pub fn from_config(config: &crate::config::RefinerConfig) -> Self {
        Self::new(
            &config.target_language,
            config.quality_min_chars,
            &config.template_phrases,
        )
    }

    fn rejection_reason(&self, refinement: &Refinement) -> Option<String> {
        let lowered = refinement.refined.to_lowercase();
        if let Some(phrase) = self.template_phrases.iter().find(|p| lowered.contains(*p)) {
            return Some(format!("template answer detected: '{}'", phrase));
        }

        if let Some(detected) = &refinement.detected_language {
            let foreign = !detected.to_lowercase().starts_with(&self.target_language);
            if foreign && refinement.refined.chars().count() < self.min_chars {
                return Some(format!(
                    "short response in unexpected language '{}'",
                    detected
                ));
            }
        }

        None
    }

    /// Choose between the refined text and the raw extraction
    pub fn evaluate(&self, raw: &str, refinement: &Refinement) -> QualityDecision {
        match self.rejection_reason(refinement) {
            Some(reason) => {
                warn!(%reason, "Refinement rejected; keeping raw text");
                QualityDecision {
                    score: score_text(raw),
                    text: raw.to_string(),
                    accepted: false,
                    reason: Some(reason),
                }
            }
            None => {
                debug!("Refinement accepted");
                QualityDecision {
                    score: score_text(&refinement.refined),
                    text: refinement.refined.clone(),
                    accepted: true,
                    reason: None,
                }
            }
        }
    }
}

/// Crude content-quality score in [0, 1].
///
/// Rewards alphanumeric density and penalizes very short fragments; enough
/// to rank extractions, not a model of readability.
pub fn score_text(text: &str) -> f32 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let alnum = text.chars().filter(|c| c.is_alphanumeric()).count();
    let density = alnum as f32 / total as f32;
    let length_factor = (total as f32 / 200.0).min(1.0);
    (density * length_factor).clamp(0.0, 1.0)
}
