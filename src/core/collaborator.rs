//! Boundary to the external vision-language collaborator.
//!
//! The engine only needs one blocking call: given a prompt and a pair of
//! frames, return text. Transport, rendering and model choice live behind
//! [`VisionLanguage`]. Failures never reach the turn loop: [`interpret`]
//! swaps in a clearly labelled local description with a conservative
//! confidence.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::changes::ChangeAnalysis;
use crate::error::CollaboratorError;
use crate::grid::Grid;

/// Prefix marking text that did not come from the collaborator.
pub const FALLBACK_LABEL: &str = "[local fallback]";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InferenceRequest {
    pub system_prompt: String,
    pub prompt: String,
    /// Before and after frames, in that order.
    pub frames: Vec<Grid>,
}

impl InferenceRequest {
    /// Request asking for an interpretation of one frame change.
    pub fn for_change(
        system_prompt: &str,
        analysis: &ChangeAnalysis,
        before: &Grid,
        after: &Grid,
    ) -> Self {
        let prompt = format!(
            "Explain what the action did in terms of objects.\n\n{}",
            analysis.report()
        );
        Self {
            system_prompt: system_prompt.to_string(),
            prompt,
            frames: vec![before.clone(), after.clone()],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InferenceResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub latency_ms: u64,
    pub model: String,
}

/// A vision-language model. Blocking from the engine's point of view.
pub trait VisionLanguage {
    fn name(&self) -> &str {
        "collaborator"
    }

    fn generate(&mut self, request: &InferenceRequest)
        -> Result<InferenceResponse, CollaboratorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InterpretationSource {
    Collaborator,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Interpretation {
    pub text: String,
    pub confidence: f32,
    pub source: InterpretationSource,
    pub model: Option<String>,
    pub usage: TokenUsage,
    pub latency_ms: u64,
}

impl Interpretation {
    pub fn fallback(local: &str, confidence: f32) -> Self {
        Self {
            text: format!("{FALLBACK_LABEL} {local}"),
            confidence: confidence.clamp(0.0, 1.0),
            source: InterpretationSource::Fallback,
            model: None,
            usage: TokenUsage::default(),
            latency_ms: 0,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.source == InterpretationSource::Fallback
    }
}

/// Ask the collaborator, degrading to `local` text on any failure.
pub fn interpret<C: VisionLanguage + ?Sized>(
    collaborator: Option<&mut C>,
    request: &InferenceRequest,
    local: &str,
    fallback_confidence: f32,
) -> Interpretation {
    let Some(c) = collaborator else {
        return Interpretation::fallback(local, fallback_confidence);
    };

    let result = c.generate(request).and_then(|r| {
        if r.content.trim().is_empty() {
            Err(CollaboratorError::EmptyResponse)
        } else {
            Ok(r)
        }
    });

    match result {
        Ok(r) => Interpretation {
            text: r.content.trim().to_string(),
            confidence: 1.0,
            source: InterpretationSource::Collaborator,
            model: Some(r.model),
            usage: r.usage,
            latency_ms: r.latency_ms,
        },
        Err(e) => {
            warn!(
                collaborator = c.name(),
                error = %e,
                "interpretation failed; using local fallback"
            );
            Interpretation::fallback(local, fallback_confidence)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(Vec<Result<InferenceResponse, CollaboratorError>>);

    impl VisionLanguage for Scripted {
        fn generate(
            &mut self,
            _request: &InferenceRequest,
        ) -> Result<InferenceResponse, CollaboratorError> {
            self.0
                .pop()
                .unwrap_or(Err(CollaboratorError::Unavailable("script exhausted".into())))
        }
    }

    fn ok(text: &str) -> Result<InferenceResponse, CollaboratorError> {
        Ok(InferenceResponse {
            content: text.to_string(),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
            },
            latency_ms: 12,
            model: "scripted".to_string(),
        })
    }

    fn request() -> InferenceRequest {
        InferenceRequest {
            system_prompt: String::new(),
            prompt: "what moved?".to_string(),
            frames: Vec::new(),
        }
    }

    #[test]
    fn successful_response_is_used() {
        let mut c = Scripted(vec![ok("  the red block slid down  ")]);
        let i = interpret(Some(&mut c), &request(), "local", 0.3);
        assert_eq!(i.text, "the red block slid down");
        assert_eq!(i.source, InterpretationSource::Collaborator);
        assert_eq!(i.usage.total(), 15);
        assert_eq!(i.confidence, 1.0);
    }

    #[test]
    fn failures_fall_back_with_label() {
        let mut c = Scripted(vec![Err(CollaboratorError::Transport("timeout".into()))]);
        let i = interpret(Some(&mut c), &request(), "4 pixels moved", 0.3);
        assert!(i.is_fallback());
        assert!(i.text.starts_with(FALLBACK_LABEL));
        assert!(i.text.contains("4 pixels moved"));
        assert_eq!(i.confidence, 0.3);

        let mut empty = Scripted(vec![ok("   ")]);
        assert!(interpret(Some(&mut empty), &request(), "x", 0.3).is_fallback());
    }

    #[test]
    fn missing_collaborator_falls_back() {
        let i = interpret::<Scripted>(None, &request(), "nothing changed", 0.25);
        assert!(i.is_fallback());
        assert_eq!(i.confidence, 0.25);
    }
}
