use std::time::Instant;

use gridmind::collaborator::{InferenceRequest, InferenceResponse, TokenUsage, VisionLanguage};
use gridmind::error::CollaboratorError;
use gridmind::grid::{color_name, Grid, PALETTE_SIZE};
use tracing::debug;

/// Built-in stand-in for a vision-language model.
///
/// Not a model: it compares colour populations of the two frames and says
/// which colours grew or shrank. Useful for replays without network access.
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// "stub" (built-in heuristic) or "offline" (always unavailable).
    pub mode: String,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            mode: "stub".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InterpreterRuntime {
    pub cfg: InterpreterConfig,
    pub calls: u32,
}

impl InterpreterRuntime {
    pub fn new_from_env() -> Self {
        let mut rt = Self::default();

        // GRIDMIND_INTERPRETER_MODE=stub|offline
        if let Ok(v) = std::env::var("GRIDMIND_INTERPRETER_MODE") {
            let vv = v.trim().to_ascii_lowercase();
            if !vv.is_empty() {
                rt.cfg.mode = vv;
            }
        }

        rt
    }

    fn invoke_stub(&self, request: &InferenceRequest) -> String {
        let (Some(before), Some(after)) = (request.frames.first(), request.frames.get(1)) else {
            return "no frames supplied; nothing to compare".to_string();
        };

        let b = population(before);
        let a = population(after);
        let mut parts: Vec<String> = Vec::new();
        for color in 1..PALETTE_SIZE as u8 {
            let (nb, na) = (b[color as usize], a[color as usize]);
            if na > nb {
                parts.push(format!("{} grew by {} cells", color_name(color), na - nb));
            } else if nb > na {
                parts.push(format!("{} shrank by {} cells", color_name(color), nb - na));
            }
        }

        if parts.is_empty() {
            "objects kept their colours and sizes; something shifted position".to_string()
        } else {
            parts.join("; ")
        }
    }
}

fn population(grid: &Grid) -> [usize; PALETTE_SIZE] {
    let mut counts = [0usize; PALETTE_SIZE];
    for (_, _, c) in grid.iter() {
        counts[(c as usize).min(PALETTE_SIZE - 1)] += 1;
    }
    counts
}

impl VisionLanguage for InterpreterRuntime {
    fn name(&self) -> &str {
        "stub-interpreter"
    }

    fn generate(
        &mut self,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse, CollaboratorError> {
        let started = Instant::now();
        self.calls += 1;

        let content = match self.cfg.mode.as_str() {
            "stub" => self.invoke_stub(request),
            "offline" => {
                return Err(CollaboratorError::Unavailable(
                    "interpreter is offline".to_string(),
                ))
            }
            // Future: http endpoint for a hosted model.
            other => {
                return Err(CollaboratorError::Unavailable(format!(
                    "interpreter mode '{other}' not implemented"
                )))
            }
        };

        debug!(calls = self.calls, "stub interpretation produced");
        Ok(InferenceResponse {
            usage: TokenUsage {
                prompt_tokens: request.prompt.split_whitespace().count() as u32,
                completion_tokens: content.split_whitespace().count() as u32,
            },
            content,
            latency_ms: started.elapsed().as_millis() as u64,
            model: "stub".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(before: Grid, after: Grid) -> InferenceRequest {
        InferenceRequest {
            system_prompt: String::new(),
            prompt: "what changed".to_string(),
            frames: vec![before, after],
        }
    }

    #[test]
    fn stub_reports_colour_growth() {
        let before = Grid::new(4, 4);
        let mut after = Grid::new(4, 4);
        after.set(0, 0, 2);
        after.set(0, 1, 2);

        let mut rt = InterpreterRuntime::default();
        let r = rt.generate(&request(before, after)).unwrap();
        assert!(r.content.contains("grew by 2 cells"), "{}", r.content);
        assert_eq!(rt.calls, 1);
    }

    #[test]
    fn offline_mode_is_unavailable() {
        let mut rt = InterpreterRuntime::default();
        rt.cfg.mode = "offline".to_string();
        let err = rt.generate(&request(Grid::new(2, 2), Grid::new(2, 2))).unwrap_err();
        assert!(matches!(err, CollaboratorError::Unavailable(_)));
    }
}
