//! Brand context assembly.
//!
//! Combines a static knowledge file with caller-supplied guidelines into a
//! single bounded text block for the planner prompt. A missing or unreadable
//! knowledge file is not an error; the pipeline runs with whatever context
//! is available.

use std::path::{Path, PathBuf};

/// Marker appended when the assembled context exceeds its character budget.
const TRUNCATION_MARKER: &str = "\n\n[...truncated...]";

pub struct ContextProvider {
    knowledge_path: PathBuf,
    max_chars: usize,
}

impl ContextProvider {
    pub fn new(knowledge_path: impl Into<PathBuf>, max_chars: usize) -> Self {
        Self {
            knowledge_path: knowledge_path.into(),
            max_chars,
        }
    }

    pub fn knowledge_path(&self) -> &Path {
        &self.knowledge_path
    }

    /// Loads the combined brand context.
    ///
    /// The static knowledge file (if present) comes first, then the caller's
    /// guidelines, joined by a blank line. The result is trimmed and capped
    /// at the configured character budget with a truncation marker.
    pub fn load_context(&self, extra_guidelines: &str) -> String {
        let mut chunks: Vec<String> = Vec::new();

        if self.knowledge_path.exists() {
            match std::fs::read_to_string(&self.knowledge_path) {
                Ok(text) => chunks.push(text),
                Err(e) => {
                    log::warn!(
                        "Could not read knowledge file '{}': {}",
                        self.knowledge_path.display(),
                        e
                    );
                }
            }
        }

        if !extra_guidelines.trim().is_empty() {
            chunks.push(extra_guidelines.to_string());
        }

        let ctx = chunks
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        if ctx.chars().count() > self.max_chars {
            let truncated: String = ctx.chars().take(self.max_chars).collect();
            return format!("{}{}", truncated, TRUNCATION_MARKER);
        }
        ctx
    }
}
