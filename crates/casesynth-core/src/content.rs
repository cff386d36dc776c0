//! Prompt-based content generation with guaranteed fallback.
//!
//! The external collaborator ([`TextGenerator`]) may fail, time out or
//! return junk. [`ContentGenerator`] is the boundary where all of that is
//! absorbed: callers always get text back, plus a note when that text is
//! the configured fallback rather than real output.

use tracing::{debug, warn};

/// Fallback used when no text could be generated.
pub const DEFAULT_FALLBACK_TEXT: &str = "Content unavailable; generated text could not be produced.";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContentError {
    #[error("generator unavailable: {0}")]
    Unavailable(String),
    #[error("generator request failed: {0}")]
    Request(String),
    #[error("malformed generator response: {0}")]
    Malformed(String),
}

/// External text-generation collaborator.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, ContentError>;

    /// Short backend name for logs.
    fn name(&self) -> &str {
        "generator"
    }
}

impl<G: TextGenerator + ?Sized> TextGenerator for Box<G> {
    fn generate(&self, prompt: &str) -> Result<String, ContentError> {
        (**self).generate(prompt)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Offline generator echoing the prompt back as content.
#[derive(Debug, Clone, Default)]
pub struct EchoGenerator;

impl TextGenerator for EchoGenerator {
    fn generate(&self, prompt: &str) -> Result<String, ContentError> {
        Ok(format!("Generated content based on prompt: {prompt}"))
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// Generator that is never available; every call degrades to the fallback.
#[derive(Debug, Clone, Default)]
pub struct DisabledGenerator;

impl TextGenerator for DisabledGenerator {
    fn generate(&self, _prompt: &str) -> Result<String, ContentError> {
        Err(ContentError::Unavailable("content generation disabled".to_string()))
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

/// Text returned by [`ContentGenerator::generate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub text: String,
    /// Why the fallback was used, if it was.
    pub degraded: Option<ContentError>,
}

impl Generated {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

pub struct ContentGenerator {
    backend: Box<dyn TextGenerator>,
    fallback: String,
}

impl ContentGenerator {
    pub fn new(backend: Box<dyn TextGenerator>) -> Self {
        Self {
            backend,
            fallback: DEFAULT_FALLBACK_TEXT.to_string(),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Generate text for `prompt`. Never fails.
    pub fn generate(&self, prompt: &str) -> Generated {
        let outcome = self
            .backend
            .generate(prompt)
            .and_then(|raw| {
                let text = normalize(&raw);
                if text.is_empty() {
                    Err(ContentError::Malformed("empty response".to_string()))
                } else {
                    Ok(text)
                }
            });

        match outcome {
            Ok(text) => {
                debug!(backend = self.backend.name(), chars = text.len(), "generated content");
                Generated {
                    text,
                    degraded: None,
                }
            }
            Err(err) => {
                warn!(backend = self.backend.name(), error = %err, "content generation degraded, using fallback");
                Generated {
                    text: self.fallback.clone(),
                    degraded: Some(err),
                }
            }
        }
    }
}

impl std::fmt::Debug for ContentGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentGenerator")
            .field("backend", &self.backend.name())
            .field("fallback", &self.fallback)
            .finish()
    }
}

const QUOTE_PAIRS: &[(char, char)] = &[
    ('"', '"'),
    ('\u{201c}', '\u{201d}'),
    ('\'', '\''),
    ('\u{2018}', '\u{2019}'),
];
const DOUBLE_QUOTES: &[char] = &['"', '\u{201c}', '\u{201d}'];

/// Trim whitespace and wrapping quotation marks from generated text.
///
/// Quotes are only removed as a matching pair around the whole text, or as
/// a single unbalanced double quote at either end. A trailing apostrophe
/// (`the users'`) is kept.
pub fn normalize(raw: &str) -> String {
    let mut text = raw.trim();
    while let Some(inner) = QUOTE_PAIRS.iter().find_map(|&(open, close)| {
        let inner = text.strip_prefix(open)?.strip_suffix(close)?;
        // `"a" and "b"` is two quotations, not one wrapped answer.
        let wraps = !DOUBLE_QUOTES.contains(&open) || !inner.contains(DOUBLE_QUOTES);
        wraps.then_some(inner)
    }) {
        text = inner.trim();
    }
    if text.matches(DOUBLE_QUOTES).count() == 1 {
        text = text
            .trim_start_matches(DOUBLE_QUOTES)
            .trim_end_matches(DOUBLE_QUOTES)
            .trim();
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Scripted(Mutex<Vec<Result<String, ContentError>>>);

    impl TextGenerator for Scripted {
        fn generate(&self, _prompt: &str) -> Result<String, ContentError> {
            self.0.lock().remove(0)
        }
    }

    #[test]
    fn test_strips_surrounding_quotes() {
        assert_eq!(normalize("  \"Printer jammed again\"  "), "Printer jammed again");
        assert_eq!(normalize("\u{201c}Quoted\u{201d}"), "Quoted");
        assert_eq!(normalize("It's \"fine\" inside"), "It's \"fine\" inside");
        assert_eq!(normalize("'Reset it'"), "Reset it");
    }

    #[test]
    fn test_keeps_possessive_apostrophes() {
        assert_eq!(normalize("Restored the users'"), "Restored the users'");
        assert_eq!(normalize("Checked the admins\u{2019}"), "Checked the admins\u{2019}");
        assert_eq!(normalize("\"Cleared the hosts'\""), "Cleared the hosts'");
    }

    #[test]
    fn test_only_unbalanced_double_quotes_are_dropped() {
        assert_eq!(normalize("\"Disk full on db01"), "Disk full on db01");
        assert_eq!(normalize("\"a\" and \"b\""), "\"a\" and \"b\"");
        assert_eq!(normalize("Bought a 27\" monitor"), "Bought a 27\" monitor");
    }

    #[test]
    fn test_always_failing_backend_yields_fallback() {
        let generator = ContentGenerator::new(Box::new(DisabledGenerator)).with_fallback("n/a");
        for _ in 0..5 {
            let out = generator.generate("anything");
            assert_eq!(out.text, "n/a");
            assert!(out.is_degraded());
        }
    }

    #[test]
    fn test_empty_or_quote_only_response_is_malformed() {
        let backend = Scripted(Mutex::new(vec![Ok("\"\"".to_string()), Ok("  ".to_string())]));
        let generator = ContentGenerator::new(Box::new(backend));
        for _ in 0..2 {
            let out = generator.generate("p");
            assert_eq!(out.text, DEFAULT_FALLBACK_TEXT);
            assert!(matches!(out.degraded, Some(ContentError::Malformed(_))));
        }
    }

    #[test]
    fn test_successful_generation_is_normalized() {
        let backend = Scripted(Mutex::new(vec![Ok("'User cannot log in'".to_string())]));
        let out = ContentGenerator::new(Box::new(backend)).generate("p");
        assert_eq!(out.text, "User cannot log in");
        assert!(!out.is_degraded());
    }

    #[test]
    fn test_echo_generator_mentions_prompt() {
        let out = ContentGenerator::new(Box::new(EchoGenerator)).generate("log snippet");
        assert!(out.text.ends_with("log snippet"));
    }
}
