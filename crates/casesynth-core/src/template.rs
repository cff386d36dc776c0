//! `{placeholder}` rendering for prompts and text fields.

use crate::value::Value;
use regex::Regex;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Render `template`, replacing each `{name}` with `lookup(name)`.
///
/// Placeholders the lookup does not know are left verbatim.
pub fn render<'a, F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<&'a Value>,
{
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| match lookup(&caps[1]) {
            Some(value) => value.render(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Names referenced by `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}
