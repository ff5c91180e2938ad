// Command template placeholders
//
// `${name}` or `${name.qualifier}` placeholders are substituted from the
// properties accumulated earlier in a sequence. Unknown names are an error,
// never left in the command text.

use crate::domain::PropertyBag;
use crate::error::{OrchestrationError, Result};
use regex::Regex;
use std::sync::LazyLock;

// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_-]+)*)\}")
        .expect("constant regex pattern is valid")
});

/// Placeholder names referenced by a template, in order of appearance
fn placeholders(template: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Substitute every placeholder, or fail listing the missing names
pub fn resolve(template: &str, properties: &PropertyBag) -> Result<String> {
    let missing: Vec<String> = placeholders(template)
        .into_iter()
        .filter(|name| !properties.contains_key(name))
        .collect();

    if !missing.is_empty() {
        return Err(OrchestrationError::UnresolvedPlaceholder {
            command: template.to_string(),
            names: missing,
        });
    }

    Ok(PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            properties
                .get(&caps[1])
                .cloned()
                .unwrap_or_default()
        })
        .into_owned())
}

/// Escape a value for use inside a single-quoted shell word
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}
