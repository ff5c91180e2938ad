// Output Extractor

use crate::domain::{OutputExtractor, PropertyBag};
use crate::error::{OrchestrationError, Result};
use regex::Regex;

/// Compile a pattern, mapping syntax errors to validation errors
pub fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| OrchestrationError::Validation(format!("invalid pattern '{}': {}", pattern, e)))
}

/// Apply each extractor independently to `raw_output`
///
/// Capture group 1 is published when present, otherwise the whole match.
/// A pattern that does not match yields no entry.
pub fn extract(raw_output: &str, extractors: &[OutputExtractor]) -> Result<PropertyBag> {
    let mut properties = PropertyBag::new();
    for extractor in extractors {
        let regex = compile(&extractor.pattern)?;
        if let Some(caps) = regex.captures(raw_output) {
            let value = caps.get(1).or_else(|| caps.get(0)).map(|m| m.as_str().trim());
            if let Some(value) = value {
                properties.insert(extractor.property.clone(), value.to_string());
            }
        }
    }
    Ok(properties)
}

/// Compile every pattern, failing on the first invalid one
pub fn compile_all(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns.iter().map(|p| compile(p)).collect()
}
