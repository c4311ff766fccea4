use crate::error::{Error, Result};
use std::fs;
use std::path::Path;
use tera::Tera;

/// Maximum template file size (256KB)
const MAX_TEMPLATE_SIZE: u64 = 256 * 1024;

/// Variables a prompt override must use, keyed by template name.
///
/// Templates not listed here must use `prompt`.
const REQUIRED_VARIABLES: &[(&str, &[&str])] = &[
    ("translate", &["content", "target_language"]),
    ("continue", &["part"]),
];

const DEFAULT_REQUIRED: &[&str] = &["prompt"];

/// Variables every unit template receives.
const OPTIONAL_VARIABLES: &[&str] = &[
    "language",
    "book_name",
    "title",
    "author",
    "genre",
    "license",
    "reference_author",
    "keywords",
    "alternate_languages",
    "index",
];

/// Validates project prompt overrides before they replace a built-in.
pub(crate) struct TemplateValidator;

impl TemplateValidator {
    /// Validates an override file and returns its source.
    ///
    /// Performs the following checks:
    /// 1. File exists and is readable
    /// 2. File size is within limits
    /// 3. Template syntax is valid (can be compiled by Tera)
    /// 4. Template uses the variables its prompt depends on
    ///
    /// # Errors
    ///
    /// Returns an error if any check fails.
    pub(crate) fn validate_template(path: &Path) -> Result<String> {
        let display = path.to_string_lossy().to_string();

        if !path.is_file() {
            return Err(Error::not_found(path));
        }

        let metadata = fs::metadata(path).map_err(|e| Error::io(path, e))?;
        if metadata.len() > MAX_TEMPLATE_SIZE {
            return Err(Error::template_validation(
                display,
                format!(
                    "Template file too large: {} bytes (max: {} bytes)",
                    metadata.len(),
                    MAX_TEMPLATE_SIZE
                ),
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        if content.trim().is_empty() {
            return Err(Error::template_validation(display, "Template file is empty"));
        }

        let mut temp_tera = Tera::default();
        temp_tera
            .add_raw_template("validation", &content)
            .map_err(|e| {
                Error::template_validation(display.clone(), format!("Template syntax error: {e}"))
            })?;

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        Self::check_required_variables(name, &content, &display)?;
        Self::check_optional_variables(&content);

        Ok(content)
    }

    fn required_for(name: &str) -> &'static [&'static str] {
        REQUIRED_VARIABLES
            .iter()
            .find(|(template, _)| *template == name)
            .map_or(DEFAULT_REQUIRED, |(_, vars)| *vars)
    }

    /// Uses a textual heuristic: the variable must appear inside `{{ }}`.
    fn check_required_variables(name: &str, content: &str, display: &str) -> Result<()> {
        let missing: Vec<&str> = Self::required_for(name)
            .iter()
            .filter(|var| !uses_variable(content, var))
            .copied()
            .collect();

        if !missing.is_empty() {
            return Err(Error::template_validation(
                display,
                format!(
                    "Template is missing required variables: {}",
                    missing.join(", ")
                ),
            ));
        }

        Ok(())
    }

    fn check_optional_variables(content: &str) {
        for var in OPTIONAL_VARIABLES {
            if !uses_variable(content, var) {
                tracing::trace!("Template does not use optional variable: {}", var);
            }
        }
    }
}

fn uses_variable(content: &str, var: &str) -> bool {
    [format!("{{{{ {var}"), format!("{{{{{var}")]
        .iter()
        .any(|pattern| content.contains(pattern))
}
