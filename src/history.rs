//! Prompt log kept at `prompts.yaml` in the project root.

use crate::error::{Error, Result};
use crate::store;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

/// File name of the prompt log.
pub const PROMPT_LOG_FILE: &str = "prompts.yaml";

/// One logged prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptEntry {
    /// Day the prompt was sent
    pub date: String,
    /// Prompt as composed from the template, without the dated preamble
    pub original_prompt: String,
}

/// Appends every prompt sent to the model to the project's log.
#[derive(Debug, Clone)]
pub struct PromptLog {
    path: PathBuf,
}

impl PromptLog {
    /// Log for the project at `project`.
    #[must_use]
    pub fn for_project(project: &Path) -> Self {
        Self {
            path: project.join(PROMPT_LOG_FILE),
        }
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records `prompt` and returns it prefixed with the current date.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read or written.
    pub fn record(&self, prompt: &str) -> Result<String> {
        self.record_on(chrono::Local::now().date_naive(), prompt)
    }

    pub(crate) fn record_on(&self, date: NaiveDate, prompt: &str) -> Result<String> {
        let mut entries = self.entries()?;
        entries.push(PromptEntry {
            date: date.to_string(),
            original_prompt: prompt.to_string(),
        });

        let yaml = serde_yaml::to_string(&entries)?;
        store::save(&self.path, &yaml, false)?;
        trace!("Logged prompt #{} to {}", entries.len(), self.path.display());

        Ok(format!(
            "Today is {}.\n\n{prompt}",
            date.format("%A, %B %-d, %Y")
        ))
    }

    /// Returns all logged prompts, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the log exists but is not valid YAML.
    pub fn entries(&self) -> Result<Vec<PromptEntry>> {
        if !self.path.is_file() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path).map_err(|e| Error::io(&self.path, e))?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_yaml::from_str::<Option<Vec<PromptEntry>>>(&raw)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_record_prefixes_date() {
        let temp = assert_fs::TempDir::new().unwrap();
        let log = PromptLog::for_project(temp.path());
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

        let prompt = log.record_on(date, "Write chapter 1").unwrap();
        assert_eq!(prompt, "Today is Saturday, March 9, 2024.\n\nWrite chapter 1");
    }

    #[test]
    fn test_entries_accumulate() {
        let temp = assert_fs::TempDir::new().unwrap();
        let log = PromptLog::for_project(temp.path());
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();

        log.record_on(date, "first").unwrap();
        log.record_on(date, "second\nwith lines").unwrap();

        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].date, "2024-03-09");
        assert_eq!(entries[1].original_prompt, "second\nwith lines");
        assert!(temp.child(PROMPT_LOG_FILE).exists());
    }

    #[test]
    fn test_empty_log_file() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child(PROMPT_LOG_FILE).write_str("").unwrap();
        assert!(PromptLog::for_project(temp.path()).entries().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_log_is_an_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child(PROMPT_LOG_FILE).write_str("date: [").unwrap();
        assert!(PromptLog::for_project(temp.path()).entries().is_err());
    }
}
