use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the per-project configuration file.
pub const CONFIG_FILE_NAME: &str = "storycraftr.json";

/// Chat-completion endpoint used when none is given.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
/// Model used when none is given.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
/// License used when none is given.
pub const DEFAULT_LICENSE: &str = "CC BY-NC-SA";
/// Genre used when none is given.
pub const DEFAULT_GENRE: &str = "fantasy";
/// Author printed when none is given.
pub const DEFAULT_AUTHOR: &str = "Author Name";
/// Placeholder meaning no reference author.
pub const DEFAULT_REFERENCE_AUTHOR: &str = "None";

/// Which flavor of the tool owns a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CliVariant {
    /// Books: outline, worldbuilding, chapters
    Storycraftr,
    /// Academic papers: define, literature, sections
    Papercraftr,
}

impl CliVariant {
    /// Returns the executable name for this variant.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Storycraftr => "storycraftr",
            Self::Papercraftr => "papercraftr",
        }
    }

    /// Detects the variant from the program name (`argv[0]`).
    ///
    /// Anything that is not `papercraftr` runs as `storycraftr`.
    #[must_use]
    pub fn detect(program: &str) -> Self {
        let stem = Path::new(program)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        if stem == "papercraftr" {
            Self::Papercraftr
        } else {
            Self::Storycraftr
        }
    }

    /// Parses the `cli_name` value stored in a project file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "storycraftr" => Ok(Self::Storycraftr),
            "papercraftr" => Ok(Self::Papercraftr),
            other => Err(Error::config(format!(
                "Unknown CLI tool name '{other}'. Use 'storycraftr' or 'papercraftr'."
            ))),
        }
    }
}

/// Per-project settings loaded from `storycraftr.json`.
///
/// A project either has a complete configuration or none at all; there is no
/// partially filled record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Root directory of the project
    pub book_path: String,

    /// Title of the book or paper
    pub book_name: String,

    /// Language the content is written in
    pub primary_language: String,

    /// Languages the book may be translated to
    pub alternate_languages: Vec<String>,

    /// Author printed on covers
    pub default_author: String,

    /// Genre or category
    pub genre: String,

    /// License printed on the back cover
    pub license: String,

    /// Author whose style the model should follow
    pub reference_author: String,

    /// Paper keywords (empty for books)
    #[serde(default)]
    pub keywords: String,

    /// Variant that created the project
    pub cli_name: String,

    /// Base URL of the chat-completion API
    pub openai_url: String,

    /// Model identifier
    pub openai_model: String,

    /// Whether long answers are requested in several parts
    pub multiple_answer: bool,
}

impl ProjectConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ProjectConfigBuilder {
        ProjectConfigBuilder::default()
    }

    /// Returns the path of the configuration file under `root`.
    #[must_use]
    pub fn file_path(root: &Path) -> PathBuf {
        root.join(CONFIG_FILE_NAME)
    }

    /// Loads the configuration of the project at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file is missing, unreadable or not a
    /// complete configuration.
    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::file_path(root);
        let raw = fs::read_to_string(&path).map_err(|e| {
            Error::config(format!(
                "Folder '{}' is not a storycraftr project ({}: {e})",
                root.display(),
                path.display()
            ))
        })?;

        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::config(format!("Malformed {}: {e}", path.display())))?;

        debug!("Loaded project config '{}' from {}", config.book_name, path.display());
        Ok(config)
    }

    /// Loads the configuration, reporting a missing or malformed file as `None`.
    #[must_use]
    pub fn try_load(root: &Path) -> Option<Self> {
        match Self::load(root) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("{e}");
                None
            }
        }
    }

    /// Returns true if `root` contains a configuration file.
    #[must_use]
    pub fn is_initialized(root: &Path) -> bool {
        Self::file_path(root).exists()
    }

    /// Writes the configuration as pretty JSON to `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, root: &Path) -> Result<()> {
        let path = Self::file_path(root);
        let json = serde_json::to_string_pretty(self)?;
        crate::store::save(&path, &json, false)
    }

    /// Returns the variant recorded in the project.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown `cli_name`.
    pub fn variant(&self) -> Result<CliVariant> {
        CliVariant::from_name(&self.cli_name)
    }

    /// Returns the alternate languages joined for prompts.
    #[must_use]
    pub fn alternate_languages_joined(&self) -> String {
        self.alternate_languages.join(", ")
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a required value is empty or the variant is unknown.
    pub fn validate(&self) -> Result<()> {
        if self.book_name.trim().is_empty() {
            return Err(Error::config("book_name must not be empty"));
        }
        if self.primary_language.trim().is_empty() {
            return Err(Error::config("primary_language must not be empty"));
        }
        if self.openai_model.trim().is_empty() {
            return Err(Error::config("openai_model must not be empty"));
        }
        if !self.openai_url.starts_with("http://") && !self.openai_url.starts_with("https://") {
            return Err(Error::config(format!(
                "openai_url must be an http(s) URL: {}",
                self.openai_url
            )));
        }
        self.variant()?;
        Ok(())
    }
}

/// Per-invocation options threaded through call sites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Log composed prompts in full
    pub debug: bool,
}

/// Builder for creating a [`ProjectConfig`].
#[derive(Debug, Default)]
pub struct ProjectConfigBuilder {
    book_path: Option<PathBuf>,
    primary_language: Option<String>,
    alternate_languages: Vec<String>,
    author: Option<String>,
    genre: Option<String>,
    license: Option<String>,
    reference_author: Option<String>,
    keywords: Option<String>,
    variant: Option<CliVariant>,
    openai_url: Option<String>,
    openai_model: Option<String>,
    multiple_answer: bool,
}

impl ProjectConfigBuilder {
    /// Sets the project root; the book name is its last path component.
    #[must_use]
    pub fn book_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.book_path = Some(path.into());
        self
    }

    /// Sets the primary language.
    #[must_use]
    pub fn primary_language(mut self, language: impl Into<String>) -> Self {
        self.primary_language = Some(language.into());
        self
    }

    /// Sets the alternate languages.
    #[must_use]
    pub fn alternate_languages(mut self, languages: Vec<String>) -> Self {
        self.alternate_languages = languages;
        self
    }

    /// Sets the default author.
    #[must_use]
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Sets the genre.
    #[must_use]
    pub fn genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    /// Sets the license.
    #[must_use]
    pub fn license(mut self, license: impl Into<String>) -> Self {
        self.license = Some(license.into());
        self
    }

    /// Sets the style reference author.
    #[must_use]
    pub fn reference_author(mut self, author: impl Into<String>) -> Self {
        self.reference_author = Some(author.into());
        self
    }

    /// Sets the paper keywords.
    #[must_use]
    pub fn keywords(mut self, keywords: impl Into<String>) -> Self {
        self.keywords = Some(keywords.into());
        self
    }

    /// Sets the tool variant.
    #[must_use]
    pub fn variant(mut self, variant: CliVariant) -> Self {
        self.variant = Some(variant);
        self
    }

    /// Sets the API base URL.
    #[must_use]
    pub fn openai_url(mut self, url: impl Into<String>) -> Self {
        self.openai_url = Some(url.into());
        self
    }

    /// Sets the model identifier.
    #[must_use]
    pub fn openai_model(mut self, model: impl Into<String>) -> Self {
        self.openai_model = Some(model.into());
        self
    }

    /// Enables multi-part answers.
    #[must_use]
    pub fn multiple_answer(mut self, enabled: bool) -> Self {
        self.multiple_answer = enabled;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the book path is missing or validation fails.
    pub fn build(self) -> Result<ProjectConfig> {
        let book_path = self
            .book_path
            .ok_or_else(|| Error::config("book_path is required"))?;
        let book_name = book_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                Error::config(format!("Cannot derive a name from {}", book_path.display()))
            })?;

        let config = ProjectConfig {
            book_path: book_path.display().to_string(),
            book_name,
            primary_language: self.primary_language.unwrap_or_else(|| "en".to_string()),
            alternate_languages: self.alternate_languages,
            default_author: self.author.unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
            genre: self.genre.unwrap_or_else(|| DEFAULT_GENRE.to_string()),
            license: self.license.unwrap_or_else(|| DEFAULT_LICENSE.to_string()),
            reference_author: self
                .reference_author
                .unwrap_or_else(|| DEFAULT_REFERENCE_AUTHOR.to_string()),
            keywords: self.keywords.unwrap_or_default(),
            cli_name: self
                .variant
                .unwrap_or(CliVariant::Storycraftr)
                .name()
                .to_string(),
            openai_url: self
                .openai_url
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            openai_model: self
                .openai_model
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            multiple_answer: self.multiple_answer,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_fs::prelude::*;

    pub(crate) fn sample_config(root: &Path) -> ProjectConfig {
        ProjectConfig::builder()
            .book_path(root.join("my-book"))
            .primary_language("en")
            .alternate_languages(vec!["es".to_string(), "fr".to_string()])
            .author("Ada Writer")
            .genre("science fiction")
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_defaults() {
        let config = ProjectConfig::builder()
            .book_path("/tmp/projects/dune")
            .build()
            .unwrap();

        assert_eq!(config.book_name, "dune");
        assert_eq!(config.license, DEFAULT_LICENSE);
        assert_eq!(config.openai_model, DEFAULT_OPENAI_MODEL);
        assert_eq!(config.variant().unwrap(), CliVariant::Storycraftr);
        assert!(config.keywords.is_empty());
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = ProjectConfig::builder()
            .book_path("/tmp/projects/dune")
            .openai_url("ftp://example.com")
            .build();

        assert!(result.unwrap_err().is_config());
    }

    #[test]
    fn test_save_and_load() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = sample_config(temp.path());
        config.save(temp.path()).unwrap();

        assert!(ProjectConfig::is_initialized(temp.path()));
        let loaded = ProjectConfig::load(temp.path()).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.alternate_languages_joined(), "es, fr");
    }

    #[test]
    fn test_missing_config_is_none() {
        let temp = assert_fs::TempDir::new().unwrap();
        assert!(ProjectConfig::try_load(temp.path()).is_none());
        assert!(ProjectConfig::load(temp.path()).unwrap_err().is_config());
    }

    #[test]
    fn test_malformed_config_is_none() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child(CONFIG_FILE_NAME).write_str("{ not json").unwrap();
        assert!(ProjectConfig::try_load(temp.path()).is_none());
    }

    #[test]
    fn test_partial_config_is_none() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child(CONFIG_FILE_NAME)
            .write_str(r#"{"book_path": "x", "book_name": "x"}"#)
            .unwrap();
        assert!(ProjectConfig::try_load(temp.path()).is_none());
    }

    #[test]
    fn test_keywords_optional() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child(CONFIG_FILE_NAME)
            .write_str(
                r#"{
                "book_path": "/p", "book_name": "p", "primary_language": "en",
                "alternate_languages": [], "default_author": "A", "genre": "g",
                "license": "l", "reference_author": "r", "cli_name": "papercraftr",
                "openai_url": "https://api.openai.com/v1", "openai_model": "gpt-4o",
                "multiple_answer": false
            }"#,
            )
            .unwrap();

        let config = ProjectConfig::load(temp.path()).unwrap();
        assert_eq!(config.keywords, "");
        assert_eq!(config.variant().unwrap(), CliVariant::Papercraftr);
    }

    #[test]
    fn test_variant_detection() {
        assert_eq!(CliVariant::detect("/usr/bin/papercraftr"), CliVariant::Papercraftr);
        assert_eq!(CliVariant::detect("papercraftr.exe"), CliVariant::Papercraftr);
        assert_eq!(CliVariant::detect("storycraftr"), CliVariant::Storycraftr);
        assert_eq!(CliVariant::detect("something-else"), CliVariant::Storycraftr);
        assert!(CliVariant::from_name("bookcraftr").unwrap_err().is_config());
    }
}
