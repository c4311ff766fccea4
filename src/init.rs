//! Project scaffolding.

use crate::{
    config::{
        CliVariant, DEFAULT_AUTHOR, DEFAULT_GENRE, DEFAULT_LICENSE, DEFAULT_OPENAI_MODEL,
        DEFAULT_OPENAI_URL, DEFAULT_REFERENCE_AUTHOR, ProjectConfig,
    },
    consolidator::BOOK_DIR,
    error::{Error, Result},
    llm::BEHAVIOR_FILE,
    prompt::OVERRIDES_DIR,
    store,
    unit::CHAPTERS_DIR,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

const STORY_DIRS: &[&str] = &[CHAPTERS_DIR, "outline", "worldbuilding", "behaviors", BOOK_DIR];
const PAPER_DIRS: &[&str] = &["sections", "outline", "research", "behaviors", BOOK_DIR];

/// Options accepted by `init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitOptions {
    /// File whose content becomes the project's behavior prompt
    pub behavior: PathBuf,
    /// Language the content is written in
    pub primary_language: String,
    /// Translation targets (books only)
    pub alternate_languages: Vec<String>,
    /// Author name
    pub author: String,
    /// Genre (books only)
    pub genre: String,
    /// License (books only)
    pub license: String,
    /// Style reference (books only)
    pub reference_author: String,
    /// Keywords (papers only)
    pub keywords: Option<String>,
    /// Chat-completion endpoint
    pub openai_url: String,
    /// Model identifier
    pub openai_model: String,
    /// Request long answers in several parts
    pub multiple_answer: bool,
}

impl InitOptions {
    /// Options with every default and the given behavior file.
    #[must_use]
    pub fn new(behavior: impl Into<PathBuf>) -> Self {
        Self {
            behavior: behavior.into(),
            primary_language: "en".to_string(),
            alternate_languages: Vec::new(),
            author: DEFAULT_AUTHOR.to_string(),
            genre: DEFAULT_GENRE.to_string(),
            license: DEFAULT_LICENSE.to_string(),
            reference_author: DEFAULT_REFERENCE_AUTHOR.to_string(),
            keywords: None,
            openai_url: DEFAULT_OPENAI_URL.to_string(),
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            multiple_answer: false,
        }
    }

    /// Rejects options that belong to the other variant.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the offending options.
    pub fn validate_for(&self, variant: CliVariant) -> Result<()> {
        match variant {
            CliVariant::Storycraftr if self.keywords.is_some() => Err(Error::validation(
                "The --keywords option is only valid for papercraftr",
            )),
            CliVariant::Papercraftr
                if self.license != DEFAULT_LICENSE
                    || !self.alternate_languages.is_empty()
                    || self.genre != DEFAULT_GENRE
                    || self.reference_author != DEFAULT_REFERENCE_AUTHOR =>
            {
                Err(Error::validation(
                    "The options --license, --alternate-languages, --genre and \
                     --reference-author are only valid for storycraftr",
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Parses a comma-separated language list, dropping empty entries.
#[must_use]
pub fn parse_languages(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Creates a project at `project` for `variant`.
///
/// Writes the directory layout, `behaviors/default.txt` and
/// `storycraftr.json`. Nothing is written if validation fails.
///
/// # Errors
///
/// Returns a validation error for options of the other variant, a missing
/// behavior file or an already initialized project, and an I/O error if
/// scaffolding fails.
#[instrument(skip(options))]
pub fn init_project(
    project: &Path,
    variant: CliVariant,
    options: &InitOptions,
) -> Result<ProjectConfig> {
    options.validate_for(variant)?;

    if !options.behavior.is_file() {
        return Err(Error::validation(format!(
            "Behavior must be a file: {}",
            options.behavior.display()
        )));
    }
    if ProjectConfig::is_initialized(project) {
        return Err(Error::validation(format!(
            "{} is already initialized",
            project.display()
        )));
    }
    let behavior = fs::read_to_string(&options.behavior)
        .map_err(|e| Error::io(&options.behavior, e))?;

    let mut builder = ProjectConfig::builder()
        .book_path(project)
        .primary_language(&options.primary_language)
        .author(&options.author)
        .variant(variant)
        .openai_url(&options.openai_url)
        .openai_model(&options.openai_model)
        .multiple_answer(options.multiple_answer);
    builder = match variant {
        CliVariant::Storycraftr => builder
            .alternate_languages(options.alternate_languages.clone())
            .genre(&options.genre)
            .license(&options.license)
            .reference_author(&options.reference_author),
        CliVariant::Papercraftr => builder.keywords(options.keywords.clone().unwrap_or_default()),
    };
    let config = builder.build()?;

    let dirs = match variant {
        CliVariant::Storycraftr => STORY_DIRS,
        CliVariant::Papercraftr => PAPER_DIRS,
    };
    for dir in dirs.iter().chain(std::iter::once(&OVERRIDES_DIR)) {
        let path = project.join(dir);
        fs::create_dir_all(&path).map_err(|e| Error::io(&path, e))?;
        debug!("Created {}", path.display());
    }

    store::save(&project.join(BEHAVIOR_FILE), &behavior, false)?;
    config.save(project)?;

    info!("✓ Initialized {} project at {}", variant.name(), project.display());
    Ok(config)
}
