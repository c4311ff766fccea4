//! # storycraftr
//!
//! Drafts and refines long-form documents with a chat-completion model.
//! Books and papers live as plain Markdown files in a project directory
//! described by `storycraftr.json`.
//!
//! ## Features
//!
//! - Create-or-refine generation of chapters, outlines, worldbuilding notes
//!   and paper sections, with a `.bak` copy kept before every overwrite
//! - Ordered consolidation of chapters into `book/book-<lang>.md`
//! - Fragment-by-fragment translation on one shared conversation
//! - Prompt templates embedded in the binary, overridable per project
//! - Every prompt logged with its date to `prompts.yaml`
//!
//! ## Quick Start
//!
//! ```no_run
//! use storycraftr::{
//!     load_api_key, ContentGenerator, ContentUnit, OpenAiClient, ProjectConfig, PromptEngine,
//!     RunOptions, Session,
//! };
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let project = Path::new("./my-book");
//! let config = ProjectConfig::load(project)?;
//! let client = OpenAiClient::from_config(&config, &load_api_key()?)?;
//! let prompts = PromptEngine::for_project(project)?;
//!
//! let mut session = Session::for_config(&client, &prompts, project, &config, RunOptions::default())?;
//! ContentGenerator::new(&config)
//!     .generate(&mut session, ContentUnit::chapter(1)?, "Open with a storm at sea.")?
//!     .print_summary();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! 1. **Store**: reads, writes and orders Markdown fragments
//! 2. **Prompt engine**: renders `tera` templates per content unit
//! 3. **Session**: sends prompts to a [`ModelClient`] and logs them
//! 4. **Generator / Consolidator**: create-or-refine a unit, or assemble the book

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod chat;
mod config;
mod consolidator;
mod error;
mod generator;
mod history;
mod init;
mod llm;
mod progress;
mod prompt;
mod registry;
mod session;
mod template_validator;
mod unit;

pub mod store;

pub use chat::{Chat, Reply, split_words};
pub use config::{
    CONFIG_FILE_NAME, CliVariant, DEFAULT_AUTHOR, DEFAULT_GENRE, DEFAULT_LICENSE,
    DEFAULT_OPENAI_MODEL, DEFAULT_OPENAI_URL, DEFAULT_REFERENCE_AUTHOR, ProjectConfig,
    ProjectConfigBuilder, RunOptions,
};
pub use consolidator::{BOOK_DIR, Consolidator, PAGE_BREAK, book_path};
pub use error::{Error, Result};
pub use generator::{ContentGenerator, Generated};
pub use history::{PROMPT_LOG_FILE, PromptEntry, PromptLog};
pub use init::{InitOptions, init_project, parse_languages};
pub use llm::{
    API_KEY_ENV, BEHAVIOR_FILE, Conversation, Message, ModelClient, OpenAiClient, ProjectFiles,
    Role, load_api_key,
};
pub use progress::{LogProgress, NoProgress, Progress, TaskId};
pub use prompt::{GenerationMode, OVERRIDES_DIR, PromptEngine};
pub use registry::{CommandRegistry, CommandSpec, Operation, Target};
pub use session::{ANSWER_PARTS, Session};
pub use unit::{CHAPTERS_DIR, ContentUnit, UnitKind};

use std::path::{Path, PathBuf};

/// Consolidates the project at `project` into `book/book-<lang>.md`,
/// translating every fragment when `target_language` is set.
///
/// Progress is reported through `tracing`.
///
/// # Errors
///
/// Returns an error if:
/// - A project prompt override is invalid
/// - A fragment cannot be read
/// - A translation request fails
/// - The book cannot be written
///
/// # Examples
///
/// ```no_run
/// use storycraftr::{load_api_key, publish, OpenAiClient, ProjectConfig, RunOptions};
/// use std::path::Path;
///
/// # fn main() -> anyhow::Result<()> {
/// let project = Path::new("./my-book");
/// let config = ProjectConfig::load(project)?;
/// let client = OpenAiClient::from_config(&config, &load_api_key()?)?;
///
/// let book = publish(&client, project, &config, Some("es"), RunOptions::default())?;
/// println!("{}", book.display());
/// # Ok(())
/// # }
/// ```
pub fn publish(
    client: &dyn ModelClient,
    project: &Path,
    config: &ProjectConfig,
    target_language: Option<&str>,
    options: RunOptions,
) -> Result<PathBuf> {
    let prompts = PromptEngine::for_project(project)?;
    let mut progress = LogProgress::new();
    Consolidator::new(client, &prompts, options).consolidate(
        project,
        &config.primary_language,
        target_language,
        &mut progress,
    )
}
