use crate::{
    config::ProjectConfig,
    error::{Error, Result},
    prompt::GenerationMode,
    session::Session,
    store,
    unit::ContentUnit,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, instrument};

/// Outcome of one generation.
#[derive(Debug, Clone)]
pub struct Generated {
    /// Unit that was written
    pub unit: ContentUnit,

    /// File the content was saved to
    pub path: PathBuf,

    /// Whether the unit was created or refined
    pub mode: GenerationMode,

    /// Content as returned by the model
    pub content: String,

    /// Time spent waiting for the model and saving
    pub duration: Duration,
}

impl Generated {
    /// Prints a one-line summary to stdout.
    pub fn print_summary(&self) {
        let verb = match self.mode {
            GenerationMode::New => "Created",
            GenerationMode::Refine => "Refined",
        };
        println!(
            "{verb} {} at {} ({:.1}s)",
            self.unit,
            self.path.display(),
            self.duration.as_secs_f64()
        );
    }
}

/// Produces or refines content units through a session.
///
/// The sequence is fixed: pick the mode from the file's existence, render the
/// prompt, ask the model, save with a backup, then refresh the project
/// knowledge. Nothing is written unless the model answered.
pub struct ContentGenerator<'c> {
    config: &'c ProjectConfig,
}

impl<'c> ContentGenerator<'c> {
    /// Creates a generator for the given project settings.
    #[must_use]
    pub const fn new(config: &'c ProjectConfig) -> Self {
        Self { config }
    }

    /// Generates `unit` following `instruction`.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering, the model call, saving or the
    /// knowledge refresh fails. In the first two cases the target file is
    /// left untouched.
    #[instrument(skip(self, session, instruction), fields(unit = %unit))]
    pub fn generate(
        &self,
        session: &mut Session<'_>,
        unit: ContentUnit,
        instruction: &str,
    ) -> Result<Generated> {
        let start = Instant::now();
        let path = unit.path(session.project());
        let mode = GenerationMode::for_path(&path);

        let prompt = session
            .prompts()
            .render_unit(&unit, mode, instruction, self.config)?;
        info!("Generating {unit} ({mode:?})");

        let content = session.ask(&prompt, Some(&path))?;
        Self::save_generated(session, unit, path, mode, content, start)
    }

    /// Inserts a new chapter at `position`, shifting later chapters up by one.
    ///
    /// The model is asked before any chapter is renamed, so a failed call
    /// leaves the book as it was.
    ///
    /// # Errors
    ///
    /// Returns a validation error for position 0 or a position more than one
    /// past the last chapter, and any rendering, model or filesystem error.
    #[instrument(skip(self, session, instruction))]
    pub fn insert_chapter(
        &self,
        session: &mut Session<'_>,
        position: u32,
        instruction: &str,
    ) -> Result<Generated> {
        let start = Instant::now();
        let unit = ContentUnit::chapter(position)?;
        let chapters = store::numbered_chapters(session.project())?;
        let last = chapters.last().map_or(0, |(n, _)| *n);
        if u64::from(position) > last + 1 {
            return Err(Error::validation(format!(
                "Cannot insert chapter {position}: the book has {last} chapters"
            )));
        }

        let mode = GenerationMode::New;
        let prompt = session
            .prompts()
            .render_unit(&unit, mode, instruction, self.config)?;
        info!("Generating inserted {unit}");
        let content = session.ask(&prompt, None)?;

        for (number, _) in chapters
            .iter()
            .rev()
            .filter(|(n, _)| *n >= u64::from(position))
        {
            store::renumber_chapter(session.project(), *number, number + 1)?;
        }
        info!("Shifted chapters from {position} to make room");

        let path = unit.path(session.project());
        Self::save_generated(session, unit, path, mode, content, start)
    }

    fn save_generated(
        session: &mut Session<'_>,
        unit: ContentUnit,
        path: PathBuf,
        mode: GenerationMode,
        content: String,
        start: Instant,
    ) -> Result<Generated> {
        store::save(&path, &content, true)?;
        session.refresh()?;

        let duration = start.elapsed();
        info!("✓ Saved {} in {:.2}s", path.display(), duration.as_secs_f64());

        Ok(Generated {
            unit,
            path,
            mode,
            content,
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunOptions;
    use crate::config::tests::sample_config;
    use crate::llm::tests::ScriptedClient;
    use crate::prompt::PromptEngine;
    use crate::unit::UnitKind;
    use assert_fs::prelude::*;

    fn session<'a>(
        client: &'a ScriptedClient,
        prompts: &'a PromptEngine,
        temp: &assert_fs::TempDir,
    ) -> Session<'a> {
        Session::open(client, prompts, temp.path(), RunOptions::default()).unwrap()
    }

    #[test]
    fn test_new_chapter_is_written_without_backup() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = sample_config(temp.path());
        let client = ScriptedClient::answering(&["# Chapter 1\n\nIt begins."]);
        let prompts = PromptEngine::new().unwrap();
        let mut session = session(&client, &prompts, &temp);

        let generated = ContentGenerator::new(&config)
            .generate(&mut session, ContentUnit::chapter(1).unwrap(), "Open on a storm.")
            .unwrap();

        assert_eq!(generated.mode, GenerationMode::New);
        temp.child("chapters/chapter-1.md")
            .assert("# Chapter 1\n\nIt begins.");
        assert!(!temp.child("chapters/chapter-1.md.bak").exists());
        assert!(client.prompts()[0].contains("Write chapter 1"));
        assert_eq!(*client.refreshes.borrow(), 1);
    }

    #[test]
    fn test_existing_chapter_is_refined_with_backup() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("chapters/chapter-2.md")
            .write_str("old draft")
            .unwrap();
        let config = sample_config(temp.path());
        let client = ScriptedClient::answering(&["new draft"]);
        let prompts = PromptEngine::new().unwrap();
        let mut session = session(&client, &prompts, &temp);

        let generated = ContentGenerator::new(&config)
            .generate(&mut session, ContentUnit::chapter(2).unwrap(), "Tighten it.")
            .unwrap();

        assert_eq!(generated.mode, GenerationMode::Refine);
        temp.child("chapters/chapter-2.md").assert("new draft");
        temp.child("chapters/chapter-2.md.bak").assert("old draft");

        let sent = &client.prompts()[0];
        assert!(sent.contains("Rewrite chapter 2"));
        assert!(sent.contains("Current content of chapter-2.md"));
        assert!(sent.ends_with("old draft"));
    }

    #[test]
    fn test_template_failure_writes_nothing() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("prompts/epilogue_new.tera")
            .write_str("{{ prompt }} narrated by {{ narrator }}")
            .unwrap();
        let config = sample_config(temp.path());
        let client = ScriptedClient::answering(&["unused"]);
        let prompts = PromptEngine::for_project(temp.path()).unwrap();
        let mut session = session(&client, &prompts, &temp);

        let err = ContentGenerator::new(&config)
            .generate(
                &mut session,
                ContentUnit::named(UnitKind::Epilogue).unwrap(),
                "Wrap up.",
            )
            .unwrap_err();

        assert!(err.is_template());
        assert!(client.prompts().is_empty());
        assert!(!temp.child("chapters/epilogue.md").exists());
    }

    #[test]
    fn test_model_failure_leaves_file_untouched() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("outline/general_outline.md")
            .write_str("The plan")
            .unwrap();
        let config = sample_config(temp.path());
        let client = ScriptedClient::answering(&[]);
        let prompts = PromptEngine::new().unwrap();
        let mut session = session(&client, &prompts, &temp);

        let err = ContentGenerator::new(&config)
            .generate(
                &mut session,
                ContentUnit::named(UnitKind::GeneralOutline).unwrap(),
                "Add a twist.",
            )
            .unwrap_err();

        assert!(err.is_upstream());
        temp.child("outline/general_outline.md").assert("The plan");
        assert!(!temp.child("outline/general_outline.md.bak").exists());
        assert_eq!(*client.refreshes.borrow(), 0);
    }

    #[test]
    fn test_insert_chapter_shifts_later_chapters() {
        let temp = assert_fs::TempDir::new().unwrap();
        for n in 1..=3 {
            temp.child(format!("chapters/chapter-{n}.md"))
                .write_str(&format!("chapter {n}"))
                .unwrap();
        }
        let config = sample_config(temp.path());
        let client = ScriptedClient::answering(&["inserted"]);
        let prompts = PromptEngine::new().unwrap();
        let mut session = session(&client, &prompts, &temp);

        let generated = ContentGenerator::new(&config)
            .insert_chapter(&mut session, 2, "A flashback.")
            .unwrap();

        assert_eq!(generated.mode, GenerationMode::New);
        temp.child("chapters/chapter-1.md").assert("chapter 1");
        temp.child("chapters/chapter-2.md").assert("inserted");
        temp.child("chapters/chapter-3.md").assert("chapter 2");
        temp.child("chapters/chapter-4.md").assert("chapter 3");
    }

    #[test]
    fn test_insert_chapter_model_failure_keeps_numbering() {
        let temp = assert_fs::TempDir::new().unwrap();
        for n in 1..=3 {
            temp.child(format!("chapters/chapter-{n}.md"))
                .write_str(&format!("chapter {n}"))
                .unwrap();
        }
        let config = sample_config(temp.path());
        let client = ScriptedClient::answering(&[]);
        let prompts = PromptEngine::new().unwrap();
        let mut session = session(&client, &prompts, &temp);

        let err = ContentGenerator::new(&config)
            .insert_chapter(&mut session, 2, "A flashback.")
            .unwrap_err();

        assert!(err.is_upstream());
        for n in 1..=3 {
            temp.child(format!("chapters/chapter-{n}.md"))
                .assert(format!("chapter {n}").as_str());
        }
        assert!(!temp.child("chapters/chapter-4.md").exists());
        assert_eq!(*client.refreshes.borrow(), 0);
    }

    #[test]
    fn test_insert_chapter_prompt_has_no_attachment() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("chapters/chapter-1.md").write_str("chapter 1").unwrap();
        let config = sample_config(temp.path());
        let client = ScriptedClient::answering(&["new opening"]);
        let prompts = PromptEngine::new().unwrap();
        let mut session = session(&client, &prompts, &temp);

        ContentGenerator::new(&config)
            .insert_chapter(&mut session, 1, "A prologue-like opening.")
            .unwrap();

        assert!(client.prompts()[0].contains("Write chapter 1"));
        assert!(!client.prompts()[0].contains("Current content of"));
        temp.child("chapters/chapter-1.md").assert("new opening");
        temp.child("chapters/chapter-2.md").assert("chapter 1");
        assert!(!temp.child("chapters/chapter-1.md.bak").exists());
    }

    #[test]
    fn test_insert_chapter_past_the_end_is_rejected() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("chapters/chapter-1.md").write_str("one").unwrap();
        let config = sample_config(temp.path());
        let client = ScriptedClient::answering(&["unused"]);
        let prompts = PromptEngine::new().unwrap();
        let mut session = session(&client, &prompts, &temp);

        let err = ContentGenerator::new(&config)
            .insert_chapter(&mut session, 5, "Too far.")
            .unwrap_err();

        assert!(err.is_validation());
        assert!(client.prompts().is_empty());
    }
}
