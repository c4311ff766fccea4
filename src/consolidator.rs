//! Assembles the chapter fragments into a single book file.

use crate::{
    config::RunOptions,
    error::{Error, Result},
    llm::ModelClient,
    progress::Progress,
    prompt::PromptEngine,
    session::Session,
    store,
};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Directory under the project root receiving the consolidated book.
pub const BOOK_DIR: &str = "book";

/// Marker written after every fragment.
pub const PAGE_BREAK: &str = "\n\\newpage\n";

/// Total reported for a translation run regardless of fragment count.
const TRANSLATION_STEPS: u64 = 50;

/// Path of the consolidated book for `language`.
#[must_use]
pub fn book_path(project: &Path, language: &str) -> PathBuf {
    project.join(BOOK_DIR).join(format!("book-{language}.md"))
}

fn check_language(language: &str) -> Result<()> {
    let plain = !language.is_empty()
        && language
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_');
    if plain {
        Ok(())
    } else {
        Err(Error::validation(format!("Invalid language name: '{language}'")))
    }
}

/// Concatenates fragments, optionally translating each one first.
pub struct Consolidator<'a> {
    client: &'a dyn ModelClient,
    prompts: &'a PromptEngine,
    options: RunOptions,
}

impl<'a> Consolidator<'a> {
    /// Creates a consolidator using `client` for translations.
    #[must_use]
    pub const fn new(
        client: &'a dyn ModelClient,
        prompts: &'a PromptEngine,
        options: RunOptions,
    ) -> Self {
        Self {
            client,
            prompts,
            options,
        }
    }

    /// Writes `book/book-<lang>.md` from the project's fragments.
    ///
    /// `<lang>` is `target_language` when given, otherwise
    /// `primary_language`. Translations share one conversation so terms stay
    /// consistent across fragments. The book is assembled in a temporary file
    /// and only replaces the previous one when every fragment succeeded.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the output language is not a plain name
    /// or the target equals the primary language. Returns an error if a
    /// fragment cannot be read, a translation fails or the output cannot be
    /// written. No partial book is left behind.
    #[instrument(skip(self, progress))]
    pub fn consolidate(
        &self,
        project: &Path,
        primary_language: &str,
        target_language: Option<&str>,
        progress: &mut dyn Progress,
    ) -> Result<PathBuf> {
        let language = target_language.unwrap_or(primary_language);
        check_language(language)?;
        if target_language == Some(primary_language) {
            return Err(Error::validation(format!(
                "Cannot translate to {language}: it is the primary language"
            )));
        }

        let fragments = store::list_fragments(project)?;
        if fragments.is_empty() {
            warn!("No chapters found in {}", project.display());
        }

        let output = book_path(project, language);
        let parent = output.parent().unwrap_or(project);
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;

        let pending = output.with_extension("md.tmp");
        let result = self.assemble(
            project,
            &fragments,
            &pending,
            primary_language,
            target_language,
            progress,
        );

        match result {
            Ok(()) => {
                fs::rename(&pending, &output).map_err(|e| Error::io(&output, e))?;
                info!("✓ Book saved to {}", output.display());
                Ok(output)
            }
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&pending) {
                    debug!("Could not remove {}: {cleanup}", pending.display());
                }
                Err(e)
            }
        }
    }

    fn assemble(
        &self,
        project: &Path,
        fragments: &[PathBuf],
        pending: &Path,
        primary_language: &str,
        target_language: Option<&str>,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        let file = File::create(pending).map_err(|e| Error::io(pending, e))?;
        let mut writer = BufWriter::new(file);

        let chapters = progress.add_task("Consolidating chapters", fragments.len() as u64);
        let mut translation = match target_language {
            Some(target) => {
                let task = progress.add_task(
                    &format!("Translating to {target}"),
                    TRANSLATION_STEPS,
                );
                let session =
                    Session::open(self.client, self.prompts, project, self.options)?;
                Some((target, task, session))
            }
            None => None,
        };

        let count = fragments.len() as u64;
        for (i, path) in fragments.iter().enumerate() {
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            progress.set_description(chapters, &format!("Processing {name}"));

            let mut content = store::read(path)?;
            if let Some((target, task, session)) = translation.as_mut() {
                let prompt = self
                    .prompts
                    .render_translation(&content, primary_language, *target)?;
                content = session.ask_single(&prompt, None)?;
                let i = i as u64;
                let step =
                    TRANSLATION_STEPS * (i + 1) / count - TRANSLATION_STEPS * i / count;
                progress.advance(*task, step);
            }

            writer
                .write_all(content.as_bytes())
                .and_then(|()| writer.write_all(PAGE_BREAK.as_bytes()))
                .map_err(|e| Error::io(pending, e))?;
            progress.advance(chapters, 1);
        }

        writer.flush().map_err(|e| Error::io(pending, e))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| Error::io(pending, e))?;

        progress.finish(chapters, "Chapters consolidated");
        if let Some((target, task, _)) = translation {
            progress.finish(task, &format!("Translated to {target}"));
        }
        Ok(())
    }
}
