use crate::{
    config::ProjectConfig,
    error::{Error, Result},
    template_validator::TemplateValidator,
    unit::{ContentUnit, UnitKind},
};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tera::{Context, Tera};
use tracing::{debug, info};

/// Directory under the project root with prompt overrides (`<name>.tera`).
pub const OVERRIDES_DIR: &str = "prompts";

const TRANSLATE: &str = "translate";
const CHAT: &str = "chat";
const MULTIPART: &str = "multipart";
const CONTINUE: &str = "continue";

macro_rules! builtin_templates {
    ($($name:literal),* $(,)?) => {
        &[$(($name, include_str!(concat!("../templates/", $name, ".tera")))),*]
    };
}

static BUILTIN_TEMPLATES: &[(&str, &str)] = builtin_templates![
    "chapter_new", "chapter_refine",
    "cover", "back_cover",
    "epilogue_new", "epilogue_refine",
    "general_outline_new", "general_outline_refine",
    "character_summary_new", "character_summary_refine",
    "plot_points_new", "plot_points_refine",
    "chapter_synopsis_new", "chapter_synopsis_refine",
    "geography_new", "geography_refine",
    "history_new", "history_refine",
    "culture_new", "culture_refine",
    "magic_system_new", "magic_system_refine",
    "technology_new", "technology_refine",
    "core_question_new", "core_question_refine",
    "contribution_new", "contribution_refine",
    "literature_summary_new", "literature_summary_refine",
    "paper_outline_new", "paper_outline_refine",
    "analysis_new", "analysis_refine",
    "abstract_new", "abstract_refine",
    "translate", "chat", "multipart", "continue",
];

/// Whether a unit is generated from scratch or rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// The target file does not exist yet
    New,
    /// The target file exists and is rewritten
    Refine,
}

impl GenerationMode {
    /// Picks the mode from the existence of the target file.
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        if path.exists() { Self::Refine } else { Self::New }
    }

    const fn suffix(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Refine => "refine",
        }
    }
}

#[derive(Serialize)]
struct UnitContext<'a> {
    prompt: &'a str,
    language: &'a str,
    book_name: &'a str,
    title: &'a str,
    author: &'a str,
    genre: &'a str,
    license: &'a str,
    reference_author: &'a str,
    keywords: &'a str,
    alternate_languages: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<u32>,
}

/// Renders prompts from the built-in templates and project overrides.
pub struct PromptEngine {
    tera: Tera,
}

impl PromptEngine {
    /// Creates an engine with the built-in templates only.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in template fails to compile.
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        Self::register_builtin_templates(&mut tera)?;
        Ok(Self { tera })
    }

    /// Creates an engine and applies the overrides found in `project/prompts`.
    ///
    /// # Errors
    ///
    /// Returns an error if an override is invalid.
    pub fn for_project(project: &Path) -> Result<Self> {
        let mut engine = Self::new()?;
        engine.load_overrides(&project.join(OVERRIDES_DIR))?;
        Ok(engine)
    }

    fn register_builtin_templates(tera: &mut Tera) -> Result<()> {
        for (name, source) in BUILTIN_TEMPLATES {
            tera.add_raw_template(name, source)
                .map_err(|e| Error::template(*name, &e))?;
        }
        Ok(())
    }

    fn load_overrides(&mut self, dir: &Path) -> Result<()> {
        if !dir.is_dir() {
            return Ok(());
        }

        let entries = fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| Error::io(dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("tera") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !self.has_template(name) {
                debug!("Ignoring prompt override without built-in counterpart: {name}");
                continue;
            }

            let source = TemplateValidator::validate_template(&path)?;
            self.tera
                .add_raw_template(name, &source)
                .map_err(|e| Error::template(name, &e))?;
            info!("Using prompt override {}", path.display());
        }
        Ok(())
    }

    /// Returns true if a template with this name is registered.
    #[must_use]
    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    /// Name of the template used for `kind` in `mode`.
    #[must_use]
    pub fn template_name(kind: UnitKind, mode: GenerationMode) -> String {
        if kind.is_single_template() {
            kind.id().to_string()
        } else {
            format!("{}_{}", kind.id(), mode.suffix())
        }
    }

    /// Renders the prompt for generating `unit`.
    ///
    /// # Errors
    ///
    /// Returns a template error if rendering fails.
    pub fn render_unit(
        &self,
        unit: &ContentUnit,
        mode: GenerationMode,
        instruction: &str,
        config: &ProjectConfig,
    ) -> Result<String> {
        let ctx = UnitContext {
            prompt: instruction,
            language: &config.primary_language,
            book_name: &config.book_name,
            title: &config.book_name,
            author: &config.default_author,
            genre: &config.genre,
            license: &config.license,
            reference_author: &config.reference_author,
            keywords: &config.keywords,
            alternate_languages: config.alternate_languages_joined(),
            index: unit.index(),
        };
        self.render(&Self::template_name(unit.kind(), mode), &ctx)
    }

    /// Renders the translation prompt for one fragment.
    ///
    /// # Errors
    ///
    /// Returns a template error if rendering fails.
    pub fn render_translation(
        &self,
        content: &str,
        language: &str,
        target_language: &str,
    ) -> Result<String> {
        #[derive(Serialize)]
        struct TranslateContext<'a> {
            content: &'a str,
            language: &'a str,
            target_language: &'a str,
        }

        self.render(
            TRANSLATE,
            &TranslateContext {
                content,
                language,
                target_language,
            },
        )
    }

    /// Renders a free-form chat message.
    ///
    /// # Errors
    ///
    /// Returns a template error if rendering fails.
    pub fn render_chat(&self, prompt: &str) -> Result<String> {
        #[derive(Serialize)]
        struct ChatContext<'a> {
            prompt: &'a str,
        }

        self.render(CHAT, &ChatContext { prompt })
    }

    /// Renders the opening message of a multi-part answer.
    ///
    /// # Errors
    ///
    /// Returns a template error if rendering fails.
    pub fn render_multipart(&self, prompt: &str, parts: usize) -> Result<String> {
        #[derive(Serialize)]
        struct MultipartContext<'a> {
            prompt: &'a str,
            parts: usize,
        }

        self.render(MULTIPART, &MultipartContext { prompt, parts })
    }

    /// Renders the follow-up asking for the next part.
    ///
    /// # Errors
    ///
    /// Returns a template error if rendering fails.
    pub fn render_continuation(&self, part: usize, parts: usize) -> Result<String> {
        #[derive(Serialize)]
        struct ContinueContext {
            part: usize,
            parts: usize,
        }

        self.render(CONTINUE, &ContinueContext { part, parts })
    }

    fn render(&self, name: &str, ctx: &impl Serialize) -> Result<String> {
        let context = Context::from_serialize(ctx).map_err(|e| Error::template(name, &e))?;
        let rendered = self
            .tera
            .render(name, &context)
            .map_err(|e| Error::template(name, &e))?;
        Ok(rendered.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use assert_fs::prelude::*;

    fn engine() -> PromptEngine {
        PromptEngine::new().unwrap()
    }

    #[test]
    fn test_every_kind_has_templates() {
        let engine = engine();
        for kind in UnitKind::all() {
            for mode in [GenerationMode::New, GenerationMode::Refine] {
                let name = PromptEngine::template_name(*kind, mode);
                assert!(engine.has_template(&name), "missing template {name}");
            }
        }
    }

    #[test]
    fn test_template_names() {
        assert_eq!(
            PromptEngine::template_name(UnitKind::Chapter, GenerationMode::New),
            "chapter_new"
        );
        assert_eq!(
            PromptEngine::template_name(UnitKind::Epilogue, GenerationMode::Refine),
            "epilogue_refine"
        );
        assert_eq!(
            PromptEngine::template_name(UnitKind::BackCover, GenerationMode::Refine),
            "back_cover"
        );
    }

    #[test]
    fn test_mode_for_path() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("chapter-1.md");
        assert_eq!(GenerationMode::for_path(file.path()), GenerationMode::New);

        file.touch().unwrap();
        assert_eq!(GenerationMode::for_path(file.path()), GenerationMode::Refine);
    }

    #[test]
    fn test_render_chapter() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = sample_config(temp.path());
        let unit = ContentUnit::chapter(4).unwrap();

        let prompt = engine()
            .render_unit(&unit, GenerationMode::New, "The heist goes wrong.", &config)
            .unwrap();

        assert!(prompt.contains("chapter 4"));
        assert!(prompt.contains("The heist goes wrong."));
        assert!(prompt.contains("written in en"));
    }

    #[test]
    fn test_render_back_cover_metadata() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = sample_config(temp.path());
        let unit = ContentUnit::named(UnitKind::BackCover).unwrap();

        let prompt = engine()
            .render_unit(&unit, GenerationMode::New, "Keep it short.", &config)
            .unwrap();

        assert!(prompt.contains("Title: my-book"));
        assert!(prompt.contains("Author: Ada Writer"));
        assert!(prompt.contains("Genre: science fiction"));
        assert!(prompt.contains("License: CC BY-NC-SA"));
        assert!(prompt.contains("Also available in: es, fr"));
    }

    #[test]
    fn test_render_translation() {
        let prompt = engine()
            .render_translation("# Capítulo", "es", "en")
            .unwrap();
        assert!(prompt.contains("from es to en"));
        assert!(prompt.ends_with("# Capítulo"));
    }

    #[test]
    fn test_override_replaces_builtin() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("prompts/chat.tera")
            .write_str("Reply tersely: {{ prompt }}")
            .unwrap();

        let engine = PromptEngine::for_project(temp.path()).unwrap();
        assert_eq!(engine.render_chat("hi").unwrap(), "Reply tersely: hi");
    }

    #[test]
    fn test_override_with_unknown_variable_fails_to_render() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("prompts/epilogue_new.tera")
            .write_str("{{ prompt }} in {{ language }} by {{ narrator }}")
            .unwrap();
        let config = sample_config(temp.path());
        let unit = ContentUnit::named(UnitKind::Epilogue).unwrap();

        let engine = PromptEngine::for_project(temp.path()).unwrap();
        let err = engine
            .render_unit(&unit, GenerationMode::New, "x", &config)
            .unwrap_err();
        assert!(err.is_template());
    }

    #[test]
    fn test_override_without_builtin_is_ignored() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("prompts/prologue_new.tera")
            .write_str("{{ prompt }}")
            .unwrap();

        let engine = PromptEngine::for_project(temp.path()).unwrap();
        assert!(!engine.has_template("prologue_new"));
    }
}
