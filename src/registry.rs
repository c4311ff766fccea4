//! Maps `module command` pairs to generation operations.
//!
//! The same table serves the command line and `!module command` lines typed
//! in chat, so both surfaces accept exactly the same commands.

use crate::{
    config::CliVariant,
    error::{Error, Result},
    generator::{ContentGenerator, Generated},
    session::Session,
    unit::{ContentUnit, UnitKind},
};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use tracing::debug;

/// What a command produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Generates or refines one unit of this kind
    Unit(UnitKind),
    /// Inserts a chapter and shifts the following ones
    InsertChapter,
}

/// One registered command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    /// Group name, e.g. `outline`
    pub module: &'static str,
    /// Command name within the group, e.g. `plot-points`
    pub command: &'static str,
    /// Operation the command maps to
    pub target: Target,
    /// One-line description for help output
    pub summary: &'static str,
}

const fn spec(
    module: &'static str,
    command: &'static str,
    target: Target,
    summary: &'static str,
) -> CommandSpec {
    CommandSpec {
        module,
        command,
        target,
        summary,
    }
}

const STORY_COMMANDS: &[CommandSpec] = &[
    spec("outline", "general-outline", Target::Unit(UnitKind::GeneralOutline), "Outline the whole book"),
    spec("outline", "character-summary", Target::Unit(UnitKind::CharacterSummary), "Describe the main characters"),
    spec("outline", "plot-points", Target::Unit(UnitKind::PlotPoints), "List the key plot points"),
    spec("outline", "chapter-synopsis", Target::Unit(UnitKind::ChapterSynopsis), "Summarize each chapter"),
    spec("worldbuilding", "geography", Target::Unit(UnitKind::Geography), "Describe the world's geography"),
    spec("worldbuilding", "history", Target::Unit(UnitKind::History), "Describe the world's history"),
    spec("worldbuilding", "culture", Target::Unit(UnitKind::Culture), "Describe cultures and customs"),
    spec("worldbuilding", "magic-system", Target::Unit(UnitKind::MagicSystem), "Describe the magic or science system"),
    spec("worldbuilding", "technology", Target::Unit(UnitKind::Technology), "Describe the available technology"),
    spec("chapters", "chapter", Target::Unit(UnitKind::Chapter), "Write or refine chapter N"),
    spec("chapters", "cover", Target::Unit(UnitKind::Cover), "Write the cover page"),
    spec("chapters", "back-cover", Target::Unit(UnitKind::BackCover), "Write the back cover"),
    spec("chapters", "epilogue", Target::Unit(UnitKind::Epilogue), "Write or refine the epilogue"),
    spec("iterate", "insert-chapter", Target::InsertChapter, "Insert a chapter at position N"),
];

const PAPER_COMMANDS: &[CommandSpec] = &[
    spec("define", "core-question", Target::Unit(UnitKind::CoreQuestion), "State the core research question"),
    spec("define", "contribution", Target::Unit(UnitKind::Contribution), "State the main contribution"),
    spec("organize-lit", "lit-summary", Target::Unit(UnitKind::LiteratureSummary), "Organize the related literature"),
    spec("outline", "outline-sections", Target::Unit(UnitKind::PaperOutline), "Outline the paper's sections"),
    spec("analyze", "data-analysis", Target::Unit(UnitKind::Analysis), "Write the analysis section"),
    spec("finalize", "abstract", Target::Unit(UnitKind::Abstract), "Write the abstract"),
];

/// A parsed command ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Generate or refine one unit
    Generate {
        /// Unit to produce
        unit: ContentUnit,
        /// Author instruction
        instruction: String,
    },
    /// Insert a new chapter
    InsertChapter {
        /// Number the new chapter takes
        position: u32,
        /// Author instruction
        instruction: String,
    },
}

impl Operation {
    /// Runs the operation.
    ///
    /// # Errors
    ///
    /// Returns any error of the underlying generation.
    pub fn run(
        &self,
        generator: &ContentGenerator<'_>,
        session: &mut Session<'_>,
    ) -> Result<Generated> {
        match self {
            Self::Generate { unit, instruction } => {
                generator.generate(session, *unit, instruction)
            }
            Self::InsertChapter {
                position,
                instruction,
            } => generator.insert_chapter(session, *position, instruction),
        }
    }
}

/// Lookup table of the commands available to one variant.
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<(String, String), CommandSpec>,
}

impl CommandRegistry {
    /// Builds the registry for a variant.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the built-in table is inconsistent.
    pub fn for_variant(variant: CliVariant) -> Result<Self> {
        let specs = match variant {
            CliVariant::Storycraftr => STORY_COMMANDS,
            CliVariant::Papercraftr => PAPER_COMMANDS,
        };
        let mut registry = Self::default();
        for spec in specs {
            registry.register(*spec)?;
        }
        debug!("Registered {} {} commands", registry.len(), variant.name());
        Ok(registry)
    }

    /// Adds a command.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a duplicate or malformed name.
    pub fn register(&mut self, spec: CommandSpec) -> Result<()> {
        for name in [spec.module, spec.command] {
            if name.is_empty() || name != normalize(name) {
                return Err(Error::config(format!(
                    "Invalid command name '{name}': use lowercase words joined by '-'"
                )));
            }
        }

        let key = (spec.module.to_string(), spec.command.to_string());
        if self.commands.contains_key(&key) {
            return Err(Error::config(format!(
                "Command '{} {}' is registered twice",
                spec.module, spec.command
            )));
        }
        self.commands.insert(key, spec);
        Ok(())
    }

    /// Number of registered commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if no command is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Registered module names, sorted and deduplicated.
    #[must_use]
    pub fn modules(&self) -> Vec<&'static str> {
        let mut modules: Vec<_> = self.commands.values().map(|s| s.module).collect();
        modules.dedup();
        modules
    }

    /// Looks up a command. Underscores are accepted in place of dashes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCommand`] if the pair is not registered.
    pub fn lookup(&self, module: &str, command: &str) -> Result<&CommandSpec> {
        self.commands
            .get(&(normalize(module), normalize(command)))
            .ok_or_else(|| Error::unknown_command(module, command))
    }

    /// Resolves a command and its arguments into an [`Operation`].
    ///
    /// Chapter commands take the number first; the remaining arguments are
    /// joined into the instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCommand`] for an unregistered pair and a
    /// validation error for missing or malformed arguments.
    pub fn resolve(&self, module: &str, command: &str, args: &[String]) -> Result<Operation> {
        let spec = self.lookup(module, command)?;
        let usage = || format!("{} {} {}", spec.module, spec.command, spec.usage());

        let numbered = matches!(
            spec.target,
            Target::InsertChapter | Target::Unit(UnitKind::Chapter)
        );
        let (number, rest) = if numbered {
            let (first, rest) = args
                .split_first()
                .ok_or_else(|| Error::validation(format!("Usage: {}", usage())))?;
            let number = first.parse::<u32>().map_err(|_| {
                Error::validation(format!(
                    "Expected a chapter number, got '{first}'. Usage: {}",
                    usage()
                ))
            })?;
            (Some(number), rest)
        } else {
            (None, args)
        };

        let instruction = rest.join(" ");
        if instruction.trim().is_empty() {
            return Err(Error::validation(format!(
                "Missing instruction. Usage: {}",
                usage()
            )));
        }

        match spec.target {
            Target::Unit(kind) => Ok(Operation::Generate {
                unit: ContentUnit::new(kind, number)?,
                instruction,
            }),
            Target::InsertChapter => {
                let position = number.unwrap_or_default();
                ContentUnit::chapter(position)?;
                Ok(Operation::InsertChapter {
                    position,
                    instruction,
                })
            }
        }
    }

    /// Help text listing every command.
    #[must_use]
    pub fn help(&self) -> String {
        let mut out = String::new();
        for module in self.modules() {
            let _ = writeln!(out, "{module}:");
            for spec in self.commands.values().filter(|s| s.module == module) {
                let _ = writeln!(
                    out,
                    "  !{} {} {:<24} {}",
                    spec.module,
                    spec.command,
                    spec.usage(),
                    spec.summary
                );
            }
        }
        out
    }
}

impl CommandSpec {
    /// Argument synopsis.
    #[must_use]
    pub const fn usage(&self) -> &'static str {
        match self.target {
            Target::InsertChapter | Target::Unit(UnitKind::Chapter) => "<number> <prompt>",
            Target::Unit(_) => "<prompt>",
        }
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase().replace('_', "-")
}
