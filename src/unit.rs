//! Content units and their on-disk names.

use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// Directory holding chapters, covers and the epilogue.
pub const CHAPTERS_DIR: &str = "chapters";

/// Kind of a generated piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// A numbered chapter
    Chapter,
    /// Front cover text
    Cover,
    /// Back cover text
    BackCover,
    /// Closing chapter after all numbered chapters
    Epilogue,
    /// Overall plot outline
    GeneralOutline,
    /// Character profiles
    CharacterSummary,
    /// Key plot points
    PlotPoints,
    /// Per-chapter synopsis
    ChapterSynopsis,
    /// Worldbuilding: geography
    Geography,
    /// Worldbuilding: history
    History,
    /// Worldbuilding: culture
    Culture,
    /// Worldbuilding: magic or science system
    MagicSystem,
    /// Worldbuilding: technology
    Technology,
    /// Paper: research question
    CoreQuestion,
    /// Paper: main contribution
    Contribution,
    /// Paper: literature organization
    LiteratureSummary,
    /// Paper: section outline
    PaperOutline,
    /// Paper: analysis section
    Analysis,
    /// Paper: abstract
    Abstract,
}

impl UnitKind {
    /// Returns every kind.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Chapter,
            Self::Cover,
            Self::BackCover,
            Self::Epilogue,
            Self::GeneralOutline,
            Self::CharacterSummary,
            Self::PlotPoints,
            Self::ChapterSynopsis,
            Self::Geography,
            Self::History,
            Self::Culture,
            Self::MagicSystem,
            Self::Technology,
            Self::CoreQuestion,
            Self::Contribution,
            Self::LiteratureSummary,
            Self::PaperOutline,
            Self::Analysis,
            Self::Abstract,
        ]
    }

    /// Returns the identifier used in template names and log lines.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Chapter => "chapter",
            Self::Cover => "cover",
            Self::BackCover => "back_cover",
            Self::Epilogue => "epilogue",
            Self::GeneralOutline => "general_outline",
            Self::CharacterSummary => "character_summary",
            Self::PlotPoints => "plot_points",
            Self::ChapterSynopsis => "chapter_synopsis",
            Self::Geography => "geography",
            Self::History => "history",
            Self::Culture => "culture",
            Self::MagicSystem => "magic_system",
            Self::Technology => "technology",
            Self::CoreQuestion => "core_question",
            Self::Contribution => "contribution",
            Self::LiteratureSummary => "literature_summary",
            Self::PaperOutline => "paper_outline",
            Self::Analysis => "analysis",
            Self::Abstract => "abstract",
        }
    }

    /// Directory (relative to the project root) holding this kind.
    #[must_use]
    pub const fn directory(self) -> &'static str {
        match self {
            Self::Chapter | Self::Cover | Self::BackCover | Self::Epilogue => CHAPTERS_DIR,
            Self::GeneralOutline
            | Self::CharacterSummary
            | Self::PlotPoints
            | Self::ChapterSynopsis
            | Self::PaperOutline => "outline",
            Self::Geography
            | Self::History
            | Self::Culture
            | Self::MagicSystem
            | Self::Technology => "worldbuilding",
            Self::LiteratureSummary => "research",
            Self::CoreQuestion | Self::Contribution | Self::Analysis | Self::Abstract => {
                "sections"
            }
        }
    }

    /// Whether units of this kind carry an index.
    #[must_use]
    pub const fn is_indexed(self) -> bool {
        matches!(self, Self::Chapter)
    }

    /// Whether this kind always uses one template regardless of existence.
    ///
    /// Covers are rewritten from the book metadata every time.
    #[must_use]
    pub const fn is_single_template(self) -> bool {
        matches!(self, Self::Cover | Self::BackCover)
    }

    /// Human readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Chapter => "chapter",
            Self::Cover => "cover",
            Self::BackCover => "back cover",
            Self::Epilogue => "epilogue",
            Self::GeneralOutline => "general outline",
            Self::CharacterSummary => "character summary",
            Self::PlotPoints => "plot points",
            Self::ChapterSynopsis => "chapter synopsis",
            Self::Geography => "geography",
            Self::History => "history",
            Self::Culture => "culture",
            Self::MagicSystem => "magic system",
            Self::Technology => "technology",
            Self::CoreQuestion => "core research question",
            Self::Contribution => "contribution",
            Self::LiteratureSummary => "literature summary",
            Self::PaperOutline => "paper outline",
            Self::Analysis => "analysis",
            Self::Abstract => "abstract",
        }
    }

    fn file_stem(self) -> &'static str {
        match self {
            Self::Cover => "cover",
            Self::BackCover => "back-cover",
            Self::Epilogue => "epilogue",
            other => other.id(),
        }
    }
}

/// A named or indexed piece of output owned by one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentUnit {
    kind: UnitKind,
    index: Option<u32>,
}

impl ContentUnit {
    /// Creates a unit, checking that the index matches the kind.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a chapter has no positive index or a
    /// non-chapter kind is given one.
    pub fn new(kind: UnitKind, index: Option<u32>) -> Result<Self> {
        match (kind.is_indexed(), index) {
            (true, Some(0)) => Err(Error::validation("Chapter numbers start at 1")),
            (true, None) => Err(Error::validation(format!(
                "A {} requires a number",
                kind.label()
            ))),
            (false, Some(n)) => Err(Error::validation(format!(
                "A {} does not take a number (got {n})",
                kind.label()
            ))),
            _ => Ok(Self { kind, index }),
        }
    }

    /// Shorthand for `chapter-N`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for chapter 0.
    pub fn chapter(number: u32) -> Result<Self> {
        Self::new(UnitKind::Chapter, Some(number))
    }

    /// Shorthand for a unit without index.
    ///
    /// # Errors
    ///
    /// Returns a validation error for chapters.
    pub fn named(kind: UnitKind) -> Result<Self> {
        Self::new(kind, None)
    }

    /// The unit kind.
    #[must_use]
    pub const fn kind(&self) -> UnitKind {
        self.kind
    }

    /// The chapter number, if any.
    #[must_use]
    pub const fn index(&self) -> Option<u32> {
        self.index
    }

    /// The stable file name of this unit.
    #[must_use]
    pub fn file_name(&self) -> String {
        match self.index {
            Some(n) => format!("{}-{n}.md", self.kind.file_stem()),
            None => format!("{}.md", self.kind.file_stem()),
        }
    }

    /// Path of the unit relative to the project root.
    #[must_use]
    pub fn relative_path(&self) -> PathBuf {
        Path::new(self.kind.directory()).join(self.file_name())
    }

    /// Absolute path of the unit inside `project`.
    #[must_use]
    pub fn path(&self, project: &Path) -> PathBuf {
        project.join(self.relative_path())
    }
}

impl fmt::Display for ContentUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(n) => write!(f, "{} {n}", self.kind.label()),
            None => f.write_str(self.kind.label()),
        }
    }
}
