use anyhow::{Context, bail};
use clap::{Args, CommandFactory, FromArgMatches, Parser, Subcommand};
use std::path::PathBuf;
use storycraftr::{
    Chat, CliVariant, CommandRegistry, ContentGenerator, Conversation, DEFAULT_AUTHOR,
    DEFAULT_GENRE, DEFAULT_LICENSE, DEFAULT_OPENAI_MODEL, DEFAULT_OPENAI_URL,
    DEFAULT_REFERENCE_AUTHOR, InitOptions, OpenAiClient, ProjectConfig, PromptEngine,
    RunOptions, Session, init_project, load_api_key, parse_languages, publish,
};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    version,
    author,
    about = "Write books and papers with a chat-completion model",
    long_about = "Draft and refine books or academic papers stored as Markdown files.\n\n\
    Run as `storycraftr` for books and as `papercraftr` for papers.\n\n\
    USAGE EXAMPLES:\n  \
      # Create a project\n  \
      storycraftr init my-book --behavior behavior.txt --genre \"science fiction\"\n\n  \
      # Write chapter 1\n  \
      storycraftr story chapters chapter 1 \"Open with a storm at sea\" --book-path my-book\n\n  \
      # Consolidate and translate\n  \
      storycraftr publish --translate es --book-path my-book"
)]
struct Cli {
    /// Log every composed prompt in full
    #[arg(long, global = true)]
    debug: bool,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// API key for the chat-completion endpoint
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the project structure and configuration
    Init(InitArgs),

    /// Read the project files the model sees and report their size
    ReloadFiles(ProjectArgs),

    /// Chat about the project; `!module command ...` runs commands
    Chat(ProjectArgs),

    /// Consolidate the chapters into book/book-<lang>.md
    Publish {
        #[command(flatten)]
        project: ProjectArgs,

        /// Translate every chapter to this language
        #[arg(long, value_name = "LANG")]
        translate: Option<String>,
    },

    /// Book commands: outline, worldbuilding, chapters, iterate
    Story(GroupArgs),

    /// Paper commands: define, organize-lit, outline, analyze, finalize
    Paper(GroupArgs),
}

#[derive(Args, Debug)]
struct ProjectArgs {
    /// Project directory (defaults to the current directory)
    #[arg(long, value_name = "PATH")]
    book_path: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct GroupArgs {
    #[command(flatten)]
    project: ProjectArgs,

    /// Command group, e.g. `chapters`
    module: String,

    /// Command within the group, e.g. `chapter`
    command: String,

    /// Arguments: a chapter number where needed, then the instruction
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(Args, Debug)]
struct InitArgs {
    /// Directory of the new project
    project_path: PathBuf,

    /// Path to the behavior file used as system prompt
    #[arg(long, value_name = "FILE")]
    behavior: PathBuf,

    /// Primary language of the project
    #[arg(long, default_value = "en")]
    primary_language: String,

    /// Comma-separated list of alternate languages (storycraftr only)
    #[arg(long, default_value = "")]
    alternate_languages: String,

    /// Default author name
    #[arg(long, default_value = DEFAULT_AUTHOR)]
    author: String,

    /// Genre of the book (storycraftr only)
    #[arg(long, default_value = DEFAULT_GENRE)]
    genre: String,

    /// License type (storycraftr only)
    #[arg(long, default_value = DEFAULT_LICENSE)]
    license: String,

    /// Reference author for style (storycraftr only)
    #[arg(long, default_value = DEFAULT_REFERENCE_AUTHOR)]
    reference_author: String,

    /// Keywords for the paper (papercraftr only)
    #[arg(long)]
    keywords: Option<String>,

    /// URL of the chat-completion API
    #[arg(long, default_value = DEFAULT_OPENAI_URL)]
    openai_url: String,

    /// Model to use
    #[arg(long, default_value = DEFAULT_OPENAI_MODEL)]
    openai_model: String,

    /// Request long answers in several parts
    #[arg(long)]
    multiple_answer: bool,
}

impl From<InitArgs> for InitOptions {
    fn from(args: InitArgs) -> Self {
        Self {
            behavior: args.behavior,
            primary_language: args.primary_language,
            alternate_languages: parse_languages(&args.alternate_languages),
            author: args.author,
            genre: args.genre,
            license: args.license,
            reference_author: args.reference_author,
            keywords: args.keywords,
            openai_url: args.openai_url,
            openai_model: args.openai_model,
            multiple_answer: args.multiple_answer,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let program = std::env::args().next().unwrap_or_default();
    let variant = CliVariant::detect(&program);

    let matches = Cli::command()
        .name(variant.name())
        .bin_name(variant.name())
        .get_matches();
    let cli = Cli::from_arg_matches(&matches)?;

    setup_tracing(cli.verbose)?;
    let options = RunOptions { debug: cli.debug };
    if options.debug {
        info!("Debug mode is ON");
    }

    match cli.command {
        Command::Init(args) => {
            let project = args.project_path.clone();
            init_project(&project, variant, &args.into())
                .with_context(|| format!("Failed to initialize {}", project.display()))?;
        }
        Command::ReloadFiles(args) => {
            let (root, _) = open_project(&args, variant)?;
            let loaded = Conversation::for_project(&root)?
                .load_project_files(&root)
                .context("Failed to reload project files")?;
            println!(
                "Loaded {} project files ({} characters){}",
                loaded.files,
                loaded.chars,
                if loaded.truncated { ", truncated" } else { "" }
            );
        }
        Command::Chat(args) => {
            let (root, config) = open_project(&args, variant)?;
            let registry = CommandRegistry::for_variant(config.variant()?)?;
            let client = model_client(&config, cli.api_key.as_deref())?;
            let prompts = PromptEngine::for_project(&root)?;
            let mut session = Session::for_config(&client, &prompts, &root, &config, options)?;
            session.refresh()?;
            Chat::new(&mut session, &registry, &config).run()?;
        }
        Command::Publish { project, translate } => {
            let (root, config) = open_project(&project, variant)?;
            let client = model_client(&config, cli.api_key.as_deref())?;
            let book = publish(&client, &root, &config, translate.as_deref(), options)
                .context("Consolidation failed")?;
            println!("Book saved to {}", book.display());
        }
        Command::Story(args) => run_group(
            CliVariant::Storycraftr,
            variant,
            &args,
            cli.api_key.as_deref(),
            options,
        )?,
        Command::Paper(args) => run_group(
            CliVariant::Papercraftr,
            variant,
            &args,
            cli.api_key.as_deref(),
            options,
        )?,
    }

    Ok(())
}

fn run_group(
    group: CliVariant,
    variant: CliVariant,
    args: &GroupArgs,
    api_key: Option<&str>,
    options: RunOptions,
) -> anyhow::Result<()> {
    if group != variant {
        bail!(
            "These commands belong to {}; run them with that executable",
            group.name()
        );
    }

    let (root, config) = open_project(&args.project, variant)?;
    let registry = CommandRegistry::for_variant(group)?;
    let operation = registry.resolve(&args.module, &args.command, &args.args)?;

    let client = model_client(&config, api_key)?;
    let prompts = PromptEngine::for_project(&root)?;
    let mut session = Session::for_config(&client, &prompts, &root, &config, options)?;
    session.refresh()?;

    operation
        .run(&ContentGenerator::new(&config), &mut session)
        .with_context(|| format!("'{} {}' failed", args.module, args.command))?
        .print_summary();
    Ok(())
}

fn open_project(args: &ProjectArgs, variant: CliVariant) -> anyhow::Result<(PathBuf, ProjectConfig)> {
    let root = match &args.book_path {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("Cannot determine the current directory")?,
    };

    let Some(config) = ProjectConfig::try_load(&root) else {
        bail!(
            "Project not initialized at {}. Run '{} init {}' first.",
            root.display(),
            variant.name(),
            root.display()
        );
    };
    if config.variant()? != variant {
        warn!(
            "{} was created by {}, running as {}",
            root.display(),
            config.cli_name,
            variant.name()
        );
    }
    Ok((root, config))
}

fn model_client(config: &ProjectConfig, api_key: Option<&str>) -> anyhow::Result<OpenAiClient> {
    let key = match api_key {
        Some(key) if !key.trim().is_empty() => key.trim().to_string(),
        _ => load_api_key()?,
    };
    OpenAiClient::from_config(config, &key).context("Failed to create the model client")
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::new(format!("storycraftr={level},papercraftr={level}"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();

    Ok(())
}
