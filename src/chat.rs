//! Interactive chat with the model about the current project.

use crate::{
    config::ProjectConfig,
    error::{Error, Result},
    generator::ContentGenerator,
    registry::CommandRegistry,
    session::Session,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{debug, warn};

const EXIT: &str = "exit()";
const HELP: &str = "help()";
const COMMAND_PREFIX: char = '!';

/// Result of handling one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Text to show the user
    Text(String),
    /// The user asked to leave
    Quit,
}

/// One chat session: free text goes to the model, `!module command ...`
/// lines run registered commands.
pub struct Chat<'s, 'a> {
    session: &'s mut Session<'a>,
    registry: &'s CommandRegistry,
    generator: ContentGenerator<'s>,
}

impl<'s, 'a> Chat<'s, 'a> {
    /// Creates a chat over an open session.
    pub fn new(
        session: &'s mut Session<'a>,
        registry: &'s CommandRegistry,
        config: &'s ProjectConfig,
    ) -> Self {
        Self {
            session,
            registry,
            generator: ContentGenerator::new(config),
        }
    }

    /// Runs the read-eval-print loop until `exit()` or end of input.
    ///
    /// Errors from individual lines are printed and the loop continues.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal cannot be read.
    pub fn run(&mut self) -> Result<()> {
        println!("Chat about {}.", self.session.project().display());
        println!("Type {HELP} for commands, {EXIT} to quit.");

        let mut editor = DefaultEditor::new()
            .map_err(|e| Error::config(format!("Failed to initialize readline: {e}")))?;

        loop {
            match editor.readline("> ") {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }
                    if let Err(e) = editor.add_history_entry(input) {
                        debug!("History not updated: {e}");
                    }

                    match self.handle_line(input) {
                        Ok(Reply::Text(text)) => println!("{text}\n"),
                        Ok(Reply::Quit) => break,
                        Err(e) => {
                            warn!("{e}");
                            eprintln!("Error: {e}");
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    return Err(Error::config(format!("Readline error: {err}")));
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    /// Handles one trimmed, non-empty input line.
    ///
    /// # Errors
    ///
    /// Returns an error if the command or the model call fails.
    pub fn handle_line(&mut self, input: &str) -> Result<Reply> {
        match input {
            EXIT => return Ok(Reply::Quit),
            HELP => return Ok(Reply::Text(self.registry.help())),
            _ => {}
        }

        if let Some(command) = input.strip_prefix(COMMAND_PREFIX) {
            return self.run_command(command);
        }

        let prompt = self.session.prompts().render_chat(input)?;
        self.session.ask_single(&prompt, None).map(Reply::Text)
    }

    fn run_command(&mut self, line: &str) -> Result<Reply> {
        let words = split_words(line)?;
        let [module, command, args @ ..] = words.as_slice() else {
            return Err(Error::validation(format!(
                "Commands look like {COMMAND_PREFIX}module command [args...]"
            )));
        };

        let operation = self.registry.resolve(module, command, args)?;
        let generated = operation.run(&self.generator, self.session)?;
        Ok(Reply::Text(format!(
            "{}\n\n(saved to {})",
            generated.content,
            generated.path.display()
        )))
    }
}

/// Splits a command line into words, honoring single and double quotes and
/// backslash escapes outside single quotes.
///
/// # Errors
///
/// Returns a validation error for an unterminated quote or a trailing escape.
pub fn split_words(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some('\''), '\'') | (Some('"'), '"') => quote = None,
            (Some('\''), _) => current.push(c),
            (_, '\\') => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| Error::validation("Trailing backslash in command"))?;
                current.push(escaped);
                in_word = true;
            }
            (Some(_), _) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, _) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(Error::validation(format!("Unterminated {q} quote in command")));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use crate::config::{CliVariant, RunOptions};
    use crate::llm::tests::ScriptedClient;
    use crate::prompt::PromptEngine;
    use assert_fs::prelude::*;

    #[test]
    fn test_split_words_plain_and_quoted() {
        assert_eq!(
            split_words(r#"chapters chapter 2 "A storm at sea""#).unwrap(),
            ["chapters", "chapter", "2", "A storm at sea"]
        );
        assert_eq!(
            split_words("outline plot-points 'it''s' done").unwrap(),
            ["outline", "plot-points", "its", "done"]
        );
        assert_eq!(
            split_words(r#"  say \"hi\"  "" "#).unwrap(),
            ["say", "\"hi\"", ""]
        );
    }

    #[test]
    fn test_split_words_errors() {
        assert!(split_words("chapter 'open").unwrap_err().is_validation());
        assert!(split_words("chapter \\").unwrap_err().is_validation());
    }

    #[test]
    fn test_free_text_goes_to_model() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = sample_config(temp.path());
        let client = ScriptedClient::answering(&["She is brave."]);
        let prompts = PromptEngine::new().unwrap();
        let registry = CommandRegistry::for_variant(CliVariant::Storycraftr).unwrap();
        let mut session =
            Session::open(&client, &prompts, temp.path(), RunOptions::default()).unwrap();
        let mut chat = Chat::new(&mut session, &registry, &config);

        let reply = chat.handle_line("Who is the heroine?").unwrap();
        assert_eq!(reply, Reply::Text("She is brave.".to_string()));
        assert!(client.prompts()[0].contains("formatted as Markdown: Who is the heroine?"));
    }

    #[test]
    fn test_command_line_runs_generation() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = sample_config(temp.path());
        let client = ScriptedClient::answering(&["Mountains everywhere."]);
        let prompts = PromptEngine::new().unwrap();
        let registry = CommandRegistry::for_variant(CliVariant::Storycraftr).unwrap();
        let mut session =
            Session::open(&client, &prompts, temp.path(), RunOptions::default()).unwrap();
        let mut chat = Chat::new(&mut session, &registry, &config);

        let reply = chat
            .handle_line(r#"!worldbuilding geography "Describe the north""#)
            .unwrap();
        let Reply::Text(text) = reply else {
            panic!("expected text");
        };
        assert!(text.starts_with("Mountains everywhere."));
        temp.child("worldbuilding/geography.md")
            .assert("Mountains everywhere.");
    }

    #[test]
    fn test_unknown_and_malformed_commands() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = sample_config(temp.path());
        let client = ScriptedClient::answering(&[]);
        let prompts = PromptEngine::new().unwrap();
        let registry = CommandRegistry::for_variant(CliVariant::Storycraftr).unwrap();
        let mut session =
            Session::open(&client, &prompts, temp.path(), RunOptions::default()).unwrap();
        let mut chat = Chat::new(&mut session, &registry, &config);

        let err = chat.handle_line("!outline soundtrack x").unwrap_err();
        assert!(matches!(err, Error::UnknownCommand { .. }));
        assert!(chat.handle_line("!outline").unwrap_err().is_validation());
        assert!(client.prompts().is_empty());
    }

    #[test]
    fn test_exit_and_help() {
        let temp = assert_fs::TempDir::new().unwrap();
        let config = sample_config(temp.path());
        let client = ScriptedClient::answering(&[]);
        let prompts = PromptEngine::new().unwrap();
        let registry = CommandRegistry::for_variant(CliVariant::Papercraftr).unwrap();
        let mut session =
            Session::open(&client, &prompts, temp.path(), RunOptions::default()).unwrap();
        let mut chat = Chat::new(&mut session, &registry, &config);

        assert_eq!(chat.handle_line("exit()").unwrap(), Reply::Quit);
        let Reply::Text(help) = chat.handle_line("help()").unwrap() else {
            panic!("expected help text");
        };
        assert!(help.contains("!define core-question"));
    }
}
