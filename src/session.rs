use crate::{
    config::{ProjectConfig, RunOptions},
    error::Result,
    history::PromptLog,
    llm::{Conversation, ModelClient},
    prompt::PromptEngine,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Number of parts requested when a project asks for multi-part answers.
pub const ANSWER_PARTS: usize = 3;

/// A model client bound to one project conversation.
///
/// Every prompt goes through the prompt log before it reaches the client.
pub struct Session<'a> {
    client: &'a dyn ModelClient,
    prompts: &'a PromptEngine,
    conversation: Conversation,
    log: PromptLog,
    project: PathBuf,
    multiple_answer: bool,
    options: RunOptions,
}

impl<'a> Session<'a> {
    /// Opens a session for `project` with its behavior file loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the behavior file cannot be read.
    pub fn open(
        client: &'a dyn ModelClient,
        prompts: &'a PromptEngine,
        project: &Path,
        options: RunOptions,
    ) -> Result<Self> {
        Ok(Self {
            client,
            prompts,
            conversation: Conversation::for_project(project)?,
            log: PromptLog::for_project(project),
            project: project.to_path_buf(),
            multiple_answer: false,
            options,
        })
    }

    /// Opens a session honoring the project's answer settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the behavior file cannot be read.
    pub fn for_config(
        client: &'a dyn ModelClient,
        prompts: &'a PromptEngine,
        project: &Path,
        config: &ProjectConfig,
        options: RunOptions,
    ) -> Result<Self> {
        let mut session = Self::open(client, prompts, project, options)?;
        session.multiple_answer = config.multiple_answer;
        Ok(session)
    }

    /// Project root of this session.
    #[must_use]
    pub fn project(&self) -> &Path {
        &self.project
    }

    /// Prompt templates.
    #[must_use]
    pub const fn prompts(&self) -> &'a PromptEngine {
        self.prompts
    }

    /// Conversation state.
    #[must_use]
    pub const fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Sends `prompt`, in several parts if the project asks for it.
    ///
    /// # Errors
    ///
    /// Returns an error if logging, rendering or the model call fails.
    pub fn ask(&mut self, prompt: &str, hint: Option<&Path>) -> Result<String> {
        if !self.multiple_answer {
            return self.ask_single(prompt, hint);
        }

        let opening = self.prompts.render_multipart(prompt, ANSWER_PARTS)?;
        let mut parts = vec![self.send(&opening, hint)?];
        for part in 2..=ANSWER_PARTS {
            let follow_up = self.prompts.render_continuation(part, ANSWER_PARTS)?;
            debug!("Requesting part {part}/{ANSWER_PARTS}");
            parts.push(self.client.complete(&mut self.conversation, &follow_up, None)?);
        }
        Ok(parts.join("\n\n"))
    }

    /// Sends `prompt` and returns a single answer.
    ///
    /// # Errors
    ///
    /// Returns an error if logging or the model call fails.
    pub fn ask_single(&mut self, prompt: &str, hint: Option<&Path>) -> Result<String> {
        self.send(prompt, hint)
    }

    fn send(&mut self, prompt: &str, hint: Option<&Path>) -> Result<String> {
        let dated = self.log.record(prompt)?;
        if self.options.debug {
            info!("Prompt:\n{dated}");
        }
        debug!("Sending prompt of {} chars", dated.len());
        self.client.complete(&mut self.conversation, &dated, hint)
    }

    /// Asks the client to reload the project files into the conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if the project files cannot be read.
    pub fn refresh(&mut self) -> Result<()> {
        self.client
            .refresh_context(&mut self.conversation, &self.project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use crate::history::PromptLog;
    use crate::llm::tests::ScriptedClient;

    #[test]
    fn test_single_answer_is_logged() {
        let temp = assert_fs::TempDir::new().unwrap();
        let client = ScriptedClient::answering(&["hello"]);
        let prompts = PromptEngine::new().unwrap();
        let mut session =
            Session::open(&client, &prompts, temp.path(), RunOptions::default()).unwrap();

        assert_eq!(session.ask("Say hello", None).unwrap(), "hello");
        assert!(client.prompts()[0].starts_with("Today is "));
        assert!(client.prompts()[0].ends_with("Say hello"));

        let entries = PromptLog::for_project(temp.path()).entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].original_prompt, "Say hello");
        assert_eq!(session.conversation().len(), 2);
    }

    #[test]
    fn test_multiple_answer_joins_parts() {
        let temp = assert_fs::TempDir::new().unwrap();
        let mut config = sample_config(temp.path());
        config.multiple_answer = true;
        let client = ScriptedClient::answering(&["one", "two", "three"]);
        let prompts = PromptEngine::new().unwrap();
        let mut session =
            Session::for_config(&client, &prompts, temp.path(), &config, RunOptions::default())
                .unwrap();

        assert_eq!(session.ask("Long chapter", None).unwrap(), "one\n\ntwo\n\nthree");
        let sent = client.prompts();
        assert_eq!(sent.len(), 3);
        assert!(sent[0].contains("Split it into 3 parts"));
        assert!(sent[2].contains("part 3 of 3"));
    }

    #[test]
    fn test_ask_single_ignores_multiple_answer() {
        let temp = assert_fs::TempDir::new().unwrap();
        let mut config = sample_config(temp.path());
        config.multiple_answer = true;
        let client = ScriptedClient::answering(&["only"]);
        let prompts = PromptEngine::new().unwrap();
        let mut session =
            Session::for_config(&client, &prompts, temp.path(), &config, RunOptions::default())
                .unwrap();

        assert_eq!(session.ask_single("Translate", None).unwrap(), "only");
        assert_eq!(client.prompts().len(), 1);
    }

    #[test]
    fn test_upstream_failure_propagates() {
        let temp = assert_fs::TempDir::new().unwrap();
        let client = ScriptedClient::answering(&[]);
        let prompts = PromptEngine::new().unwrap();
        let mut session =
            Session::open(&client, &prompts, temp.path(), RunOptions::default()).unwrap();

        assert!(session.ask("anything", None).unwrap_err().is_upstream());
        assert!(session.conversation().is_empty());
    }
}
