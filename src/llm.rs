//! Generation model client: conversation state and the chat-completion API.

use crate::{
    config::ProjectConfig,
    error::{Error, Result},
    store::BACKUP_SUFFIX,
};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Behavior file sent as the system prompt of every conversation.
pub const BEHAVIOR_FILE: &str = "behaviors/default.txt";

const API_KEY_FILE: &str = "openai_api_key.txt";
const API_KEY_DIRS: &[&str] = &[".storycraftr", ".papercraftr"];
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Project directories whose Markdown files are shared with the model.
const KNOWLEDGE_DIRS: &[&str] = &["outline", "worldbuilding", "chapters", "research", "sections"];
const MAX_CONTEXT_CHARS: usize = 400_000;
/// Budget for resent exchanges; the oldest are dropped first.
const MAX_HISTORY_CHARS: usize = 200_000;

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions and project knowledge
    System,
    /// Prompts sent by the tool
    User,
    /// Model answers
    Assistant,
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author
    pub role: Role,
    /// Text
    pub content: String,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Summary of a project files snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProjectFiles {
    /// Markdown files read
    pub files: usize,
    /// Characters kept in the snapshot
    pub chars: usize,
    /// Whether the snapshot was cut at the context limit
    pub truncated: bool,
}

/// Process-local conversation handle.
///
/// Keeps the behavior prompt, the latest snapshot of the project files and
/// the most recent exchanges so later calls see earlier chapters and
/// translations without outgrowing the model's context.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    behavior: String,
    knowledge: Option<String>,
    history: Vec<Message>,
}

impl Conversation {
    /// Starts a conversation with the given behavior prompt.
    #[must_use]
    pub fn new(behavior: impl Into<String>) -> Self {
        Self {
            behavior: behavior.into(),
            knowledge: None,
            history: Vec::new(),
        }
    }

    /// Starts a conversation with the project's behavior file, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the behavior file exists but cannot be read.
    pub fn for_project(project: &Path) -> Result<Self> {
        let path = project.join(BEHAVIOR_FILE);
        let behavior = if path.is_file() {
            fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?
        } else {
            debug!("No behavior file at {}", path.display());
            String::new()
        };
        Ok(Self::new(behavior))
    }

    /// Replaces the project knowledge with the current Markdown files.
    ///
    /// # Errors
    ///
    /// Returns an error if a project file cannot be read.
    pub fn load_project_files(&mut self, project: &Path) -> Result<ProjectFiles> {
        let mut knowledge = String::new();
        let mut count = 0;

        for dir in KNOWLEDGE_DIRS {
            let root = project.join(dir);
            if !root.is_dir() {
                continue;
            }
            let mut files: Vec<PathBuf> = WalkDir::new(&root)
                .into_iter()
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().is_file())
                .map(walkdir::DirEntry::into_path)
                .filter(|p| is_knowledge_file(p))
                .collect();
            files.sort();

            for path in files {
                let content = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
                let relative = path.strip_prefix(project).unwrap_or(&path);
                knowledge.push_str(&format!("## File: {}\n\n{}\n\n", relative.display(), content));
                count += 1;
            }
        }

        let truncated = knowledge.len() > MAX_CONTEXT_CHARS;
        if truncated {
            warn!(
                "Project files exceed {} characters, the model sees a truncated snapshot",
                MAX_CONTEXT_CHARS
            );
            let cut = floor_char_boundary(&knowledge, MAX_CONTEXT_CHARS);
            knowledge.truncate(cut);
        }

        let loaded = ProjectFiles {
            files: count,
            chars: knowledge.len(),
            truncated,
        };
        self.knowledge = (!knowledge.is_empty()).then_some(knowledge);
        debug!("Loaded {count} project files into the conversation");
        Ok(loaded)
    }

    /// Builds the user message for `prompt`, attaching the current content
    /// of `hint` when that file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the hinted file exists but cannot be read.
    pub fn user_message(prompt: &str, hint: Option<&Path>) -> Result<String> {
        match hint.filter(|p| p.is_file()) {
            Some(path) => {
                let current = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
                let name = path.file_name().unwrap_or_default().to_string_lossy();
                Ok(format!("{prompt}\n\nCurrent content of {name}:\n\n{current}"))
            }
            None => Ok(prompt.to_string()),
        }
    }

    /// Records one completed exchange, dropping the oldest exchanges once
    /// the history exceeds its size budget. The latest exchange is always
    /// kept.
    pub fn push_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.history.push(Message::new(Role::User, user));
        self.history.push(Message::new(Role::Assistant, assistant));
        self.trim_history();
    }

    fn trim_history(&mut self) {
        let mut size: usize = self.history.iter().map(|m| m.content.len()).sum();
        let mut dropped = 0;
        while size > MAX_HISTORY_CHARS && self.history.len() - dropped > 2 {
            size -= self.history[dropped..dropped + 2]
                .iter()
                .map(|m| m.content.len())
                .sum::<usize>();
            dropped += 2;
        }
        if dropped > 0 {
            self.history.drain(..dropped);
            debug!("Dropped {} old exchanges from the conversation", dropped / 2);
        }
    }

    /// Messages to send with a new user message appended.
    #[must_use]
    pub fn messages_with(&self, user: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 3);
        if !self.behavior.trim().is_empty() {
            messages.push(Message::new(Role::System, self.behavior.clone()));
        }
        if let Some(knowledge) = &self.knowledge {
            messages.push(Message::new(
                Role::System,
                format!("Current project files:\n\n{knowledge}"),
            ));
        }
        messages.extend(self.history.iter().cloned());
        messages.push(Message::new(Role::User, user));
        messages
    }

    /// Number of recorded messages, excluding system messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Returns true if nothing has been exchanged yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Returns true if project files have been loaded.
    #[must_use]
    pub const fn has_knowledge(&self) -> bool {
        self.knowledge.is_some()
    }
}

fn is_knowledge_file(path: &Path) -> bool {
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    name.ends_with(".md") && !name.ends_with(BACKUP_SUFFIX)
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// A chat-completion backend.
///
/// Calls block until the model answers.
pub trait ModelClient {
    /// Sends `prompt` on `conversation` and returns the generated text.
    ///
    /// `hint` names the file the answer is about; its current content is
    /// attached when it exists. A successful exchange is recorded in the
    /// conversation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Upstream`] if the call fails.
    fn complete(
        &self,
        conversation: &mut Conversation,
        prompt: &str,
        hint: Option<&Path>,
    ) -> Result<String>;

    /// Refreshes the project knowledge after files changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the project files cannot be read.
    fn refresh_context(&self, conversation: &mut Conversation, project: &Path) -> Result<()> {
        conversation.load_project_files(project).map(|_| ())
    }
}

/// Client for OpenAI-compatible `chat/completions` endpoints.
pub struct OpenAiClient {
    http: HttpClient,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenAiClient {
    /// Creates a client for `base_url` and `model`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, model: &str, api_key: &str) -> Result<Self> {
        let http = HttpClient::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Creates a client from the project settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &ProjectConfig, api_key: &str) -> Result<Self> {
        Self::new(&config.openai_url, &config.openai_model, api_key)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| Error::config(format!("Invalid API key: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);
        Ok(headers)
    }
}

impl ModelClient for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.model))]
    fn complete(
        &self,
        conversation: &mut Conversation,
        prompt: &str,
        hint: Option<&Path>,
    ) -> Result<String> {
        let user = Conversation::user_message(prompt, hint)?;
        let messages = conversation.messages_with(&user);
        let url = format!("{}/chat/completions", self.base_url);

        debug!("Sending {} messages to {url}", messages.len());
        let response = self
            .http
            .post(url)
            .headers(self.headers()?)
            .json(&ChatRequest {
                model: &self.model,
                messages: &messages,
            })
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .map_or_else(|_| "unknown error".to_string(), |b| b.error.message);
            return Err(Error::upstream(message, Some(status.as_u16())));
        }

        let body: ChatResponse = response.json()?;
        let answer = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::upstream("response contained no choices", None))?;

        conversation.push_exchange(user, answer.clone());
        Ok(answer)
    }
}

/// Finds the API key in the environment or the user's home directory.
///
/// # Errors
///
/// Returns a configuration error if no key is found.
pub fn load_api_key() -> Result<String> {
    if let Ok(key) = env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            return Ok(key.trim().to_string());
        }
    }

    let home = dirs::home_dir().ok_or_else(|| Error::config("Cannot locate home directory"))?;
    for dir in API_KEY_DIRS {
        let path = home.join(dir).join(API_KEY_FILE);
        if path.is_file() {
            let key = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
            debug!("Loaded API key from {}", path.display());
            return Ok(key.trim().to_string());
        }
    }

    Err(Error::config(format!(
        "Set {API_KEY_ENV} or create {API_KEY_FILE} in ~/.storycraftr or ~/.papercraftr"
    )))
}
