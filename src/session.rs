//! Session construction and lifetime.
//!
//! A [`Session`] bundles everything one conversation needs: the provider
//! handle, the tool registry, the in-memory conversation, and the on-disk
//! journal. Sessions are created by [`create_session`] (used by the headless
//! worker and by interactive frontends) and die with the process.

use crate::api::{ModelClient, Provider, ProviderOptions};
use crate::config::{heddle_home, load_config_with_credential, DEFAULT_SYSTEM_PROMPT};
use crate::journal::{SessionJournal, SessionMeta};
use crate::tools::{builtin_registry, ToolRegistry};
use crate::types::Message;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// One live conversation and its collaborators.
pub struct Session {
    pub session_id: String,
    /// Creation timestamp, ISO-8601 (mirrors the journal header).
    pub created_at: String,
    pub model: String,
    pub cwd: PathBuf,
    pub conversation: Vec<Message>,
    pub client: Box<dyn ModelClient>,
    pub registry: ToolRegistry,
    pub journal: SessionJournal,
    pub max_iterations: usize,
    pub doom_loop_threshold: usize,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("created_at", &self.created_at)
            .field("model", &self.model)
            .field("cwd", &self.cwd)
            .field("conversation", &self.conversation)
            .field("max_iterations", &self.max_iterations)
            .field("doom_loop_threshold", &self.doom_loop_threshold)
            .finish()
    }
}

/// Parameters accepted from the controller at session creation.
#[derive(Debug, Clone, Default)]
pub struct SessionSetup {
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    /// Tool-name filter; `None` or empty means every built-in.
    pub tools: Option<Vec<String>>,
    /// Working directory to switch into; must already exist.
    pub cwd: Option<String>,
    pub max_iterations: Option<usize>,
    /// Project context prepended to the system prompt (discovered by an
    /// external collaborator).
    pub agents_context: Option<String>,
}

/// Create a session: resolve config, switch directories, build the provider
/// and registry, open the journal, and seed the system message.
pub fn create_session(setup: SessionSetup) -> Result<Session, String> {
    if let Some(cwd) = setup.cwd.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        let path = Path::new(cwd);
        if !path.is_dir() {
            return Err(format!("working directory does not exist: {cwd}"));
        }
        std::env::set_current_dir(path)
            .map_err(|e| format!("failed to change working directory to {cwd}: {e}"))?;
    }

    let config = load_config_with_credential().map_err(|e| e.to_string())?;
    let model = setup
        .model
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| config.api.model.clone());

    let client = Provider::new(ProviderOptions {
        api_key: config.api.api_key.clone(),
        model: model.clone(),
        base_url: Some(config.api.base_url.clone()),
        request_params: None,
        retry: None,
    });

    // An empty controller filter is treated as unset.
    let filter = setup
        .tools
        .filter(|tools| !tools.is_empty())
        .unwrap_or_else(|| config.agent.tools.clone());
    let registry = builtin_registry(&filter).map_err(|e| e.to_string())?;

    let cwd = std::env::current_dir()
        .map_err(|e| format!("failed to resolve working directory: {e}"))?;
    let session_id = Uuid::new_v4().to_string();
    let journal_path = session_file_path(&cwd, &session_id);
    debug!(session_id = %session_id, path = %journal_path.display(), "creating session journal");

    let journal = SessionJournal::create(&journal_path)?;
    let meta = SessionMeta::new(&session_id, cwd.to_string_lossy(), &model);
    journal.write_session_meta(&meta)?;
    let created_at = meta.created.clone();

    let prompt = setup
        .system_prompt
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            if config.agent.system_prompt.trim().is_empty() {
                DEFAULT_SYSTEM_PROMPT.to_string()
            } else {
                config.agent.system_prompt.clone()
            }
        });
    let system = compose_system_prompt(setup.agents_context.as_deref(), &prompt);
    let conversation = vec![Message::system(system)];
    journal.append_message(&conversation[0])?;

    Ok(Session {
        session_id,
        created_at,
        model,
        cwd,
        conversation,
        client: Box::new(client),
        registry,
        journal,
        max_iterations: setup.max_iterations.unwrap_or(config.agent.max_iterations),
        doom_loop_threshold: config.agent.doom_loop_threshold,
    })
}

/// Project-scoped journal path:
/// `<heddle_home>/projects/<dash-encoded-cwd>/sessions/<uuid>.jsonl`.
pub fn session_file_path(cwd: &Path, session_id: &str) -> PathBuf {
    heddle_home()
        .join("projects")
        .join(dash_encode(&cwd.to_string_lossy()))
        .join("sessions")
        .join(format!("{session_id}.jsonl"))
}

/// Flatten a path into one directory-safe component.
fn dash_encode(path: &str) -> String {
    path.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '-' })
        .collect()
}

/// Prepend the agents context to the system prompt when one exists.
fn compose_system_prompt(agents_context: Option<&str>, prompt: &str) -> String {
    match agents_context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(context) => format!("{context}\n\n{prompt}"),
        None => prompt.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::TestTempDir;

    #[test]
    fn dash_encode_flattens_separators() {
        assert_eq!(dash_encode("/root/my work"), "-root-my-work");
        assert_eq!(dash_encode("C:\\dev\\proj"), "C--dev-proj");
    }

    #[test]
    fn compose_prepends_context_when_present() {
        assert_eq!(compose_system_prompt(None, "prompt"), "prompt");
        assert_eq!(compose_system_prompt(Some("  "), "prompt"), "prompt");
        assert_eq!(
            compose_system_prompt(Some("project notes"), "prompt"),
            "project notes\n\nprompt"
        );
    }

    #[test]
    fn session_paths_are_project_scoped() {
        let dir = TestTempDir::new("session-path");
        std::env::set_var("HEDDLE_HOME", dir.path());
        let path = session_file_path(Path::new("/work/app"), "abc-123");
        std::env::remove_var("HEDDLE_HOME");

        let text = path.display().to_string();
        assert!(text.contains("projects"), "got: {text}");
        assert!(text.contains("-work-app"), "got: {text}");
        assert!(text.ends_with("sessions/abc-123.jsonl"), "got: {text}");
    }

    // Verifies missing cwd fails before any config or network work.
    #[test]
    fn missing_cwd_is_rejected() {
        let setup = SessionSetup {
            cwd: Some("/definitely/not/a/real/dir".to_string()),
            ..SessionSetup::default()
        };
        let err = create_session(setup).expect_err("must fail");
        assert!(err.contains("working directory does not exist"), "got: {err}");
    }
}
