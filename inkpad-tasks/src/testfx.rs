//! In-memory host and prompter fixtures shared by unit tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::host::{HostBridge, MessageKind, Prompter, Workspace};
use crate::registry::RECOGNIZED_CONFIG_IDENTITY;

/// Builds a workspace fixture with the recognized config identity.
pub(crate) fn workspace(root: &str, name: &str, description: &str) -> Workspace {
    Workspace {
        root_path: PathBuf::from(root),
        name: name.to_string(),
        description: description.to_string(),
        config_identity: RECOGNIZED_CONFIG_IDENTITY.to_string(),
    }
}

/// Host bridge backed by plain fields.
pub(crate) struct FakeHost {
    pub document: Option<PathBuf>,
    pub workspace: Option<Workspace>,
    pub selected: String,
    pub exec_path: PathBuf,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            document: None,
            workspace: None,
            selected: String::new(),
            exec_path: PathBuf::from("/opt/inkpad/bin/inkpad"),
        }
    }
}

impl HostBridge for FakeHost {
    fn current_document(&self) -> Option<PathBuf> {
        self.document.clone()
    }

    fn current_workspace(&self) -> Option<Workspace> {
        self.workspace.clone()
    }

    fn workspace_containing(&self, path: &Path) -> Option<Workspace> {
        self.workspace
            .as_ref()
            .filter(|ws| path.starts_with(&ws.root_path))
            .cloned()
    }

    fn selected_text(&self) -> String {
        self.selected.clone()
    }

    fn app_executable_path(&self) -> PathBuf {
        self.exec_path.clone()
    }
}

/// A record of one dialog the prompter was asked to render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PromptCall {
    Prompt {
        title: String,
        label: String,
        default: String,
        password: bool,
    },
    Pick {
        title: String,
        options: Vec<String>,
    },
    Message {
        kind: MessageKind,
        title: String,
        body: String,
    },
    MessageBox {
        title: String,
        body: String,
        buttons: Vec<String>,
    },
}

/// Prompter that replays scripted responses and records every call.
#[derive(Default)]
pub(crate) struct ScriptedPrompter {
    strings: Mutex<VecDeque<Option<String>>>,
    picks: Mutex<VecDeque<Option<usize>>>,
    answers: Mutex<VecDeque<Option<usize>>>,
    calls: Mutex<Vec<PromptCall>>,
}

impl ScriptedPrompter {
    pub fn with_strings(responses: Vec<Option<String>>) -> Self {
        Self {
            strings: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    pub fn with_picks(responses: Vec<Option<usize>>) -> Self {
        Self {
            picks: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    pub fn with_answers(responses: Vec<Option<usize>>) -> Self {
        Self {
            answers: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<PromptCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: PromptCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Prompter for ScriptedPrompter {
    fn prompt_string(
        &self,
        title: &str,
        label: &str,
        default: &str,
        password: bool,
    ) -> Option<String> {
        self.record(PromptCall::Prompt {
            title: title.to_string(),
            label: label.to_string(),
            default: default.to_string(),
            password,
        });
        self.strings.lock().unwrap().pop_front().flatten()
    }

    fn pick_string(&self, title: &str, options: &[String]) -> Option<usize> {
        self.record(PromptCall::Pick {
            title: title.to_string(),
            options: options.to_vec(),
        });
        self.picks.lock().unwrap().pop_front().flatten()
    }

    fn show_message(&self, kind: MessageKind, title: &str, body: &str) -> Option<usize> {
        self.record(PromptCall::Message {
            kind,
            title: title.to_string(),
            body: body.to_string(),
        });
        self.answers.lock().unwrap().pop_front().flatten()
    }

    fn message_box(&self, title: &str, body: &str, buttons: &[String]) -> Option<usize> {
        self.record(PromptCall::MessageBox {
            title: title.to_string(),
            body: body.to_string(),
            buttons: buttons.to_vec(),
        });
        self.answers.lock().unwrap().pop_front().flatten()
    }
}
