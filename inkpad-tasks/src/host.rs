//! Interfaces implemented by the embedding application.
//!
//! The task core never talks to UI or document-model types directly; it goes
//! through the narrow traits below, which keeps the subsystem testable with
//! in-memory fixtures.

use std::path::{Path, PathBuf};

/// A workspace (a root folder of notes) known to the host application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Workspace {
    /// Absolute path of the workspace's root folder.
    pub root_path: PathBuf,
    /// Display name of the workspace.
    pub name: String,
    /// Free-form description of the workspace.
    pub description: String,
    /// Identity of the configuration manager backing this workspace. Only
    /// workspaces backed by the recognized bundle layout contribute a task
    /// search root.
    pub config_identity: String,
}

/// Kind of message dialog requested by a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// Informational; has a single dismiss button.
    Info,
    /// A question the user answers by choosing a button.
    Question,
}

/// Read-only facade over host state consulted during variable expansion and
/// task discovery. All methods are synchronous.
pub trait HostBridge: Send + Sync {
    /// Absolute path of the currently focused document, if any.
    fn current_document(&self) -> Option<PathBuf>;

    /// The currently active workspace, if any.
    fn current_workspace(&self) -> Option<Workspace>;

    /// The first configured workspace whose root contains `path` by prefix.
    fn workspace_containing(&self, path: &Path) -> Option<Workspace>;

    /// Text currently selected in the focused editor; possibly empty.
    fn selected_text(&self) -> String;

    /// Absolute path of the application executable.
    fn app_executable_path(&self) -> PathBuf;
}

/// Dialog rendering delegated to the host. Each method blocks until the user
/// responds; `None` means the dialog was cancelled.
pub trait Prompter: Send + Sync {
    /// Asks the user for a line of text.
    fn prompt_string(
        &self,
        title: &str,
        label: &str,
        default: &str,
        password: bool,
    ) -> Option<String>;

    /// Asks the user to pick one of `options`; returns the chosen index.
    fn pick_string(&self, title: &str, options: &[String]) -> Option<usize>;

    /// Shows a message dialog. For [`MessageKind::Question`] the returned
    /// value is the index of the chosen answer.
    fn show_message(&self, kind: MessageKind, title: &str, body: &str) -> Option<usize>;

    /// Shows a dialog with caller-supplied buttons; returns the index of the
    /// clicked button.
    fn message_box(&self, title: &str, body: &str, buttons: &[String]) -> Option<usize>;
}
