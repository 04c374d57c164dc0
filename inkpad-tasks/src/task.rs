//! The in-memory task document model.

use std::path::{Path, PathBuf};

use crate::error;
use crate::host::{HostBridge, Prompter};
use crate::shells;
use crate::variables::Expander;

/// Latest task document dialect understood by this implementation, and the
/// version assumed when a document does not declare one.
pub const LATEST_VERSION: &str = "0.1.3";

/// How a task's command is invoked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum TaskKind {
    /// The command line is handed to a shell interpreter.
    #[default]
    Shell,
    /// The command is executed directly with its arguments.
    Process,
}

/// How an input's value is solicited from the user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "camelCase")]
pub enum InputKind {
    /// Free-form text entry.
    #[default]
    PromptString,
    /// Selection from a fixed list of options.
    PickString,
}

/// A parameter a task declares; its value is prompted for at launch time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Input {
    /// Identifier referenced as `${input:ID}`; unique within the task.
    pub id: String,
    /// How the value is solicited.
    pub kind: InputKind,
    /// Label shown in the prompt dialog. A template string.
    pub description: String,
    /// Pre-filled value. A template string.
    pub default: String,
    /// Mask the entered text; honored only for [`InputKind::PromptString`].
    pub password: bool,
    /// Choices offered; honored only for [`InputKind::PickString`].
    pub options: Vec<String>,
}

/// A node in a task tree: a declarative description of an external command,
/// together with the configuration needed to launch it.
///
/// Fields hold *templates*; the resolved accessors run them through the
/// variable engine at call time, so the same task can produce different
/// values as host state changes.
#[derive(Clone, Debug)]
pub struct Task {
    pub(crate) version: String,
    pub(crate) kind: TaskKind,
    pub(crate) label: Option<String>,
    pub(crate) command: Option<String>,
    pub(crate) args: Vec<String>,
    pub(crate) icon: Option<PathBuf>,
    pub(crate) shortcut: Option<String>,
    pub(crate) options_cwd: Option<String>,
    pub(crate) options_env: Vec<(String, String)>,
    pub(crate) shell_executable: String,
    pub(crate) shell_args: Vec<String>,
    pub(crate) inputs: Vec<Input>,
    pub(crate) children: Vec<Task>,
    pub(crate) file: PathBuf,
    pub(crate) locale: Option<String>,
}

#[cfg(windows)]
const DEFAULT_SHELL: &str = "PowerShell.exe";
#[cfg(not(windows))]
const DEFAULT_SHELL: &str = "/bin/bash";

impl Task {
    /// Creates the root task of a document. The label defaults to the file's
    /// base name until the document provides one.
    pub(crate) fn new_root(file: &Path, locale: Option<&str>) -> Self {
        Self {
            version: LATEST_VERSION.to_string(),
            kind: TaskKind::default(),
            label: file_base_name(file),
            command: None,
            args: vec![],
            icon: None,
            shortcut: None,
            options_cwd: None,
            options_env: vec![],
            shell_executable: DEFAULT_SHELL.to_string(),
            shell_args: vec![],
            inputs: vec![],
            children: vec![],
            file: file.to_path_buf(),
            locale: locale.map(str::to_string),
        }
    }

    /// Creates a child task, copying the parent's inheritable configuration.
    /// `label`, `inputs`, and `children` are deliberately not inherited.
    pub(crate) fn new_child(parent: &Task) -> Self {
        Self {
            version: parent.version.clone(),
            kind: parent.kind,
            label: None,
            command: parent.command.clone(),
            args: parent.args.clone(),
            icon: None,
            shortcut: None,
            options_cwd: parent.options_cwd.clone(),
            options_env: parent.options_env.clone(),
            shell_executable: parent.shell_executable.clone(),
            shell_args: parent.shell_args.clone(),
            inputs: vec![],
            children: vec![],
            file: parent.file.clone(),
            locale: parent.locale.clone(),
        }
    }

    /// The document dialect version this task was parsed with.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// How the task's command is invoked.
    pub const fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Human-readable name of the task.
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or_default()
    }

    /// The raw command template, before expansion.
    pub fn command_template(&self) -> &str {
        self.command.as_deref().unwrap_or_default()
    }

    /// Absolute path of the task's icon, if one was configured and exists.
    pub fn icon(&self) -> Option<&Path> {
        self.icon.as_deref()
    }

    /// Key-binding string, opaque to the core.
    pub fn shortcut(&self) -> Option<&str> {
        self.shortcut.as_deref()
    }

    /// Path of the JSON document this task was loaded from.
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Child tasks, in document order.
    pub fn children(&self) -> &[Task] {
        &self.children
    }

    /// Inputs declared by this task, in document order.
    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    /// Looks up a declared input by id.
    pub fn input(&self, id: &str) -> Option<&Input> {
        self.inputs.iter().find(|input| input.id == id)
    }

    /// Identity of the configured shell (lowercased executable basename).
    pub fn shell_identity(&self) -> String {
        shells::shell_identity(&self.shell_executable)
    }

    /// Path of the configured shell executable.
    pub fn shell_executable(&self) -> &str {
        &self.shell_executable
    }

    /// The command with all variable references expanded. May prompt.
    pub fn resolved_command(
        &self,
        host: &dyn HostBridge,
        prompter: &dyn Prompter,
    ) -> Result<String, error::Error> {
        Expander::new(host, prompter, self).expand(self.command_template())
    }

    /// The argument list with all variable references expanded; elements
    /// that expand to the empty string are dropped. May prompt.
    pub fn resolved_args(
        &self,
        host: &dyn HostBridge,
        prompter: &dyn Prompter,
    ) -> Result<Vec<String>, error::Error> {
        Expander::new(host, prompter, self).expand_all(&self.args)
    }

    /// The working directory for the child process.
    ///
    /// Falls back, in order: the configured `options.cwd` template, the
    /// active workspace root, the folder containing the current document,
    /// the folder containing the task file.
    pub fn resolved_cwd(
        &self,
        host: &dyn HostBridge,
        prompter: &dyn Prompter,
    ) -> Result<PathBuf, error::Error> {
        Ok(PathBuf::from(
            Expander::new(host, prompter, self).resolved_cwd()?,
        ))
    }

    /// The environment overrides with values expanded, in document order.
    pub fn resolved_env(
        &self,
        host: &dyn HostBridge,
        prompter: &dyn Prompter,
    ) -> Result<Vec<(String, String)>, error::Error> {
        let mut expander = Expander::new(host, prompter, self);
        let mut resolved = Vec::with_capacity(self.options_env.len());
        for (name, value) in &self.options_env {
            resolved.push((name.clone(), expander.expand(value)?));
        }
        Ok(resolved)
    }

    /// The interpreter arguments: the configured sequence expanded, or the
    /// shell profile's defaults when nothing is configured.
    pub fn resolved_shell_args(
        &self,
        host: &dyn HostBridge,
        prompter: &dyn Prompter,
    ) -> Result<Vec<String>, error::Error> {
        if self.shell_args.is_empty() {
            Ok(shells::default_shell_args(&self.shell_identity()))
        } else {
            Expander::new(host, prompter, self).expand_all(&self.shell_args)
        }
    }
}

/// Base name of a file: the file name up to its first `.`.
fn file_base_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy();
    Some(name.split('.').next().unwrap_or_default().to_string())
}
