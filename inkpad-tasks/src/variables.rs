//! Template variable expansion.
//!
//! Expands `${name}` and `${namespace:key}` references against live host
//! state, the task being launched, the process environment, the wall clock,
//! and interactive input prompts. Unknown references are left literal.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Local};
use fancy_regex::Regex;
use rand::Rng;

use crate::error::Error;
use crate::host::{HostBridge, Prompter};
use crate::task::{Input, InputKind, Task};

/// Replaces `/` with `\` on Windows; pass-through elsewhere. Applied to
/// every path-typed variable before substitution.
pub(crate) fn normal_path(path: &str) -> String {
    #[cfg(windows)]
    {
        path.replace('/', "\\")
    }
    #[cfg(not(windows))]
    {
        path.to_string()
    }
}

#[cfg(windows)]
const PATH_SEPARATOR: &str = "\\";
#[cfg(not(windows))]
const PATH_SEPARATOR: &str = "/";

fn variable_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{[\t ]*([A-Za-z_][A-Za-z0-9_]*)(?:[\t ]*:[\t ]*([^}]*?))?[\t ]*\}")
            .expect("variable pattern is valid")
    })
}

fn input_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{[\t ]*input[\t ]*:[\t ]*(.*?)[\t ]*\}")
            .expect("input pattern is valid")
    })
}

/// One expansion pass over a task's templates.
///
/// The wall clock and the random samples are captured at construction, so
/// every occurrence of the same `magic:` token within a pass agrees. Input
/// values are prompted at most once per id per pass.
pub struct Expander<'a> {
    host: &'a dyn HostBridge,
    prompter: &'a dyn Prompter,
    task: &'a Task,
    now: DateTime<Local>,
    random: u32,
    random_d: u32,
    resolved_inputs: HashMap<String, String>,
    inputs_in_flight: Vec<String>,
    expanding_cwd: bool,
}

impl<'a> Expander<'a> {
    /// Starts a fresh expansion pass for `task`.
    pub fn new(host: &'a dyn HostBridge, prompter: &'a dyn Prompter, task: &'a Task) -> Self {
        let mut rng = rand::rng();
        Self {
            host,
            prompter,
            task,
            now: Local::now(),
            random: rng.random(),
            random_d: rng.random(),
            resolved_inputs: HashMap::new(),
            inputs_in_flight: vec![],
            expanding_cwd: false,
        }
    }

    /// Expands every variable reference in `text`. Unknown references stay
    /// literal. May prompt the user; a dismissed prompt yields
    /// [`Error::TaskCancelled`].
    pub fn expand(&mut self, text: &str) -> Result<String, Error> {
        let simply_expanded = self.expand_simple(text)?;
        self.expand_inputs(&simply_expanded)
    }

    /// Expands each element of `texts`, dropping elements that expand to the
    /// empty string.
    pub fn expand_all(&mut self, texts: &[String]) -> Result<Vec<String>, Error> {
        let mut expanded = Vec::with_capacity(texts.len());
        for text in texts {
            let value = self.expand(text)?;
            if !value.is_empty() {
                expanded.push(value);
            }
        }
        Ok(expanded)
    }

    /// The task's effective working directory, as a string.
    ///
    /// Falls back, in order: the `options.cwd` template (expanded), the
    /// active workspace root, the current document's folder, the task
    /// file's folder.
    pub fn resolved_cwd(&mut self) -> Result<String, Error> {
        if let Some(template) = self.task.options_cwd.clone() {
            // Re-entry guard: a `${cwd}` inside the cwd template itself
            // stays literal instead of recursing.
            let prev = self.expanding_cwd;
            self.expanding_cwd = true;
            let result = self.expand(&template);
            self.expanding_cwd = prev;
            return result;
        }
        if let Some(workspace) = self.host.current_workspace() {
            return Ok(workspace.root_path.to_string_lossy().into_owned());
        }
        if let Some(parent) = self
            .host
            .current_document()
            .as_deref()
            .and_then(Path::parent)
        {
            return Ok(parent.to_string_lossy().into_owned());
        }
        Ok(self
            .task
            .file()
            .parent()
            .map(|dir| dir.to_string_lossy().into_owned())
            .unwrap_or_default())
    }

    fn expand_simple(&mut self, text: &str) -> Result<String, Error> {
        let re = variable_regex();
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for captures in re.captures_iter(text) {
            let captures = captures?;
            let Some(whole) = captures.get(0) else {
                continue;
            };
            let name = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            let replacement = match captures.get(2) {
                Some(key) => self.namespace_value(name, key.as_str()),
                None => self.simple_value(name)?,
            };

            out.push_str(&text[last..whole.start()]);
            match replacement {
                Some(value) => out.push_str(&value),
                None => out.push_str(whole.as_str()),
            }
            last = whole.end();
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    /// Resolves a plain `${name}` reference; `None` leaves it literal.
    fn simple_value(&mut self, name: &str) -> Result<Option<String>, Error> {
        let document = self.host.current_document();

        let value = match name {
            "notebookFolder" => self
                .host
                .current_workspace()
                .map(|ws| normal_path(&ws.root_path.to_string_lossy())),
            "notebookFolderBasename" => self
                .host
                .current_workspace()
                .map(|ws| dir_name(&ws.root_path)),
            "notebookName" => self.host.current_workspace().map(|ws| ws.name),
            "notebookDescription" => self.host.current_workspace().map(|ws| ws.description),
            "file" => Some(normal_path(&path_str(document.as_deref()))),
            "fileNotebookFolder" => Some(normal_path(
                &self
                    .document_workspace_root(document.as_deref())
                    .unwrap_or_default(),
            )),
            "relativeFile" => Some(self.relative_document_path(document.as_deref())),
            "fileBasename" => Some(file_name(document.as_deref())),
            "fileBasenameNoExtension" => Some(base_name(document.as_deref())),
            "fileDirname" => Some(normal_path(&path_str(
                document.as_deref().and_then(Path::parent),
            ))),
            "fileExtname" => Some(format!(".{}", file_suffix(document.as_deref()))),
            "selectedText" => Some(self.host.selected_text()),
            "cwd" => {
                if self.expanding_cwd {
                    None
                } else {
                    Some(normal_path(&self.resolved_cwd()?))
                }
            }
            "taskFile" => Some(normal_path(&self.task.file().to_string_lossy())),
            "taskDirname" => Some(normal_path(&path_str(self.task.file().parent()))),
            "execPath" => Some(normal_path(
                &self.host.app_executable_path().to_string_lossy(),
            )),
            "pathSeparator" => Some(PATH_SEPARATOR.to_string()),
            _ => None,
        };
        Ok(value)
    }

    /// Resolves a `${namespace:key}` reference; `None` leaves it literal.
    /// The `input:` namespace is handled in a later pass.
    fn namespace_value(&self, namespace: &str, key: &str) -> Option<String> {
        match namespace {
            "magic" => self.magic_value(key),
            "env" => Some(std::env::var(key).unwrap_or_default()),
            _ => None,
        }
    }

    fn magic_value(&self, key: &str) -> Option<String> {
        let format = |pattern: &str| self.now.format(pattern).to_string();
        let document = self.host.current_document();

        let value = match key {
            "d" => format("%-d"),
            "dd" => format("%d"),
            "ddd" => format("%a"),
            "dddd" => format("%A"),
            "M" => format("%-m"),
            "MM" => format("%m"),
            "MMM" => format("%b"),
            "MMMM" => format("%B"),
            "yy" => format("%y"),
            "yyyy" => format("%Y"),
            "h" | "H" => format("%-H"),
            "hh" | "HH" => format("%H"),
            "m" => format("%-M"),
            "mm" => format("%M"),
            "s" => format("%-S"),
            "ss" => format("%S"),
            "z" => self.now.timestamp_subsec_millis().to_string(),
            "zzz" => format!("{:03}", self.now.timestamp_subsec_millis()),
            "AP" | "A" => format("%p"),
            "ap" | "a" => format("%P"),
            "random" => self.random.to_string(),
            "random_d" => self.random_d.to_string(),
            "date" => format("%Y-%m-%d"),
            "da" => format("%Y%m%d"),
            "time" => format("%H:%M:%S"),
            "datetime" => format("%Y-%m-%d %H:%M:%S"),
            "dt" => format("%Y%m%d %H:%M:%S"),
            "note" => file_name(document.as_deref()),
            "no" | "t" => complete_base_name(document.as_deref()),
            "w" => self.now.iso_week().week().to_string(),
            _ => return None,
        };
        Some(value)
    }

    fn document_workspace_root(&self, document: Option<&Path>) -> Option<String> {
        let document = document?;
        self.host
            .workspace_containing(document)
            .map(|ws| ws.root_path.to_string_lossy().into_owned())
    }

    fn relative_document_path(&self, document: Option<&Path>) -> String {
        let Some(document) = document else {
            return String::new();
        };
        match self.host.workspace_containing(document) {
            Some(ws) => document
                .strip_prefix(&ws.root_path)
                .unwrap_or(document)
                .to_string_lossy()
                .into_owned(),
            None => document.to_string_lossy().into_owned(),
        }
    }

    fn expand_inputs(&mut self, text: &str) -> Result<String, Error> {
        let re = input_regex();

        // Collect referenced ids, deduplicated in first-seen order.
        let mut ids: Vec<String> = vec![];
        for captures in re.captures_iter(text) {
            let captures = captures?;
            let id = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            if !ids.iter().any(|seen| seen == id) {
                ids.push(id.to_string());
            }
        }
        if ids.is_empty() {
            return Ok(text.to_string());
        }

        for id in &ids {
            if !self.resolved_inputs.contains_key(id) {
                let value = self.resolve_input(id)?;
                self.resolved_inputs.insert(id.clone(), value);
            }
        }

        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for captures in re.captures_iter(text) {
            let captures = captures?;
            let Some(whole) = captures.get(0) else {
                continue;
            };
            let id = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            out.push_str(&text[last..whole.start()]);
            if let Some(value) = self.resolved_inputs.get(id) {
                out.push_str(value);
            }
            last = whole.end();
        }
        out.push_str(&text[last..]);
        Ok(out)
    }

    fn resolve_input(&mut self, id: &str) -> Result<String, Error> {
        let task = self.task;
        let Some(input) = task.input(id) else {
            tracing::warn!(task = task.label(), id, "input not declared on task");
            return Err(Error::MissingInput(id.to_string()));
        };

        if self.inputs_in_flight.iter().any(|pending| pending == id) {
            return Err(Error::InputCycle(id.to_string()));
        }
        self.inputs_in_flight.push(id.to_string());
        let outcome = self.prompt_for(input);
        self.inputs_in_flight.pop();
        outcome
    }

    fn prompt_for(&mut self, input: &Input) -> Result<String, Error> {
        match input.kind {
            InputKind::PromptString => {
                // Description and default are themselves templates; the
                // nested pass shares this pass's caches.
                let description = self.expand(&input.description)?;
                let default = self.expand(&input.default)?;
                self.prompter
                    .prompt_string(self.task.label(), &description, &default, input.password)
                    .ok_or(Error::TaskCancelled)
            }
            InputKind::PickString => {
                let index = self
                    .prompter
                    .pick_string(self.task.label(), &input.options)
                    .ok_or(Error::TaskCancelled)?;
                Ok(input.options.get(index).cloned().unwrap_or_default())
            }
        }
    }
}

fn path_str(path: Option<&Path>) -> String {
    path.map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_name(path: Option<&Path>) -> String {
    path.and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// File name up to the first `.`.
fn base_name(path: Option<&Path>) -> String {
    let name = file_name(path);
    name.split('.').next().unwrap_or_default().to_string()
}

/// File name up to the last `.`.
fn complete_base_name(path: Option<&Path>) -> String {
    let name = file_name(path);
    match name.rsplit_once('.') {
        Some((base, _)) => base.to_string(),
        None => name,
    }
}

/// File name suffix after the last `.`, empty when there is none.
fn file_suffix(path: Option<&Path>) -> String {
    let name = file_name(path);
    match name.rsplit_once('.') {
        Some((_, suffix)) => suffix.to_string(),
        None => String::new(),
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
