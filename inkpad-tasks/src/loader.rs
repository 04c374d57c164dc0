//! Task document loading.
//!
//! Reads a task JSON file, dispatches on its declared version, decodes
//! locale-tagged strings, and recursively constructs the task tree,
//! applying the per-OS overlay last.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use semver::Version;
use serde_json::{Map, Value};

use crate::error::Error;
use crate::task::{Input, InputKind, Task, TaskKind};

#[cfg(windows)]
const OS_OVERLAY_KEY: &str = "windows";
#[cfg(target_os = "macos")]
const OS_OVERLAY_KEY: &str = "osx";
#[cfg(all(not(windows), not(target_os = "macos")))]
const OS_OVERLAY_KEY: &str = "linux";

/// Reads and parses a task document. A syntactically invalid file yields
/// [`Error::ParseFailure`]; the caller is expected to log and skip it.
pub fn load_task_file(path: &Path, locale: Option<&str>) -> Result<Task, Error> {
    let text = std::fs::read_to_string(path)?;
    parse_document(path, &text, locale)
}

/// Parses document text into a task tree rooted at `path`.
pub(crate) fn parse_document(
    path: &Path,
    text: &str,
    locale: Option<&str>,
) -> Result<Task, Error> {
    let json: Value = serde_json::from_str(text)
        .map_err(|err| Error::ParseFailure(path.to_path_buf(), err))?;
    let mut task = Task::new_root(path, locale);
    if let Value::Object(obj) = json {
        from_json(&mut task, &obj);
    }
    Ok(task)
}

/// Dispatches on the document's `version` field. Pre-1.0 documents use the
/// V0 dialect; anything newer is unknown and yields a skeletal task.
fn from_json(task: &mut Task, obj: &Map<String, Value>) {
    if let Some(version) = obj.get("version").and_then(Value::as_str) {
        task.version = version.to_string();
    }

    match Version::parse(&task.version) {
        Ok(version) if version < Version::new(1, 0, 0) => from_json_v0(task, obj, false),
        Ok(version) => {
            tracing::warn!(%version, file = %task.file().display(), "unknown task version");
        }
        Err(_) => {
            tracing::warn!(
                version = %task.version,
                file = %task.file().display(),
                "unparseable task version, assuming pre-1.0 dialect"
            );
            from_json_v0(task, obj, false);
        }
    }
}

/// V0 dialect. Fields present in `obj` overwrite the task's (possibly
/// inherited) values; absent fields leave them intact. When
/// `merge_children` is set (OS overlay), a `tasks` array appends to the
/// existing children instead of replacing them.
#[allow(clippy::too_many_lines)]
fn from_json_v0(task: &mut Task, obj: &Map<String, Value>, merge_children: bool) {
    let locale = task.locale.clone();
    let locale = locale.as_deref();

    if let Some(kind) = obj.get("type").and_then(Value::as_str) {
        match TaskKind::from_str(kind) {
            Ok(parsed) => task.kind = parsed,
            Err(_) => tracing::warn!(kind, "unknown task type"),
        }
    }

    if let Some(icon) = obj.get("icon").and_then(Value::as_str) {
        let mut path = PathBuf::from(icon);
        if path.is_relative() {
            if let Some(dir) = task.file().parent() {
                path = dir.join(path);
            }
        }
        if path.exists() {
            task.icon = Some(path);
        } else {
            tracing::warn!(icon = %path.display(), "task icon does not exist");
        }
    }

    if let Some(shortcut) = obj.get("shortcut").and_then(Value::as_str) {
        task.shortcut = Some(shortcut.to_string());
    }

    if let Some(command) = obj.get("command") {
        task.command = locale_string(command, locale);
    }

    if let Some(args) = obj.get("args") {
        task.args = locale_string_list(args, locale);
    }

    match obj.get("label") {
        Some(label) => task.label = locale_string(label, locale),
        None => {
            if task.label.is_none() && task.command.is_some() {
                task.label = task.command.clone();
            }
        }
    }

    if let Some(Value::Object(options)) = obj.get("options") {
        if let Some(cwd) = options.get("cwd").and_then(Value::as_str) {
            task.options_cwd = Some(cwd.to_string());
        }

        if let Some(Value::Object(env)) = options.get("env") {
            task.options_env.clear();
            for (name, value) in env {
                let value = locale_string(value, locale).unwrap_or_default();
                task.options_env.push((name.clone(), value));
            }
        }

        if task.kind == TaskKind::Shell {
            if let Some(Value::Object(shell)) = options.get("shell") {
                if let Some(executable) = shell.get("executable").and_then(Value::as_str) {
                    task.shell_executable = executable.to_string();
                }
                if let Some(Value::Array(args)) = shell.get("args") {
                    task.shell_args = args
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect();
                }
            }
        }
    }

    if let Some(Value::Array(children)) = obj.get("tasks") {
        if !merge_children {
            task.children.clear();
        }
        for child_value in children {
            if let Value::Object(child_obj) = child_value {
                let mut child = Task::new_child(task);
                from_json(&mut child, child_obj);
                task.children.push(child);
            }
        }
    }

    if let Some(Value::Array(inputs)) = obj.get("inputs") {
        task.inputs.clear();
        for input_value in inputs {
            if let Value::Object(input_obj) = input_value {
                task.inputs.push(parse_input(input_obj, locale));
            }
        }
    }

    // The matching per-OS overlay merges last, on top of every sibling
    // field; its tasks array appends.
    if let Some(Value::Object(overlay)) = obj.get(OS_OVERLAY_KEY) {
        from_json_v0(task, overlay, true);
    }
}

fn parse_input(obj: &Map<String, Value>, locale: Option<&str>) -> Input {
    let mut input = Input::default();

    match obj.get("id").and_then(Value::as_str) {
        Some(id) => input.id = id.to_string(),
        None => tracing::warn!("input configuration does not contain an id"),
    }

    if let Some(kind) = obj.get("type").and_then(Value::as_str) {
        match InputKind::from_str(kind) {
            Ok(parsed) => input.kind = parsed,
            Err(_) => tracing::warn!(kind, "unknown input type"),
        }
    }

    if let Some(description) = obj.get("description") {
        input.description = locale_string(description, locale).unwrap_or_default();
    }

    if let Some(default) = obj.get("default") {
        input.default = locale_string(default, locale).unwrap_or_default();
    }

    if input.kind == InputKind::PromptString {
        input.password = obj
            .get("password")
            .and_then(Value::as_bool)
            .unwrap_or_default();
    }

    if input.kind == InputKind::PickString {
        if let Some(options) = obj.get("options") {
            input.options = locale_string_list(options, locale);
        }
        if !input.default.is_empty() && !input.options.contains(&input.default) {
            tracing::warn!(
                id = %input.id,
                "input default must be one of the option values"
            );
        }
    }

    input
}

/// Decodes a string-valued field that may be a locale-map: a JSON object
/// keyed by locale tags. The active locale's entry wins; otherwise the
/// first entry (insertion order) is taken with a warning.
fn locale_string(value: &Value, locale: Option<&str>) -> Option<String> {
    match value {
        Value::Object(map) => {
            if let Some(locale) = locale {
                if let Some(entry) = map.get(locale) {
                    return entry.as_str().map(str::to_string);
                }
            }
            tracing::warn!(?locale, "active locale not present in string map");
            map.values().next().and_then(Value::as_str).map(str::to_string)
        }
        other => other.as_str().map(str::to_string),
    }
}

fn locale_string_list(value: &Value, locale: Option<&str>) -> Vec<String> {
    match value {
        Value::Array(values) => values
            .iter()
            .map(|entry| locale_string(entry, locale).unwrap_or_default())
            .collect(),
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> Result<Task> {
        Ok(parse_document(
            Path::new("/tasks/sample.json"),
            text,
            Some("en_US"),
        )?)
    }

    #[test]
    fn test_minimal_document() -> Result<()> {
        let task = parse(
            r#"{
                "version": "0.1.3",
                "type": "shell",
                "label": "Build",
                "command": "make",
                "args": ["-j", "4"],
                "options": { "cwd": "${notebookFolder}" }
            }"#,
        )?;

        assert_eq!(task.version(), "0.1.3");
        assert_eq!(task.kind(), TaskKind::Shell);
        assert_eq!(task.label(), "Build");
        assert_eq!(task.command_template(), "make");
        assert_eq!(task.args, vec!["-j", "4"]);
        assert_eq!(task.options_cwd.as_deref(), Some("${notebookFolder}"));
        Ok(())
    }

    #[test]
    fn test_invalid_json_is_a_parse_failure() {
        let result = parse_document(Path::new("/tasks/bad.json"), "{ nope", None);
        assert!(matches!(result, Err(Error::ParseFailure(..))));
    }

    #[test]
    fn test_unknown_version_yields_skeletal_task() -> Result<()> {
        let task = parse(r#"{ "version": "2.0.0", "command": "make" }"#)?;
        assert_eq!(task.version(), "2.0.0");
        assert_eq!(task.command, None);
        // The root label still defaults to the file's base name.
        assert_eq!(task.label(), "sample");
        Ok(())
    }

    #[test]
    fn test_unparseable_version_uses_v0_dialect() -> Result<()> {
        let task = parse(r#"{ "version": "not-a-version", "command": "make" }"#)?;
        assert_eq!(task.command_template(), "make");
        Ok(())
    }

    #[test]
    fn test_locale_map_selection_and_fallback() -> Result<()> {
        let task = parse(r#"{ "label": { "en_US": "Build", "zh_CN": "构建" } }"#)?;
        assert_eq!(task.label(), "Build");

        // Active locale absent: first entry wins.
        let task = parse(r#"{ "label": { "xx_YY": "A", "zz_ZZ": "B" } }"#)?;
        assert_eq!(task.label(), "A");
        Ok(())
    }

    #[test]
    fn test_locale_maps_in_args() -> Result<()> {
        let task = parse(
            r#"{ "command": "echo", "args": ["plain", { "en_US": "hello", "zh_CN": "你好" }] }"#,
        )?;
        assert_eq!(task.args, vec!["plain", "hello"]);
        Ok(())
    }

    #[test]
    fn test_children_inherit_and_override() -> Result<()> {
        let task = parse(
            r#"{
                "command": "a",
                "inputs": [{ "id": "x" }],
                "tasks": [
                    { "label": "C" },
                    { "command": "b" }
                ]
            }"#,
        )?;

        assert_eq!(task.children().len(), 2);

        let first = &task.children()[0];
        assert_eq!(first.command_template(), "a");
        assert_eq!(first.label(), "C");
        assert!(first.inputs().is_empty());

        let second = &task.children()[1];
        assert_eq!(second.command_template(), "b");
        // No explicit label: the (overridden) command text is used.
        assert_eq!(second.label(), "b");
        Ok(())
    }

    #[test]
    fn test_os_overlay_replaces_scalars_and_appends_children() -> Result<()> {
        let text = format!(
            r#"{{
                "command": "x",
                "tasks": [{{ "label": "base" }}],
                "{OS_OVERLAY_KEY}": {{
                    "command": "y",
                    "tasks": [{{ "label": "L" }}]
                }}
            }}"#
        );
        let task = parse(&text)?;

        assert_eq!(task.command_template(), "y");
        let labels: Vec<&str> = task.children().iter().map(Task::label).collect();
        assert_eq!(labels, vec!["base", "L"]);
        Ok(())
    }

    #[test]
    fn test_plain_tasks_array_replaces_children() -> Result<()> {
        // Without the overlay flag, a document's own tasks array replaces
        // whatever was there (nothing, for a fresh parse).
        let task = parse(r#"{ "tasks": [{ "label": "only" }] }"#)?;
        assert_eq!(task.children().len(), 1);
        Ok(())
    }

    #[test]
    fn test_shell_options_ignored_for_process_tasks() -> Result<()> {
        let task = parse(
            r#"{
                "type": "process",
                "command": "tool",
                "options": { "shell": { "executable": "zsh", "args": ["-x"] } }
            }"#,
        )?;
        assert_ne!(task.shell_executable(), "zsh");
        assert!(task.shell_args.is_empty());
        Ok(())
    }

    #[test]
    fn test_input_parsing() -> Result<()> {
        let task = parse(
            r#"{
                "command": "ssh",
                "inputs": [
                    { "id": "pw", "type": "promptString", "password": true },
                    { "id": "host", "type": "pickString", "options": ["a", "b"], "default": "a" },
                    { "id": "odd", "type": "pickString", "password": true }
                ]
            }"#,
        )?;

        let inputs = task.inputs();
        assert_eq!(inputs.len(), 3);

        assert_eq!(inputs[0].kind, InputKind::PromptString);
        assert!(inputs[0].password);

        assert_eq!(inputs[1].kind, InputKind::PickString);
        assert_eq!(inputs[1].options, vec!["a", "b"]);
        assert_eq!(inputs[1].default, "a");

        // password is only honored for promptString inputs.
        assert!(!inputs[2].password);
        Ok(())
    }

    #[test]
    fn test_unknown_enum_values_fall_back_to_defaults() -> Result<()> {
        let task = parse(r#"{ "type": "daemon", "inputs": [{ "id": "i", "type": "mystery" }] }"#)?;
        assert_eq!(task.kind(), TaskKind::Shell);
        assert_eq!(task.inputs()[0].kind, InputKind::PromptString);
        Ok(())
    }

    #[test]
    fn test_env_values_parse_in_document_order() -> Result<()> {
        let task = parse(
            r#"{ "options": { "env": { "B": "2", "A": { "en_US": "1" } } } }"#,
        )?;
        assert_eq!(
            task.options_env,
            vec![
                ("B".to_string(), "2".to_string()),
                ("A".to_string(), "1".to_string())
            ]
        );
        Ok(())
    }
}
