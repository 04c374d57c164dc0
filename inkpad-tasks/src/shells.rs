//! Shell invocation profiles.
//!
//! Maps a shell executable to its identity, its default interpreter
//! arguments, and the rule for joining a task's command and arguments into
//! the interpreter's argv.

/// Quote character used when space-quoting arguments.
pub const DEFAULT_QUOTE: char = '"';

/// Derives the shell identity from an executable path: the lowercased
/// basename without extension (`C:\tools\PowerShell.exe` -> `powershell`).
/// Both separator styles are accepted regardless of the host OS.
pub fn shell_identity(executable: &str) -> String {
    let basename = executable.rsplit(['/', '\\']).next().unwrap_or_default();
    let stem = basename.split('.').next().unwrap_or_default();
    stem.to_lowercase()
}

/// Default interpreter arguments for a shell identity, used when the task
/// does not configure `options.shell.args` itself.
pub fn default_shell_args(identity: &str) -> Vec<String> {
    match identity {
        "cmd" => vec!["/C".to_string()],
        "powershell" | "pwsh" => vec!["-Command".to_string()],
        "bash" | "sh" => vec!["-c".to_string()],
        _ => vec![],
    }
}

/// Wraps `text` in `quote` characters if it contains an ASCII space.
pub fn space_quote(text: &str, quote: char) -> String {
    if text.contains(' ') {
        format!("{quote}{text}{quote}")
    } else {
        text.to_string()
    }
}

fn space_quote_all(args: &[String], quote: char) -> Vec<String> {
    args.iter().map(|arg| space_quote(arg, quote)).collect()
}

/// Joins a resolved command and its arguments into the argv tail handed to
/// the interpreter, per the identity's convention.
///
/// Arguments are space-quoted only when both the command and the argument
/// list are non-empty. `bash`-family shells take the whole command line as a
/// single argv element with embedded quotes escaped; every other identity
/// receives the command and each argument as separate argv elements.
pub fn join_command(identity: &str, command: &str, args: &[String]) -> Vec<String> {
    let args = if !command.is_empty() && !args.is_empty() {
        space_quote_all(args, DEFAULT_QUOTE)
    } else {
        args.to_vec()
    };

    match identity {
        "bash" | "sh" => {
            let mut pieces = vec![command.to_string()];
            pieces.extend(args);
            vec![pieces.join(" ").replace('"', "\\\"")]
        }
        _ => {
            let mut argv = vec![command.to_string()];
            argv.extend(args);
            argv
        }
    }
}
