//! Inline control messages embedded in child process output.
//!
//! A child may write lines of the form `::cmd key=value,...::body` to its
//! stdout to request a dialog from the host. Matched lines are acted upon,
//! stripped from the forwarded text, and may produce a reply destined for
//! the child's stdin.

use std::collections::HashMap;
use std::sync::OnceLock;

use fancy_regex::Regex;

use crate::host::{MessageKind, Prompter};

fn control_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^::([a-zA-Z-]+)(.*?)?::(.*?)$").expect("control pattern is valid")
    })
}

/// Result of scanning one chunk of child output.
#[derive(Debug, Default)]
pub(crate) struct ControlOutcome {
    /// The chunk with every control line removed.
    pub text: String,
    /// Replies to write to the child's stdin, in order.
    pub replies: Vec<String>,
}

/// Scans `text` for control lines, renders the requested dialogs through
/// `prompter`, and returns the residual text plus any replies.
pub(crate) fn scan_output(text: &str, prompter: &dyn Prompter) -> ControlOutcome {
    let re = control_regex();
    let mut outcome = ControlOutcome::default();
    let mut last = 0;

    for captures in re.captures_iter(text) {
        let Ok(captures) = captures else {
            break;
        };
        let Some(whole) = captures.get(0) else {
            continue;
        };
        let cmd = captures
            .get(1)
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_default();
        let args = parse_args(captures.get(2).map(|m| m.as_str()).unwrap_or_default());
        let value = captures.get(3).map(|m| m.as_str()).unwrap_or_default();
        let title = args.get("title").map(String::as_str).unwrap_or_default();

        match cmd.as_str() {
            "show-info" => {
                prompter.show_message(MessageKind::Info, title, value);
            }
            "show-question" => {
                if let Some(answer) = prompter.show_message(MessageKind::Question, title, value) {
                    outcome.replies.push(format!("{answer}\n"));
                }
            }
            "show-messagebox" => {
                let buttons: Vec<String> = args
                    .get("buttons")
                    .map(|list| list.split('|').map(str::to_string).collect())
                    .unwrap_or_default();
                if let Some(clicked) = prompter.message_box(title, value, &buttons) {
                    outcome.replies.push(format!("{clicked}\n"));
                }
            }
            "show-inputdialog" => {
                // Reply behavior is reserved; the line is only stripped.
                tracing::debug!(title, "show-inputdialog control message ignored");
            }
            _ => {}
        }

        outcome.text.push_str(&text[last..whole.start()]);
        last = whole.end();
    }

    outcome.text.push_str(&text[last..]);
    outcome
}

/// Parses a comma-separated `key[=value]` list.
fn parse_args(raw: &str) -> HashMap<String, String> {
    let mut args = HashMap::new();
    for piece in raw.trim().split(',') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        match piece.split_once('=') {
            Some((name, value)) => args.insert(name.to_string(), value.to_string()),
            None => args.insert(piece.to_string(), String::new()),
        };
    }
    args
}
