//! Child process construction and supervision.
//!
//! Translates a resolved task into a launched child process, streams its
//! decoded output to the observer, and services inline control messages.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};

use crate::control;
use crate::decode;
use crate::error::Error;
use crate::host::{HostBridge, Prompter};
use crate::shells;
use crate::task::{Task, TaskKind};

/// Observer for everything a running task writes back to the host: decoded
/// child output and the runner's banner lines.
pub trait OutputSink: Send + Sync {
    /// Called with each chunk of text, in arrival order.
    fn output(&self, text: &str);
}

/// Handle to a launched child. The pipeline is fire-and-forget; the handle
/// only lets the embedder (or a test) await completion.
pub struct TaskHandle {
    waiter: tokio::task::JoinHandle<()>,
}

impl TaskHandle {
    /// Waits until the child has exited and all of its output has been
    /// forwarded.
    pub async fn wait(self) {
        let _ = self.waiter.await;
    }
}

type SharedStdin = Arc<tokio::sync::Mutex<Option<ChildStdin>>>;

/// Launches tasks against a fixed host, prompter, and output observer.
pub struct TaskRunner {
    host: Arc<dyn HostBridge>,
    prompter: Arc<dyn Prompter>,
    sink: Arc<dyn OutputSink>,
}

/// A fully resolved invocation, ready to spawn.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct LaunchPlan {
    pub program: String,
    pub argv: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
    pub label: String,
}

impl TaskRunner {
    /// Creates a runner.
    pub fn new(
        host: Arc<dyn HostBridge>,
        prompter: Arc<dyn Prompter>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            host,
            prompter,
            sink,
        }
    }

    /// Resolves and launches `task`.
    ///
    /// Returns `Ok(None)` without starting anything when the resolved
    /// command is empty or when the user cancels a prompt. Spawn failures
    /// emit an error banner and are returned to the caller.
    pub async fn launch(&self, task: &Task) -> Result<Option<TaskHandle>, Error> {
        let plan = match self.plan(task) {
            Ok(Some(plan)) => plan,
            Ok(None) => return Ok(None),
            Err(Error::TaskCancelled) => {
                tracing::debug!(task = task.label(), "launch cancelled by user");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        self.spawn(plan)
    }

    /// Resolves the task's fields (command, args, cwd, env, in that order)
    /// and composes the argv per the task's invocation kind.
    pub(crate) fn plan(&self, task: &Task) -> Result<Option<LaunchPlan>, Error> {
        let host = self.host.as_ref();
        let prompter = self.prompter.as_ref();

        let command = task.resolved_command(host, prompter)?;
        if command.is_empty() {
            return Ok(None);
        }
        let args = task.resolved_args(host, prompter)?;
        let cwd = task.resolved_cwd(host, prompter)?;
        let env = task.resolved_env(host, prompter)?;

        let (program, argv) = match task.kind() {
            TaskKind::Process => (command, args),
            TaskKind::Shell => {
                let mut argv = task.resolved_shell_args(host, prompter)?;
                argv.extend(shells::join_command(
                    &task.shell_identity(),
                    &command,
                    &args,
                ));
                (task.shell_executable().to_string(), argv)
            }
        };

        Ok(Some(LaunchPlan {
            program,
            argv,
            cwd,
            env,
            label: task.label().to_string(),
        }))
    }

    fn spawn(&self, plan: LaunchPlan) -> Result<Option<TaskHandle>, Error> {
        let mut command = Command::new(&plan.program);
        command
            .args(&plan.argv)
            .current_dir(&plan.cwd)
            .envs(plan.env.iter().cloned())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::info!(program = %plan.program, args = ?plan.argv, "running task");
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                self.sink
                    .output(&format!("[Task {} error occurred: {err}]\n", plan.label));
                return Err(Error::SpawnFailure(err));
            }
        };

        self.sink
            .output(&format!("[Task {} started]\n", plan.label));

        let stdin: SharedStdin = Arc::new(tokio::sync::Mutex::new(child.stdin.take()));

        let stdout_task = child.stdout.take().map(|stream| {
            let sink = Arc::clone(&self.sink);
            let prompter = Arc::clone(&self.prompter);
            let stdin = Arc::clone(&stdin);
            tokio::spawn(async move {
                forward_stdout(stream, sink, prompter, stdin).await;
            })
        });

        let stderr_task = child.stderr.take().map(|stream| {
            let sink = Arc::clone(&self.sink);
            tokio::spawn(async move {
                forward_stderr(stream, sink).await;
            })
        });

        let sink = Arc::clone(&self.sink);
        let label = plan.label;
        let waiter = tokio::spawn(async move {
            let status = child.wait().await;
            if let Some(task) = stdout_task {
                let _ = task.await;
            }
            if let Some(task) = stderr_task {
                let _ = task.await;
            }
            match status {
                Ok(status) => {
                    let code = status.code().unwrap_or(-1);
                    sink.output(&format!("\n[Task {label} finished with exit code {code}]\n"));
                }
                Err(err) => {
                    sink.output(&format!("[Task {label} error occurred: {err}]\n"));
                }
            }
        });

        Ok(Some(TaskHandle { waiter }))
    }
}

/// Streams stdout: each decoded chunk is filtered through the control
/// channel before the residual text reaches the observer; replies are
/// written back to the child.
async fn forward_stdout(
    stream: impl AsyncRead + Unpin,
    sink: Arc<dyn OutputSink>,
    prompter: Arc<dyn Prompter>,
    stdin: SharedStdin,
) {
    let mut stream = stream;
    let mut buf = [0u8; 8192];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let text = decode::decode_bytes(&buf[..n]);
                let outcome = control::scan_output(&text, prompter.as_ref());
                for reply in &outcome.replies {
                    write_reply(&stdin, reply).await;
                }
                if !outcome.text.is_empty() {
                    sink.output(&outcome.text);
                }
            }
        }
    }
}

async fn forward_stderr(stream: impl AsyncRead + Unpin, sink: Arc<dyn OutputSink>) {
    let mut stream = stream;
    let mut buf = [0u8; 8192];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => sink.output(&decode::decode_bytes(&buf[..n])),
        }
    }
}

async fn write_reply(stdin: &SharedStdin, reply: &str) {
    let mut guard = stdin.lock().await;
    match guard.as_mut() {
        Some(stream) => {
            if let Err(err) = stream.write_all(reply.as_bytes()).await {
                tracing::warn!(%err, "failed to write control reply to child");
            } else {
                let _ = stream.flush().await;
            }
        }
        None => tracing::warn!("process finished"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Input;
    use crate::testfx::{FakeHost, ScriptedPrompter};
    use anyhow::Result;
    use std::path::Path;
    use std::sync::Mutex;

    struct CollectingSink(Mutex<String>);

    impl CollectingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(String::new())))
        }

        fn text(&self) -> String {
            self.0.lock().unwrap().clone()
        }
    }

    impl OutputSink for CollectingSink {
        fn output(&self, text: &str) {
            self.0.lock().unwrap().push_str(text);
        }
    }

    fn runner_with(
        host: FakeHost,
        prompter: ScriptedPrompter,
    ) -> (TaskRunner, Arc<CollectingSink>) {
        let sink = CollectingSink::new();
        let runner = TaskRunner::new(Arc::new(host), Arc::new(prompter), sink.clone());
        (runner, sink)
    }

    fn process_task(command: &str, args: &[&str]) -> Task {
        let mut task = Task::new_root(Path::new("/tasks/t.json"), None);
        task.kind = TaskKind::Process;
        task.command = Some(command.to_string());
        task.args = args.iter().map(|a| a.to_string()).collect();
        task.options_cwd = Some(
            std::env::temp_dir().to_string_lossy().into_owned(),
        );
        task
    }

    #[cfg(unix)]
    fn shell_task(command: &str) -> Task {
        let mut task = Task::new_root(Path::new("/tasks/t.json"), None);
        task.kind = TaskKind::Shell;
        task.shell_executable = "/bin/sh".to_string();
        task.command = Some(command.to_string());
        task.options_cwd = Some(
            std::env::temp_dir().to_string_lossy().into_owned(),
        );
        task
    }

    #[tokio::test]
    async fn test_empty_command_aborts_without_output() -> Result<()> {
        let (runner, sink) = runner_with(FakeHost::default(), ScriptedPrompter::default());
        let mut task = process_task("", &[]);
        task.command = None;

        let handle = runner.launch(&task).await?;
        assert!(handle.is_none());
        assert_eq!(sink.text(), "");
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_prompt_aborts_silently() -> Result<()> {
        let (runner, sink) = runner_with(
            FakeHost::default(),
            ScriptedPrompter::with_strings(vec![None]),
        );
        let mut task = process_task("echo", &["${input:x}"]);
        task.inputs = vec![Input {
            id: "x".to_string(),
            ..Input::default()
        }];

        let handle = runner.launch(&task).await?;
        assert!(handle.is_none());
        assert_eq!(sink.text(), "");
        Ok(())
    }

    #[test]
    fn test_shell_plan_uses_profile_join() -> Result<()> {
        let sink = CollectingSink::new();
        let runner = TaskRunner::new(
            Arc::new(FakeHost::default()),
            Arc::new(ScriptedPrompter::default()),
            sink,
        );
        let mut task = Task::new_root(Path::new("/tasks/t.json"), None);
        task.kind = TaskKind::Shell;
        task.shell_executable = "/bin/bash".to_string();
        task.command = Some("echo".to_string());
        task.args = vec!["hello world".to_string(), "a".to_string()];

        let plan = runner.plan(&task)?.expect("plan");
        assert_eq!(plan.program, "/bin/bash");
        assert_eq!(
            plan.argv,
            vec!["-c".to_string(), r#"echo \"hello world\" a"#.to_string()]
        );
        Ok(())
    }

    #[test]
    fn test_process_plan_keeps_args_verbatim() -> Result<()> {
        let sink = CollectingSink::new();
        let runner = TaskRunner::new(
            Arc::new(FakeHost::default()),
            Arc::new(ScriptedPrompter::default()),
            sink,
        );
        let task = process_task("echo", &["hello world", "a"]);

        let plan = runner.plan(&task)?.expect("plan");
        assert_eq!(plan.program, "echo");
        assert_eq!(plan.argv, vec!["hello world".to_string(), "a".to_string()]);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_emits_banners_and_output() -> Result<()> {
        let (runner, sink) = runner_with(FakeHost::default(), ScriptedPrompter::default());
        let task = process_task("echo", &["hello"]);

        let handle = runner.launch(&task).await?.expect("spawned");
        handle.wait().await;

        let text = sink.text();
        assert!(text.starts_with("[Task t started]\n"), "got: {text}");
        assert!(text.contains("hello\n"), "got: {text}");
        assert!(
            text.ends_with("\n[Task t finished with exit code 0]\n"),
            "got: {text}"
        );
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_overrides_reach_the_child() -> Result<()> {
        let (runner, sink) = runner_with(FakeHost::default(), ScriptedPrompter::default());
        let mut task = shell_task("echo value=$INKPAD_TEST_ENV");
        task.options_env = vec![("INKPAD_TEST_ENV".to_string(), "42".to_string())];

        let handle = runner.launch(&task).await?.expect("spawned");
        handle.wait().await;

        assert!(sink.text().contains("value=42"), "got: {}", sink.text());
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stderr_is_forwarded() -> Result<()> {
        let (runner, sink) = runner_with(FakeHost::default(), ScriptedPrompter::default());
        let task = shell_task("echo oops 1>&2");

        let handle = runner.launch(&task).await?.expect("spawned");
        handle.wait().await;

        assert!(sink.text().contains("oops\n"), "got: {}", sink.text());
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_question_reply_reaches_child_stdin() -> Result<()> {
        let (runner, sink) = runner_with(
            FakeHost::default(),
            ScriptedPrompter::with_answers(vec![Some(1)]),
        );
        // The joined command line escapes double quotes, so the control
        // line is written unquoted.
        let task = shell_task("echo ::show-question title=Q::Continue; read answer; echo got=$answer");

        let handle = runner.launch(&task).await?.expect("spawned");
        handle.wait().await;

        let text = sink.text();
        assert!(text.contains("got=1"), "got: {text}");
        assert!(!text.contains("show-question"), "got: {text}");
        Ok(())
    }

    #[tokio::test]
    async fn test_spawn_failure_emits_error_banner() {
        let (runner, sink) = runner_with(FakeHost::default(), ScriptedPrompter::default());
        let task = process_task("/nonexistent/program/for/sure", &[]);

        let result = runner.launch(&task).await;
        assert!(matches!(result, Err(Error::SpawnFailure(_))));
        assert!(sink.text().contains("error occurred"), "got: {}", sink.text());
    }
}
