//! User-defined task runner at the core of the inkpad note-taking
//! application.
//!
//! A *task* is a JSON-declared invocation of an external command: the
//! program (or shell command line), its arguments, environment, working
//! directory, and the interactive inputs to solicit before launch. Tasks
//! are discovered from several search roots, hot-reloaded when their files
//! change, and may embed `${...}` variable references that are expanded
//! against live host state immediately before launch.
//!
//! The embedding application provides host state and dialog rendering via
//! the [`HostBridge`] and [`Prompter`] traits and observes child output via
//! [`OutputSink`].

mod control;
mod decode;
mod error;
mod host;
mod loader;
mod registry;
mod runner;
mod shells;
mod task;
mod variables;

#[cfg(test)]
pub(crate) mod testfx;

pub use decode::decode_bytes;
pub use error::Error;
pub use host::{HostBridge, MessageKind, Prompter, Workspace};
pub use loader::load_task_file;
pub use registry::{RegistryConfig, TaskRegistry, RECOGNIZED_CONFIG_IDENTITY};
pub use runner::{OutputSink, TaskHandle, TaskRunner};
pub use task::{Input, InputKind, Task, TaskKind, LATEST_VERSION};
pub use variables::Expander;
