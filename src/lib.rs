//! Relaycast is an HTTP request replication proxy.
//!
//! Every inbound request is buffered once to a scratch file and replayed
//! concurrently to an ordered list of targets. The first target is the
//! primary: its response is relayed to the caller. The rest are
//! secondaries whose outcomes are logged and discarded. The buffer lives
//! until the last delivery finishes, and shutdown waits for in-flight
//! broadcasts to drain.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, validate).
//! - [`config`] -- Configuration loading and validation via the
//!   [`ConfigSource`](config::ConfigSource) trait.
//! - [`target`] -- Target descriptors and their query-string override directives.
//! - [`buffer`] -- Scratch-file storage of inbound request bodies.
//! - [`proxy`] -- The broadcast coordinator, per-target dispatch, header merge
//!   and delivery completion tracking.
//! - [`drain`] -- In-flight broadcast counting for graceful shutdown.
//! - [`ids`] -- Request id generation.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`server`] -- Axum server setup, shared application state, HTTP client, and
//!   graceful shutdown.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `json` | JSON config file support |
//! | `toml` | TOML config file support |
//! | `file-backends` | All file format backends |

// Binary crate — public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod buffer;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod drain;
pub mod error;
pub mod ids;
pub mod logging;
pub mod proxy;
pub mod server;
pub mod target;
