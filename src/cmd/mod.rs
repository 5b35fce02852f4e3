//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to [`run`] or
//! [`validate`]. Each handler lives in its own submodule.

pub mod run;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::RelaycastError;

pub async fn dispatch(cli: Cli) -> Result<(), RelaycastError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Validate(ref args)) => validate::execute(args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  relaycast v{version}: HTTP request replication proxy\n\n  \
         No command provided. To get started:\n\n    \
         relaycast run -t http://a:9000,http://b:9000   Mirror traffic to two targets\n    \
         relaycast run                                  Start the proxy (auto-detects ./relaycast.yaml)\n    \
         relaycast validate relaycast.yaml              Check a config file\n    \
         relaycast --help                               See all commands and options\n"
    );
}
