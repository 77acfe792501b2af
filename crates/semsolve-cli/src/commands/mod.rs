//! Command dispatch and handler modules.

mod resolve;

use miette::Result;

use crate::cli::{Cli, Command};

/// Route a parsed CLI invocation to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Resolve {
            registry,
            requires,
            manifest,
            format,
            depth,
            why,
            max_passes,
            config,
        } => {
            let opts = resolve::ResolveOptions {
                registry,
                requires,
                manifest,
                format,
                depth,
                why,
                max_passes,
                config,
            };
            resolve::exec(&opts).await
        }
    }
}
