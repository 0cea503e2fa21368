//! Command implementations.
//!
//! Each submodule handles a specific CLI command or group of commands.

mod inspect;
mod mutate;
mod pack;

use crate::cli::{Cli, Commands};

/// Dispatch CLI command to the appropriate handler.
pub fn run_command(cli: &Cli) -> i32 {
    match &cli.command {
        Commands::Mutate { input, options } => {
            mutate::cmd_mutate(input, &options.to_options(), cli.silent)
        }
        Commands::Size { program } => pack::cmd_size(program),
        Commands::Pack {
            loader,
            program,
            output,
        } => pack::cmd_pack(loader, program, output, cli.silent),
        Commands::Unpack { input, output } => {
            pack::cmd_unpack(input, output.as_deref(), cli.silent)
        }
        Commands::Inspect { input } => inspect::cmd_inspect(input),
    }
}
