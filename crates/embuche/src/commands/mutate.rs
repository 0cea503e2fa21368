//! Mutate command.

use std::path::Path;

use embuche::FileFormatOptions;
use tracing::{error, info};

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::terminal;

/// Handle the `mutate` command.
pub fn cmd_mutate(input: &Path, options: &FileFormatOptions, silent: bool) -> i32 {
    info!(input = %input.display(), "mutating");

    match embuche::process_file(input, options) {
        Ok(seed) => {
            if !silent {
                terminal::success(&format!("mutated {} (seed {seed})", input.display()));
            }
            EXIT_SUCCESS
        }
        Err(e) => {
            error!(error = %e, "mutation failed");
            terminal::error(&format!("{} left unchanged", input.display()));
            EXIT_FAILURE
        }
    }
}
