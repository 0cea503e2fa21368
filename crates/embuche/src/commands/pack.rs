//! Size, pack and unpack commands.

use std::io::{self, Write};
use std::path::Path;

use embuche::io::{permissions_of, write_atomic};
use tracing::error;

use crate::cli::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::terminal;

/// Handle the `size` command.
///
/// Prints the bare number; the build captures it as-is.
pub fn cmd_size(program: &Path) -> i32 {
    match embuche::estimate_packed_size(program) {
        Ok(size) => {
            print!("{size}");
            let _ = io::stdout().flush();
            EXIT_SUCCESS
        }
        Err(e) => {
            error!(error = %e, program = %program.display(), "cannot size program");
            EXIT_FAILURE
        }
    }
}

/// Handle the `pack` command.
pub fn cmd_pack(loader: &Path, program: &Path, output: &Path, silent: bool) -> i32 {
    match embuche::pack_file(loader, program, output) {
        Ok(packed) => {
            if !silent {
                terminal::success(&format!(
                    "packed {} (.text sha256 {})",
                    program.display(),
                    hex::encode(packed.text_digest())
                ));
                terminal::path_output(output);
            }
            EXIT_SUCCESS
        }
        Err(e) => {
            error!(error = %e, "packing failed");
            terminal::error("no output written");
            EXIT_FAILURE
        }
    }
}

/// Handle the `unpack` command.
pub fn cmd_unpack(input: &Path, output: Option<&Path>, silent: bool) -> i32 {
    let program = match embuche::unpack_file(input) {
        Ok(program) => program,
        Err(e) => {
            error!(error = %e, input = %input.display(), "decryption failed");
            return EXIT_FAILURE;
        }
    };

    if let Some(output) = output {
        let written = permissions_of(input)
            .and_then(|mode| write_atomic(output, &program, Some(mode)));
        if let Err(e) = written {
            error!(error = %e, output = %output.display(), "cannot write program");
            return EXIT_FAILURE;
        }
    }
    if !silent {
        terminal::success(&format!("recovered {} bytes", program.len()));
        if let Some(output) = output {
            terminal::path_output(output);
        } else {
            terminal::warning("no output path given, program not written");
        }
    }
    EXIT_SUCCESS
}
