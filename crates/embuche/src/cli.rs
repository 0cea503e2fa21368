//! CLI definitions and argument types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use embuche::{DEFAULT_MAX_PERTURBATION, FileFormatOptions};

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "embuche")]
#[command(about = "ELF64 anti-analysis mutations and content-addressed packer")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (sets RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rewrite an ELF file in place with the selected mutations
    Mutate {
        /// ELF file to rewrite
        #[arg(value_name = "ELF")]
        input: PathBuf,

        #[command(flatten)]
        options: MutateArgs,
    },
    /// Print the size to reserve for the packed program (no trailing newline)
    Size {
        /// Program that will be packed
        #[arg(value_name = "PROGRAM")]
        program: PathBuf,
    },
    /// Encrypt a program into a loader's reserved section
    Pack {
        /// Linked loader with `.text` and a sized `.fini.` section
        #[arg(value_name = "LOADER")]
        loader: PathBuf,

        /// Program to embed
        #[arg(value_name = "PROGRAM")]
        program: PathBuf,

        /// Packed binary to write
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
    },
    /// Decrypt the program embedded in a packed binary
    Unpack {
        /// Packed binary
        #[arg(value_name = "PACKED")]
        input: PathBuf,

        /// Write the recovered program here instead of only checking it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the headers, segments and sections a disassembler would see
    Inspect {
        /// ELF file to describe
        #[arg(value_name = "ELF")]
        input: PathBuf,
    },
}

/// File-format mutation flags.
#[derive(Args, Clone, Debug)]
pub struct MutateArgs {
    /// Flip the declared byte order
    #[arg(long)]
    pub endianness: bool,

    /// Zero the section header table fields
    #[arg(long)]
    pub remove_section_header: bool,

    /// Map code segments as .data and data segments as .text
    #[arg(long)]
    pub flip_sections_flags: bool,

    /// Shift the fake .data start away from the entry point
    #[arg(long)]
    pub hide_entry_point: bool,

    /// Swap dynamic symbol names
    #[arg(long)]
    pub mixing_symbols: bool,

    /// Seed for the random choices (random if unset)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Largest entry point shift in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_PERTURBATION)]
    pub max_perturbation: u64,
}

impl MutateArgs {
    pub const fn to_options(&self) -> FileFormatOptions {
        FileFormatOptions {
            endianness: self.endianness,
            remove_section_header: self.remove_section_header,
            flip_sections_flags: self.flip_sections_flags,
            hide_entry_point: self.hide_entry_point,
            mixing_symbols: self.mixing_symbols,
            seed: self.seed,
            max_perturbation: self.max_perturbation,
        }
    }
}
