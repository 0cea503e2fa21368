use thiserror::Error;

/// Top-level errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("ELF error: {0}")]
    Elf(#[from] embuche_elf::ElfError),
    #[error("{0}")]
    Mutate(#[from] embuche_mutate::MutateError),
    #[error("{0}")]
    Pack(#[from] embuche_pack::PackError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to replace output file: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("Conflicting options: {0}")]
    ConflictingOptions(String),
}

pub type Result<T> = std::result::Result<T, Error>;
