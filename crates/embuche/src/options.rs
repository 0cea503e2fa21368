use embuche_mutate::{DEFAULT_MAX_PERTURBATION, FabricateConfig};

use crate::{Error, Result};

/// One structural mutation of a file-format plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutation {
    RemoveSectionHeaders,
    FabricateSectionHeaders,
    ShuffleSymbols,
    FlipEndianness,
}

impl Mutation {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RemoveSectionHeaders => "remove section headers",
            Self::FabricateSectionHeaders => "fabricate section headers",
            Self::ShuffleSymbols => "shuffle dynamic symbols",
            Self::FlipEndianness => "flip endianness",
        }
    }
}

/// File-format obfuscation switches.
#[derive(Clone, Debug)]
pub struct FileFormatOptions {
    /// Flip the declared byte order in `e_ident`.
    pub endianness: bool,
    /// Zero the section header table fields of the file header.
    pub remove_section_header: bool,
    /// Publish code segments as `.data` and data segments as `.text`.
    pub flip_sections_flags: bool,
    /// Shift the fake `.data` start away from the entry point.
    pub hide_entry_point: bool,
    /// Swap `.dynsym` name offsets.
    pub mixing_symbols: bool,
    /// Seed for the mutations that draw random numbers. Drawn fresh when unset.
    pub seed: Option<u64>,
    /// Inclusive bound of the entry point shift.
    pub max_perturbation: u64,
}

impl Default for FileFormatOptions {
    fn default() -> Self {
        Self {
            endianness: false,
            remove_section_header: false,
            flip_sections_flags: false,
            hide_entry_point: false,
            mixing_symbols: false,
            seed: None,
            max_perturbation: DEFAULT_MAX_PERTURBATION,
        }
    }
}

impl FileFormatOptions {
    /// Create options with every mutation disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_endianness(mut self, enabled: bool) -> Self {
        self.endianness = enabled;
        self
    }

    #[must_use]
    pub const fn with_remove_section_header(mut self, enabled: bool) -> Self {
        self.remove_section_header = enabled;
        self
    }

    #[must_use]
    pub const fn with_flip_sections_flags(mut self, enabled: bool) -> Self {
        self.flip_sections_flags = enabled;
        self
    }

    #[must_use]
    pub const fn with_hide_entry_point(mut self, enabled: bool) -> Self {
        self.hide_entry_point = enabled;
        self
    }

    #[must_use]
    pub const fn with_mixing_symbols(mut self, enabled: bool) -> Self {
        self.mixing_symbols = enabled;
        self
    }

    /// Pin the random source, making the output reproducible.
    #[must_use]
    pub const fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub const fn with_max_perturbation(mut self, bound: u64) -> Self {
        self.max_perturbation = bound;
        self
    }

    #[must_use]
    pub const fn fabricate_config(&self) -> FabricateConfig {
        FabricateConfig {
            max_perturbation: self.max_perturbation,
        }
    }

    /// Order the enabled mutations so that each one's precondition holds.
    ///
    /// Removal comes first, then a single fabrication (shared by
    /// `flip_sections_flags` and `hide_entry_point`), then the symbol
    /// shuffle, and the endianness flip last since it changes how every
    /// later field would be read.
    ///
    /// # Errors
    ///
    /// Returns `ConflictingOptions` when a fabrication option is set without
    /// `remove_section_header`, or when `remove_section_header` and
    /// `mixing_symbols` are both set.
    pub fn plan(&self) -> Result<Vec<Mutation>> {
        let fabricate = self.flip_sections_flags || self.hide_entry_point;
        if fabricate && !self.remove_section_header {
            return Err(Error::ConflictingOptions(
                "flip_sections_flags and hide_entry_point require remove_section_header".into(),
            ));
        }
        if self.remove_section_header && self.mixing_symbols {
            return Err(Error::ConflictingOptions(
                "remove_section_header and mixing_symbols are mutually exclusive".into(),
            ));
        }

        let mut plan = Vec::new();
        if self.remove_section_header {
            plan.push(Mutation::RemoveSectionHeaders);
        }
        if fabricate {
            plan.push(Mutation::FabricateSectionHeaders);
        }
        if self.mixing_symbols {
            plan.push(Mutation::ShuffleSymbols);
        }
        if self.endianness {
            plan.push(Mutation::FlipEndianness);
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_plan() {
        assert!(FileFormatOptions::new().plan().unwrap().is_empty());
    }

    #[test]
    fn test_plan_order() {
        let options = FileFormatOptions::new()
            .with_endianness(true)
            .with_hide_entry_point(true)
            .with_flip_sections_flags(true)
            .with_remove_section_header(true);
        assert_eq!(
            options.plan().unwrap(),
            vec![
                Mutation::RemoveSectionHeaders,
                Mutation::FabricateSectionHeaders,
                Mutation::FlipEndianness,
            ]
        );

        let options = FileFormatOptions::new()
            .with_endianness(true)
            .with_mixing_symbols(true);
        assert_eq!(
            options.plan().unwrap(),
            vec![Mutation::ShuffleSymbols, Mutation::FlipEndianness]
        );
    }

    #[test]
    fn test_fabrication_requires_removal() {
        let err = FileFormatOptions::new()
            .with_flip_sections_flags(true)
            .plan()
            .unwrap_err();
        assert!(matches!(err, Error::ConflictingOptions(_)));

        let err = FileFormatOptions::new()
            .with_hide_entry_point(true)
            .plan()
            .unwrap_err();
        assert!(matches!(err, Error::ConflictingOptions(_)));
    }

    #[test]
    fn test_removal_excludes_shuffle() {
        let err = FileFormatOptions::new()
            .with_remove_section_header(true)
            .with_mixing_symbols(true)
            .plan()
            .unwrap_err();
        assert!(matches!(err, Error::ConflictingOptions(_)));
    }

    #[test]
    fn test_default_perturbation() {
        assert_eq!(FileFormatOptions::default().fabricate_config().max_perturbation, 250);
    }
}
