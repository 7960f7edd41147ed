//! Coder options: coding mode, fidelity, string table bounds.
//!
//! Options are fixed for the duration of one run; both coder halves read them
//! at `init_for_each_run` and never change them mid-document.
//!
//! # Beispiel
//!
//! ```
//! use exi_stream::options::{CodingMode, ExiOptions, Preserve};
//!
//! let opts = ExiOptions::default()
//!     .with_coding_mode(CodingMode::BytePacked)
//!     .with_preserve(Preserve { comments: true, ..Preserve::default() })
//!     .with_value_max_length(64);
//!
//! assert_eq!(opts.coding_mode(), CodingMode::BytePacked);
//! assert!(opts.preserve().comments);
//! assert_eq!(opts.value_max_length(), Some(64));
//! ```

use crate::{Error, Result};

/// Wire alignment of event codes and content items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodingMode {
    /// Bits are packed without padding (default).
    #[default]
    BitPacked,
    /// Every n-bit unsigned integer occupies whole bytes.
    BytePacked,
}

/// Memory profile of a coder instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    /// Undeclared element names get their own runtime-learned grammar.
    #[default]
    Default,
    /// Undeclared element names share the grammar's ur-type rule; nothing is
    /// learned at runtime.
    UltraConstrained,
}

/// Fidelity options: which information items survive the round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Preserve {
    /// CM events can be preserved.
    pub comments: bool,
    /// PI events can be preserved.
    pub pis: bool,
    /// DT and ER events can be preserved.
    pub dtd: bool,
    /// NS events and namespace prefixes can be preserved.
    pub prefixes: bool,
    /// Values are coded as strings instead of their typed representation.
    pub lexical_values: bool,
}

/// Options controlling one coder instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExiOptions {
    pub(crate) coding_mode: CodingMode,
    pub(crate) strict: bool,
    pub(crate) fragment: bool,
    pub(crate) preserve: Preserve,
    pub(crate) profile: Profile,
    pub(crate) value_max_length: Option<u32>,
    pub(crate) value_partition_capacity: Option<u32>,
}

impl Default for ExiOptions {
    fn default() -> Self {
        Self {
            coding_mode: CodingMode::BitPacked,
            strict: false,
            fragment: false,
            preserve: Preserve::default(),
            profile: Profile::Default,
            value_max_length: None,
            value_partition_capacity: None,
        }
    }
}

impl ExiOptions {
    // --- Getter ---

    /// Wire alignment.
    pub fn coding_mode(&self) -> CodingMode { self.coding_mode }
    /// Strict interpretation of schema-informed grammars.
    pub fn strict(&self) -> bool { self.strict }
    /// Body is coded as a fragment (multiple root elements allowed).
    pub fn fragment(&self) -> bool { self.fragment }
    /// Fidelity options.
    pub fn preserve(&self) -> &Preserve { &self.preserve }
    /// Memory profile.
    pub fn profile(&self) -> Profile { self.profile }
    /// Maximum character length of a value added to the string table (`None` = unbounded).
    pub fn value_max_length(&self) -> Option<u32> { self.value_max_length }
    /// Capacity of the global value partition (`None` = unbounded, `Some(0)` = disabled).
    pub fn value_partition_capacity(&self) -> Option<u32> { self.value_partition_capacity }

    // --- Builder-Setter (Fluent API) ---

    /// Setzt den Coding-Mode.
    pub fn with_coding_mode(mut self, mode: CodingMode) -> Self { self.coding_mode = mode; self }
    /// Aktiviert Strict-Modus.
    pub fn with_strict(mut self) -> Self { self.strict = true; self }
    /// Aktiviert Fragment-Modus.
    pub fn with_fragment(mut self) -> Self { self.fragment = true; self }
    /// Setzt die Preserve-Optionen.
    pub fn with_preserve(mut self, preserve: Preserve) -> Self { self.preserve = preserve; self }
    /// Setzt das Speicherprofil.
    pub fn with_profile(mut self, profile: Profile) -> Self { self.profile = profile; self }
    /// Setzt das Value-Max-Length-Limit.
    pub fn with_value_max_length(mut self, len: u32) -> Self {
        self.value_max_length = Some(len);
        self
    }
    /// Setzt die Value-Partition-Capacity.
    pub fn with_value_partition_capacity(mut self, cap: u32) -> Self {
        self.value_partition_capacity = Some(cap);
        self
    }

    // --- Mutable Setter ---

    /// Setzt den Coding-Mode.
    pub fn set_coding_mode(&mut self, mode: CodingMode) { self.coding_mode = mode; }
    /// Setzt Strict-Modus.
    pub fn set_strict(&mut self, val: bool) { self.strict = val; }
    /// Setzt Fragment-Modus.
    pub fn set_fragment(&mut self, val: bool) { self.fragment = val; }
    /// Setzt die Preserve-Optionen.
    pub fn set_preserve(&mut self, preserve: Preserve) { self.preserve = preserve; }
    /// Setzt das Speicherprofil.
    pub fn set_profile(&mut self, profile: Profile) { self.profile = profile; }
    /// Setzt das Value-Max-Length-Limit.
    pub fn set_value_max_length(&mut self, len: Option<u32>) { self.value_max_length = len; }
    /// Setzt die Value-Partition-Capacity.
    pub fn set_value_partition_capacity(&mut self, cap: Option<u32>) {
        self.value_partition_capacity = cap;
    }

    /// Validates the option combination.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidOptionCombination` if `strict` is set together
    /// with any of `preserve.comments`, `preserve.pis`, `preserve.dtd` or
    /// `preserve.prefixes` (strict grammars have no productions for them).
    pub fn validate(&self) -> Result<()> {
        let incompatible_with_strict = self.preserve.comments
            || self.preserve.pis
            || self.preserve.dtd
            || self.preserve.prefixes;

        if self.strict && incompatible_with_strict {
            return Err(Error::InvalidOptionCombination);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = ExiOptions::default();
        assert_eq!(opts.coding_mode(), CodingMode::BitPacked);
        assert!(!opts.strict());
        assert!(!opts.fragment());
        assert_eq!(*opts.preserve(), Preserve::default());
        assert_eq!(opts.profile(), Profile::Default);
        assert_eq!(opts.value_max_length(), None);
        assert_eq!(opts.value_partition_capacity(), None);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn builder_und_setter_konsistent() {
        let built = ExiOptions::default()
            .with_coding_mode(CodingMode::BytePacked)
            .with_fragment()
            .with_profile(Profile::UltraConstrained)
            .with_value_partition_capacity(0);

        let mut set = ExiOptions::default();
        set.set_coding_mode(CodingMode::BytePacked);
        set.set_fragment(true);
        set.set_profile(Profile::UltraConstrained);
        set.set_value_partition_capacity(Some(0));

        assert_eq!(built, set);
    }

    #[test]
    fn strict_with_lexical_values_is_valid() {
        let opts = ExiOptions::default()
            .with_strict()
            .with_preserve(Preserve { lexical_values: true, ..Preserve::default() });
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn strict_rejects_fidelity_options() {
        let cases = [
            Preserve { comments: true, ..Preserve::default() },
            Preserve { pis: true, ..Preserve::default() },
            Preserve { dtd: true, ..Preserve::default() },
            Preserve { prefixes: true, ..Preserve::default() },
        ];
        for preserve in cases {
            let opts = ExiOptions::default().with_strict().with_preserve(preserve);
            assert_eq!(opts.validate(), Err(Error::InvalidOptionCombination), "{preserve:?}");
        }
    }
}
