//! Per-translation-unit configuration, read off global compiler flags in
//! most C toolchains; here it is an explicit struct passed by reference into
//! the driver rather than reaching for globals.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationConfig {
    /// Enables the incomplete-type-substitute pointer arithmetic of §4.3
    /// and GNU-inline duplication of §4.6.
    pub gnu_extensions: bool,
    /// Emits a single `CHAR` filler typeentry for empty structs.
    pub empty_structs: bool,
    pub char_is_signed: bool,
    pub bitfield_storage_unit_bits: u32,
    pub gnu_inline_semantics: bool,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        TranslationConfig {
            gnu_extensions: true,
            empty_structs: true,
            char_is_signed: true,
            bitfield_storage_unit_bits: 32,
            gnu_inline_semantics: true,
        }
    }
}
