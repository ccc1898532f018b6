use clap::ValueEnum;
use unicode_normalization::UnicodeNormalization;
use zhconv::{zhconv, Variant};

/// How file stems are rewritten before matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Normalizer {
    /// Leave names untouched
    None,
    /// Compose decomposed unicode (NFC)
    Nfc,
    /// NFC, then fold Traditional Chinese to Simplified
    #[default]
    Simplified,
    /// Transliterate to plain ASCII
    Ascii,
}

impl Normalizer {
    pub fn apply(self, name: &str) -> String {
        match self {
            Normalizer::None => name.to_owned(),
            Normalizer::Nfc => name.nfc().collect(),
            Normalizer::Simplified => {
                let composed: String = name.nfc().collect();
                zhconv(&composed, Variant::ZhHans)
            }
            Normalizer::Ascii => deunicode::deunicode_with_tofu(name, "_"),
        }
    }
}
