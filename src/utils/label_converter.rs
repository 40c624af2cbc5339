use std::collections::BTreeSet;

use indexmap::IndexSet;
use num_traits::PrimInt;
use unicode_normalization::UnicodeNormalization;

use super::string_utils::StringUtil;
use crate::error::CodecError;

/// Label 0, emitted by the network between characters.
pub const BLANK: &str = "";
pub const SPACE: &str = " ";
/// Stands in for glyphs the alphabet does not know.
pub const UNKNOWN: &str = "~";

const ASCII_SYMBOLS: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}";
const XSYMBOLS: &str = "€¢£»«›‹÷©®†‡°∙•◦‣¶§¡¿▪▫";
const GERMAN: &str = "ÄäÖöÜüß";
const FRENCH: &str = "ÀàÂâÆæÇçÉéÈèÊêËëÎîÏïÔôŒœÙùÛûÜüŸÿ";
const PORTUGUESE: &str = "ÁÃÌÍÒÓÕÚáãìíòóõú";

/// Bidirectional mapping between text and label sequences.
///
/// The alphabet always starts with the blank, the space and the unknown glyph,
/// followed by every other symbol sorted by code point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Codec {
    alphabet: IndexSet<String>,
}

impl Codec {
    /// Builds an alphabet from a set of characters. Control characters, the space
    /// and `~` are dropped from the set; the fixed prefix re-adds the latter two.
    pub fn new<I: IntoIterator<Item = char>>(chars: I) -> Self {
        let sorted: BTreeSet<char> = chars
            .into_iter()
            .filter(|&ch| ch > ' ' && ch != '~')
            .collect();

        let mut alphabet = IndexSet::with_capacity(sorted.len() + 3);
        for symbol in [BLANK, SPACE, UNKNOWN] {
            alphabet.insert(symbol.to_string());
        }
        alphabet.extend(sorted.into_iter().map(String::from));

        Self { alphabet }
    }

    /// Alphabet of every character seen in `texts` after NFKC normalization.
    pub fn from_transcripts<'a, I: IntoIterator<Item = &'a str>>(texts: I) -> Self {
        Self::new(texts.into_iter().flat_map(|text| text.nfkc()))
    }

    pub fn default_charset() -> Self {
        let alphanumeric = ('0'..='9').chain('A'..='Z').chain('a'..='z');
        let extra = [ASCII_SYMBOLS, XSYMBOLS, GERMAN, FRENCH, PORTUGUESE]
            .into_iter()
            .flat_map(str::chars);

        Self::new(alphanumeric.chain(extra))
    }

    /// Rebuilds a codec from a stored symbol list, keeping its order.
    pub fn from_charset(charset: Vec<String>) -> Result<Self, CodecError> {
        if charset.len() < 3 || charset[..3] != [BLANK, SPACE, UNKNOWN] {
            return Err(CodecError::BadPrefix(charset.into_iter().take(3).collect()));
        }

        let mut alphabet = IndexSet::with_capacity(charset.len());
        for symbol in charset {
            if alphabet.contains(&symbol) {
                return Err(CodecError::Duplicate(symbol));
            }
            alphabet.insert(symbol);
        }

        Ok(Self { alphabet })
    }

    pub fn len(&self) -> usize {
        self.alphabet.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alphabet.is_empty()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.alphabet.iter().map(String::as_str)
    }

    pub fn to_charset(&self) -> Vec<String> {
        self.alphabet.iter().cloned().collect()
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u32>, CodecError> {
        text.strs()
            .map(|symbol| {
                self.alphabet
                    .get_index_of(symbol)
                    .map(|idx| idx as u32)
                    .ok_or_else(|| CodecError::UnknownSymbol {
                        symbol: symbol.to_string(),
                    })
            })
            .collect()
    }

    pub fn decode<INT: PrimInt>(&self, labels: &[INT]) -> String {
        labels
            .iter()
            .map(|label| {
                label
                    .to_usize()
                    .and_then(|idx| self.alphabet.get_index(idx))
                    .map_or(UNKNOWN, String::as_str)
            })
            .collect()
    }

    /// Short rendering of the alphabet for the startup log.
    pub fn describe(&self) -> String {
        let joined: String = self.symbols().collect();
        if self.len() < 200 {
            return format!("[{joined}]");
        }

        let chars: Vec<char> = joined.chars().collect();
        let head: String = chars[..20].iter().collect();
        let tail: String = chars[chars.len() - 20..].iter().collect();
        format!("[{head} ... {tail}]")
    }
}
