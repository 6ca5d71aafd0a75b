//! Diceware passphrase generation.
//!
//! A source's passphrase is their sole credential: it must be generated
//! from a validated word list with enough entropy, and it must never be
//! persisted. Word lists are validated eagerly at construction so that a
//! bad deployment fails at startup instead of quietly generating unsafe
//! passphrases later.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::Config;
use crate::error::{Result, TiplineError};

/// Number of words drawn for each passphrase.
pub const PASSPHRASE_WORDS_COUNT: usize = 7;

/// Upper bound on generated passphrase length, to avoid DoS via scrypt.
pub const MAX_PASSPHRASE_LENGTH: usize = 128;

/// Lower bound on generated passphrase length.
pub const MIN_PASSPHRASE_LENGTH: usize = 20;

/// Minimum number of usable words in any word list.
///
/// 7300^7 is just over 2^89 possible passphrases, the floor the original
/// deployment required.
const WORD_LIST_MINIMUM_SIZE: usize = 7300;

/// Minimum word length kept when parsing a word list file.
const WORD_MINIMUM_LENGTH: usize = 2;

/// A space-joined sequence of words drawn from a validated word list.
///
/// Zeroized on drop; the `Debug` impl redacts the contents. The passphrase
/// is the source's only credential and must never reach durable storage or
/// logs.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DicewarePassphrase(String);

impl DicewarePassphrase {
    /// Wrap a user-supplied passphrase, e.g. from a login form.
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self(passphrase.into())
    }

    /// Borrow the passphrase for immediate use (derivation, display to the
    /// source at generation time). Avoid storing or logging this value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for DicewarePassphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DicewarePassphrase")
            .field(&"[REDACTED]")
            .finish()
    }
}

/// Generates diceware passphrases from per-language word lists.
pub struct PassphraseGenerator {
    language_to_words: HashMap<String, Vec<String>>,
    fallback_language: String,
}

impl PassphraseGenerator {
    /// Build a generator, validating every word list eagerly.
    ///
    /// # Errors
    ///
    /// Returns `TiplineError::InvalidWordList` if:
    /// - The fallback language has no word list
    /// - Any list has fewer than 7300 usable words
    /// - Any list contains non-ASCII words
    /// - Word length extremes allow passphrases outside [20, 128] chars
    pub fn new(
        language_to_words: HashMap<String, Vec<String>>,
        fallback_language: impl Into<String>,
    ) -> Result<Self> {
        let fallback_language = fallback_language.into();
        if !language_to_words.contains_key(&fallback_language) {
            return Err(TiplineError::InvalidWordList(format!(
                "Missing word list for fallback language '{}'",
                fallback_language
            )));
        }

        for (language, word_list) in &language_to_words {
            if word_list.len() < WORD_LIST_MINIMUM_SIZE {
                return Err(TiplineError::InvalidWordList(format!(
                    "The word list for language '{}' only contains {} long-enough words; \
                     minimum required is {} words",
                    language,
                    word_list.len(),
                    WORD_LIST_MINIMUM_SIZE
                )));
            }

            if word_list.iter().any(|word| !word.is_ascii()) {
                return Err(TiplineError::InvalidWordList(format!(
                    "The word list for language '{}' contains non-ASCII words",
                    language
                )));
            }

            // A passphrase is WORDS_COUNT words plus the spaces between
            // them; check both length extremes against the allowed range.
            let longest_word = word_list
                .iter()
                .map(|word| word.len())
                .max()
                .unwrap_or_default();
            let longest_passphrase =
                longest_word * PASSPHRASE_WORDS_COUNT + PASSPHRASE_WORDS_COUNT;
            if longest_passphrase >= MAX_PASSPHRASE_LENGTH {
                return Err(TiplineError::InvalidWordList(format!(
                    "Passphrases over the maximum length ({}) may be generated from the \
                     word list for language '{}'",
                    MAX_PASSPHRASE_LENGTH, language
                )));
            }

            let shortest_word = word_list
                .iter()
                .map(|word| word.len())
                .min()
                .unwrap_or_default();
            let shortest_passphrase =
                shortest_word * PASSPHRASE_WORDS_COUNT + PASSPHRASE_WORDS_COUNT;
            if shortest_passphrase <= MIN_PASSPHRASE_LENGTH {
                return Err(TiplineError::InvalidWordList(format!(
                    "Passphrases under the minimum length ({}) may be generated from the \
                     word list for language '{}'",
                    MIN_PASSPHRASE_LENGTH, language
                )));
            }
        }

        Ok(Self {
            language_to_words,
            fallback_language,
        })
    }

    /// Build the generator from the configured word lists directory, with
    /// English as the fallback language.
    pub fn from_config(config: &Config) -> Result<Self> {
        let language_to_words = load_wordlists(&config.wordlists_dir)?;
        Self::new(language_to_words, "en")
    }

    /// Languages for which a word list is available, sorted.
    pub fn available_languages(&self) -> Vec<&str> {
        let mut languages: Vec<&str> = self
            .language_to_words
            .keys()
            .map(String::as_str)
            .collect();
        languages.sort_unstable();
        languages
    }

    /// Draw a new 7-word passphrase, uniformly at random from the word list
    /// for `preferred_language`, falling back to the default language if no
    /// list exists for it.
    pub fn generate_passphrase(&self, preferred_language: Option<&str>) -> DicewarePassphrase {
        let word_list = preferred_language
            .and_then(|language| self.language_to_words.get(language))
            .unwrap_or_else(|| &self.language_to_words[&self.fallback_language]);

        let mut rng = OsRng;
        let words: Vec<&str> = (0..PASSPHRASE_WORDS_COUNT)
            .map(|_| {
                word_list
                    .choose(&mut rng)
                    .expect("word list validated non-empty at construction")
                    .as_str()
            })
            .collect();
        DicewarePassphrase(words.join(" "))
    }
}

/// Parse every `<language>.txt` file in `dir` as a word list, dropping
/// words that are too short to contribute meaningful entropy.
pub fn load_wordlists(dir: &Path) -> Result<HashMap<String, Vec<String>>> {
    let mut language_to_words = HashMap::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("txt") {
            continue;
        }
        let Some(language) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };

        let contents = fs::read_to_string(&path)?;
        let words: Vec<String> = contents
            .lines()
            .map(str::trim)
            .filter(|word| word.len() >= WORD_MINIMUM_LENGTH)
            .map(str::to_string)
            .collect();
        language_to_words.insert(language.to_string(), words);
    }

    Ok(language_to_words)
}
