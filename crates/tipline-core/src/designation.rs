//! Journalist designation generation.
//!
//! A designation is the random "<adjective> <noun>" pseudonym journalists
//! see for a source, independent of the source's filesystem id. Generation
//! is pure; global uniqueness is enforced by the source factory via
//! retry-on-collision against the database.

use std::fs;
use std::path::Path;

use rand::rngs::OsRng;
use rand::seq::SliceRandom;

use crate::config::Config;
use crate::error::{Result, TiplineError};

/// Generates two-word display pseudonyms for sources.
pub struct DesignationGenerator {
    nouns: Vec<String>,
    adjectives: Vec<String>,
}

impl DesignationGenerator {
    /// Build a generator from noun and adjective word lists.
    ///
    /// # Errors
    ///
    /// Returns `TiplineError::InvalidWordList` if either list is empty or
    /// contains an empty string.
    pub fn new(nouns: Vec<String>, adjectives: Vec<String>) -> Result<Self> {
        if nouns.is_empty() {
            return Err(TiplineError::InvalidWordList(
                "Nouns word list is empty".to_string(),
            ));
        }
        if nouns.iter().any(String::is_empty) {
            return Err(TiplineError::InvalidWordList(
                "Nouns word list contains an empty string".to_string(),
            ));
        }

        if adjectives.is_empty() {
            return Err(TiplineError::InvalidWordList(
                "Adjectives word list is empty".to_string(),
            ));
        }
        if adjectives.iter().any(String::is_empty) {
            return Err(TiplineError::InvalidWordList(
                "Adjectives word list contains an empty string".to_string(),
            ));
        }

        Ok(Self { nouns, adjectives })
    }

    /// Build the generator from the configured nouns and adjectives files.
    pub fn from_config(config: &Config) -> Result<Self> {
        let nouns = read_word_list(&config.nouns_file)?;
        let adjectives = read_word_list(&config.adjectives_file)?;
        Self::new(nouns, adjectives)
    }

    /// Draw a designation uniformly at random.
    pub fn generate_journalist_designation(&self) -> String {
        let mut rng = OsRng;
        let adjective = self
            .adjectives
            .choose(&mut rng)
            .expect("adjectives validated non-empty at construction");
        let noun = self
            .nouns
            .choose(&mut rng)
            .expect("nouns validated non-empty at construction");
        format!("{} {}", adjective, noun)
    }

    /// Number of distinct designations this generator can produce.
    ///
    /// Used to document the collision retry bound in the source factory.
    pub fn combinations(&self) -> usize {
        self.nouns.len() * self.adjectives.len()
    }
}

fn read_word_list(path: &Path) -> Result<Vec<String>> {
    let contents = fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_generate_designation() {
        let generator = DesignationGenerator::new(
            words(&["tome", "harbor"]),
            words(&["quiet", "radiant"]),
        )
        .expect("generator should build");

        let designation = generator.generate_journalist_designation();
        let mut parts = designation.splitn(2, ' ');
        let adjective = parts.next().expect("designation should have an adjective");
        let noun = parts.next().expect("designation should have a noun");

        assert!(["quiet", "radiant"].contains(&adjective));
        assert!(["tome", "harbor"].contains(&noun));
        assert_eq!(generator.combinations(), 4);
    }

    #[test]
    fn test_empty_nouns_rejected() {
        let result = DesignationGenerator::new(vec![], words(&["quiet"]));
        assert!(matches!(result, Err(TiplineError::InvalidWordList(_))));
    }

    #[test]
    fn test_empty_adjectives_rejected() {
        let result = DesignationGenerator::new(words(&["tome"]), vec![]);
        assert!(matches!(result, Err(TiplineError::InvalidWordList(_))));
    }

    #[test]
    fn test_empty_string_entries_rejected() {
        let result = DesignationGenerator::new(words(&["tome", ""]), words(&["quiet"]));
        assert!(matches!(result, Err(TiplineError::InvalidWordList(_))));

        let result = DesignationGenerator::new(words(&["tome"]), words(&["", "quiet"]));
        assert!(matches!(result, Err(TiplineError::InvalidWordList(_))));
    }
}
