//! Hybrid attacks composing a wordlist with a mask.
//!
//! The mask space is materialized once per stream and spliced with every
//! dictionary word; the dictionary side never applies mutation rules except
//! in [`HybridMode::RulesBrute`], which runs a rules-enabled dictionary pass
//! and then falls back to plain brute force over the mask.
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use super::{AttackError, BruteForce, Candidates, Dictionary, StrategyInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HybridMode {
    /// `word + mask` for every mask value, then `mask + word`.
    DictionaryMask,
    /// `word + mask`, `mask + word` and the word inserted at the mask midpoint.
    MaskDictionary,
    /// Rules-enabled dictionary pass, then brute force over the mask.
    RulesBrute,
}

impl HybridMode {
    pub const ALL: [HybridMode; 3] = [
        HybridMode::DictionaryMask,
        HybridMode::MaskDictionary,
        HybridMode::RulesBrute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HybridMode::DictionaryMask => "dictionary_mask",
            HybridMode::MaskDictionary => "mask_dictionary",
            HybridMode::RulesBrute => "rules_brute",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            HybridMode::DictionaryMask => "Dictionary words combined with mask patterns",
            HybridMode::MaskDictionary => "Mask patterns combined with dictionary words",
            HybridMode::RulesBrute => "Dictionary rules followed by brute force",
        }
    }

    fn requires_mask(&self) -> bool {
        !matches!(self, HybridMode::RulesBrute)
    }
}

impl fmt::Display for HybridMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HybridMode {
    type Err = AttackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        HybridMode::ALL
            .into_iter()
            .find(|m| m.as_str() == normalized)
            .ok_or_else(|| AttackError::Configuration(format!("unknown hybrid mode: {s}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hybrid {
    wordlist: PathBuf,
    dictionary: Dictionary,
    brute_force: Option<BruteForce>,
    mode: HybridMode,
}

impl Hybrid {
    pub fn new(
        wordlist: impl Into<PathBuf>,
        mask: Option<&str>,
        mode: HybridMode,
    ) -> Result<Self, AttackError> {
        let wordlist = wordlist.into();
        let brute_force = mask
            .map(|m| BruteForce::new(m, None, None))
            .transpose()?;
        if mode.requires_mask() && brute_force.is_none() {
            return Err(AttackError::Configuration(format!(
                "mask required for {mode} hybrid mode"
            )));
        }
        Ok(Self {
            dictionary: Dictionary::new(wordlist.clone(), false),
            wordlist,
            brute_force,
            mode,
        })
    }

    pub fn mode(&self) -> HybridMode {
        self.mode
    }

    pub fn brute_force(&self) -> Option<&BruteForce> {
        self.brute_force.as_ref()
    }

    pub fn candidates(&self) -> Result<Candidates, AttackError> {
        match (self.mode, &self.brute_force) {
            (HybridMode::RulesBrute, brute) => {
                let words = Dictionary::new(self.wordlist.clone(), true).candidates()?;
                match brute {
                    Some(b) => Ok(Box::new(words.chain(b.candidates()))),
                    None => Ok(words),
                }
            }
            (mode, Some(brute)) => {
                // Open the wordlist first so a missing file fails before the
                // mask space is materialized.
                let words = self.dictionary.candidates()?;
                let masks: Arc<[String]> = brute.iter().collect::<Vec<_>>().into();
                Ok(Box::new(words.flat_map(move |word| -> Candidates {
                    match word {
                        Ok(word) => Box::new(Splice::new(mode, word, Arc::clone(&masks)).map(Ok)),
                        Err(e) => Box::new(std::iter::once(Err(e))),
                    }
                })))
            }
            (mode, None) => Err(AttackError::Configuration(format!(
                "mask required for {mode} hybrid mode"
            ))),
        }
    }

    pub(crate) fn describe(&self, info: &mut StrategyInfo) {
        info.push("hybrid_mode", self.mode);
        info.push("mode_description", self.mode.description());
        info.push("wordlist", self.wordlist.display());
        if let Some(b) = &self.brute_force {
            info.push("mask", b.mask().source());
            info.push("mask_combinations", b.total_combinations());
        }
    }
}

/// Candidates derived from one word and the materialized mask values.
struct Splice {
    mode: HybridMode,
    word: String,
    masks: Arc<[String]>,
    index: usize,
    pending: VecDeque<String>,
}

impl Splice {
    fn new(mode: HybridMode, word: String, masks: Arc<[String]>) -> Self {
        Self {
            mode,
            word,
            masks,
            index: 0,
            pending: VecDeque::new(),
        }
    }
}

impl Iterator for Splice {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let n = self.masks.len();
        match self.mode {
            HybridMode::DictionaryMask => {
                let i = self.index;
                if i >= 2 * n {
                    return None;
                }
                self.index += 1;
                Some(if i < n {
                    format!("{}{}", self.word, self.masks[i])
                } else {
                    format!("{}{}", self.masks[i - n], self.word)
                })
            }
            _ => loop {
                if let Some(next) = self.pending.pop_front() {
                    return Some(next);
                }
                let m = self.masks.get(self.index)?;
                self.index += 1;
                let len = m.chars().count();
                if len <= 1 {
                    continue;
                }
                self.pending.push_back(format!("{}{}", self.word, m));
                self.pending.push_back(format!("{}{}", m, self.word));
                if len > 2 {
                    let mid = m
                        .char_indices()
                        .nth(len / 2)
                        .map_or(m.len(), |(byte, _)| byte);
                    self.pending
                        .push_back(format!("{}{}{}", &m[..mid], self.word, &m[mid..]));
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn wordlist(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    fn collect(h: &Hybrid) -> Vec<String> {
        h.candidates().unwrap().map(|c| c.unwrap()).collect()
    }

    #[test]
    fn dictionary_mask_appends_then_prepends() {
        let f = wordlist("ab\n");
        let h = Hybrid::new(f.path(), Some("?d?d"), HybridMode::DictionaryMask).unwrap();
        let all = collect(&h);
        assert_eq!(all.len(), 200);
        assert_eq!(all[0], "ab00");
        assert_eq!(all[99], "ab99");
        assert_eq!(all[100], "00ab");
        assert_eq!(all[199], "99ab");
    }

    #[test]
    fn dictionary_mask_cardinality_scales_with_words() {
        let f = wordlist("a\nb\na\nc\n");
        let h = Hybrid::new(f.path(), Some("?b"), HybridMode::DictionaryMask).unwrap();
        // Three distinct words, two mask values, two orderings.
        assert_eq!(collect(&h).len(), 2 * 3 * 2);
    }

    #[test]
    fn mask_dictionary_inserts_at_midpoint() {
        let f = wordlist("W\n");
        let h = Hybrid::new(f.path(), Some("?b?b?b"), HybridMode::MaskDictionary).unwrap();
        let all = collect(&h);
        assert_eq!(all.len(), 8 * 3);
        assert_eq!(&all[..3], &["W000", "000W", "0W00"]);

        let h = Hybrid::new(f.path(), Some("?b?b"), HybridMode::MaskDictionary).unwrap();
        let all = collect(&h);
        assert_eq!(all.len(), 4 * 2);
        assert_eq!(&all[..2], &["W00", "00W"]);
    }

    #[test]
    fn mask_dictionary_skips_single_character_masks() {
        let f = wordlist("word\n");
        let h = Hybrid::new(f.path(), Some("?d"), HybridMode::MaskDictionary).unwrap();
        assert!(collect(&h).is_empty());
    }

    #[test]
    fn rules_brute_runs_rules_then_mask() {
        let f = wordlist("cat\n");
        let h = Hybrid::new(f.path(), Some("?d"), HybridMode::RulesBrute).unwrap();
        let all = collect(&h);
        assert_eq!(all[0], "cat");
        assert!(all.iter().any(|c| c == "Cat"));
        assert_eq!(&all[all.len() - 10..], &["0", "1", "2", "3", "4", "5", "6", "7", "8", "9"]);

        let h = Hybrid::new(f.path(), None, HybridMode::RulesBrute).unwrap();
        // cat, CAT, Cat, seven suffixes, three prefixes, c@7, seven symbols.
        assert_eq!(collect(&h).len(), 21);
    }

    #[test]
    fn mask_modes_require_a_mask() {
        for mode in [HybridMode::DictionaryMask, HybridMode::MaskDictionary] {
            assert!(matches!(
                Hybrid::new("words.txt", None, mode),
                Err(AttackError::Configuration(_))
            ));
        }
    }

    #[test]
    fn parses_mode_names() {
        assert_eq!(
            "mask-dictionary".parse::<HybridMode>().unwrap(),
            HybridMode::MaskDictionary
        );
        assert!("sideways".parse::<HybridMode>().is_err());
    }
}
