//! Wordlist attack.
//!
//! Streams the wordlist line by line, skipping blank lines, and optionally
//! expands every word through [`rules::mutations`] and any extra catalogue
//! rules. A per-run set of already yielded values guarantees no candidate
//! repeats within one stream.
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use log::debug;

use super::rules::{self, Rule, RuleEngine};
use super::{AttackError, Candidates, StrategyInfo};
use crate::io::{DEFAULT_MMAP_THRESHOLD_BYTES, LineIter, iter_lines_auto};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dictionary {
    wordlist: PathBuf,
    apply_rules: bool,
    extra_rules: Vec<Rule>,
    mmap_threshold: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordlistStats {
    pub total_lines: usize,
    /// Distinct entries, compared case-insensitively.
    pub unique_entries: usize,
    pub duplicates: usize,
    pub min_length: usize,
    pub max_length: usize,
    pub file_size_bytes: u64,
}

impl Dictionary {
    pub fn new(wordlist: impl Into<PathBuf>, apply_rules: bool) -> Self {
        Self {
            wordlist: wordlist.into(),
            apply_rules,
            extra_rules: Vec::new(),
            mmap_threshold: DEFAULT_MMAP_THRESHOLD_BYTES,
        }
    }

    /// Catalogue rules applied to every word after the default mutations.
    /// Independent of `apply_rules`.
    pub fn with_extra_rules(mut self, rules: Vec<Rule>) -> Self {
        self.extra_rules = rules;
        self
    }

    pub fn extra_rules(&self) -> &[Rule] {
        &self.extra_rules
    }

    /// Override the file size above which the wordlist is memory-mapped.
    pub fn with_mmap_threshold(mut self, bytes: u64) -> Self {
        self.mmap_threshold = bytes;
        self
    }

    pub fn wordlist(&self) -> &Path {
        &self.wordlist
    }

    pub fn applies_rules(&self) -> bool {
        self.apply_rules
    }

    pub fn candidates(&self) -> Result<Candidates, AttackError> {
        if !self.wordlist.exists() {
            return Err(AttackError::WordlistNotFound(self.wordlist.clone()));
        }
        let lines = iter_lines_auto(&self.wordlist, self.mmap_threshold)?;
        debug!(
            "streaming wordlist {} (rules: {})",
            self.wordlist.display(),
            self.apply_rules
        );
        Ok(Box::new(WordStream {
            lines,
            wordlist: self.wordlist.clone(),
            apply_rules: self.apply_rules,
            catalogue: (!self.extra_rules.is_empty())
                .then(|| RuleEngine::new(self.extra_rules.clone())),
            seen: HashSet::new(),
            pending: VecDeque::new(),
            failed: false,
        }))
    }

    /// Scan the whole wordlist once and summarize it.
    pub fn wordlist_stats(&self) -> Result<WordlistStats, AttackError> {
        if !self.wordlist.exists() {
            return Err(AttackError::WordlistNotFound(self.wordlist.clone()));
        }
        let file_size_bytes = std::fs::metadata(&self.wordlist)
            .map_err(|e| read_error(&self.wordlist, e))?
            .len();
        let mut stats = WordlistStats {
            file_size_bytes,
            ..Default::default()
        };
        let mut unique: HashSet<String> = HashSet::new();
        let mut min_length = usize::MAX;
        for line in iter_lines_auto(&self.wordlist, self.mmap_threshold)? {
            let line = line.map_err(|e| read_error(&self.wordlist, e))?;
            let word = line.trim();
            if word.is_empty() {
                continue;
            }
            let len = word.chars().count();
            stats.total_lines += 1;
            min_length = min_length.min(len);
            stats.max_length = stats.max_length.max(len);
            unique.insert(word.to_lowercase());
        }
        stats.unique_entries = unique.len();
        stats.duplicates = stats.total_lines - stats.unique_entries;
        stats.min_length = if stats.total_lines == 0 { 0 } else { min_length };
        Ok(stats)
    }

    pub(crate) fn describe(&self, info: &mut StrategyInfo) {
        info.push("wordlist", self.wordlist.display());
        info.push("mutations", self.apply_rules);
        if !self.extra_rules.is_empty() {
            let names: Vec<&str> = self.extra_rules.iter().map(|r| r.name()).collect();
            info.push("extra rules", names.join(", "));
        }
    }
}

fn read_error(path: &Path, e: std::io::Error) -> AttackError {
    AttackError::Io(anyhow::Error::new(e).context(format!("read {}", path.display())))
}

struct WordStream {
    lines: LineIter,
    wordlist: PathBuf,
    apply_rules: bool,
    catalogue: Option<RuleEngine>,
    seen: HashSet<String>,
    pending: VecDeque<String>,
    failed: bool,
}

impl WordStream {
    fn offer(&mut self, candidate: String) {
        if !self.seen.contains(&candidate) {
            self.seen.insert(candidate.clone());
            self.pending.push_back(candidate);
        }
    }
}

impl Iterator for WordStream {
    type Item = Result<String, AttackError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(candidate) = self.pending.pop_front() {
                return Some(Ok(candidate));
            }
            if self.failed {
                return None;
            }
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.failed = true;
                    return Some(Err(read_error(&self.wordlist, e)));
                }
                None => {
                    if let Some(catalogue) = self.catalogue.take() {
                        let stats = catalogue.stats();
                        for count in &stats.per_rule {
                            debug!("rule {}: {} candidates", count.rule, count.generated);
                        }
                    }
                    return None;
                }
            };
            let word = line.trim();
            if word.is_empty() {
                continue;
            }
            let word = word.to_string();
            let mut variants = if self.apply_rules {
                rules::mutations(&word)
            } else {
                Vec::new()
            };
            if let Some(catalogue) = self.catalogue.as_mut() {
                variants.extend(catalogue.apply(&word));
            }
            self.offer(word);
            for variant in variants {
                self.offer(variant);
            }
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

    fn collect(d: &Dictionary) -> Vec<String> {
        d.candidates().unwrap().map(|c| c.unwrap()).collect()
    }

    #[test]
    fn without_rules_yields_deduplicated_lines_in_order() {
        let f = wordlist("alpha\n\n  beta \nalpha\ngamma\n\n");
        let words = collect(&Dictionary::new(f.path(), false));
        assert_eq!(words, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn with_rules_never_repeats_and_keeps_base_words() {
        let f = wordlist("password\nPassword\nadmin\npassword1\n");
        let words = collect(&Dictionary::new(f.path(), true));
        let unique: HashSet<&String> = words.iter().collect();
        assert_eq!(unique.len(), words.len());
        for base in ["password", "Password", "admin", "password1"] {
            assert!(words.iter().any(|w| w == base), "missing {base}");
        }
        assert!(words.iter().any(|w| w == "p@$$w0rd"));
        assert!(words.iter().any(|w| w == "123admin"));
        assert_eq!(words[0], "password");
        assert_eq!(words[1], "PASSWORD");
    }

    #[test]
    fn extra_rules_follow_default_mutations() {
        let f = wordlist("abc\n");
        let plain = Dictionary::new(f.path(), false)
            .with_extra_rules(vec![Rule::Reverse, Rule::Duplicate]);
        assert_eq!(collect(&plain), vec!["abc", "cba", "abcabc"]);

        let both = Dictionary::new(f.path(), true).with_extra_rules(vec![Rule::Reverse]);
        let words = collect(&both);
        assert_eq!(words.last().unwrap(), "cba");
        assert_eq!(words.iter().filter(|w| *w == "cba").count(), 1);

        let mut info = StrategyInfo::default();
        plain.describe(&mut info);
        assert_eq!(info.get("extra rules"), Some("reverse_word, duplicate_word"));
    }

    #[test]
    fn mmap_path_matches_buffered_path() {
        let f = wordlist("one\ntwo\r\nthree");
        let buffered = collect(&Dictionary::new(f.path(), false));
        let mapped = collect(&Dictionary::new(f.path(), false).with_mmap_threshold(1));
        assert_eq!(buffered, mapped);
        assert_eq!(mapped, vec!["one", "two", "three"]);
    }

    #[test]
    fn missing_wordlist_is_a_resource_error() {
        let d = Dictionary::new("/no/such/wordlist.txt", true);
        assert!(matches!(
            d.candidates(),
            Err(AttackError::WordlistNotFound(_))
        ));
    }

    #[test]
    fn stats_summarize_the_file() {
        let f = wordlist("abc\nABC\nlonger\n\nx\n");
        let stats = Dictionary::new(f.path(), false).wordlist_stats().unwrap();
        assert_eq!(stats.total_lines, 4);
        assert_eq!(stats.unique_entries, 3);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.min_length, 1);
        assert_eq!(stats.max_length, 6);
    }
}
