//! Word mutation rules applied by dictionary attacks.
//!
//! [`mutations`] is the fixed default set: case variants, numeric suffixes
//! and prefixes, one full-word leetspeak substitution, and symbol suffixes.
//! On top of it, [`Rule`] is a catalogue of named rules that can be selected
//! individually and run through a [`RuleEngine`], which keeps per-rule
//! counts.
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use super::AttackError;

pub const NUMERIC_SUFFIXES: &[&str] = &["1", "12", "123", "1234", "2023", "2024", "2025"];
pub const NUMERIC_PREFIXES: &[&str] = &["1", "12", "123"];
pub const SYMBOL_SUFFIXES: &[char] = &['!', '@', '#', '$', '%', '&', '*'];

/// Case-insensitive leetspeak translation, built once per process.
pub static LEET_TABLE: LazyLock<HashMap<char, char>> = LazyLock::new(|| {
    let pairs = [
        ('a', '@'),
        ('e', '3'),
        ('i', '1'),
        ('o', '0'),
        ('s', '$'),
        ('t', '7'),
        ('l', '1'),
    ];
    pairs
        .iter()
        .flat_map(|&(from, to)| [(from, to), (from.to_ascii_uppercase(), to)])
        .collect()
});

/// Substitute every mapped character at once.
pub fn leetspeak(word: &str) -> String {
    word.chars()
        .map(|c| LEET_TABLE.get(&c).copied().unwrap_or(c))
        .collect()
}

/// First character uppercased, the rest lowercased.
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Every mutation of `word`, in rule order. May contain repeats (for example
/// when `word` is already lowercase); callers deduplicate.
pub fn mutations(word: &str) -> Vec<String> {
    let mut out = Vec::with_capacity(
        3 + NUMERIC_SUFFIXES.len() + NUMERIC_PREFIXES.len() + 1 + SYMBOL_SUFFIXES.len(),
    );
    out.push(word.to_lowercase());
    out.push(word.to_uppercase());
    out.push(capitalize(word));
    for suffix in NUMERIC_SUFFIXES {
        out.push(format!("{word}{suffix}"));
    }
    for prefix in NUMERIC_PREFIXES {
        out.push(format!("{prefix}{word}"));
    }
    let leet = leetspeak(word);
    if leet != word {
        out.push(leet);
    }
    for symbol in SYMBOL_SUFFIXES {
        out.push(format!("{word}{symbol}"));
    }
    out
}

/// Numbers appended or prepended by the catalogue rules.
pub const COMMON_NUMBERS: &[&str] = &[
    "1", "12", "123", "1234", "12345", "123456", "2023", "2024", "2025", "2022", "2021", "01",
    "02", "03", "04", "05", "06", "07", "08", "09", "10", "11", "22", "33", "44", "55", "66",
    "77", "88", "99", "00",
];

pub const COMMON_SYMBOLS: &[char] = &[
    '!', '@', '#', '$', '%', '&', '*', '(', ')', '-', '_', '+', '=', '[', ']', '{', '}', '|',
    ':', ';', '"', '\'', '<', '>', ',', '.', '?', '/',
];

pub const KEYBOARD_PATTERNS: &[&str] = &[
    "qwerty",
    "asdf",
    "zxcv",
    "qwertyuiop",
    "asdfghjkl",
    "zxcvbnm",
    "123456",
    "123456789",
    "qwerty123",
    "asdf123",
];

/// Lowercase source letters and every substitute for them.
const LEET_VARIANTS: &[(char, &[char])] = &[
    ('a', &['@', '4']),
    ('b', &['8', '6']),
    ('c', &['(', '[']),
    ('e', &['3']),
    ('g', &['9', '6']),
    ('h', &['#']),
    ('i', &['!', '1']),
    ('l', &['1']),
    ('o', &['0']),
    ('s', &['$', '5']),
    ('t', &['7']),
    ('z', &['2']),
];

const VOWELS: &str = "aeiouAEIOU";

/// A named mutation rule from the catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Rule {
    AppendNumbers,
    PrependNumbers,
    AppendSymbols,
    PrependSymbols,
    CapitalizeVariations,
    LeetspeakVariations,
    Reverse,
    Duplicate,
    ToggleCase,
    RemoveVowels,
    RemoveConsonants,
    KeyboardPatterns,
}

impl Rule {
    pub const ALL: [Rule; 12] = [
        Rule::AppendNumbers,
        Rule::PrependNumbers,
        Rule::AppendSymbols,
        Rule::PrependSymbols,
        Rule::CapitalizeVariations,
        Rule::LeetspeakVariations,
        Rule::Reverse,
        Rule::Duplicate,
        Rule::ToggleCase,
        Rule::RemoveVowels,
        Rule::RemoveConsonants,
        Rule::KeyboardPatterns,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Rule::AppendNumbers => "append_numbers",
            Rule::PrependNumbers => "prepend_numbers",
            Rule::AppendSymbols => "append_symbols",
            Rule::PrependSymbols => "prepend_symbols",
            Rule::CapitalizeVariations => "capitalize_variations",
            Rule::LeetspeakVariations => "leetspeak_variations",
            Rule::Reverse => "reverse_word",
            Rule::Duplicate => "duplicate_word",
            Rule::ToggleCase => "toggle_case",
            Rule::RemoveVowels => "remove_vowels",
            Rule::RemoveConsonants => "remove_consonants",
            Rule::KeyboardPatterns => "keyboard_patterns",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Rule::AppendNumbers => "Append common numbers (123, 2024, etc.)",
            Rule::PrependNumbers => "Prepend common numbers",
            Rule::AppendSymbols => "Append common symbols (!, @, #, etc.)",
            Rule::PrependSymbols => "Prepend common symbols",
            Rule::CapitalizeVariations => "Generate capitalization variations",
            Rule::LeetspeakVariations => "Generate leetspeak substitutions",
            Rule::Reverse => "Reverse the word",
            Rule::Duplicate => "Duplicate the word",
            Rule::ToggleCase => "Toggle case of each character",
            Rule::RemoveVowels => "Remove all vowels",
            Rule::RemoveConsonants => "Remove all consonants",
            Rule::KeyboardPatterns => "Combine with keyboard patterns",
        }
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        Rule::ALL.into_iter().map(Rule::name)
    }

    /// Candidates this rule derives from `word`, without repeats. Rules
    /// that would only reproduce `word` yield nothing.
    pub fn apply(self, word: &str) -> Vec<String> {
        let raw: Vec<String> = match self {
            Rule::AppendNumbers => COMMON_NUMBERS.iter().map(|n| format!("{word}{n}")).collect(),
            Rule::PrependNumbers => COMMON_NUMBERS.iter().map(|n| format!("{n}{word}")).collect(),
            Rule::AppendSymbols => COMMON_SYMBOLS.iter().map(|s| format!("{word}{s}")).collect(),
            Rule::PrependSymbols => COMMON_SYMBOLS.iter().map(|s| format!("{s}{word}")).collect(),
            Rule::CapitalizeVariations => case_variations(word),
            Rule::LeetspeakVariations => leet_variations(word),
            Rule::Reverse => vec![word.chars().rev().collect()],
            Rule::Duplicate => vec![format!("{word}{word}")],
            Rule::ToggleCase => vec![toggle_case(word)],
            Rule::RemoveVowels => {
                let kept: String = word.chars().filter(|c| !VOWELS.contains(*c)).collect();
                if kept.chars().count() > 1 { vec![kept] } else { Vec::new() }
            }
            Rule::RemoveConsonants => {
                let kept: String = word.chars().filter(|c| VOWELS.contains(*c)).collect();
                if kept.chars().count() > 1 { vec![kept] } else { Vec::new() }
            }
            Rule::KeyboardPatterns => KEYBOARD_PATTERNS
                .iter()
                .flat_map(|p| [format!("{word}{p}"), format!("{p}{word}")])
                .collect(),
        };
        let mut seen = HashSet::new();
        raw.into_iter()
            .filter(|c| c != word && seen.insert(c.clone()))
            .collect()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Rule {
    type Err = AttackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rule::ALL
            .iter()
            .copied()
            .find(|r| r.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AttackError::Configuration(format!("unknown rule {s:?}")))
    }
}

/// Uppercase the first letter of every run of letters, lowercase the rest.
fn title_case(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut in_word = false;
    for c in word.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

fn case_variations(word: &str) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    let Some((&last, init)) = chars.split_last() else {
        return Vec::new();
    };
    let mut out = vec![
        word.to_lowercase(),
        word.to_uppercase(),
        capitalize(word),
        title_case(word),
    ];
    if let Some((&first, middle)) = init.split_first() {
        let last_upper: String = init.iter().copied().chain(last.to_uppercase()).collect();
        let both: String = first
            .to_uppercase()
            .chain(middle.iter().copied())
            .chain(last.to_uppercase())
            .collect();
        out.push(last_upper);
        out.push(both);
    }
    out
}

fn toggle_case(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    for c in word.chars() {
        if c.is_uppercase() {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
    }
    out
}

/// One full substitution using each letter's first substitute, then every
/// single-letter substitution, case-insensitively.
fn leet_variations(word: &str) -> Vec<String> {
    let substitute = |text: &str, from: char, to: char| -> String {
        text.chars()
            .map(|c| if c.to_ascii_lowercase() == from { to } else { c })
            .collect()
    };
    let mut out = Vec::new();
    let full = LEET_VARIANTS
        .iter()
        .fold(word.to_string(), |acc, (from, to)| substitute(&acc, *from, to[0]));
    out.push(full);
    let lower = word.to_ascii_lowercase();
    for (from, substitutes) in LEET_VARIANTS {
        if !lower.contains(*from) {
            continue;
        }
        for to in *substitutes {
            out.push(substitute(word, *from, *to));
        }
    }
    out
}

/// Candidates produced by one rule since the last reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleCount {
    pub rule: Rule,
    pub generated: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleStats {
    /// Words passed through [`RuleEngine::apply`].
    pub words: u64,
    pub mutations_generated: u64,
    pub per_rule: Vec<RuleCount>,
}

/// Applies a selection of catalogue rules to words, in selection order, and
/// counts what each rule contributed.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<Rule>,
    counts: Vec<u64>,
    words: u64,
    max_mutations: Option<usize>,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(Rule::ALL.to_vec())
    }
}

impl RuleEngine {
    /// Repeated rules run once, at their first position.
    pub fn new(rules: Vec<Rule>) -> Self {
        let mut unique = Vec::with_capacity(rules.len());
        for rule in rules {
            if !unique.contains(&rule) {
                unique.push(rule);
            }
        }
        Self {
            counts: vec![0; unique.len()],
            rules: unique,
            words: 0,
            max_mutations: None,
        }
    }

    /// Select rules by catalogue name.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, AttackError> {
        let rules = names
            .iter()
            .map(|n| n.as_ref().parse())
            .collect::<Result<Vec<Rule>, _>>()?;
        Ok(Self::new(rules))
    }

    /// Cap the candidates produced per word.
    pub fn with_max_mutations(mut self, limit: usize) -> Self {
        self.max_mutations = Some(limit);
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Candidates derived from `word` by the selected rules. Never contains
    /// `word` itself or a repeat.
    pub fn apply(&mut self, word: &str) -> Vec<String> {
        self.words += 1;
        let limit = self.max_mutations.unwrap_or(usize::MAX);
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        for (rule, count) in self.rules.iter().zip(self.counts.iter_mut()) {
            for candidate in rule.apply(word) {
                if out.len() >= limit {
                    return out;
                }
                if seen.insert(candidate.clone()) {
                    *count += 1;
                    out.push(candidate);
                }
            }
        }
        out
    }

    pub fn stats(&self) -> RuleStats {
        RuleStats {
            words: self.words,
            mutations_generated: self.counts.iter().sum(),
            per_rule: self
                .rules
                .iter()
                .zip(&self.counts)
                .map(|(&rule, &generated)| RuleCount { rule, generated })
                .collect(),
        }
    }

    pub fn reset_stats(&mut self) {
        self.words = 0;
        self.counts.iter_mut().for_each(|c| *c = 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leetspeak_is_case_insensitive() {
        assert_eq!(leetspeak("Password"), "P@$$w0rd");
        assert_eq!(leetspeak("TITLE"), "71713");
        assert_eq!(leetspeak("xyz"), "xyz");
    }

    #[test]
    fn capitalize_lowers_the_tail() {
        assert_eq!(capitalize("pASSWORD"), "Password");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn mutation_order_and_count() {
        let m = mutations("Admin");
        assert_eq!(m[0], "admin");
        assert_eq!(m[1], "ADMIN");
        assert_eq!(m[2], "Admin");
        assert_eq!(m[3], "Admin1");
        assert_eq!(m[9], "Admin2025");
        assert_eq!(m[10], "1Admin");
        assert_eq!(m[13], "@dm1n");
        assert_eq!(m.last().unwrap(), "Admin*");
        assert_eq!(m.len(), 3 + 7 + 3 + 1 + 7);

        // No leet form when nothing maps.
        assert_eq!(mutations("xyz").len(), 3 + 7 + 3 + 7);
    }

    #[test]
    fn catalogue_names_round_trip() {
        assert_eq!(Rule::ALL.len(), 12);
        for rule in Rule::ALL {
            assert_eq!(rule.name().parse::<Rule>().unwrap(), rule);
            assert!(!rule.description().is_empty());
        }
        assert_eq!("Reverse_Word".parse::<Rule>().unwrap(), Rule::Reverse);
        assert!(matches!(
            "rot13".parse::<Rule>(),
            Err(AttackError::Configuration(_))
        ));
    }

    #[test]
    fn word_shape_rules() {
        assert_eq!(Rule::Reverse.apply("abc"), vec!["cba"]);
        assert!(Rule::Reverse.apply("abba").is_empty());
        assert_eq!(Rule::Duplicate.apply("ab"), vec!["abab"]);
        assert_eq!(Rule::ToggleCase.apply("PassWord1"), vec!["pASSwORD1"]);
        assert!(Rule::ToggleCase.apply("1234").is_empty());
        assert_eq!(Rule::RemoveVowels.apply("password"), vec!["psswrd"]);
        assert!(Rule::RemoveVowels.apply("ae").is_empty());
        assert_eq!(Rule::RemoveConsonants.apply("password"), vec!["ao"]);
        assert!(Rule::RemoveConsonants.apply("cat").is_empty());
    }

    #[test]
    fn affix_rules_cover_their_tables() {
        let appended = Rule::AppendNumbers.apply("x");
        assert_eq!(appended.len(), COMMON_NUMBERS.len());
        assert_eq!(appended[0], "x1");
        assert_eq!(appended.last().unwrap(), "x00");
        assert_eq!(Rule::PrependSymbols.apply("x")[0], "!x");
        assert_eq!(Rule::PrependSymbols.apply("x").len(), COMMON_SYMBOLS.len());

        let keyboard = Rule::KeyboardPatterns.apply("me");
        assert_eq!(keyboard.len(), 2 * KEYBOARD_PATTERNS.len());
        assert_eq!(&keyboard[..2], &["meqwerty", "qwertyme"]);
    }

    #[test]
    fn case_variations_skip_the_original() {
        let v = Rule::CapitalizeVariations.apply("hello world");
        assert_eq!(
            v,
            vec!["HELLO WORLD", "Hello world", "Hello World", "hello worlD", "Hello worlD"]
        );
        assert!(Rule::CapitalizeVariations.apply("").is_empty());
        assert_eq!(Rule::CapitalizeVariations.apply("a"), vec!["A"]);
    }

    #[test]
    fn leet_variations_full_then_single() {
        let v = Rule::LeetspeakVariations.apply("Sassy");
        assert_eq!(v[0], "$@$$y");
        assert!(v.contains(&"$a$$y".to_string()));
        assert!(v.contains(&"5a55y".to_string()));
        assert!(v.contains(&"S4ssy".to_string()));
        assert!(Rule::LeetspeakVariations.apply("xyz").is_empty());
    }

    #[test]
    fn rule_engine_selects_deduplicates_and_counts() {
        let mut engine = RuleEngine::from_names(&["reverse_word", "toggle_case", "reverse_word"]).unwrap();
        assert_eq!(engine.rules(), &[Rule::Reverse, Rule::ToggleCase]);
        assert_eq!(engine.apply("abc"), vec!["cba", "ABC"]);
        // "ABA" reversed is itself; toggled it is new.
        assert_eq!(engine.apply("ABA"), vec!["aba"]);

        let stats = engine.stats();
        assert_eq!(stats.words, 2);
        assert_eq!(stats.mutations_generated, 3);
        assert_eq!(
            stats.per_rule,
            vec![
                RuleCount { rule: Rule::Reverse, generated: 1 },
                RuleCount { rule: Rule::ToggleCase, generated: 2 },
            ]
        );
        engine.reset_stats();
        assert_eq!(engine.stats().mutations_generated, 0);
        assert_eq!(engine.stats().words, 0);

        assert!(RuleEngine::from_names(&["nope"]).is_err());
    }

    #[test]
    fn rule_engine_respects_mutation_cap() {
        let mut engine = RuleEngine::default().with_max_mutations(10);
        let out = engine.apply("password");
        assert_eq!(out.len(), 10);
        assert_eq!(out[0], "password1");
        assert_eq!(engine.stats().per_rule[0].generated, 10);
        assert_eq!(engine.stats().per_rule[1].generated, 0);
    }
}
