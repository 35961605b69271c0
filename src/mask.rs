//! Mask grammar: parses placeholder patterns such as `?u?l?l?l?d?d` into
//! ordered per-position character sets and computes the size of the space
//! they describe.
//!
//! A mask is a sequence of literal characters and two-character placeholders
//! (`?` followed by a class identifier). Parses are cached by exact mask
//! string, so repeated lookups from hybrid attacks or estimators are cheap.
//!
//! ```
//! use hashaudit::mask::MaskParser;
//! use num_bigint::BigUint;
//!
//! let parser = MaskParser::new();
//! let mask = parser.parse("?l?l?l?l").unwrap();
//! assert_eq!(mask.combinations(), BigUint::from(456_976u32));
//! ```
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, RwLock};

use log::{debug, warn};
use num_bigint::BigUint;
use num_traits::{One, ToPrimitive};

/// Character introducing a placeholder.
pub const SENTINEL: char = '?';

/// Hash rate assumed by [`MaskParser::estimate_time`] when none is supplied.
pub const DEFAULT_HASH_RATE: f64 = 1_000_000.0;

/// Class identifier reserved for a caller-defined character set.
pub const CUSTOM_CLASS: char = 'c';

const LOWER: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const SYMBOLS: &str = "!@#$%^&*()-_=+[]{}|;:,.<>?/~`";
const BINARY: &str = "01";
const HEX_LOWER: &str = "0123456789abcdef";
const HEX_UPPER: &str = "0123456789ABCDEF";

const LARGE_SPACE_WARNING: u64 = 1_000_000_000_000;
const SHORT_MASK_WARNING: usize = 4;

/// Shapes seen often in real password sets.
pub const COMMON_MASKS: &[&str] = &[
    "?l?l?l?l?l?l?l?l",
    "?l?l?l?l?l?l?l?l?l",
    "?l?l?l?l?l?l?l?l?l?l",
    "?u?l?l?l?l?l?l",
    "?l?l?l?l?d?d?d?d",
    "?l?l?l?l?l?d?d",
    "?d?d?d?d?d?d?d?d",
    "?l?l?l?l?l?l?l?l?d?d",
    "?l?l?l?l?l?l?d?d?d",
    "?l?l?l?l?l?l?l?l?l?d",
    "?u?l?l?l?l?l?l?d?d",
    "?l?l?l?l?l?l?s",
    "?l?l?l?l?l?l?l?l?s",
    "?l?l?l?l?l?d?d?s",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MaskError {
    #[error("mask cannot be empty")]
    Empty,
    #[error("incomplete placeholder at position {position}")]
    IncompletePlaceholder { position: usize },
    #[error("invalid placeholder '?{class}' at position {position}")]
    UnknownPlaceholder { class: char, position: usize },
    #[error("placeholder '?{class}' has no character set defined")]
    UndefinedCustomCharset { class: char },
    #[error("character set for '?{class}' cannot be empty")]
    EmptyCharset { class: char },
    #[error("'{class}' cannot be used as a placeholder name")]
    ReservedClass { class: char },
}

/// One position of a parsed mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskComponent {
    Placeholder { class: char, charset: Arc<[char]> },
    Literal(char),
}

impl MaskComponent {
    /// Number of characters this position can take.
    pub fn size(&self) -> usize {
        match self {
            MaskComponent::Placeholder { charset, .. } => charset.len(),
            MaskComponent::Literal(_) => 1,
        }
    }

    /// Characters for this position, in declaration order.
    pub fn chars(&self) -> &[char] {
        match self {
            MaskComponent::Placeholder { charset, .. } => charset,
            MaskComponent::Literal(c) => std::slice::from_ref(c),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, MaskComponent::Placeholder { .. })
    }
}

/// An immutable, parsed mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    source: String,
    components: Vec<MaskComponent>,
}

impl Mask {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn components(&self) -> &[MaskComponent] {
        &self.components
    }

    /// Length of every candidate this mask produces.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn placeholder_count(&self) -> usize {
        self.components.iter().filter(|c| c.is_placeholder()).count()
    }

    /// Exact number of candidates: the product of all position sizes.
    pub fn combinations(&self) -> BigUint {
        self.components
            .iter()
            .fold(BigUint::one(), |acc, c| acc * BigUint::from(c.size()))
    }

    /// Per-position character sets, shared with the parse.
    pub fn charsets(&self) -> Vec<Arc<[char]>> {
        self.components
            .iter()
            .map(|c| match c {
                MaskComponent::Placeholder { charset, .. } => Arc::clone(charset),
                MaskComponent::Literal(ch) => Arc::from(vec![*ch]),
            })
            .collect()
    }

    /// Lazily enumerate the Cartesian product, last position varying fastest.
    pub fn iter(&self) -> Product {
        Product::new(self.charsets())
    }

    /// Decode a candidate from its index in generation order.
    pub fn nth_candidate(&self, index: &BigUint) -> Option<String> {
        if *index >= self.combinations() {
            return None;
        }
        let mut rest = index.clone();
        let mut out: Vec<char> = Vec::with_capacity(self.len());
        for component in self.components.iter().rev() {
            let radix = BigUint::from(component.size());
            let digit = (&rest % &radix).to_usize()?;
            rest /= radix;
            out.push(component.chars()[digit]);
        }
        Some(out.into_iter().rev().collect())
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Every candidate of `unit` repeated `len` times, for each `len` in
/// `min_length..=max_length`, shortest first.
pub fn expand_range(
    unit: Vec<Arc<[char]>>,
    min_length: usize,
    max_length: usize,
) -> impl Iterator<Item = String> + Send + 'static {
    (min_length..=max_length).flat_map(move |len| {
        let sets: Vec<Arc<[char]>> = unit.iter().cycle().take(unit.len() * len).cloned().collect();
        Product::new(sets)
    })
}

/// Odometer over a list of per-position character sets.
#[derive(Debug, Clone)]
pub struct Product {
    sets: Vec<Arc<[char]>>,
    indices: Vec<usize>,
    done: bool,
}

impl Product {
    pub fn new(sets: Vec<Arc<[char]>>) -> Self {
        let done = sets.iter().any(|s| s.is_empty());
        let indices = vec![0; sets.len()];
        Self {
            sets,
            indices,
            done,
        }
    }
}

impl Iterator for Product {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        let current: String = self
            .indices
            .iter()
            .zip(&self.sets)
            .map(|(&i, set)| set[i])
            .collect();

        // Advance from the right; a full carry past position 0 ends the walk.
        let mut pos = self.indices.len();
        loop {
            if pos == 0 {
                self.done = true;
                break;
            }
            pos -= 1;
            self.indices[pos] += 1;
            if self.indices[pos] < self.sets[pos].len() {
                break;
            }
            self.indices[pos] = 0;
        }
        Some(current)
    }
}

#[derive(Debug, Clone)]
struct CharClass {
    charset: Option<Arc<[char]>>,
    description: String,
    builtin: bool,
}

impl CharClass {
    fn builtin(chars: &str, description: &str) -> Self {
        Self {
            charset: Some(chars.chars().collect::<Vec<_>>().into()),
            description: description.to_string(),
            builtin: true,
        }
    }
}

fn builtin_classes() -> HashMap<char, CharClass> {
    let all = format!("{LOWER}{UPPER}{DIGITS}{SYMBOLS}");
    let printable = format!(" {all}");
    let mut classes = HashMap::new();
    classes.insert('l', CharClass::builtin(LOWER, "lowercase letters (a-z)"));
    classes.insert('u', CharClass::builtin(UPPER, "uppercase letters (A-Z)"));
    classes.insert('d', CharClass::builtin(DIGITS, "digits (0-9)"));
    classes.insert('s', CharClass::builtin(SYMBOLS, "special symbols"));
    classes.insert('a', CharClass::builtin(&all, "all printable ASCII characters"));
    classes.insert('b', CharClass::builtin(BINARY, "binary digits (0-1)"));
    classes.insert('h', CharClass::builtin(HEX_LOWER, "hexadecimal lowercase (0-9, a-f)"));
    classes.insert('H', CharClass::builtin(HEX_UPPER, "hexadecimal uppercase (0-9, A-F)"));
    classes.insert(
        'p',
        CharClass::builtin(&printable, "printable characters (space + printable)"),
    );
    classes.insert(
        CUSTOM_CLASS,
        CharClass {
            charset: None,
            description: "custom character set (defined separately)".to_string(),
            builtin: true,
        },
    );
    classes
}

/// Validation outcome for a mask, with non-fatal warnings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub length: usize,
    pub combinations: BigUint,
}

impl MaskReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A mask scored by [`MaskParser::rank_masks_by_effectiveness`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedMask {
    pub mask: String,
    pub score: i64,
    pub length: usize,
    pub combinations: BigUint,
    pub placeholder_kinds: usize,
    /// Known passwords whose shape is exactly this mask.
    pub matches: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaskComplexity {
    pub length: usize,
    pub combinations: BigUint,
    pub entropy_bits: f64,
    pub placeholder_kinds: usize,
    /// 0..=100, higher means a harder mask.
    pub complexity_score: f64,
}

/// Advisory duration estimate for exhausting a mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeEstimate {
    pub seconds: f64,
}

impl TimeEstimate {
    pub fn minutes(&self) -> f64 {
        self.seconds / 60.0
    }

    pub fn hours(&self) -> f64 {
        self.seconds / 3600.0
    }

    pub fn days(&self) -> f64 {
        self.seconds / 86_400.0
    }

    pub fn years(&self) -> f64 {
        self.seconds / 31_536_000.0
    }
}

impl fmt::Display for TimeEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.seconds;
        if s < 60.0 {
            write!(f, "{s:.1} seconds")
        } else if s < 3600.0 {
            write!(f, "{:.1} minutes", self.minutes())
        } else if s < 86_400.0 {
            write!(f, "{:.1} hours", self.hours())
        } else if s < 31_536_000.0 {
            write!(f, "{:.1} days", self.days())
        } else {
            write!(f, "{:.1} years", self.years())
        }
    }
}

/// Parses masks against a runtime-extensible class registry and caches
/// successful parses by exact mask string.
#[derive(Debug)]
pub struct MaskParser {
    classes: RwLock<HashMap<char, CharClass>>,
    cache: Mutex<HashMap<String, Arc<Mask>>>,
}

impl Default for MaskParser {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL: LazyLock<MaskParser> = LazyLock::new(MaskParser::new);

impl MaskParser {
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(builtin_classes()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Process-wide parser used by the attack strategies.
    pub fn global() -> &'static MaskParser {
        &GLOBAL
    }

    /// Parse `mask`, returning the cached parse when available.
    pub fn parse(&self, mask: &str) -> Result<Arc<Mask>, MaskError> {
        if let Some(hit) = self.lock_cache().get(mask) {
            return Ok(Arc::clone(hit));
        }
        let parsed = Arc::new(self.parse_uncached(mask)?);
        self.lock_cache()
            .insert(mask.to_string(), Arc::clone(&parsed));
        Ok(parsed)
    }

    fn parse_uncached(&self, mask: &str) -> Result<Mask, MaskError> {
        if mask.is_empty() {
            return Err(MaskError::Empty);
        }
        let classes = self.classes.read().unwrap_or_else(|e| e.into_inner());
        let mut components = Vec::with_capacity(mask.len());
        let mut chars = mask.chars().enumerate();
        while let Some((position, ch)) = chars.next() {
            if ch != SENTINEL {
                components.push(MaskComponent::Literal(ch));
                continue;
            }
            let Some((_, class)) = chars.next() else {
                return Err(MaskError::IncompletePlaceholder { position });
            };
            if class == SENTINEL {
                components.push(MaskComponent::Literal(SENTINEL));
                continue;
            }
            match classes.get(&class) {
                Some(CharClass {
                    charset: Some(charset),
                    ..
                }) => components.push(MaskComponent::Placeholder {
                    class,
                    charset: Arc::clone(charset),
                }),
                Some(CharClass { charset: None, .. }) => {
                    return Err(MaskError::UndefinedCustomCharset { class });
                }
                None => return Err(MaskError::UnknownPlaceholder { class, position }),
            }
        }
        debug!("parsed mask {mask:?} into {} positions", components.len());
        Ok(Mask {
            source: mask.to_string(),
            components,
        })
    }

    /// Register `charset` under placeholder `?name`. Overriding a built-in
    /// class is allowed and logged. Duplicate characters are dropped, keeping
    /// first occurrence order.
    pub fn add_custom_charset(&self, name: char, charset: &str) -> Result<(), MaskError> {
        if name == SENTINEL || name.is_whitespace() {
            return Err(MaskError::ReservedClass { class: name });
        }
        let mut unique: Vec<char> = Vec::with_capacity(charset.len());
        for c in charset.chars() {
            if !unique.contains(&c) {
                unique.push(c);
            }
        }
        if unique.is_empty() {
            return Err(MaskError::EmptyCharset { class: name });
        }
        {
            let mut classes = self.classes.write().unwrap_or_else(|e| e.into_inner());
            let overrides_builtin = classes
                .get(&name)
                .is_some_and(|existing| existing.builtin && existing.charset.is_some());
            if overrides_builtin {
                warn!("custom charset overrides built-in placeholder ?{name}");
            }
            classes.insert(
                name,
                CharClass {
                    charset: Some(unique.into()),
                    description: format!("custom set: {charset}"),
                    builtin: false,
                },
            );
        }
        // Cached parses may reference the old definition.
        self.lock_cache().clear();
        Ok(())
    }

    /// All known placeholders with descriptions, sorted by class identifier.
    pub fn available_placeholders(&self) -> Vec<(String, String)> {
        let classes = self.classes.read().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<(String, String)> = classes
            .iter()
            .map(|(k, v)| (format!("{SENTINEL}{k}"), v.description.clone()))
            .collect();
        out.sort();
        out
    }

    pub fn estimate_combinations(&self, mask: &str) -> Result<BigUint, MaskError> {
        Ok(self.parse(mask)?.combinations())
    }

    /// Time to exhaust `mask` at `hashes_per_second`. Purely advisory.
    pub fn estimate_time(&self, mask: &str, hashes_per_second: f64) -> Result<TimeEstimate, MaskError> {
        let combinations = self.estimate_combinations(mask)?;
        let total = combinations.to_f64().unwrap_or(f64::INFINITY);
        let seconds = if hashes_per_second > 0.0 {
            total / hashes_per_second
        } else {
            f64::INFINITY
        };
        Ok(TimeEstimate { seconds })
    }

    /// Check syntax and flag masks that are very large or very short.
    pub fn validate(&self, mask: &str) -> MaskReport {
        let mut report = MaskReport::default();
        match self.parse(mask) {
            Ok(parsed) => {
                report.length = parsed.len();
                report.combinations = parsed.combinations();
                if report.combinations > BigUint::from(LARGE_SPACE_WARNING) {
                    report
                        .warnings
                        .push("very large search space may take excessive time".to_string());
                }
                if report.length < SHORT_MASK_WARNING {
                    report
                        .warnings
                        .push("very short mask may have limited effectiveness".to_string());
                }
            }
            Err(e) => report.errors.push(e.to_string()),
        }
        report
    }

    pub fn analyze(&self, mask: &str) -> Result<MaskComplexity, MaskError> {
        let parsed = self.parse(mask)?;
        let combinations = parsed.combinations();
        let entropy_bits: f64 = parsed
            .components()
            .iter()
            .map(|c| (c.size() as f64).log2())
            .sum();
        let mut kinds: Vec<char> = parsed
            .components()
            .iter()
            .filter_map(|c| match c {
                MaskComponent::Placeholder { class, .. } => Some(*class),
                MaskComponent::Literal(_) => None,
            })
            .collect();
        kinds.sort_unstable();
        kinds.dedup();

        let magnitude = combinations.to_f64().unwrap_or(f64::MAX).log10();
        let mut score = magnitude.clamp(0.0, 50.0);
        score += kinds.len() as f64 * 5.0;
        score += (parsed.len() as f64 * 2.0).min(20.0);

        Ok(MaskComplexity {
            length: parsed.len(),
            combinations,
            entropy_bits,
            placeholder_kinds: kinds.len(),
            complexity_score: score.min(100.0),
        })
    }

    /// Candidates for `template` repeated once per length in
    /// `min_length..=max_length`. A template without placeholders repeats
    /// its first character. Lengths below 1 are skipped.
    pub fn expand_mask_range(
        &self,
        template: &str,
        min_length: usize,
        max_length: usize,
    ) -> Result<Box<dyn Iterator<Item = String> + Send>, MaskError> {
        let unit = if template.contains(SENTINEL) {
            self.parse(template)?
        } else {
            let first = template.chars().next().ok_or(MaskError::Empty)?;
            self.parse(&first.to_string())?
        };
        Ok(Box::new(expand_range(
            unit.charsets(),
            min_length.max(1),
            max_length,
        )))
    }

    /// Score masks by how likely they are to pay off: typical lengths, a
    /// mix of classes, a space that is neither trivial nor hopeless, and
    /// how many `known` passwords share the shape. Highest score first;
    /// invalid masks score -100.
    pub fn rank_masks_by_effectiveness<M, K>(&self, masks: &[M], known: &[K]) -> Vec<RankedMask>
    where
        M: AsRef<str>,
        K: AsRef<str>,
    {
        let known_shapes: Vec<String> = known.iter().map(|p| password_to_mask(p.as_ref())).collect();
        let mut ranked: Vec<RankedMask> = masks
            .iter()
            .map(|mask| {
                let mask = mask.as_ref();
                let Ok(complexity) = self.analyze(mask) else {
                    return RankedMask {
                        mask: mask.to_string(),
                        score: -100,
                        length: 0,
                        combinations: BigUint::from(0u8),
                        placeholder_kinds: 0,
                        matches: 0,
                    };
                };
                let mut score: i64 = match complexity.length {
                    6..=12 => 20,
                    13..=16 => 10,
                    _ => -10,
                };
                score += complexity.placeholder_kinds as i64 * 5;
                if complexity.combinations < BigUint::from(1_000_000u32) {
                    score -= 5;
                } else if complexity.combinations <= BigUint::from(10_000_000_000u64) {
                    score += 15;
                } else if complexity.combinations > BigUint::from(1_000_000_000_000u64) {
                    score -= 10;
                }
                let matches = known_shapes.iter().filter(|shape| *shape == mask).count();
                score += matches as i64 * 10;
                RankedMask {
                    mask: mask.to_string(),
                    score,
                    length: complexity.length,
                    combinations: complexity.combinations,
                    placeholder_kinds: complexity.placeholder_kinds,
                    matches,
                }
            })
            .collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked
    }

    /// Order masks for a multi-mask run: moderate complexity first, very
    /// complex and invalid masks last.
    pub fn optimize_mask_order<M: AsRef<str>>(&self, masks: &[M]) -> Vec<String> {
        let mut scored: Vec<(String, f64)> = masks
            .iter()
            .map(|mask| {
                let mask = mask.as_ref();
                let score = match self.analyze(mask) {
                    Ok(c) if (20.0..=60.0).contains(&c.complexity_score) => c.complexity_score + 20.0,
                    Ok(c) if c.complexity_score > 80.0 => c.complexity_score - 30.0,
                    Ok(c) => c.complexity_score,
                    Err(_) => 0.0,
                };
                (mask.to_string(), score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.into_iter().map(|(mask, _)| mask).collect()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Mask>>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Parse with the process-wide parser.
pub fn parse(mask: &str) -> Result<Arc<Mask>, MaskError> {
    MaskParser::global().parse(mask)
}

pub fn estimate_combinations(mask: &str) -> Result<BigUint, MaskError> {
    MaskParser::global().estimate_combinations(mask)
}

pub fn estimate_time(mask: &str, hashes_per_second: f64) -> Result<TimeEstimate, MaskError> {
    MaskParser::global().estimate_time(mask, hashes_per_second)
}

/// The mask describing `password`'s shape: ASCII letters, digits and
/// symbols become their class placeholder, anything else stays literal.
pub fn password_to_mask(password: &str) -> String {
    let mut mask = String::with_capacity(password.len() * 2);
    for c in password.chars() {
        let class = if c.is_ascii_lowercase() {
            'l'
        } else if c.is_ascii_uppercase() {
            'u'
        } else if c.is_ascii_digit() {
            'd'
        } else if SYMBOLS.contains(c) {
            's'
        } else {
            mask.push(c);
            continue;
        };
        mask.push(SENTINEL);
        mask.push(class);
    }
    mask
}

/// Distinct shapes of `passwords` with their frequency, most frequent
/// first. Ties keep first-seen order; empty passwords are skipped.
pub fn generate_masks_from_passwords<I, S>(passwords: I) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut counts: Vec<(String, usize)> = Vec::new();
    for password in passwords {
        let mask = password_to_mask(password.as_ref());
        if mask.is_empty() {
            continue;
        }
        match index.get(&mask) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(mask.clone(), counts.len());
                counts.push((mask, 1));
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

/// [`COMMON_MASKS`] within the length range, followed by single-class masks
/// and common mixed shapes for every length in range. No repeats.
pub fn generate_common_masks(min_length: usize, max_length: usize) -> Vec<String> {
    let lengths = min_length.max(1)..=max_length;
    let mut out: Vec<String> = COMMON_MASKS
        .iter()
        .filter(|m| {
            parse(m)
                .map(|parsed| lengths.contains(&parsed.len()))
                .unwrap_or(false)
        })
        .map(|m| m.to_string())
        .collect();
    for class in ["?l", "?u", "?d", "?s"] {
        for len in lengths.clone() {
            out.push(class.repeat(len));
        }
    }
    for len in lengths {
        out.push(format!("?u{}", "?l".repeat(len - 1)));
        if len >= 3 {
            out.push(format!("{}?d?d", "?l".repeat(len - 2)));
        }
        if len >= 2 {
            out.push(format!("{}?s", "?l".repeat(len - 1)));
        }
        out.push(["?u", "?l"].iter().cycle().take(len).copied().collect());
    }
    let mut seen = std::collections::HashSet::new();
    out.retain(|m| seen.insert(m.clone()));
    out
}
