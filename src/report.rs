//! Human-readable report rendering for terminal output.
//!
//! Produces colored sections for a finished crack, the strategy in use, and
//! mask planning estimates.
use colored::*;

use crate::attack::StrategyInfo;
use crate::attack::rules::Rule;
use crate::engine::{CrackResult, EngineInfo, Outcome};
use crate::mask::{DEFAULT_HASH_RATE, MaskParser, RankedMask};

fn visible_len(s: &str) -> usize {
    // Strip ANSI escape sequences (\x1b[ ... m) to compute printable width
    let mut len = 0;
    let mut iter = s.chars().peekable();
    while let Some(ch) = iter.next() {
        if ch == '\u{1b}' {
            if let Some('[') = iter.peek().cloned() {
                let _ = iter.next();
            }
            for c in iter.by_ref() {
                if c == 'm' {
                    break;
                }
            }
        } else {
            len += 1;
        }
    }
    len
}

fn section_header(title: &str) -> String {
    let len = visible_len(title);
    let mut s = String::new();
    s.push('\n');
    s.push_str(title);
    s.push('\n');
    s.push_str(&"─".repeat(len));
    s.push_str("\n\n");
    s
}

fn push_field(out: &mut String, key: &str, value: impl std::fmt::Display) {
    out.push_str(&format!("{}: {}\n", key.bold(), value));
}

pub fn render_result(result: &CrackResult) -> String {
    let mut out = String::new();
    let title = if result.success {
        "Password Recovered".bold().green().to_string()
    } else {
        "Password Not Recovered".bold().red().to_string()
    };
    out.push_str(&section_header(&title));
    if let Some(password) = &result.password {
        push_field(&mut out, "Password", password.red().bold());
    }
    push_field(&mut out, "Outcome", &result.outcome);
    push_field(&mut out, "Strategy", &result.strategy);
    push_field(&mut out, "Algorithm", &result.algorithm);
    push_field(&mut out, "Attempts", result.attempts);
    push_field(
        &mut out,
        "Elapsed",
        format!("{:.2}s", result.elapsed.as_secs_f64()),
    );
    push_field(
        &mut out,
        "Rate",
        format!("{:.0} H/s", result.hashes_per_second()),
    );
    if result.outcome == Outcome::NotAttackable {
        out.push_str(&format!(
            "{}\n",
            "(algorithm does not support offline search)".dimmed()
        ));
    }
    if !result.errors.is_empty() {
        out.push_str(&section_header(&"Errors".bold().yellow().to_string()));
        for e in &result.errors {
            out.push_str(&format!("  {}\n", e.yellow()));
        }
    }
    out
}

pub fn render_strategy(info: &StrategyInfo, engine: &EngineInfo) -> String {
    let mut out = section_header(&info.name.bold().cyan().to_string());
    for (key, value) in &info.fields {
        push_field(&mut out, key, value);
    }
    push_field(&mut out, "workers", engine.max_workers);
    push_field(&mut out, "cpu_count", engine.cpu_count);
    out
}

/// Size, time and complexity estimates for `mask`. Invalid masks render
/// their errors instead.
pub fn render_estimate(parser: &MaskParser, mask: &str) -> String {
    let mut out = section_header(&format!("Mask {}", mask).bold().cyan().to_string());
    let report = parser.validate(mask);
    if !report.is_valid() {
        for e in &report.errors {
            out.push_str(&format!("{} {}\n", "error:".red().bold(), e));
        }
        return out;
    }
    push_field(&mut out, "Length", report.length);
    push_field(&mut out, "Combinations", &report.combinations);
    if let Ok(estimate) = parser.estimate_time(mask, DEFAULT_HASH_RATE) {
        push_field(
            &mut out,
            "Estimated time",
            format!("{estimate} at {DEFAULT_HASH_RATE:.0} H/s"),
        );
    }
    if let Ok(complexity) = parser.analyze(mask) {
        push_field(
            &mut out,
            "Entropy",
            format!("{:.1} bits", complexity.entropy_bits),
        );
        push_field(
            &mut out,
            "Complexity",
            format!("{:.1}/100", complexity.complexity_score),
        );
    }
    for w in &report.warnings {
        out.push_str(&format!("{} {}\n", "warning:".yellow().bold(), w));
    }
    out
}

pub fn render_placeholders(parser: &MaskParser) -> String {
    let mut out = section_header(&"Mask Placeholders".bold().cyan().to_string());
    for (name, description) in parser.available_placeholders() {
        push_field(&mut out, &name, description);
    }
    out
}

pub fn render_rules() -> String {
    let mut out = section_header(&"Mutation Rules".bold().cyan().to_string());
    for rule in Rule::ALL {
        push_field(&mut out, rule.name(), rule.description());
    }
    out
}

/// Ranked masks, best first, at most `limit` rows.
pub fn render_mask_ranking(ranked: &[RankedMask], limit: usize) -> String {
    let mut out = section_header(&"Suggested Masks".bold().cyan().to_string());
    if ranked.is_empty() {
        out.push_str(&format!("{}\n", "(no masks)".dimmed()));
        return out;
    }
    for r in ranked.iter().take(limit) {
        out.push_str(&format!(
            "{:>5}  {}  ({} combinations, {} known)\n",
            r.score,
            r.mask.bold(),
            r.combinations,
            r.matches
        ));
    }
    out
}
