//! CLI entrypoint for `hashaudit`.
//!
//! Builds an attack strategy from the command line, runs it through the
//! cracking engine against a single digest, and prints a terminal report.
//! Exit status: 0 when the password was recovered, 1 when it was not, 2 on
//! invalid input.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use hashaudit::{
    attack::{AttackStrategy, Dictionary, HybridMode, Strategy, rules::Rule},
    engine::CrackingEngine,
    hash::{self, HashAlgorithm},
    io::{DEFAULT_MMAP_THRESHOLD_BYTES, iter_lines_auto},
    mask::{self, MaskParser},
    report::{
        render_estimate, render_mask_ranking, render_placeholders, render_result, render_rules,
        render_strategy,
    },
};
use log::{LevelFilter, error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "hashaudit",
    version,
    about = "Password hash audit tool (dictionary, mask and hybrid attacks)"
)]
struct Args {
    /// Target digest to recover
    #[arg(
        long = "hash",
        required_unless_present_any = ["estimate", "list_placeholders", "list_rules", "suggest_masks"]
    )]
    hash: Option<String>,

    /// Hash algorithm of the target digest
    #[arg(
        short = 'a',
        long = "algorithm",
        default_value = "md5",
        ignore_case = true,
        value_parser = clap::builder::PossibleValuesParser::new(hash::ALGORITHM_NAMES.iter().copied())
    )]
    algorithm: String,

    /// Attack strategy
    #[arg(long = "attack", value_enum, default_value_t = AttackArg::Dictionary)]
    attack: AttackArg,

    /// Wordlist for dictionary and hybrid attacks
    #[arg(short = 'w', long = "wordlist")]
    wordlist: Option<PathBuf>,

    /// Mask for brute-force and hybrid attacks (e.g. ?u?l?l?l?d?d)
    #[arg(short = 'm', long = "mask")]
    mask: Option<String>,

    /// Shortest candidate for single-placeholder masks
    #[arg(long = "min-length")]
    min_length: Option<usize>,

    /// Longest candidate for single-placeholder masks
    #[arg(long = "max-length")]
    max_length: Option<usize>,

    /// How dictionary words and mask values are combined
    #[arg(long = "hybrid-mode", value_enum, default_value_t = HybridModeArg::DictionaryMask)]
    hybrid_mode: HybridModeArg,

    /// Disable word mutation rules in dictionary attacks
    #[arg(long = "no-rules")]
    no_rules: bool,

    /// Extra catalogue rule for dictionary attacks (repeatable, see --list-rules)
    #[arg(
        long = "rule",
        value_parser = clap::builder::PossibleValuesParser::new(Rule::names())
    )]
    rules: Vec<String>,

    /// Number of worker threads (defaults to the CPU count)
    #[arg(long = "workers")]
    workers: Option<usize>,

    /// Stop after this many seconds
    #[arg(long = "timeout")]
    timeout: Option<f64>,

    /// Custom placeholder as NAME:CHARS, e.g. c:abc123 (repeatable)
    #[arg(long = "custom-charset")]
    custom_charsets: Vec<String>,

    /// Confirm you are authorized to audit this hash
    #[arg(long = "authorized")]
    authorized: bool,

    /// Print size and time estimates for --mask and exit
    #[arg(long = "estimate")]
    estimate: bool,

    /// List mask placeholders and exit
    #[arg(long = "list-placeholders")]
    list_placeholders: bool,

    /// List catalogue mutation rules and exit
    #[arg(long = "list-rules")]
    list_rules: bool,

    /// Rank candidate masks against a file of known passwords and exit
    #[arg(long = "suggest-masks", value_name = "FILE")]
    suggest_masks: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Control color output (auto, always, never)
    #[arg(long = "color", value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AttackArg {
    Dictionary,
    BruteForce,
    Hybrid,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum HybridModeArg {
    DictionaryMask,
    MaskDictionary,
    RulesBrute,
}

impl From<HybridModeArg> for HybridMode {
    fn from(arg: HybridModeArg) -> Self {
        match arg {
            HybridModeArg::DictionaryMask => HybridMode::DictionaryMask,
            HybridModeArg::MaskDictionary => HybridMode::MaskDictionary,
            HybridModeArg::RulesBrute => HybridMode::RulesBrute,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

fn init_logger(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .try_init();
}

fn register_charsets(specs: &[String]) -> Result<()> {
    let parser = MaskParser::global();
    for spec in specs {
        let (name, chars) = spec
            .split_once(':')
            .with_context(|| format!("custom charset must be NAME:CHARS, got {spec:?}"))?;
        let mut name_chars = name.chars();
        let (Some(class), None) = (name_chars.next(), name_chars.next()) else {
            bail!("custom charset name must be a single character, got {name:?}");
        };
        parser
            .add_custom_charset(class, chars)
            .with_context(|| format!("invalid custom charset {spec:?}"))?;
    }
    Ok(())
}

fn build_strategy(args: &Args, algorithm: Arc<dyn HashAlgorithm>) -> Result<AttackStrategy> {
    let strategy = match args.attack {
        AttackArg::Dictionary => {
            let wordlist = args
                .wordlist
                .as_ref()
                .context("--wordlist is required for dictionary attacks")?;
            let extra = args
                .rules
                .iter()
                .map(|name| name.parse::<Rule>())
                .collect::<Result<Vec<_>, _>>()?;
            let dictionary = Dictionary::new(wordlist, !args.no_rules).with_extra_rules(extra);
            AttackStrategy::new(Strategy::Dictionary(dictionary), algorithm)
        }
        AttackArg::BruteForce => {
            let mask = args
                .mask
                .as_deref()
                .context("--mask is required for brute-force attacks")?;
            AttackStrategy::brute_force(algorithm, mask, args.min_length, args.max_length)?
        }
        AttackArg::Hybrid => {
            let wordlist = args
                .wordlist
                .as_ref()
                .context("--wordlist is required for hybrid attacks")?;
            AttackStrategy::hybrid(
                algorithm,
                wordlist,
                args.mask.as_deref(),
                args.hybrid_mode.into(),
            )?
        }
    };
    Ok(strategy)
}

/// Masks learned from `path` plus the common set, ranked against the
/// passwords in `path`.
fn suggest_masks(path: &Path) -> Result<String> {
    let mut known = Vec::new();
    for line in iter_lines_auto(path, DEFAULT_MMAP_THRESHOLD_BYTES)
        .with_context(|| format!("open {}", path.display()))?
    {
        let line = line.with_context(|| format!("read {}", path.display()))?;
        let word = line.trim();
        if !word.is_empty() {
            known.push(word.to_string());
        }
    }
    let mut candidates: Vec<String> = mask::generate_masks_from_passwords(&known)
        .into_iter()
        .map(|(m, _)| m)
        .collect();
    for common in mask::generate_common_masks(6, 12) {
        if !candidates.contains(&common) {
            candidates.push(common);
        }
    }
    info!("ranking {} masks against {} passwords", candidates.len(), known.len());
    let ranked = MaskParser::global().rank_masks_by_effectiveness(&candidates, &known);
    Ok(render_mask_ranking(&ranked, 20))
}

fn run(args: &Args) -> Result<i32> {
    register_charsets(&args.custom_charsets)?;

    if args.list_placeholders {
        println!("{}", render_placeholders(MaskParser::global()));
        return Ok(0);
    }
    if args.list_rules {
        println!("{}", render_rules());
        return Ok(0);
    }
    if let Some(path) = &args.suggest_masks {
        println!("{}", suggest_masks(path)?);
        return Ok(0);
    }

    if args.estimate {
        let mask = args.mask.as_deref().context("--estimate requires --mask")?;
        let parser = MaskParser::global();
        println!("{}", render_estimate(parser, mask));
        return Ok(if parser.validate(mask).is_valid() { 0 } else { 2 });
    }

    if !args.authorized {
        bail!("refusing to run without --authorized; only audit hashes you are permitted to test");
    }
    let target = args.hash.as_deref().context("--hash is required")?;
    let algorithm = hash::algorithm_by_name(&args.algorithm)
        .with_context(|| format!("unsupported algorithm {:?}", args.algorithm))?;
    algorithm
        .verify("", &algorithm.normalize_hash(target))
        .with_context(|| format!("invalid {} digest", algorithm.name()))?;
    let timeout = args
        .timeout
        .map(Duration::try_from_secs_f64)
        .transpose()
        .context("--timeout must be a non-negative number of seconds")?;

    let mut strategy = build_strategy(args, Arc::clone(&algorithm))?;
    let mut engine = CrackingEngine::new().with_progress(|p| {
        info!(
            "{} attempts in {:.1?} ({} active workers)",
            p.attempts, p.elapsed, p.active_workers
        );
    });
    if let Some(workers) = args.workers {
        engine = engine.with_workers(workers);
    }

    let interrupt = engine.interrupt_handle();
    if let Err(e) = ctrlc::set_handler(move || interrupt.interrupt()) {
        warn!("could not install Ctrl-C handler: {e}");
    }

    println!("{}", render_strategy(&strategy.info(), &engine.info()));
    let result = engine.crack(target, algorithm, &mut strategy, timeout)?;
    println!("{}", render_result(&result));
    Ok(if result.success { 0 } else { 1 })
}

fn main() {
    let args = Args::parse();
    init_logger(args.verbose);
    // Configure color policy
    match args.color {
        ColorChoice::Always => {
            colored::control::set_override(true);
        }
        ColorChoice::Never => {
            colored::control::set_override(false);
        }
        ColorChoice::Auto => {}
    }
    let code = match run(&args) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            2
        }
    };
    std::process::exit(code);
}
