//! CLI command definitions for augustus.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{parse_duration, AugustusConfig, ConfigLoader};
use crate::error::ScanError;
use crate::scanner::{
    signal_context, ProbeSelection, ScanRequest, Scanner, ScannerOptions, DEFAULT_HARNESS,
};

/// LLM red-teaming engine.
#[derive(Parser)]
#[command(name = "augustus")]
#[command(about = "Run adversarial probes against a text-generation model")]
#[command(version)]
#[command(
    long_about = "augustus runs a configurable battery of adversarial probes against a \
target model, scores every exchange with one or more detectors, and aggregates the scored \
attempts into a report.\n\nExample usage:\n  augustus scan openai.OpenAI --probe dan.Dan1 \
--detector dan.DAN --format table"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run a scan against a target generator.
    Scan(ScanArgs),

    /// Print each registry's contents and registered count.
    List,

    /// Print the build version.
    Version,
}

/// Arguments for the scan command.
#[derive(Parser, Debug, Default)]
pub struct ScanArgs {
    /// Target generator name, e.g. `openai.OpenAI`.
    pub generator: String,

    /// Probe to run (repeatable).
    #[arg(long = "probe", conflicts_with_all = ["probes_glob", "all"])]
    pub probes: Vec<String>,

    /// Glob selecting probes, e.g. `dan.*`.
    #[arg(long, conflicts_with = "all")]
    pub probes_glob: Option<String>,

    /// Run every registered probe.
    #[arg(long)]
    pub all: bool,

    /// Detector to run (repeatable); defaults to each probe's primary.
    #[arg(long = "detector")]
    pub detectors: Vec<String>,

    /// Glob selecting detectors.
    #[arg(long)]
    pub detectors_glob: Option<String>,

    /// Buff applied to every prompt (repeatable, ordered).
    #[arg(long = "buff")]
    pub buffs: Vec<String>,

    /// Glob selecting buffs.
    #[arg(long)]
    pub buffs_glob: Option<String>,

    /// YAML configuration file.
    #[arg(long)]
    pub config_file: Option<PathBuf>,

    /// Inline JSON configuration.
    #[arg(long)]
    pub config: Option<String>,

    /// Named profile from the configuration file.
    #[arg(long)]
    pub profile: Option<String>,

    /// Harness to use.
    #[arg(long)]
    pub harness: Option<String>,

    /// Overall scan timeout, e.g. `30m`.
    #[arg(long)]
    pub timeout: Option<String>,

    /// Maximum in-flight generator calls.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Per-probe timeout, e.g. `5m`.
    #[arg(long)]
    pub probe_timeout: Option<String>,

    /// Retries per generator call for transient failures.
    #[arg(long)]
    pub retries: Option<u32>,

    /// Output format: table, json or jsonl.
    #[arg(long)]
    pub format: Option<String>,

    /// JSONL output file.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// HTML report file.
    #[arg(long)]
    pub html: Option<PathBuf>,

    /// Verbose evaluation output.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Parse CLI arguments and return the Cli struct.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    crate::register_builtins();

    match cli.command {
        Commands::Scan(args) => run_scan_command(args).await,
        Commands::List => {
            run_list_command();
            Ok(())
        }
        Commands::Version => {
            println!("augustus {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Maps a top-level error to the process exit code.
///
/// Configuration and setup failures exit 1, harness failures exit 2, and a
/// user-cancelled scan exits with the conventional interrupted code.
pub fn exit_code(error: &anyhow::Error) -> i32 {
    if let Some(scan_error) = error.downcast_ref::<ScanError>() {
        return match scan_error {
            ScanError::Cancelled => 130,
            ScanError::Registry(_)
            | ScanError::NoProbeSelector
            | ScanError::EmptySelection { .. }
            | ScanError::NoProbes
            | ScanError::Validation(_) => 1,
            _ => 2,
        };
    }
    1
}

/// Assembles the scan request from configuration and flags, then runs it.
async fn run_scan_command(args: ScanArgs) -> anyhow::Result<()> {
    if args.config_file.is_some() && args.config.is_some() {
        anyhow::bail!("cannot use both --config-file and --config");
    }

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config_file {
        loader = loader.with_file(path);
    }
    if let Some(inline) = &args.config {
        loader = loader.with_inline(inline);
    }
    if let Some(profile) = &args.profile {
        loader = loader.with_profile(profile);
    }
    let config = loader.load()?;

    let request = build_scan_request(&args, &config)?;
    let ctx = signal_context();
    Scanner::new().run(&ctx, &request).await?;
    Ok(())
}

/// Flags override environment and file values, which override defaults.
fn build_scan_request(args: &ScanArgs, config: &AugustusConfig) -> anyhow::Result<ScanRequest> {
    let mut options = ScannerOptions::default();
    if config.run.concurrency > 0 {
        options = options.with_concurrency(config.run.concurrency as usize);
    }
    if config.run.max_attempts > 0 {
        options = options.with_max_attempts(config.run.max_attempts as usize);
    }
    if let Some(text) = &config.run.probe_timeout {
        options = options.with_probe_timeout(parse_duration(text)?);
    }
    if let Some(text) = &config.run.timeout {
        options = options.with_timeout(parse_duration(text)?);
    }
    if config.run.retry_count > 0 {
        let backoff = match &config.run.retry_backoff {
            Some(text) => parse_duration(text)?,
            None => options.retry_backoff,
        };
        options = options.with_retries(config.run.retry_count as u32, backoff);
    }

    if let Some(concurrency) = args.concurrency {
        options = options.with_concurrency(concurrency);
    }
    if let Some(text) = &args.probe_timeout {
        options = options.with_probe_timeout(parse_duration(text)?);
    }
    if let Some(text) = &args.timeout {
        options = options.with_timeout(parse_duration(text)?);
    }
    if let Some(retries) = args.retries {
        let backoff = options.retry_backoff;
        options = options.with_retries(retries, backoff);
    }

    let probes = if args.all {
        ProbeSelection::All
    } else if let Some(pattern) = &args.probes_glob {
        ProbeSelection::Glob(pattern.clone())
    } else if !args.probes.is_empty() {
        ProbeSelection::Names(args.probes.clone())
    } else {
        ProbeSelection::None
    };

    let harness = args
        .harness
        .clone()
        .or_else(|| config.run.harness.clone())
        .unwrap_or_else(|| DEFAULT_HARNESS.to_string());

    let format = args
        .format
        .clone()
        .or_else(|| config.output.format.clone())
        .unwrap_or_else(|| "table".to_string());

    let output_file = args
        .output
        .clone()
        .or_else(|| config.output.file.as_ref().map(PathBuf::from));
    let html_file = args
        .html
        .clone()
        .or_else(|| config.output.html.as_ref().map(PathBuf::from));

    Ok(ScanRequest {
        generator: args.generator.clone(),
        generator_config: config.generator_bag(&args.generator),
        probes,
        detectors: args.detectors.clone(),
        detectors_glob: args.detectors_glob.clone(),
        buffs: args.buffs.clone(),
        buffs_glob: args.buffs_glob.clone(),
        harness,
        harness_config: crate::registry::Config::from_map(config.run.harness_settings.clone()),
        probe_settings: config.probes.bags(),
        detector_settings: config.detectors.bags(),
        buff_settings: config.buffs.bags(),
        options,
        format,
        output_file,
        html_file,
        verbose: args.verbose,
    })
}

/// Prints every registry's kind, count and sorted names.
fn run_list_command() {
    print_registry("generators", crate::generators::registry().list());
    print_registry("probes", crate::probes::registry().list());
    print_registry("detectors", crate::detectors::registry().list());
    print_registry("buffs", crate::buffs::registry().list());
    print_registry("harnesses", crate::harness::registry().list());
}

fn print_registry(kind: &str, names: Vec<String>) {
    println!("{kind} ({} registered)", names.len());
    for name in names {
        println!("  {name}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_defaults() {
        let args = ScanArgs {
            generator: "test.Repeat".to_string(),
            all: true,
            ..ScanArgs::default()
        };
        let request = build_scan_request(&args, &AugustusConfig::default()).unwrap();

        assert_eq!(request.generator, "test.Repeat");
        assert!(matches!(request.probes, ProbeSelection::All));
        assert_eq!(request.harness, DEFAULT_HARNESS);
        assert_eq!(request.format, "table");
        assert_eq!(request.options.concurrency, 10);
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = AugustusConfig::default();
        config.run.concurrency = 3;
        config.run.timeout = Some("10m".to_string());
        config.output.format = Some("jsonl".to_string());

        let args = ScanArgs {
            generator: "test.Repeat".to_string(),
            probes: vec!["test.Test".to_string()],
            concurrency: Some(8),
            format: Some("json".to_string()),
            ..ScanArgs::default()
        };
        let request = build_scan_request(&args, &config).unwrap();

        // The flag wins over the file value.
        assert_eq!(request.options.concurrency, 8);
        assert_eq!(request.format, "json");
        // File values without a competing flag apply.
        assert_eq!(request.options.timeout, std::time::Duration::from_secs(600));
    }

    #[test]
    fn test_config_values_used_without_flags() {
        let mut config = AugustusConfig::default();
        config.run.concurrency = 3;
        config.output.format = Some("jsonl".to_string());

        let args = ScanArgs {
            generator: "test.Repeat".to_string(),
            probes: vec!["test.Test".to_string()],
            ..ScanArgs::default()
        };
        let request = build_scan_request(&args, &config).unwrap();

        assert_eq!(request.options.concurrency, 3);
        assert_eq!(request.format, "jsonl");
    }

    #[test]
    fn test_no_selector_maps_to_none() {
        let args = ScanArgs {
            generator: "test.Repeat".to_string(),
            ..ScanArgs::default()
        };
        let request = build_scan_request(&args, &AugustusConfig::default()).unwrap();
        assert!(matches!(request.probes, ProbeSelection::None));
    }

    #[test]
    fn test_exit_codes() {
        let cancelled = anyhow::Error::from(ScanError::Cancelled);
        assert_eq!(exit_code(&cancelled), 130);

        let validation = anyhow::Error::from(ScanError::NoProbeSelector);
        assert_eq!(exit_code(&validation), 1);

        let detector = anyhow::Error::from(ScanError::Detector {
            detector: "x".to_string(),
            source: crate::error::DetectorError::Other("boom".to_string()),
        });
        assert_eq!(exit_code(&detector), 2);

        let other = anyhow::anyhow!("config parse failure");
        assert_eq!(exit_code(&other), 1);
    }

    #[test]
    fn test_cli_parses_scan() {
        let cli = Cli::parse_from([
            "augustus",
            "scan",
            "openai.OpenAI",
            "--probe",
            "dan.Dan1",
            "--probe",
            "test.Test",
            "--format",
            "jsonl",
            "--concurrency",
            "4",
        ]);
        match cli.command {
            Commands::Scan(args) => {
                assert_eq!(args.generator, "openai.OpenAI");
                assert_eq!(args.probes, vec!["dan.Dan1", "test.Test"]);
                assert_eq!(args.format.as_deref(), Some("jsonl"));
                assert_eq!(args.concurrency, Some(4));
            }
            _ => panic!("expected scan command"),
        }
    }

    #[test]
    fn test_probe_and_all_conflict() {
        let result = Cli::try_parse_from([
            "augustus",
            "scan",
            "openai.OpenAI",
            "--probe",
            "dan.Dan1",
            "--all",
        ]);
        assert!(result.is_err());
    }
}
