use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::{error::ErrorKind, CommandFactory, Parser};
use colored::Colorize;

use crate::cancel::CancellationController;
use crate::cli::args::CliArgs;
use crate::cli::validation;
use crate::config::{self, ConfigFile, OutputConfig, RateLimitConfig, ScanConfig};
use crate::filter::FilterRules;
use crate::logging::{self, LogRoute};
use crate::output::{self, OutputFormat};
use crate::runner::{Runner, ScanSummary};
use crate::utils;

pub struct Banner {
    pub version: &'static str,
}

impl Banner {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn render(&self) -> String {
        const ART: &str = r#"
       ___
  ____/ (_)_____________      _____  ___  ____
 / __  / / ___/ ___/ | /| / / _ \/ _ \/ __ \
/ /_/ / / /  (__  )| |/ |/ /  __/  __/ /_/ /
\__,_/_/_/  /____/ |__/|__/\___/\___/ .___/
                                   /_/"#;
        format!(
            "{ART}\n       v{} - concurrent web path scanner\n",
            self.version
        )
    }
}

pub fn print_banner(banner: &Banner, color: bool) {
    let text = banner.render();
    if color {
        println!("{}", text.cyan());
    } else {
        println!("{text}");
    }
}

fn format_kv_line(label: &str, value: &str) {
    println!(":: {:<10}: {}", label, value);
}

fn format_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn print_scan_settings(run: &ScanConfig) {
    format_kv_line("Target", &run.target);
    format_kv_line("Wordlist", &run.wordlist.display().to_string());
    format_kv_line("Threads", &run.threads.to_string());
    let methods: Vec<&str> = run.methods.iter().map(|m| m.as_str()).collect();
    format_kv_line("Methods", &methods.join(","));
    format_kv_line("Extensions", &run.extensions.join(","));
    format_kv_line("Timeout", &format!("{:?}", run.timeout));
    if run.rate_limit.enabled {
        format_kv_line(
            "Rate",
            &format!("{} req/s", run.rate_limit.requests_per_second),
        );
    }
    if run.recursive {
        format_kv_line("Recursive", &format!("depth {}", run.max_depth));
    }
    if let Some(file) = run.output.file.as_ref() {
        format_kv_line(
            "Output",
            &format!("{} ({})", file.display(), run.output.format.name()),
        );
    }
    format_kv_line("Verbose", format_bool(run.output.verbose));
    println!();
}

fn duration_setting(
    flag: Option<String>,
    file: Option<config::DurationSetting>,
    name: &str,
    default: Duration,
) -> Result<Duration, String> {
    if let Some(raw) = flag {
        return config::parse_duration(&raw).map_err(|e| format!("invalid --{name} '{raw}': {e}"));
    }
    match file {
        Some(setting) => setting
            .to_duration()
            .map_err(|e| format!("invalid {name} in config: {e}")),
        None => Ok(default),
    }
}

// merges flags over the config file over built-in defaults
pub fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<ScanConfig, String> {
    validation::validate(&args)?;
    let defaults = ScanConfig::default();

    let target = args.url.or(cfg.target).unwrap_or_default();
    let wordlist = args
        .wordlist
        .or(cfg.wordlist)
        .map(|p| config::expand_tilde(&p))
        .unwrap_or(defaults.wordlist);
    let threads = args.threads.or(cfg.threads).unwrap_or(defaults.threads);
    let timeout = duration_setting(args.timeout, cfg.timeout, "timeout", defaults.timeout)?;
    let retry_delay = duration_setting(
        args.retry_delay,
        cfg.retry_delay,
        "retry-delay",
        defaults.retry_delay,
    )?;
    let retry_count = args.retry.or(cfg.retry).unwrap_or(defaults.retry_count);
    let user_agent = args
        .user_agent
        .or(cfg.user_agent)
        .unwrap_or(defaults.user_agent);

    // flag headers come last so they replace config headers of the same name
    let mut headers = Vec::new();
    for line in cfg.headers.unwrap_or_default().iter().chain(args.header.iter()) {
        headers.push(config::parse_header_line(line).map_err(|e| e.to_string())?);
    }

    let methods = match args.methods.or(cfg.methods) {
        Some(raw) => utils::parse_http_methods_csv(&raw)
            .map_err(|e| format!("invalid methods '{raw}': {e}"))?,
        None => defaults.methods,
    };
    let extensions = match args.extensions.or(cfg.extensions) {
        Some(raw) => utils::parse_extensions_csv(&raw)
            .map_err(|e| format!("invalid extensions '{raw}': {e}"))?,
        None => defaults.extensions,
    };

    let rate_limit = RateLimitConfig {
        enabled: args.rate_limit || cfg.rate_limit.unwrap_or(defaults.rate_limit.enabled),
        requests_per_second: args
            .rps
            .or(cfg.rps)
            .unwrap_or(defaults.rate_limit.requests_per_second),
    };

    let status_codes = match args.status_codes.or(cfg.status_codes) {
        Some(raw) => utils::parse_status_codes_csv(&raw)
            .map_err(|e| format!("invalid status codes '{raw}': {e}"))?,
        None => defaults.filter.status_codes,
    };
    let exclude_status = match args.exclude_status.or(cfg.exclude_status) {
        Some(raw) => utils::parse_status_codes_csv(&raw)
            .map_err(|e| format!("invalid exclude status '{raw}': {e}"))?,
        None => defaults.filter.exclude_status,
    };
    let filter = FilterRules {
        status_codes,
        exclude_status,
        min_size: args.min_size.or(cfg.min_size).unwrap_or(0),
        max_size: args.max_size.or(cfg.max_size).unwrap_or(0),
        include_regex: args.include_regex.or(cfg.include_regex),
        exclude_regex: args.exclude_regex.or(cfg.exclude_regex),
        include_words: args
            .include_words
            .or(cfg.include_words)
            .map(|raw| utils::parse_words_csv(&raw))
            .unwrap_or_default(),
        exclude_words: args
            .exclude_words
            .or(cfg.exclude_words)
            .map(|raw| utils::parse_words_csv(&raw))
            .unwrap_or_default(),
    };

    let file = args.output.or(cfg.output).filter(|p| !p.trim().is_empty());
    let format = match args.format.or(cfg.format) {
        Some(raw) => OutputFormat::parse(&raw)
            .ok_or_else(|| format!("invalid format '{raw}', expected console, json or csv"))?,
        None => file
            .as_deref()
            .and_then(output::infer_format_from_path)
            .unwrap_or(OutputFormat::Console),
    };
    let output = OutputConfig {
        format,
        file: file.map(|p| config::expand_tilde(&p)),
        verbose: args.verbose || cfg.verbose.unwrap_or(false),
        show_errors: args.show_errors || cfg.show_errors.unwrap_or(false),
        buffered: !(args.stream || cfg.stream.unwrap_or(false)),
        progress: !(args.no_progress || cfg.no_progress.unwrap_or(false)),
        color: !(args.no_color || cfg.no_color.unwrap_or(false)),
    };

    let run = ScanConfig {
        target,
        wordlist,
        threads,
        timeout,
        retry_count,
        retry_delay,
        max_depth: args.depth.or(cfg.max_depth).unwrap_or(defaults.max_depth),
        recursive: args.recursive || cfg.recursive.unwrap_or(false),
        methods,
        headers,
        user_agent,
        rate_limit,
        filter,
        extensions,
        skip_tls_verify: !(args.verify_tls || cfg.verify_tls.unwrap_or(false)),
        follow_redirects: args.follow_redirects || cfg.follow_redirects.unwrap_or(false),
        max_redirects: args
            .max_redirects
            .or(cfg.max_redirects)
            .unwrap_or(defaults.max_redirects),
        output,
    };
    run.validate().map_err(|e| e.to_string())?;
    Ok(run)
}

fn print_summary(summary: &ScanSummary) {
    println!();
    if summary.cancelled {
        println!(
            ":: Cancelled :: {} results after {} of {} jobs in {}s ::",
            summary.results,
            summary.processed,
            summary.total_jobs,
            summary.elapsed.as_secs()
        );
    } else {
        println!(
            ":: Completed :: {} results in {}s ::",
            summary.results,
            summary.elapsed.as_secs()
        );
    }
    let errors = &summary.write_errors;
    for e in errors.first.iter() {
        eprintln!("[!] output error: {e}");
    }
    if errors.count > errors.first.len() {
        eprintln!(
            "[!] ... and {} more output errors",
            errors.count - errors.first.len()
        );
    }
}

async fn run_async(run: ScanConfig, route: LogRoute) -> Result<(), String> {
    if !run.output.color {
        colored::control::set_override(false);
    }
    print_banner(&Banner::current(), run.output.color);
    print_scan_settings(&run);

    let runner = Runner::new(run)
        .map_err(|e| e.to_string())?
        .with_log_route(route);
    let writer = output::build_writer(&runner.config().output).map_err(|e| e.to_string())?;

    let controller = CancellationController::new();
    let listener = controller.spawn_signal_listener();
    let outcome = runner.run(writer, &controller).await;
    listener.abort();

    let summary = outcome.map_err(|e| e.to_string())?;
    print_summary(&summary);
    Ok(())
}

fn load_file_config(path: Option<&str>) -> Result<ConfigFile, String> {
    let (path, allow_missing): (Option<PathBuf>, bool) = match path {
        Some(p) => (Some(config::expand_tilde(p)), false),
        None => (config::default_config_path(), true),
    };
    match path {
        Some(path) => config::load_config(&path, allow_missing).map_err(|e| e.to_string()),
        None => Ok(ConfigFile::default()),
    }
}

// `Ok(None)` means usage or version text was printed and there is nothing to
// run. a bare invocation prints the usage, like `--help`.
pub fn parse_args<I, T>(argv: I) -> Result<Option<CliArgs>, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
    if argv.len() <= 1 {
        CliArgs::command()
            .print_help()
            .map_err(|e| format!("failed to print usage: {e}"))?;
        println!();
        return Ok(None);
    }
    match CliArgs::try_parse_from(argv) {
        Ok(args) => Ok(Some(args)),
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                let _ = e.print();
                Ok(None)
            }
            _ => Err(e.to_string()),
        },
    }
}

pub fn run_cli() -> Result<(), String> {
    let Some(args) = parse_args(std::env::args_os())? else {
        return Ok(());
    };

    let cfg = load_file_config(args.config.as_deref())?;
    let run = build_run_config(args, cfg)?;
    let route = logging::init(run.output.verbose, run.output.color);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run, route))?;
    Ok(())
}

#[cfg(test)]
mod cli_tests {
    use super::*;
    use clap::Parser;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["dirsweep", "-u", "http://example.com/"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn bare_invocation_prints_usage_instead_of_failing() {
        assert!(parse_args(["dirsweep"]).unwrap().is_none());
        assert!(parse_args(Vec::<String>::new()).unwrap().is_none());
    }

    #[test]
    fn help_and_version_are_not_errors() {
        assert!(parse_args(["dirsweep", "--help"]).unwrap().is_none());
        assert!(parse_args(["dirsweep", "--version"]).unwrap().is_none());
    }

    #[test]
    fn parse_args_returns_flags_or_the_clap_error() {
        let parsed = parse_args(["dirsweep", "-u", "http://example.com/"])
            .unwrap()
            .unwrap();
        assert_eq!(parsed.url.as_deref(), Some("http://example.com/"));
        assert!(parse_args(["dirsweep", "--no-such-flag"]).is_err());
    }

    #[test]
    fn defaults_apply_without_flags_or_config() {
        let run = build_run_config(args(&[]), ConfigFile::default()).unwrap();
        assert_eq!(run.threads, 20);
        assert_eq!(run.timeout, Duration::from_secs(10));
        assert_eq!(run.retry_count, 3);
        assert_eq!(run.filter.exclude_status, vec![404, 400, 403]);
        assert_eq!(run.output.format, OutputFormat::Console);
        assert!(run.skip_tls_verify);
        assert!(!run.rate_limit.enabled);
        assert!(run.output.buffered);
    }

    #[test]
    fn flags_override_config_file() {
        let cfg = ConfigFile {
            threads: Some(5),
            methods: Some("POST".to_string()),
            recursive: Some(true),
            headers: Some(vec!["X-From: config".to_string()]),
            ..ConfigFile::default()
        };
        let run = build_run_config(
            args(&["-t", "8", "-H", "X-From: flag", "--exclude-status", ""]),
            cfg,
        )
        .unwrap();
        assert_eq!(run.threads, 8);
        assert_eq!(run.methods, vec![reqwest::Method::POST]);
        assert!(run.recursive);
        assert!(run.filter.exclude_status.is_empty());
        assert_eq!(
            run.headers.last(),
            Some(&("X-From".to_string(), "flag".to_string()))
        );
    }

    #[test]
    fn format_is_inferred_from_output_path() {
        let run = build_run_config(args(&["-o", "found.csv", "--stream"]), ConfigFile::default())
            .unwrap();
        assert_eq!(run.output.format, OutputFormat::Csv);
        assert!(!run.output.buffered);
        assert_eq!(run.output.file, Some(PathBuf::from("found.csv")));
    }

    #[test]
    fn file_format_without_output_is_rejected() {
        let err = build_run_config(args(&["-f", "json"]), ConfigFile::default()).unwrap_err();
        assert!(err.contains("output file"));
    }

    #[test]
    fn missing_target_is_rejected() {
        let err = build_run_config(CliArgs::parse_from(["dirsweep"]), ConfigFile::default())
            .unwrap_err();
        assert!(err.contains("target"));
    }

    #[test]
    fn banner_carries_the_version() {
        let banner = Banner { version: "9.9.9" };
        assert!(banner.render().contains("v9.9.9"));
    }
}
