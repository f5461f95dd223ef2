use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use thiserror::Error;

use crate::filter::{FilterError, FilterRules, ResultFilter};
use crate::output::OutputFormat;
use crate::scanner::MAX_REQUESTS_PER_SECOND;

// durations may be written as `10`, `"10s"`, `"500ms"` or `"1m30s"`
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum DurationSetting {
    Seconds(u64),
    Text(String),
}

impl DurationSetting {
    pub fn to_duration(&self) -> Result<Duration, String> {
        match self {
            Self::Seconds(secs) => Ok(Duration::from_secs(*secs)),
            Self::Text(raw) => parse_duration(raw),
        }
    }
}

// a list written either as one comma separated string or as a sequence,
// e.g. `methods: GET,POST` or `"exclude_status": [404, 403]`
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ListSetting {
    Items(Vec<ListItem>),
    Single(ListItem),
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ListItem {
    Number(i64),
    Text(String),
}

impl ListItem {
    fn text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.trim().to_string(),
        }
    }
}

impl ListSetting {
    pub fn to_csv(&self) -> String {
        match self {
            Self::Single(item) => item.text(),
            Self::Items(items) => items
                .iter()
                .map(ListItem::text)
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

// headers as `"Name: value"` lines or as a `{Name: value}` map
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum HeaderSetting {
    Map(BTreeMap<String, ListItem>),
    Lines(Vec<String>),
    Line(String),
}

impl HeaderSetting {
    pub fn to_lines(&self) -> Vec<String> {
        match self {
            Self::Map(map) => map
                .iter()
                .map(|(name, value)| format!("{name}: {}", value.text()))
                .collect(),
            Self::Lines(lines) => lines.clone(),
            Self::Line(line) => vec![line.clone()],
        }
    }
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct ScannerSection {
    pub methods: Option<ListSetting>,
    pub extensions: Option<ListSetting>,
    #[serde(alias = "skip_tls_verify")]
    pub skip_ssl_verify: Option<bool>,
    pub follow_redirects: Option<bool>,
    pub max_redirects: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct FilterSection {
    pub status_codes: Option<ListSetting>,
    pub exclude_status: Option<ListSetting>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub include_regex: Option<String>,
    pub exclude_regex: Option<String>,
    pub include_words: Option<ListSetting>,
    pub exclude_words: Option<ListSetting>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct RateLimitSection {
    pub enabled: Option<bool>,
    #[serde(alias = "rps")]
    pub requests_per_second: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum RateLimitSetting {
    Enabled(bool),
    Section(RateLimitSection),
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct OutputSection {
    pub format: Option<String>,
    pub file: Option<String>,
    pub verbose: Option<bool>,
    pub show_errors: Option<bool>,
    pub stream: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum OutputSetting {
    File(String),
    Section(OutputSection),
}

// the on-disk layout. both the flat keys and the nested `scanner`,
// `filters`, `rate_limit` and `output` sections are accepted; a flat key wins
// over the same setting in a section.
#[derive(Debug, Default, Deserialize, Clone)]
pub struct ConfigDocument {
    #[serde(alias = "url")]
    pub target: Option<String>,
    pub wordlist: Option<String>,
    pub threads: Option<usize>,
    pub timeout: Option<DurationSetting>,
    pub user_agent: Option<String>,
    pub headers: Option<HeaderSetting>,
    pub methods: Option<ListSetting>,
    pub extensions: Option<ListSetting>,
    #[serde(alias = "retry_count")]
    pub retry: Option<u32>,
    pub retry_delay: Option<DurationSetting>,
    pub rate_limit: Option<RateLimitSetting>,
    #[serde(alias = "requests_per_second")]
    pub rps: Option<u32>,
    pub follow_redirects: Option<bool>,
    pub max_redirects: Option<usize>,
    pub verify_tls: Option<bool>,
    #[serde(alias = "skip_ssl_verify")]
    pub skip_tls_verify: Option<bool>,
    pub status_codes: Option<ListSetting>,
    pub exclude_status: Option<ListSetting>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub include_regex: Option<String>,
    pub exclude_regex: Option<String>,
    pub include_words: Option<ListSetting>,
    pub exclude_words: Option<ListSetting>,
    pub recursive: Option<bool>,
    #[serde(alias = "depth")]
    pub max_depth: Option<usize>,
    pub format: Option<String>,
    pub output: Option<OutputSetting>,
    pub stream: Option<bool>,
    pub verbose: Option<bool>,
    pub show_errors: Option<bool>,
    pub no_progress: Option<bool>,
    pub no_color: Option<bool>,
    pub scanner: Option<ScannerSection>,
    pub filters: Option<FilterSection>,
}

// config file settings after the document layout is resolved. every field is
// optional, an unset field falls back to the flag or the built-in default.
#[derive(Debug, Default, Clone)]
pub struct ConfigFile {
    pub target: Option<String>,
    pub wordlist: Option<String>,
    pub threads: Option<usize>,
    pub timeout: Option<DurationSetting>,
    pub user_agent: Option<String>,
    pub headers: Option<Vec<String>>,
    pub methods: Option<String>,
    pub extensions: Option<String>,
    pub retry: Option<u32>,
    pub retry_delay: Option<DurationSetting>,
    pub rate_limit: Option<bool>,
    pub rps: Option<u32>,
    pub follow_redirects: Option<bool>,
    pub max_redirects: Option<usize>,
    pub verify_tls: Option<bool>,
    pub status_codes: Option<String>,
    pub exclude_status: Option<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub include_regex: Option<String>,
    pub exclude_regex: Option<String>,
    pub include_words: Option<String>,
    pub exclude_words: Option<String>,
    pub recursive: Option<bool>,
    pub max_depth: Option<usize>,
    pub format: Option<String>,
    pub output: Option<String>,
    pub stream: Option<bool>,
    pub verbose: Option<bool>,
    pub show_errors: Option<bool>,
    pub no_progress: Option<bool>,
    pub no_color: Option<bool>,
}

// files written with every key present carry `""` and `[]` for unset values.
// `exclude_status` keeps its empty list, which turns the default exclusions off.
fn text(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn list_csv(value: Option<ListSetting>) -> Option<String> {
    value.as_ref().map(ListSetting::to_csv)
}

impl From<ConfigDocument> for ConfigFile {
    fn from(doc: ConfigDocument) -> Self {
        let scanner = doc.scanner.unwrap_or_default();
        let filters = doc.filters.unwrap_or_default();
        let (rate_enabled, rate_rps) = match doc.rate_limit {
            Some(RateLimitSetting::Enabled(enabled)) => (Some(enabled), None),
            Some(RateLimitSetting::Section(section)) => {
                (section.enabled, section.requests_per_second)
            }
            None => (None, None),
        };
        let (output_file, output) = match doc.output {
            Some(OutputSetting::File(file)) => (Some(file), OutputSection::default()),
            Some(OutputSetting::Section(section)) => (section.file.clone(), section),
            None => (None, OutputSection::default()),
        };
        let skip_tls_verify = doc.skip_tls_verify.or(scanner.skip_ssl_verify);

        Self {
            target: text(doc.target),
            wordlist: text(doc.wordlist),
            threads: doc.threads,
            timeout: doc.timeout,
            user_agent: text(doc.user_agent),
            headers: doc.headers.as_ref().map(HeaderSetting::to_lines),
            methods: text(list_csv(doc.methods.or(scanner.methods))),
            extensions: text(list_csv(doc.extensions.or(scanner.extensions))),
            retry: doc.retry,
            retry_delay: doc.retry_delay,
            rate_limit: rate_enabled,
            rps: doc.rps.or(rate_rps),
            follow_redirects: doc.follow_redirects.or(scanner.follow_redirects),
            max_redirects: doc.max_redirects.or(scanner.max_redirects),
            verify_tls: doc.verify_tls.or(skip_tls_verify.map(|skip| !skip)),
            status_codes: text(list_csv(doc.status_codes.or(filters.status_codes))),
            exclude_status: list_csv(doc.exclude_status.or(filters.exclude_status)),
            min_size: doc.min_size.or(filters.min_size),
            max_size: doc.max_size.or(filters.max_size),
            include_regex: text(doc.include_regex.or(filters.include_regex)),
            exclude_regex: text(doc.exclude_regex.or(filters.exclude_regex)),
            include_words: text(list_csv(doc.include_words.or(filters.include_words))),
            exclude_words: text(list_csv(doc.exclude_words.or(filters.exclude_words))),
            recursive: doc.recursive,
            max_depth: doc.max_depth,
            format: text(doc.format.or(output.format)),
            output: text(output_file),
            stream: doc.stream.or(output.stream),
            verbose: doc.verbose.or(output.verbose),
            show_errors: doc.show_errors.or(output.show_errors),
            no_progress: doc.no_progress,
            no_color: doc.no_color,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub file: Option<PathBuf>,
    pub verbose: bool,
    pub show_errors: bool,
    // buffered writers hold everything until the final flush, streaming ones
    // write each result as it arrives
    pub buffered: bool,
    pub progress: bool,
    pub color: bool,
}

#[derive(Clone, Debug)]
pub struct ScanConfig {
    pub target: String,
    pub wordlist: PathBuf,
    pub threads: usize,
    pub timeout: Duration,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub max_depth: usize,
    pub recursive: bool,
    pub methods: Vec<Method>,
    pub headers: Vec<(String, String)>,
    pub user_agent: String,
    pub rate_limit: RateLimitConfig,
    pub filter: FilterRules,
    pub extensions: Vec<String>,
    pub skip_tls_verify: bool,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub output: OutputConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            wordlist: PathBuf::from("dicc.txt"),
            threads: 20,
            timeout: Duration::from_secs(10),
            retry_count: 3,
            retry_delay: Duration::from_secs(1),
            max_depth: 3,
            recursive: false,
            methods: vec![Method::GET],
            headers: Vec::new(),
            user_agent: default_user_agent(),
            rate_limit: RateLimitConfig {
                enabled: false,
                requests_per_second: 10,
            },
            filter: FilterRules {
                exclude_status: vec![404, 400, 403],
                ..Default::default()
            },
            extensions: ["php", "html", "js", "txt"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            skip_tls_verify: true,
            follow_redirects: false,
            max_redirects: 3,
            output: OutputConfig {
                format: OutputFormat::Console,
                file: None,
                verbose: false,
                show_errors: false,
                buffered: true,
                progress: true,
                color: true,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("target URL is required (--url)")]
    MissingTarget,

    #[error("invalid target URL: {url}")]
    InvalidUrl { url: String },

    #[error("wordlist path is required (--wordlist)")]
    MissingWordlist,

    #[error("invalid threads {value}, expected positive integer")]
    InvalidThreads { value: usize },

    #[error("timeout must be greater than zero")]
    InvalidTimeout,

    #[error(
        "requests per second must be between 1 and {max} when rate limiting is enabled, got {value}"
    )]
    InvalidRate { value: u32, max: u32 },

    #[error("at least one HTTP method is required")]
    NoMethods,

    #[error("{format} output requires an output file (--output)")]
    MissingOutputFile { format: &'static str },

    #[error("invalid header '{line}', expected 'Name: value'")]
    InvalidHeader { line: String },

    #[error("invalid {field} '{value}': {message}")]
    InvalidValue {
        field: &'static str,
        value: String,
        message: String,
    },

    #[error("config file not found '{path}'")]
    FileNotFound { path: String },

    #[error("failed to read config '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config '{path}': {source}")]
    FileParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error(transparent)]
    Filter(#[from] FilterError),
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let target = self.target.trim();
        if target.is_empty() {
            return Err(ConfigError::MissingTarget);
        }
        match reqwest::Url::parse(target) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => {}
            _ => {
                return Err(ConfigError::InvalidUrl {
                    url: target.to_string(),
                })
            }
        }
        if self.wordlist.as_os_str().is_empty() {
            return Err(ConfigError::MissingWordlist);
        }
        if self.threads == 0 {
            return Err(ConfigError::InvalidThreads {
                value: self.threads,
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        let rps = self.rate_limit.requests_per_second;
        if self.rate_limit.enabled && !(1..=MAX_REQUESTS_PER_SECOND).contains(&rps) {
            return Err(ConfigError::InvalidRate {
                value: rps,
                max: MAX_REQUESTS_PER_SECOND,
            });
        }
        if self.methods.is_empty() {
            return Err(ConfigError::NoMethods);
        }
        if self.output.format.needs_file() && self.output.file.is_none() {
            return Err(ConfigError::MissingOutputFile {
                format: self.output.format.name(),
            });
        }
        // compile once up front so a bad pattern fails before any request
        ResultFilter::new(&self.filter)?;
        Ok(())
    }
}

pub fn default_user_agent() -> String {
    format!("dirsweep/{}", env!("CARGO_PKG_VERSION"))
}

// a bare number is seconds. otherwise one or more number+unit pairs, as in
// `1m30s` or `1.5h`, with units h, m, s, ms, us (or µs) and ns.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = raw.parse::<f64>() {
        return seconds(secs);
    }

    let mut total = 0.0f64;
    let mut rest = raw;
    while !rest.is_empty() {
        let split = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(split);
        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid number in '{raw}'"))?;
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);
        let scale = match unit {
            "h" => 3600.0,
            "m" => 60.0,
            "s" => 1.0,
            "ms" => 1e-3,
            "us" | "µs" => 1e-6,
            "ns" => 1e-9,
            "" => return Err(format!("missing unit in '{raw}'")),
            other => {
                return Err(format!(
                    "unknown unit '{other}', expected h, m, s, ms, us or ns"
                ))
            }
        };
        total += value * scale;
        rest = next;
    }
    seconds(total)
}

fn seconds(secs: f64) -> Result<Duration, String> {
    if !secs.is_finite() || secs < 0.0 || secs > u64::MAX as f64 {
        return Err("duration out of range".to_string());
    }
    Ok(Duration::from_secs_f64(secs))
}

pub fn parse_header_line(line: &str) -> Result<(String, String), ConfigError> {
    let invalid = || ConfigError::InvalidHeader {
        line: line.to_string(),
    };
    let (name, value) = line.split_once(':').ok_or_else(invalid)?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return Err(invalid());
    }
    Ok((name.to_string(), value.trim().to_string()))
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("USERPROFILE").map(PathBuf::from))
        .or_else(|| {
            let drive = env::var_os("HOMEDRIVE")?;
            let path = env::var_os("HOMEPATH")?;
            Some(PathBuf::from(drive).join(path))
        })
}

pub fn default_config_path() -> Option<PathBuf> {
    Some(home_dir()?.join(".dirsweep").join("config.yml"))
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn load_config(path: &PathBuf, allow_missing: bool) -> Result<ConfigFile, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            serde_yaml::from_str::<ConfigDocument>(&contents)
                .map(ConfigFile::from)
                .map_err(|e| ConfigError::FileParse {
                    path: path.display().to_string(),
                    source: e,
                })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && allow_missing => {
            Ok(ConfigFile::default())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        }),
        Err(e) => Err(ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        }),
    }
}
