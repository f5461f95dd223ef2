use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "dirsweep",
    version,
    about = "concurrent web path and directory scanner",
    long_about = "dirsweep scans a web server for files and directories from a wordlist, with bounded concurrency, rate limiting, retries, response filtering and optional recursion into discovered links.\n\nExamples:\n  dirsweep -u https://target.tld/\n  dirsweep -u https://target.tld/ -w words.txt -e php,bak -t 50\n  dirsweep -u https://target.tld/ -r --depth 2 -f json -o results.json\n\nOnly scan hosts you are authorized to test."
)]
pub struct CliArgs {
    #[arg(
        short = 'u',
        long = "url",
        visible_alias = "target",
        value_name = "URL",
        help_heading = "Input",
        help = "Target base URL (http or https)."
    )]
    pub url: Option<String>,

    #[arg(
        short = 'w',
        long = "wordlist",
        value_name = "FILE",
        help_heading = "Input",
        help = "Wordlist path, one path per line; %EXT% expands to each extension (default: dicc.txt)."
    )]
    pub wordlist: Option<String>,

    #[arg(
        short = 'e',
        long = "extensions",
        value_name = "EXTS",
        help_heading = "Input",
        help = "Comma-separated extensions substituted for %EXT% (default: php,html,js,txt)."
    )]
    pub extensions: Option<String>,

    #[arg(
        short = 't',
        long = "threads",
        visible_alias = "concurrency",
        value_name = "N",
        help_heading = "Performance",
        help = "Number of concurrent workers (default: 20)."
    )]
    pub threads: Option<usize>,

    #[arg(
        long = "rate-limit",
        help_heading = "Performance",
        help = "Enable request rate limiting (see --rps)."
    )]
    pub rate_limit: bool,

    #[arg(
        long = "rps",
        value_name = "N",
        help_heading = "Performance",
        help = "Requests per second when rate limiting is enabled (default: 10)."
    )]
    pub rps: Option<u32>,

    #[arg(
        long = "retry",
        value_name = "N",
        help_heading = "Performance",
        help = "Retries per request after a transport failure (default: 3)."
    )]
    pub retry: Option<u32>,

    #[arg(
        long = "retry-delay",
        value_name = "DURATION",
        help_heading = "Performance",
        help = "Delay between retries, e.g. 500ms, 1s (default: 1s)."
    )]
    pub retry_delay: Option<String>,

    #[arg(
        long = "timeout",
        value_name = "DURATION",
        help_heading = "HTTP",
        help = "Per-request timeout, e.g. 10s, 1500ms; bare numbers are seconds (default: 10s)."
    )]
    pub timeout: Option<String>,

    #[arg(
        short = 'm',
        long = "methods",
        value_name = "METHODS",
        help_heading = "HTTP",
        help = "Comma-separated HTTP methods tried in order per path (default: GET)."
    )]
    pub methods: Option<String>,

    #[arg(
        short = 'H',
        long = "header",
        value_name = "HEADER",
        action = ArgAction::Append,
        help_heading = "HTTP",
        help = "Add a header to all requests, 'Name: value' (repeatable)."
    )]
    pub header: Vec<String>,

    #[arg(
        long = "user-agent",
        visible_alias = "ua",
        value_name = "UA",
        help_heading = "HTTP",
        help = "User-Agent header value."
    )]
    pub user_agent: Option<String>,

    #[arg(
        long = "follow-redirects",
        help_heading = "HTTP",
        help = "Follow HTTP redirects (up to --max-redirects)."
    )]
    pub follow_redirects: bool,

    #[arg(
        long = "max-redirects",
        value_name = "N",
        help_heading = "HTTP",
        help = "Maximum redirects to follow (default: 3)."
    )]
    pub max_redirects: Option<usize>,

    #[arg(
        long = "verify-tls",
        help_heading = "HTTP",
        help = "Verify TLS certificates (skipped by default)."
    )]
    pub verify_tls: bool,

    #[arg(
        long = "status-codes",
        visible_alias = "mc",
        value_name = "CODES",
        help_heading = "Filters",
        help = "Only report these status codes (comma-separated)."
    )]
    pub status_codes: Option<String>,

    #[arg(
        long = "exclude-status",
        visible_alias = "fc",
        value_name = "CODES",
        help_heading = "Filters",
        help = "Never report these status codes (default: 404,400,403; empty to disable)."
    )]
    pub exclude_status: Option<String>,

    #[arg(
        long = "min-size",
        value_name = "BYTES",
        help_heading = "Filters",
        help = "Minimum response size in bytes."
    )]
    pub min_size: Option<u64>,

    #[arg(
        long = "max-size",
        value_name = "BYTES",
        help_heading = "Filters",
        help = "Maximum response size in bytes."
    )]
    pub max_size: Option<u64>,

    #[arg(
        long = "include-regex",
        value_name = "REGEX",
        help_heading = "Filters",
        help = "Only report responses whose body matches (needs -v or -r)."
    )]
    pub include_regex: Option<String>,

    #[arg(
        long = "exclude-regex",
        value_name = "REGEX",
        help_heading = "Filters",
        help = "Drop responses whose body matches (needs -v or -r)."
    )]
    pub exclude_regex: Option<String>,

    #[arg(
        long = "include-words",
        value_name = "WORDS",
        help_heading = "Filters",
        help = "Only report responses containing one of these comma-separated keywords."
    )]
    pub include_words: Option<String>,

    #[arg(
        long = "exclude-words",
        value_name = "WORDS",
        help_heading = "Filters",
        help = "Drop responses containing any of these comma-separated keywords."
    )]
    pub exclude_words: Option<String>,

    #[arg(
        short = 'r',
        long = "recursive",
        help_heading = "Recursion",
        help = "Follow links found on 2xx/3xx pages."
    )]
    pub recursive: bool,

    #[arg(
        long = "depth",
        visible_alias = "max-depth",
        value_name = "N",
        help_heading = "Recursion",
        help = "Maximum recursion depth (default: 3)."
    )]
    pub depth: Option<usize>,

    #[arg(
        short = 'f',
        long = "format",
        value_name = "FORMAT",
        help_heading = "Output",
        help = "Output format: console, json or csv (inferred from --output when omitted)."
    )]
    pub format: Option<String>,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        help_heading = "Output",
        help = "Also write results to this file."
    )]
    pub output: Option<String>,

    #[arg(
        long = "stream",
        help_heading = "Output",
        help = "Write file results as they arrive instead of once at the end."
    )]
    pub stream: bool,

    #[arg(
        short = 'v',
        long = "verbose",
        help_heading = "Output",
        help = "Show method, size and time per result; keep headers and bodies; debug logging."
    )]
    pub verbose: bool,

    #[arg(
        long = "show-errors",
        help_heading = "Output",
        help = "Show requests that failed after all retries."
    )]
    pub show_errors: bool,

    #[arg(
        long = "no-progress",
        help_heading = "Output",
        help = "Disable the progress bar."
    )]
    pub no_progress: bool,

    #[arg(
        long = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        short = 'c',
        long = "config",
        value_name = "FILE",
        help_heading = "Config",
        help = "Path to a YAML or JSON config file (defaults to ~/.dirsweep/config.yml when present)."
    )]
    pub config: Option<String>,
}
