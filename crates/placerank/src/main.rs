use anyhow::Result;
use clap::Parser;
use placerank_core::{Error, MatchStrategy, PlaceItem, RankQuery, RankResult};
use placerank_local::engine::{RankEngine, RequestHeaders};
use placerank_local::profile::SelectorProfile;
use placerank_local::LocalFetcher;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

#[derive(Parser, Debug)]
#[command(name = "placerank")]
#[command(about = "Rank of a shop in map search results (single-shot JSON lookup)", long_about = None)]
struct Cli {
    /// Search keyword (may also be given positionally).
    #[arg(long)]
    keyword: Option<String>,

    /// Shop name to match (may also be given positionally).
    #[arg(long)]
    shop: Option<String>,

    /// Match strategy. Allowed: partial, exact
    #[arg(long = "match", value_name = "STRATEGY", default_value = "partial")]
    match_strategy: MatchStrategy,

    /// Overall deadline for the run (both fetches combined), in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,

    /// User-Agent header override.
    #[arg(long)]
    user_agent: Option<String>,

    /// Pretty-print the JSON response.
    #[arg(long)]
    pretty: bool,

    /// Include extended fields (strategy, counters, URLs, timing).
    #[arg(long)]
    full: bool,

    /// Request trace to stderr.
    #[arg(long)]
    debug: bool,

    /// Positional form: <keyword> <shop name>.
    #[arg(value_name = "ARG")]
    rest: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorInfo {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
}

#[derive(Debug, Serialize)]
struct MinimalResponse {
    ok: bool,
    keyword: String,
    shop_name: String,
    found: bool,
    rank: i32,
    matched_name: String,
    items: Vec<PlaceItem>,
    error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize)]
struct FullResponse {
    #[serde(flatten)]
    minimal: MinimalResponse,
    match_strategy: String,
    items_scanned: u32,
    search_url: String,
    iframe_url: String,
    timestamp_epoch_s: u64,
    duration_ms: u128,
}

/// Flags win over positionals; positionals fill whatever the flags left
/// unset. Anything else is an argument error.
fn resolve_query(
    keyword: Option<String>,
    shop: Option<String>,
    rest: &[String],
) -> std::result::Result<(String, String), String> {
    let (keyword, shop) = match (keyword, shop, rest) {
        (None, None, [k, s]) => (k.clone(), s.clone()),
        (None, Some(s), [k]) => (k.clone(), s),
        (Some(k), None, [s]) => (k, s.clone()),
        (k, s, []) => (k.unwrap_or_default(), s.unwrap_or_default()),
        _ => return Err("unexpected positional arguments".to_string()),
    };
    if keyword.trim().is_empty() {
        return Err("keyword is required".to_string());
    }
    if shop.trim().is_empty() {
        return Err("shop name is required".to_string());
    }
    Ok((keyword, shop))
}

fn error_info(err: &Error) -> ErrorInfo {
    let (code, status) = match err {
        Error::HttpStatus { status, .. } => ("http_status", Some(*status)),
        Error::Parse { .. } => ("parse_error", None),
        Error::Structure(_) => ("structure", None),
        Error::Timeout(_) => ("timeout", None),
        Error::InvalidUrl(_) | Error::Fetch(_) => ("request_error", None),
    };
    ErrorInfo {
        code,
        message: err.to_string(),
        status,
    }
}

fn now_epoch_s() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}

fn write_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

struct FullExtras {
    items_scanned: u32,
    search_url: String,
    iframe_url: String,
}

fn emit(
    minimal: MinimalResponse,
    extras: FullExtras,
    strategy: MatchStrategy,
    started: Instant,
    cli_full: bool,
    cli_pretty: bool,
) -> Result<()> {
    if cli_full {
        write_json(
            &FullResponse {
                minimal,
                match_strategy: strategy.to_string(),
                items_scanned: extras.items_scanned,
                search_url: extras.search_url,
                iframe_url: extras.iframe_url,
                timestamp_epoch_s: now_epoch_s(),
                duration_ms: started.elapsed().as_millis(),
            },
            cli_pretty,
        )
    } else {
        write_json(&minimal, cli_pretty)
    }
}

async fn run(cli: Cli, started: Instant) -> Result<ExitCode> {
    let strategy = cli.match_strategy;

    let (keyword, shop_name) =
        match resolve_query(cli.keyword.clone(), cli.shop.clone(), &cli.rest) {
            Ok(v) => v,
            Err(msg) => {
                let minimal = MinimalResponse {
                    ok: false,
                    keyword: cli.keyword.unwrap_or_default(),
                    shop_name: cli.shop.unwrap_or_default(),
                    found: false,
                    rank: -1,
                    matched_name: String::new(),
                    items: Vec::new(),
                    error: Some(ErrorInfo {
                        code: "invalid_args",
                        message: msg,
                        status: None,
                    }),
                };
                emit(
                    minimal,
                    FullExtras {
                        items_scanned: 0,
                        search_url: String::new(),
                        iframe_url: String::new(),
                    },
                    strategy,
                    started,
                    cli.full,
                    cli.pretty,
                )?;
                return Ok(ExitCode::from(2));
            }
        };

    let mut headers = RequestHeaders::default();
    if let Some(ua) = cli.user_agent.as_deref() {
        if !ua.trim().is_empty() {
            headers.user_agent = ua.to_string();
        }
    }

    let query = RankQuery {
        keyword,
        shop_name,
        strategy,
    };

    let outcome: placerank_core::Result<RankResult> = match LocalFetcher::new()
        .and_then(|f| RankEngine::new(Arc::new(f), SelectorProfile::from_env(), headers))
    {
        Ok(engine) => {
            if cli.debug {
                if let Ok(u) = engine.search_url(&query.keyword) {
                    eprintln!("debug: GET {u}");
                }
            }
            engine
                .rank(&query, Duration::from_millis(cli.timeout_ms))
                .await
        }
        Err(e) => Err(e),
    };

    let (minimal, extras) = match &outcome {
        Ok(r) => {
            if cli.debug {
                eprintln!("debug: iframe {}", r.iframe_url);
                eprintln!("debug: scanned {} organic items", r.items_scanned);
            }
            (
                MinimalResponse {
                    ok: true,
                    keyword: r.keyword.clone(),
                    shop_name: r.shop_name.clone(),
                    found: r.found,
                    rank: r.rank,
                    matched_name: r.matched_name.clone(),
                    items: r.items.clone(),
                    error: None,
                },
                FullExtras {
                    items_scanned: r.items_scanned,
                    search_url: r.search_url.clone(),
                    iframe_url: r.iframe_url.clone(),
                },
            )
        }
        Err(e) => {
            if cli.debug {
                eprintln!("debug: run failed: {e}");
            }
            (
                MinimalResponse {
                    ok: false,
                    keyword: query.keyword.clone(),
                    shop_name: query.shop_name.clone(),
                    found: false,
                    rank: -1,
                    matched_name: String::new(),
                    items: Vec::new(),
                    error: Some(error_info(e)),
                },
                FullExtras {
                    items_scanned: 0,
                    search_url: String::new(),
                    iframe_url: String::new(),
                },
            )
        }
    };

    emit(minimal, extras, strategy, started, cli.full, cli.pretty)?;
    Ok(if outcome.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let started = Instant::now();
    let cli = Cli::parse();
    match run(cli, started).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("placerank: {e:#}");
            ExitCode::from(1)
        }
    }
}
