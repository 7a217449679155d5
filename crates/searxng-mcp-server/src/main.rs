use anyhow::Result;
use clap::{Parser, Subcommand};
use searxng_mcp_local::{docker, searxng, settings, SearxngClient};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "stdio")]
mod mcp;

#[derive(Parser, Debug)]
#[command(name = "searxng-mcp")]
#[command(about = "SearXNG web search over MCP stdio", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as an MCP stdio server (for Cursor / Claude Desktop / MCP clients).
    McpStdio(ServeCmd),
    /// Run one search from the shell through the same path the MCP tools use.
    Search(SearchCmd),
    /// Diagnose configuration/launch issues (json).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct BackendArgs {
    /// Base URL of the SearXNG instance.
    #[arg(long, env = "SEARXNG_MCP_URL", default_value = searxng::DEFAULT_BASE_URL)]
    url: String,
    /// Deadline for a single backend call (clamped to 1000..=120000).
    #[arg(long, env = "SEARXNG_MCP_TIMEOUT_MS", default_value_t = searxng::DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,
}

impl BackendArgs {
    fn client(&self, http: reqwest::Client) -> Result<SearxngClient> {
        let timeout = Duration::from_millis(searxng::clamp_timeout_ms(self.timeout_ms));
        Ok(SearxngClient::new(http, &self.url, timeout)?)
    }
}

#[derive(clap::Args, Debug)]
struct ServeCmd {
    #[command(flatten)]
    backend: BackendArgs,
    /// Provision and start a local `searxng` docker container before serving.
    #[arg(long, env = "SEARXNG_MCP_AUTO_LAUNCH", default_value_t = false)]
    auto_launch: bool,
}

#[derive(clap::Args, Debug)]
struct SearchCmd {
    /// Search query.
    query: String,
    #[command(flatten)]
    backend: BackendArgs,
    /// Restrict to a category (repeatable). Cannot be combined with the advanced options.
    #[arg(long = "category", conflicts_with_all = ["language", "time_range", "page"])]
    categories: Vec<String>,
    /// Language code (e.g. en, fr).
    #[arg(long)]
    language: Option<String>,
    /// Allowed: day, month, year
    #[arg(long)]
    time_range: Option<String>,
    /// Page number (1-50).
    #[arg(long, allow_negative_numbers = true)]
    page: Option<i64>,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    #[command(flatten)]
    backend: BackendArgs,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
    /// Check the backend with an HTTP GET.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    check_backend: bool,
    /// Spawn a child `searxng-mcp mcp-stdio` and call `list_tools` to prove an MCP client
    /// can start the server. Makes no search calls.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    check_stdio: bool,
    /// Timeout for each doctor check (ms). Separate from `--timeout-ms`, the search deadline.
    #[arg(long = "check-timeout-ms", default_value_t = 3000)]
    check_timeout_ms: u64,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

/// Load `KEY=VALUE` lines from `SEARXNG_MCP_ENV_FILE`, if set.
///
/// Opt-in only. Variables already present in the process environment win, and values are
/// never logged (the subscriber isn't installed yet anyway).
fn load_env_file() {
    let Ok(p) = std::env::var("SEARXNG_MCP_ENV_FILE") else {
        return;
    };
    let p = p.trim();
    if p.is_empty() {
        return;
    }
    let Ok(txt) = std::fs::read_to_string(p) else {
        return;
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        let v = v.trim().trim_matches('"');
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v);
        }
    }
}

fn init_tracing() {
    // stderr only: stdout carries MCP JSON-RPC.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// A token that fires on ctrl-c or SIGTERM.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let t = token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown signal received");
        t.cancel();
    });
    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(feature = "stdio")]
async fn run_search(args: SearchCmd, http: reqwest::Client) -> Result<bool> {
    let backend = args.backend.client(http)?;
    let shutdown = shutdown_token();
    let format = Some(args.output.clone());

    let outcome = if !args.categories.is_empty() {
        let req = mcp::CategorySearchArgs {
            query: Some(args.query),
            categories: Some(args.categories),
            format,
        };
        mcp::run_search_once(&backend, &req, &shutdown).await
    } else if args.language.is_some() || args.time_range.is_some() || args.page.is_some() {
        let req = mcp::AdvancedSearchArgs {
            query: Some(args.query),
            language: args.language,
            time_range: args.time_range,
            page: args.page.map(serde_json::Value::from),
            format,
        };
        mcp::run_search_once(&backend, &req, &shutdown).await
    } else {
        let req = mcp::SearchArgs {
            query: Some(args.query),
            format,
        };
        mcp::run_search_once(&backend, &req, &shutdown).await
    };

    match args.output.trim().to_ascii_lowercase().as_str() {
        "text" => {
            if outcome.ok {
                println!("{}", outcome.text);
            } else {
                eprintln!("{}", outcome.text);
            }
        }
        _ => println!("{}", outcome.payload),
    }
    Ok(outcome.ok)
}

async fn check_backend_reachable(http: &reqwest::Client, url: &str, timeout: Duration) -> serde_json::Value {
    let t0 = std::time::Instant::now();
    let res = http.get(url).timeout(timeout).send().await;
    let elapsed_ms = t0.elapsed().as_millis();
    match res {
        Ok(resp) if resp.status().is_success() => serde_json::json!({
            "name": "backend_reachable",
            "ok": true,
            "skipped": false,
            "message": format!("SearXNG answered HTTP {}", resp.status().as_u16()),
            "hint": "",
            "elapsed_ms": elapsed_ms,
        }),
        Ok(resp) => serde_json::json!({
            "name": "backend_reachable",
            "ok": false,
            "skipped": false,
            "message": format!("SearXNG answered HTTP {}", resp.status().as_u16()),
            "hint": "The instance is up but unhealthy. Check its logs.",
            "elapsed_ms": elapsed_ms,
        }),
        Err(e) => serde_json::json!({
            "name": "backend_reachable",
            "ok": false,
            "skipped": false,
            "message": format!("failed to reach SearXNG: {e}"),
            "hint": "Start SearXNG (or run `searxng-mcp mcp-stdio --auto-launch`) and check --url / SEARXNG_MCP_URL.",
            "elapsed_ms": elapsed_ms,
        }),
    }
}

#[cfg(feature = "stdio")]
async fn check_stdio_handshake(args: &DoctorCmd) -> serde_json::Value {
    use rmcp::service::ServiceExt;
    use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
    use tokio::process::Command;

    let t0 = std::time::Instant::now();
    let exe = std::env::current_exe().unwrap_or_else(|_| std::path::PathBuf::from("searxng-mcp"));
    let child = TokioChildProcess::new(Command::new(exe).configure(|cmd| {
        cmd.args(["mcp-stdio"]);
        cmd.env("SEARXNG_MCP_URL", &args.backend.url);
        // Never provision containers from a doctor check.
        cmd.env_remove("SEARXNG_MCP_AUTO_LAUNCH");
        cmd.env("RUST_LOG", "error");
    }));

    let fail = |code: &str, message: String, hint: &str, elapsed_ms: u128| {
        serde_json::json!({
            "name": "mcp_stdio_handshake",
            "ok": false,
            "skipped": false,
            "message": "stdio MCP handshake failed",
            "hint": hint,
            "tool_count": null,
            "elapsed_ms": elapsed_ms,
            "error": {"code": code, "message": message, "hint": hint},
        })
    };

    let child = match child {
        Ok(c) => c,
        Err(e) => {
            return fail(
                "spawn_failed",
                e.to_string(),
                "Could not start the child process. Reinstall `searxng-mcp`.",
                t0.elapsed().as_millis(),
            )
        }
    };
    let service = match ().serve(child).await {
        Ok(s) => s,
        Err(e) => {
            return fail(
                "handshake_failed",
                e.to_string(),
                "The child closed the stdio transport early. Common causes: stdout contamination or a crash on startup.",
                t0.elapsed().as_millis(),
            )
        }
    };

    let res = tokio::time::timeout(
        Duration::from_millis(args.check_timeout_ms),
        service.list_tools(Default::default()),
    )
    .await;
    let elapsed_ms = t0.elapsed().as_millis();
    let out = match res {
        Ok(Ok(tools)) => serde_json::json!({
            "name": "mcp_stdio_handshake",
            "ok": true,
            "skipped": false,
            "message": "stdio MCP handshake succeeded",
            "hint": "",
            "tool_count": tools.tools.len(),
            "elapsed_ms": elapsed_ms,
            "error": null,
        }),
        Ok(Err(e)) => fail(
            "handshake_failed",
            e.to_string(),
            "Verify your MCP client config points at the correct command and uses args: [\"mcp-stdio\"].",
            elapsed_ms,
        ),
        Err(_elapsed) => fail(
            "timeout",
            format!("stdio handshake timed out after {}ms", args.check_timeout_ms),
            "The child did not answer list_tools in time. Check for a stuck startup.",
            elapsed_ms,
        ),
    };
    let _ = service.cancel().await;
    out
}

fn skipped(name: &str, message: &str) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "ok": true,
        "skipped": true,
        "message": message,
        "hint": "",
        "elapsed_ms": null,
        "error": null,
    })
}

async fn doctor(args: DoctorCmd, http: reqwest::Client) -> serde_json::Value {
    let t0 = std::time::Instant::now();
    let mut checks: Vec<serde_json::Value> = Vec::new();

    let client = args.backend.client(http.clone());
    let url_ok = client.is_ok();
    checks.push(serde_json::json!({
        "name": "url_valid",
        "ok": url_ok,
        "skipped": false,
        "message": match &client {
            Ok(c) => format!("search endpoint: {}", c.endpoint()),
            Err(e) => e.to_string(),
        },
        "hint": if url_ok { "" } else { "Pass an http(s) base URL via --url or SEARXNG_MCP_URL." },
    }));

    if args.check_backend && url_ok {
        checks.push(
            check_backend_reachable(
                &http,
                &args.backend.url,
                Duration::from_millis(args.check_timeout_ms),
            )
            .await,
        );
    } else {
        checks.push(skipped("backend_reachable", "backend check skipped"));
    }

    #[cfg(feature = "stdio")]
    if args.check_stdio {
        checks.push(check_stdio_handshake(&args).await);
    } else {
        checks.push(skipped("mcp_stdio_handshake", "stdio MCP handshake skipped"));
    }
    #[cfg(not(feature = "stdio"))]
    checks.push(skipped(
        "mcp_stdio_handshake",
        "`mcp-stdio` requires building with feature `stdio`",
    ));

    let config_dir = settings::default_config_dir();
    let settings_path = config_dir.join(settings::SETTINGS_FILE);
    let ok = checks.iter().all(|c| c["ok"].as_bool().unwrap_or(false));
    serde_json::json!({
        "schema_version": 1,
        "kind": "doctor",
        "ok": ok,
        "name": "searxng-mcp",
        "version": env!("CARGO_PKG_VERSION"),
        "platform": {
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        },
        "features": {
            "stdio": cfg!(feature = "stdio"),
        },
        "elapsed_ms": t0.elapsed().as_millis(),
        "configured": {
            "url": args.backend.url,
            "timeout_ms": searxng::clamp_timeout_ms(args.backend.timeout_ms),
            "docker_on_path": docker::has_docker(),
            "config_dir": config_dir.to_string_lossy(),
            "settings_path": settings_path.to_string_lossy(),
            "settings_exists": settings_path.is_file(),
        },
        "checks": checks,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    let cli = Cli::parse();
    init_tracing();

    let http = searxng::default_http_client()?;

    match cli.command {
        #[cfg(feature = "stdio")]
        Commands::McpStdio(args) => {
            let shutdown = shutdown_token();
            let client = args.backend.client(http.clone())?;
            if args.auto_launch {
                let opts = docker::BootstrapOptions::new(
                    args.backend.url.clone(),
                    settings::default_config_dir(),
                );
                docker::ensure_container(&http, &opts, &shutdown).await?;
            }
            tracing::info!(
                endpoint = client.endpoint(),
                timeout_ms = client.timeout().as_millis() as u64,
                "starting mcp stdio server"
            );
            mcp::serve_stdio(std::sync::Arc::new(client), shutdown)
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        }
        #[cfg(feature = "stdio")]
        Commands::Search(args) => {
            if !run_search(args, http).await? {
                std::process::exit(1);
            }
        }
        Commands::Doctor(args) => {
            let output = args.output.to_ascii_lowercase();
            let payload = doctor(args, http).await;
            match output.as_str() {
                "text" => {
                    println!(
                        "searxng-mcp {} (ok={})",
                        env!("CARGO_PKG_VERSION"),
                        payload["ok"].as_bool().unwrap_or(false)
                    );
                    println!(
                        "url: {}",
                        payload["configured"]["url"].as_str().unwrap_or("")
                    );
                    println!(
                        "settings: {}",
                        payload["configured"]["settings_path"]
                            .as_str()
                            .unwrap_or("")
                    );
                    println!(
                        "docker: {}",
                        payload["configured"]["docker_on_path"]
                            .as_bool()
                            .unwrap_or(false)
                    );
                    println!("checks:");
                    if let Some(arr) = payload["checks"].as_array() {
                        for c in arr {
                            let name = c["name"].as_str().unwrap_or("?");
                            let ok = c["ok"].as_bool().unwrap_or(false);
                            if c["skipped"].as_bool().unwrap_or(false) {
                                println!("- {name}: skipped");
                            } else {
                                println!("- {}: {}", name, if ok { "ok" } else { "fail" });
                            }
                        }
                    }
                }
                _ => println!("{payload}"),
            }
        }
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "searxng-mcp",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("searxng-mcp {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
        #[cfg(not(feature = "stdio"))]
        Commands::McpStdio(_) | Commands::Search(_) => {
            anyhow::bail!("this command requires feature `stdio` (rebuild with: --features stdio)");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn search_rejects_category_with_advanced_options() {
        let r = Cli::try_parse_from([
            "searxng-mcp",
            "search",
            "rust",
            "--category",
            "it",
            "--page",
            "2",
        ]);
        assert!(r.is_err());
    }

    #[test]
    fn search_accepts_repeated_categories() {
        let cli = Cli::try_parse_from([
            "searxng-mcp",
            "search",
            "ml",
            "--category",
            "science",
            "--category",
            "it",
            "--url",
            "http://127.0.0.1:9",
        ])
        .unwrap();
        let Commands::Search(s) = cli.command else {
            panic!("expected search");
        };
        assert_eq!(s.categories, vec!["science", "it"]);
        assert_eq!(s.backend.url, "http://127.0.0.1:9");
    }

    #[test]
    fn doctor_keeps_search_deadline_and_check_timeout_apart() {
        let cli = Cli::try_parse_from([
            "searxng-mcp",
            "doctor",
            "--timeout-ms",
            "5000",
            "--check-timeout-ms",
            "250",
            "--check-stdio=false",
        ])
        .unwrap();
        let Commands::Doctor(d) = cli.command else {
            panic!("expected doctor");
        };
        assert_eq!(d.backend.timeout_ms, 5000);
        assert_eq!(d.check_timeout_ms, 250);
        assert!(!d.check_stdio);
        assert!(d.check_backend);
    }

    #[tokio::test]
    async fn doctor_reports_invalid_url_without_probing() {
        let args = DoctorCmd {
            backend: BackendArgs {
                url: "ftp://nowhere".to_string(),
                timeout_ms: 1000,
            },
            output: "json".to_string(),
            check_backend: true,
            check_stdio: false,
            check_timeout_ms: 100,
        };
        let v = doctor(args, reqwest::Client::new()).await;
        assert_eq!(v["ok"].as_bool(), Some(false));
        let checks = v["checks"].as_array().unwrap();
        let url = checks.iter().find(|c| c["name"] == "url_valid").unwrap();
        assert_eq!(url["ok"].as_bool(), Some(false));
        let backend_check = checks
            .iter()
            .find(|c| c["name"] == "backend_reachable")
            .unwrap();
        assert_eq!(backend_check["skipped"].as_bool(), Some(true));
    }
}
