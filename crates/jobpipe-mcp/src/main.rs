use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;

mod mcp;

#[derive(Parser, Debug)]
#[command(name = "jobpipe")]
#[command(about = "Jenkins job control (MCP stdio / streamable HTTP server)", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as an MCP stdio server (for Cursor / MCP clients).
    McpStdio,
    /// Run as an MCP streamable-HTTP server, mounted at /mcp.
    McpHttp(McpHttpCmd),
    /// Diagnose configuration/launch issues (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct McpHttpCmd {
    #[arg(long, env = "MCP_HOST", default_value = "127.0.0.1")]
    host: String,
    #[arg(long, env = "MCP_PORT", default_value_t = 8010)]
    port: u16,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
    /// Probe JENKINS_URL (the same check as the `health` tool).
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    check_remote: bool,
    /// Spawn a child `jobpipe mcp-stdio` and call `list_tools`.
    ///
    /// Proves an MCP client can start the server. No Jenkins call is made by this check.
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    check_stdio: bool,
    /// Timeout for the stdio handshake (ms).
    #[arg(long, default_value_t = 3000)]
    timeout_ms: u64,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

/// `KEY=VALUE` pairs from an env file. Blank lines and `#` comments are skipped.
fn parse_env_file(txt: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        if k.is_empty() {
            continue;
        }
        out.push((k.to_string(), v.trim().to_string()));
    }
    out
}

/// `JOBPIPE_ENV_FILE` if set (empty or `0` disables), else `./.env` when it exists.
fn env_file_path(explicit: Option<String>) -> Option<std::path::PathBuf> {
    match explicit {
        Some(p) => {
            let p = p.trim();
            if p.is_empty() || p == "0" {
                None
            } else {
                Some(std::path::PathBuf::from(p))
            }
        }
        None => {
            let p = std::path::PathBuf::from(".env");
            p.is_file().then_some(p)
        }
    }
}

fn load_env_file() {
    let Some(path) = env_file_path(std::env::var("JOBPIPE_ENV_FILE").ok()) else {
        return;
    };
    let Ok(txt) = std::fs::read_to_string(&path) else {
        return;
    };
    for (k, v) in parse_env_file(&txt) {
        // Explicit process env wins.
        if std::env::var_os(&k).is_none() {
            std::env::set_var(k, v);
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout belongs to the stdio transport.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn has_env(k: &str) -> bool {
    std::env::var(k).ok().is_some_and(|v| !v.trim().is_empty())
}

async fn stdio_handshake(timeout_ms: u64) -> serde_json::Value {
    use rmcp::service::ServiceExt;
    use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
    use tokio::process::Command;

    let exe = std::env::current_exe().unwrap_or_else(|_| std::path::PathBuf::from("jobpipe"));
    let t0 = std::time::Instant::now();
    let child = TokioChildProcess::new(Command::new(exe).configure(|cmd| {
        cmd.args(["mcp-stdio"]);
        cmd.env("JOBPIPE_ENV_FILE", "0");
        cmd.env("RUST_LOG", "error");
    }));
    let service = match child {
        Ok(child) => ().serve(child).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    let service = match service {
        Ok(s) => s,
        Err(msg) => {
            return serde_json::json!({
                "ok": false,
                "tool_count": null,
                "elapsed_ms": t0.elapsed().as_millis(),
                "error": {
                    "code": "handshake_failed",
                    "message": msg,
                    "hint": "The child closed the stdio transport early. Check that nothing prints to stdout in mcp-stdio mode."
                },
            });
        }
    };

    let res = tokio::time::timeout(
        std::time::Duration::from_millis(timeout_ms),
        service.list_tools(Default::default()),
    )
    .await;
    let elapsed_ms = t0.elapsed().as_millis();
    let out = match res {
        Ok(Ok(tools)) => serde_json::json!({
            "ok": true,
            "tool_count": tools.tools.len(),
            "elapsed_ms": elapsed_ms,
            "error": null,
        }),
        Ok(Err(e)) => serde_json::json!({
            "ok": false,
            "tool_count": null,
            "elapsed_ms": elapsed_ms,
            "error": {
                "code": "handshake_failed",
                "message": e.to_string(),
                "hint": "Verify the MCP client config runs this binary with args: [\"mcp-stdio\"]."
            },
        }),
        Err(_elapsed) => serde_json::json!({
            "ok": false,
            "tool_count": null,
            "elapsed_ms": elapsed_ms,
            "error": {
                "code": "timeout",
                "message": format!("stdio handshake timed out after {timeout_ms}ms"),
                "hint": "The child did not answer list_tools in time."
            },
        }),
    };
    let _ = service.cancel().await;
    out
}

async fn remote_check() -> serde_json::Value {
    let t0 = std::time::Instant::now();
    let ctx = jobpipe_core::RequestContext::new();
    let health = match jobpipe_jenkins::JenkinsClient::from_env() {
        Ok(client) => client.health(&ctx).await,
        Err(e) => jobpipe_core::Health::error(e.to_string()),
    };
    serde_json::json!({
        "ok": health.is_ok(),
        "status": health.status,
        "details": health.details,
        "elapsed_ms": t0.elapsed().as_millis(),
    })
}

async fn doctor(args: DoctorCmd) -> Result<()> {
    let t0 = std::time::Instant::now();
    let mut checks: Vec<serde_json::Value> = Vec::new();

    let config_error = jobpipe_jenkins::JenkinsConfig::from_env()
        .err()
        .map(|e| e.to_string());
    checks.push(serde_json::json!({
        "name": "config_valid",
        "ok": config_error.is_none(),
        "skipped": false,
        "error": config_error,
    }));

    let mut remote = serde_json::json!({});
    if args.check_remote {
        remote = remote_check().await;
    }
    checks.push(serde_json::json!({
        "name": "jenkins_reachable",
        "ok": !args.check_remote || remote["ok"].as_bool().unwrap_or(false),
        "skipped": !args.check_remote,
        "elapsed_ms": remote.get("elapsed_ms"),
        "error": remote.get("details"),
    }));

    let mut stdio = serde_json::json!({});
    if args.check_stdio {
        stdio = stdio_handshake(args.timeout_ms).await;
    }
    checks.push(serde_json::json!({
        "name": "mcp_stdio_handshake",
        "ok": !args.check_stdio || stdio["ok"].as_bool().unwrap_or(false),
        "skipped": !args.check_stdio,
        "tool_count": stdio.get("tool_count"),
        "elapsed_ms": stdio.get("elapsed_ms"),
        "error": stdio.get("error"),
    }));

    let ok = checks.iter().all(|c| c["ok"].as_bool().unwrap_or(false));
    // Presence only; values (tokens especially) are never printed.
    let payload = serde_json::json!({
        "schema_version": 1,
        "kind": "doctor",
        "ok": ok,
        "name": "jobpipe",
        "version": env!("CARGO_PKG_VERSION"),
        "platform": {
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        },
        "elapsed_ms": t0.elapsed().as_millis(),
        "configured": {
            "jenkins_url": has_env("JENKINS_URL"),
            "jenkins_user": has_env("JENKINS_USER"),
            "jenkins_api_token": has_env("JENKINS_API_TOKEN"),
            "crumb_timeout_ms": has_env("JOBPIPE_CRUMB_TIMEOUT_MS"),
            "request_timeout_ms": has_env("JOBPIPE_REQUEST_TIMEOUT_MS"),
        },
        "checks": checks,
    });

    match args.output.to_ascii_lowercase().as_str() {
        "text" => {
            println!("jobpipe {} (ok={})", env!("CARGO_PKG_VERSION"), ok);
            println!(
                "configured: jenkins_url={} jenkins_user={} jenkins_api_token={}",
                payload["configured"]["jenkins_url"].as_bool().unwrap_or(false),
                payload["configured"]["jenkins_user"].as_bool().unwrap_or(false),
                payload["configured"]["jenkins_api_token"]
                    .as_bool()
                    .unwrap_or(false),
            );
            println!("checks:");
            if let Some(arr) = payload["checks"].as_array() {
                for c in arr {
                    let name = c["name"].as_str().unwrap_or("?");
                    if c["skipped"].as_bool().unwrap_or(false) {
                        println!("- {name}: skipped");
                    } else {
                        let ok = c["ok"].as_bool().unwrap_or(false);
                        println!("- {}: {}", name, if ok { "ok" } else { "fail" });
                    }
                }
            }
        }
        _ => println!("{payload}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::McpStdio => {
            mcp::serve_stdio()
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        }
        Commands::McpHttp(args) => {
            let addr: SocketAddr = format!("{}:{}", args.host, args.port)
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid bind address {}:{}: {e}", args.host, args.port))?;
            mcp::serve_http(addr).await?;
        }
        Commands::Doctor(args) => doctor(args).await?,
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "jobpipe",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("jobpipe {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_file_skips_comments_and_junk() {
        let pairs = parse_env_file(
            "# jenkins\nJENKINS_URL = http://ci:8080\n\nnot a pair\n=orphan\nJENKINS_USER=bot\nEMPTY=\n",
        );
        assert_eq!(
            pairs,
            vec![
                ("JENKINS_URL".to_string(), "http://ci:8080".to_string()),
                ("JENKINS_USER".to_string(), "bot".to_string()),
                ("EMPTY".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn env_file_value_keeps_inner_equals() {
        let pairs = parse_env_file("JENKINS_API_TOKEN=ab=cd==");
        assert_eq!(pairs[0].1, "ab=cd==");
    }

    #[test]
    fn env_file_can_be_disabled() {
        assert_eq!(env_file_path(Some("0".to_string())), None);
        assert_eq!(env_file_path(Some("  ".to_string())), None);
        assert_eq!(
            env_file_path(Some("/etc/jobpipe.env".to_string())),
            Some(std::path::PathBuf::from("/etc/jobpipe.env"))
        );
    }

    #[test]
    fn cli_parses_http_flags() {
        let cli = Cli::try_parse_from(["jobpipe", "mcp-http", "--host", "0.0.0.0", "--port", "9000"])
            .unwrap();
        match cli.command {
            Commands::McpHttp(a) => {
                assert_eq!(a.host, "0.0.0.0");
                assert_eq!(a.port, 9000);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
