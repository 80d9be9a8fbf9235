//! Triage - 故障分诊命令行
//!
//! 用法：
//! ```bash
//! triage [--config path/to/config.toml] [--json] "The checkout service is giving 500 errors..."
//! echo "users cannot login" | triage
//! ```
//!
//! 故障报告取自参数；没有参数时从 stdin 读取，stdin 为终端时使用内置的演示报告。
//! 分诊失败时退出码非零。

use std::io::{IsTerminal, Read};
use std::path::PathBuf;

use anyhow::{bail, Context};
use tokio_util::sync::CancellationToken;
use triage::{create_triage_graph, load_config, observability, run_triage_with, RunOptions};

const DEMO_REPORT: &str = "The checkout service is giving 500 errors when processing payments. \
I need a P1 ticket opened and I think it's related to the recent configuration change.";

struct CliArgs {
    config: Option<PathBuf>,
    json: bool,
    report: Vec<String>,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut cli = CliArgs {
        config: None,
        json: false,
        report: Vec::new(),
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().context("--config requires a path")?;
                cli.config = Some(PathBuf::from(path));
            }
            "--json" => cli.json = true,
            flag if flag.starts_with("--") => bail!("unknown flag {flag}"),
            _ => cli.report.push(arg),
        }
    }
    Ok(cli)
}

fn read_report(words: &[String]) -> anyhow::Result<String> {
    if !words.is_empty() {
        return Ok(words.join(" "));
    }
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        tracing::info!("No report given, using the demo report");
        return Ok(DEMO_REPORT.to_string());
    }
    let mut buf = String::new();
    stdin
        .lock()
        .read_to_string(&mut buf)
        .context("Failed to read report from stdin")?;
    let report = buf.trim().to_string();
    if report.is_empty() {
        bail!("empty incident report");
    }
    Ok(report)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cli = parse_args()?;
    let cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    tracing::debug!(app = cfg.app.name.as_deref().unwrap_or("triage"), "config loaded");
    let report = read_report(&cli.report)?;
    let graph = create_triage_graph(&cfg).context("Failed to assemble triage graph")?;

    // Ctrl+C 取消当前会话
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let opts = RunOptions::from(&cfg.triage).with_cancel_token(cancel);
    let outcome = run_triage_with(&graph, &report, opts)
        .await
        .context("Triage aborted")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.final_response());
    }

    if !outcome.is_resolved() {
        std::process::exit(1);
    }
    Ok(())
}
