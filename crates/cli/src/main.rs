//! dyndesk CLI
//!
//! Command-line interface for controlling the dyndesk daemon.
//!
//! Commands are sent to the daemon via IPC (Unix domain socket).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dyndesk_ipc::{decode_line, encode_line, socket_path, IpcCommand, IpcResponse, PassSummary};
use std::fmt::Write as _;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// How long to wait for the daemon to answer.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "dyndesk-cli")]
#[command(author, version, about = "Control the dyndesk dynamic desktop daemon")]
struct Cli {
    /// Print the raw JSON response
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon statistics and effective configuration
    Status,
    /// List desktops and the current view
    Desktops,
    /// Show what the next pass would change, without applying it
    Plan,
    /// Run a reconciliation pass now
    Reconcile,
    /// Reload configuration and reconcile
    Reload,
    /// Stop the daemon
    Stop,
}

impl Commands {
    fn to_ipc(&self) -> IpcCommand {
        match self {
            Commands::Status => IpcCommand::QueryStatus,
            Commands::Desktops => IpcCommand::QueryDesktops,
            Commands::Plan => IpcCommand::Plan,
            Commands::Reconcile => IpcCommand::Reconcile,
            Commands::Reload => IpcCommand::Reload,
            Commands::Stop => IpcCommand::Stop,
        }
    }
}

/// Send one command and wait for its response.
async fn send_command(cmd: &IpcCommand) -> Result<IpcResponse> {
    let path = socket_path();
    let stream = UnixStream::connect(&path).await.with_context(|| {
        format!(
            "Failed to connect to {}. Is the dyndesk daemon running?",
            path.display()
        )
    })?;

    let (reader, mut writer) = stream.into_split();
    writer.write_all(encode_line(cmd)?.as_bytes()).await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    let bytes_read = tokio::time::timeout(RESPONSE_TIMEOUT, reader.read_line(&mut line))
        .await
        .context("Timed out waiting for the daemon")??;
    if bytes_read == 0 {
        bail!("Daemon closed the connection without responding");
    }

    Ok(decode_line(&line)?)
}

fn format_summary(out: &mut String, summary: &PassSummary) {
    let _ = writeln!(
        out,
        "Pass ({}): removed {} gap(s), truncated {}, appended {}, relabeled {} -> {} desktops",
        summary.trigger,
        summary.removed_gaps,
        summary.truncated,
        summary.appended,
        summary.relabeled,
        summary.desktop_count
    );
}

/// Render a response for humans.
fn format_response(response: &IpcResponse) -> String {
    let mut out = String::new();
    match response {
        IpcResponse::Ok => out.push_str("OK\n"),
        IpcResponse::Error { message } => {
            let _ = writeln!(out, "Error: {}", message);
        }
        IpcResponse::Desktops { current, desktops } => {
            for desktop in desktops {
                let marker = if desktop.index == *current { '*' } else { ' ' };
                let _ = writeln!(out, "{} {:>2}  {}", marker, desktop.index, desktop.label);
            }
        }
        IpcResponse::Plan {
            gap_removals,
            needed,
            truncate,
            append,
            noop,
        } => {
            if *noop {
                let _ = writeln!(out, "No structural change ({} desktops)", needed);
            } else {
                if !gap_removals.is_empty() {
                    let gaps: Vec<String> = gap_removals.iter().map(|i| i.to_string()).collect();
                    let _ = writeln!(out, "Remove gaps: {}", gaps.join(", "));
                }
                if *truncate > 0 {
                    let _ = writeln!(out, "Remove {} trailing desktop(s)", truncate);
                }
                if *append > 0 {
                    let _ = writeln!(out, "Append {} desktop(s)", append);
                }
                let _ = writeln!(out, "Result: {} desktops", needed);
            }
        }
        IpcResponse::PassCompleted { summary } => format_summary(&mut out, summary),
        IpcResponse::Status {
            passes,
            suppressed,
            uptime_secs,
            minimum_desktops,
            label_template,
            last_pass,
        } => {
            let _ = writeln!(out, "Uptime:           {}s", uptime_secs);
            let _ = writeln!(out, "Passes:           {}", passes);
            let _ = writeln!(out, "Suppressed:       {}", suppressed);
            let _ = writeln!(out, "Minimum desktops: {}", minimum_desktops);
            let _ = writeln!(out, "Label template:   {}", label_template);
            match last_pass {
                Some(summary) => format_summary(&mut out, summary),
                None => out.push_str("No pass completed yet\n"),
            }
        }
    }
    out
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let response = send_command(&cli.command.to_ipc()).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print!("{}", format_response(&response));
    }

    if let IpcResponse::Error { .. } = response {
        std::process::exit(1);
    }
    Ok(())
}
