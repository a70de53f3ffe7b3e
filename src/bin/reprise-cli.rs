//! Reprise CLI - interactive client for the evaluation daemon.
//!
//! Connects to a running `reprised`, completes the protocol handshake,
//! and either evaluates a one-shot script or drops into a line-based REPL
//! that carries one session across calls.

use anyhow::{Context, Result};
use clap::Parser;
use reprise::service::client::{ClientError, ServiceClient};
use std::io::{self, BufRead, Write};

#[derive(Parser)]
#[command(name = "reprise")]
#[command(about = "Client for the Reprise evaluation daemon", long_about = None)]
struct Cli {
    /// Daemon address to connect to
    #[arg(short, long, default_value = "127.0.0.1:7878")]
    addr: String,

    /// Session token to resume; a fresh session is minted otherwise
    #[arg(short, long)]
    session: Option<String>,

    /// Evaluate one script and exit instead of starting a REPL
    #[arg(short, long)]
    eval: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut client = ServiceClient::connect(&cli.addr)
        .with_context(|| format!("Failed to connect to {}", cli.addr))?;
    let info = client.handshake("reprise-cli").context("Handshake failed")?;

    let mut session = cli.session;

    if let Some(script) = cli.eval {
        let reply = client.evaluate(session.as_deref(), &script)?;
        print!("{}", reply.output);
        return Ok(());
    }

    eprintln!(
        "connected to reprised {} (protocol {})",
        info.service_version, info.protocol_version
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        match client.evaluate(session.as_deref(), &line) {
            Ok(reply) => {
                session = Some(reply.session);
                print!("{}", reply.output);
            }
            Err(ClientError::Protocol(err)) => {
                eprintln!("error: {}", err.message);
            }
            Err(err) => return Err(err).context("Connection to daemon lost"),
        }
    }

    if let Some(token) = session {
        eprintln!("session: {token}");
    }
    Ok(())
}
