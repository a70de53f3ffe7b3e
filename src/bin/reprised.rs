//! `reprised` – Session-continuous script evaluation daemon.

use anyhow::{Context, Result, bail};
use reprise::config::{ServiceConfig, StoreBackend};
use reprise::engine::ScriptEngine;
use reprise::pipeline::Pipeline;
use reprise::service::Service;
use reprise::session::{FileStore, MemoryStore, SessionStore};
use std::env;
use std::io::{self, BufReader, BufWriter};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let mut root: Option<PathBuf> = None;
    let mut listen_addr: Option<String> = None;
    let mut memory_store = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--root" => {
                let path = match args.next() {
                    Some(path) => path,
                    None => {
                        print_usage();
                        bail!("--root requires a path argument");
                    }
                };
                root = Some(PathBuf::from(path));
            }
            "--memory" => {
                memory_store = true;
            }
            "--stdio" => {
                // Stdio is the default transport; accept the flag for compatibility.
            }
            "--listen" => {
                let addr = match args.next() {
                    Some(addr) => addr,
                    None => {
                        print_usage();
                        bail!("--listen requires an address argument");
                    }
                };
                listen_addr = Some(addr);
            }
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            other => {
                print_usage();
                bail!("unknown argument: {other}");
            }
        }
    }

    let root = root.unwrap_or_else(|| PathBuf::from(".reprise"));
    let mut config = ServiceConfig::load(&root)?;
    if memory_store {
        config.store = StoreBackend::Memory;
    }
    if listen_addr.is_some() {
        config.listen = listen_addr;
    }

    let store: Arc<dyn SessionStore> = match config.store {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::File => {
            config.save()?;
            Arc::new(
                FileStore::open(config.sessions_dir())
                    .context("Failed to open session store")?,
            )
        }
    };

    let pipeline = Arc::new(Pipeline::new(store, ScriptEngine::new));
    let service = Arc::new(Service::new(pipeline));

    match config.listen.clone() {
        Some(addr) => run_tcp(service, &addr),
        None => run_stdio(service),
    }
}

fn run_stdio(service: Arc<Service<ScriptEngine>>) -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let reader = stdin.lock();
    let writer = BufWriter::new(stdout.lock());

    service.handle(reader, writer)?;
    Ok(())
}

fn run_tcp(service: Arc<Service<ScriptEngine>>, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .with_context(|| format!("Failed to bind listen address {addr}"))?;
    let actual = listener.local_addr()?;
    tracing::info!(%actual, "reprised listening");

    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => {
                let peer = stream.peer_addr().ok();
                let service = service.clone();
                // One thread per connection: the thread is the worker
                // execution context and owns one interpreter slot.
                thread::spawn(move || {
                    let reader = match stream.try_clone() {
                        Ok(clone) => BufReader::new(clone),
                        Err(err) => {
                            tracing::warn!(?peer, error = %err, "failed to clone stream");
                            return;
                        }
                    };
                    let writer = BufWriter::new(stream);
                    if let Err(err) = service.handle(reader, writer) {
                        tracing::warn!(?peer, error = %err, "connection error");
                    }
                });
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to accept connection");
            }
        }
    }

    Ok(())
}

fn print_usage() {
    eprintln!(
        "Usage: reprised [--root PATH] [--memory] [--stdio] [--listen ADDR]\n\
         \n\
         Options:\n\
           --root PATH   Daemon root directory (default: .reprise)\n\
           --memory      Keep session state in memory instead of on disk\n\
           --stdio       Communicate over stdin/stdout (default)\n\
           --listen ADDR Listen on TCP ADDR instead of stdio\n"
    );
}
