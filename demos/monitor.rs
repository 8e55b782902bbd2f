//! Example Monitor
//!
//! Watches the `status_<service>` mailboxes published by `service` and prints
//! each status as it changes. With `--snapshot` it reads every service once
//! and exits.

use serde::Deserialize;
use shm_json::{Mailbox, MailboxConfig, Snapshot};
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Metrics {
    temperature: f64,
    cpu_usage: f64,
    memory_mb: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Status {
    counter: u64,
    active: bool,
    mode: String,
    health: String,
    metrics: Metrics,
}

struct Watched {
    service: String,
    mailbox: Mailbox,
    last_seq: u64,
}

fn display(service: &str, snapshot: &Snapshot<Status>) {
    let status = &snapshot.value;
    println!("=== {} (seq={}) ===", service, snapshot.sequence);
    println!("  counter: {}", status.counter);
    println!("  active:  {}", status.active);
    println!("  mode:    {}", status.mode);
    println!("  health:  {}", status.health);
    println!("  temperature: {:.2}", status.metrics.temperature);
    println!("  cpu_usage:   {:.2}", status.metrics.cpu_usage);
    if let Some(memory) = status.metrics.memory_mb {
        println!("  memory_mb:   {:.1}", memory);
    }
}

fn attach_all(services: &[String]) -> Vec<Watched> {
    let config = MailboxConfig::default();
    services
        .iter()
        .filter_map(|service| match Mailbox::attach(&format!("status_{}", service), &config) {
            Ok(mailbox) => Some(Watched {
                service: service.clone(),
                mailbox,
                last_seq: 0,
            }),
            Err(e) => {
                eprintln!("[Monitor] Cannot watch '{}': {}", service, e);
                None
            }
        })
        .collect()
}

fn snapshot(watched: &[Watched]) {
    for w in watched {
        match w.mailbox.read_snapshot::<Status>() {
            Ok(snapshot) => {
                display(&w.service, &snapshot);
                if let Ok(header) = w.mailbox.header() {
                    println!("  published_at_us: {}", header.timestamp);
                    println!("  size:            {} bytes", header.data_size);
                }
            }
            Err(e) => println!("=== {} ===\n  No data available ({})", w.service, e),
        }
    }
}

fn watch(watched: &mut [Watched]) {
    loop {
        let mut updated = false;
        for w in watched.iter_mut() {
            match w.mailbox.wait_snapshot::<Status>(Duration::from_millis(100), w.last_seq) {
                Ok(snapshot) => {
                    w.last_seq = snapshot.sequence;
                    display(&w.service, &snapshot);
                    updated = true;
                }
                Err(e) if e.is_transient() => {}
                Err(e) => eprintln!("[Monitor] {}: {}", w.service, e),
            }
        }

        if !updated {
            thread::sleep(Duration::from_millis(100));
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let snapshot_mode = args.first().is_some_and(|a| a == "--snapshot");
    if snapshot_mode {
        args.remove(0);
    }

    if args.is_empty() {
        eprintln!("Usage: monitor [--snapshot] <service>...");
        std::process::exit(1);
    }

    let mut watched = attach_all(&args);
    if watched.is_empty() {
        eprintln!("[Monitor] No services to watch; start them first");
        std::process::exit(1);
    }

    if snapshot_mode {
        snapshot(&watched);
    } else {
        println!("[Monitor] Watching {} service(s) (Ctrl+C to quit)", watched.len());
        watch(&mut watched);
    }
}
