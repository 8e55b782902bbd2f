//! Example Reader
//!
//! Attaches to a mailbox and prints every new value as it is published.

use serde_json::Value;
use shm_json::{Mailbox, MailboxConfig, Snapshot};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "my_shared_data".to_string());

    let mailbox = match Mailbox::attach(&name, &MailboxConfig::default()) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("[Reader] Failed to attach: {}", e);
            eprintln!("[Reader] Make sure the writer is running first!");
            std::process::exit(1);
        }
    };

    println!("[Reader] Watching '{}' (Ctrl+C to quit)", name);

    let mut last_seq = 0;
    loop {
        match mailbox.wait_snapshot::<Value>(Duration::from_secs(5), last_seq) {
            Ok(Snapshot { value, sequence, .. }) => {
                if last_seq != 0 && sequence > last_seq + 1 {
                    println!("[Reader] Missed {} update(s)", sequence - last_seq - 1);
                }
                last_seq = sequence;
                let pretty = serde_json::to_string_pretty(&value).unwrap_or_default();
                println!("[Reader] seq={}\n{}", sequence, pretty);
            }
            Err(e) => println!("[Reader] {}", e),
        }
    }
}
