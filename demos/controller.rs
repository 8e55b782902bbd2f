//! Example Controller
//!
//! Creates the `commands` mailbox and publishes commands typed on stdin.
//! Run `service` next to it to see them applied.

use serde_json::{json, Value};
use shm_json::{Mailbox, MailboxConfig};
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

const COMMAND_CHANNEL: &str = "commands";

fn print_help() {
    println!("Commands:");
    println!("  1       - Set temperature to 25");
    println!("  2       - Set mode to 'manual'");
    println!("  3       - Set mode to 'auto'");
    println!("  4       - Toggle active state");
    println!("  5       - Shutdown service");
    println!("  {{...}}   - Send a raw JSON command");
    println!("  q       - Quit");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let commands = match Mailbox::create(COMMAND_CHANNEL, &MailboxConfig::default()) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("[Controller] Failed to create '{}': {}", COMMAND_CHANNEL, e);
            std::process::exit(1);
        }
    };

    print_help();

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!(">>> ");
        let _ = stdout.flush();

        let mut input = String::new();
        match stdin.lock().read_line(&mut input) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let now = shm_json::header::now_micros();
        let command: Value = match input.trim() {
            "" => continue,
            "q" | "quit" => break,
            "1" => json!({"action": "set_temperature", "value": 25.0, "timestamp": now}),
            "2" => json!({"action": "set_mode", "mode": "manual", "timestamp": now}),
            "3" => json!({"action": "set_mode", "mode": "auto", "timestamp": now}),
            "4" => json!({"action": "toggle_active", "timestamp": now}),
            "5" => json!({"action": "shutdown", "timestamp": now}),
            raw => match serde_json::from_str(raw) {
                Ok(value) => value,
                Err(e) => {
                    println!("[Controller] Not JSON: {}", e);
                    continue;
                }
            },
        };

        match commands.write(&command) {
            Ok(seq) => println!("[Controller] Sent (seq={}): {}", seq, command),
            Err(e) => eprintln!("[Controller] Failed to send command: {}", e),
        }
    }

    println!("[Controller] Goodbye!");
}
