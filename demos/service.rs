//! Example Service
//!
//! Attaches to the `commands` mailbox created by `controller`, applies the
//! commands it sees, and publishes its status once a second to
//! `status_<service name>`.

use serde::{Deserialize, Serialize};
use shm_json::{Mailbox, MailboxConfig};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const COMMAND_CHANNEL: &str = "commands";

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Command {
    SetTemperature { value: f64 },
    SetMode { mode: String },
    ToggleActive,
    Shutdown,
}

#[derive(Debug, Serialize)]
struct Metrics {
    temperature: f64,
    cpu_usage: f64,
}

#[derive(Debug, Serialize)]
struct Status<'a> {
    service: &'a str,
    timestamp: u64,
    counter: u64,
    active: bool,
    mode: &'a str,
    metrics: Metrics,
    health: &'a str,
}

struct Service {
    name: String,
    commands: Mailbox,
    status: Mailbox,
    temperature: f64,
    active: bool,
    mode: String,
    running: bool,
}

impl Service {
    fn new(name: &str) -> shm_json::Result<Self> {
        let config = MailboxConfig::default();
        Ok(Self {
            name: name.to_string(),
            commands: Mailbox::attach(COMMAND_CHANNEL, &config)?,
            status: Mailbox::create(&format!("status_{}", name), &config)?,
            temperature: 20.0,
            active: true,
            mode: "auto".to_string(),
            running: true,
        })
    }

    fn run(&mut self) {
        // Only react to commands sent after we started
        let mut last_cmd_seq = self.commands.sequence_number().unwrap_or(0);
        let mut counter = 0u64;
        let mut last_status: Option<Instant> = None;

        while self.running {
            match self.commands.wait_snapshot::<Command>(Duration::from_millis(100), last_cmd_seq) {
                Ok(snapshot) => {
                    last_cmd_seq = snapshot.sequence;
                    self.apply(snapshot.value);
                }
                Err(e) if e.is_transient() => {}
                Err(e) => {
                    // Skip the unreadable command rather than retrying it forever
                    eprintln!("[{}] Ignoring command: {}", self.name, e);
                    last_cmd_seq = self.commands.sequence_number().unwrap_or(last_cmd_seq);
                }
            }

            if last_status.map_or(true, |t| t.elapsed() >= Duration::from_secs(1)) {
                self.publish_status(counter);
                counter += 1;
                last_status = Some(Instant::now());
            }
        }
    }

    fn apply(&mut self, command: Command) {
        println!("[{}] Received {:?}", self.name, command);
        match command {
            Command::SetTemperature { value } => self.temperature = value,
            Command::SetMode { mode } => self.mode = mode,
            Command::ToggleActive => self.active = !self.active,
            Command::Shutdown => self.running = false,
        }
    }

    fn publish_status(&self, counter: u64) {
        let wobble = ((counter as f64) * 0.7).sin() * 0.5;
        let status = Status {
            service: &self.name,
            timestamp: shm_json::header::now_micros(),
            counter,
            active: self.active,
            mode: &self.mode,
            metrics: Metrics {
                temperature: self.temperature + wobble,
                cpu_usage: 15.5 + wobble * 10.0,
            },
            health: if self.active { "healthy" } else { "inactive" },
        };

        match self.status.write(&status) {
            Ok(_) => println!("[{}] Status published (counter={})", self.name, counter),
            Err(e) => eprintln!("[{}] Failed to publish status: {}", self.name, e),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let name = match std::env::args().nth(1) {
        Some(name) => name,
        None => {
            eprintln!("Usage: service <service_name>");
            std::process::exit(1);
        }
    };

    let mut service = match Service::new(&name) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("[{}] Failed to start: {}", name, e);
            eprintln!("[{}] Make sure the controller is running first!", name);
            std::process::exit(1);
        }
    };

    println!("[{}] Listening on '{}', publishing to 'status_{}'", name, COMMAND_CHANNEL, name);
    service.run();
    println!("[{}] Shutting down", name);
}
