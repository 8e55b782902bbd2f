//! Example Writer
//!
//! Creates a mailbox and publishes a sample JSON document every two seconds.

use serde_json::json;
use shm_json::{Mailbox, MailboxConfig};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "my_shared_data".to_string());

    let mailbox = match Mailbox::create(&name, &MailboxConfig::default()) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("[Writer] Failed to create mailbox: {}", e);
            std::process::exit(1);
        }
    };

    println!("[Writer] Publishing to '{}' every 2 seconds (Ctrl+C to quit)", name);

    for counter in 0u64.. {
        let data = json!({
            "timestamp": shm_json::header::now_micros(),
            "counter": counter,
            "message": "Hello from writer",
            "data": {
                "temperature": 23.5 + (counter % 10) as f64,
                "humidity": 45.0 + (counter % 20) as f64,
                "pressure": 1013.25,
            },
            "array": [1, 2, 3, 4, 5],
        });

        match mailbox.write(&data) {
            Ok(seq) => println!("[Writer] Wrote counter={} (seq={})", counter, seq),
            Err(e) => eprintln!("[Writer] Failed to write: {}", e),
        }

        std::thread::sleep(Duration::from_secs(2));
    }
}
