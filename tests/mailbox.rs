//! Multi-handle and multi-thread behaviour of the mailbox

use serde_json::{json, Value};
use shm_json::{Mailbox, MailboxConfig, Role, ShmJsonError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn unique(tag: &str) -> String {
    format!("shmjson_it_{}_{}", tag, std::process::id())
}

#[test]
fn test_scenario_sequence_and_wait() {
    let name = unique("scenario");
    let config = MailboxConfig::default();
    let owner = Mailbox::create(&name, &config).unwrap();
    let reader = Mailbox::attach(&name, &config).unwrap();

    assert_eq!(owner.write(&json!({"a": 1})).unwrap(), 1);
    assert_eq!(owner.write(&json!({"a": 2})).unwrap(), 2);
    assert_eq!(reader.read::<Value>().unwrap(), json!({"a": 2}));

    let start = Instant::now();
    let value: Value = reader.read_with_timeout(Duration::from_millis(200), 1).unwrap();
    assert_eq!(value, json!({"a": 2}));
    assert!(start.elapsed() < Duration::from_millis(50));

    let start = Instant::now();
    let err = reader
        .read_with_timeout::<Value>(Duration::from_millis(200), 2)
        .unwrap_err();
    let elapsed = start.elapsed();
    assert!(matches!(err, ShmJsonError::Timeout { .. }));
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_millis(400));
}

#[test]
fn test_sequence_increments_by_one() {
    let name = unique("sequence");
    let config = MailboxConfig::default().with_capacity(4096);
    let writer = Mailbox::create(&name, &config).unwrap();
    let reader = Mailbox::attach(&name, &config).unwrap();

    let seq1 = writer.sequence_number().unwrap();
    writer.write(&json!({"counter": 1})).unwrap();
    let seq2 = reader.sequence_number().unwrap();
    writer.write(&json!({"counter": 2})).unwrap();
    let seq3 = reader.sequence_number().unwrap();

    assert_eq!(seq1, 0);
    assert_eq!(seq2, seq1 + 1);
    assert_eq!(seq3, seq2 + 1);
}

#[test]
fn test_timeout_bounds() {
    let name = unique("timeout");
    let interval = Duration::from_millis(10);
    let config = MailboxConfig::default()
        .with_capacity(4096)
        .with_poll_interval(interval);
    let writer = Mailbox::create(&name, &config).unwrap();
    let reader = Mailbox::attach(&name, &config).unwrap();

    writer.write(&json!({"value": 1})).unwrap();
    let seq = reader.sequence_number().unwrap();

    let timeout = Duration::from_millis(300);
    let start = Instant::now();
    assert!(reader.read_with_timeout::<Value>(timeout, seq).is_err());
    let elapsed = start.elapsed();
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + interval * 10);
}

#[test]
fn test_concurrent_write_wakes_reader() {
    let name = unique("wake");
    let config = MailboxConfig::default().with_capacity(4096);
    let writer = Mailbox::create(&name, &config).unwrap();
    let reader = Mailbox::attach(&name, &config).unwrap();

    writer.write(&json!({"value": 1})).unwrap();
    let seq = reader.sequence_number().unwrap();

    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        writer.write(&json!({"value": 2})).unwrap();
        writer
    });

    let start = Instant::now();
    let snapshot = reader
        .wait_snapshot::<Value>(Duration::from_secs(2), seq)
        .unwrap();
    let elapsed = start.elapsed();
    let _writer = handle.join().unwrap();

    assert_eq!(snapshot.value, json!({"value": 2}));
    assert_eq!(snapshot.sequence, seq + 1);
    assert!(elapsed >= Duration::from_millis(150));
    assert!(elapsed < Duration::from_millis(500));
}

#[test]
fn test_multiple_attachers_see_same_value() {
    let name = unique("multi");
    let config = MailboxConfig::default();
    let writer = Mailbox::create(&name, &config).unwrap();
    writer.write(&json!({"message": "hello from writer"})).unwrap();

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let name = name.clone();
            let config = config.clone();
            thread::spawn(move || {
                let reader = Mailbox::attach(&name, &config).unwrap();
                reader.read_snapshot::<Value>().unwrap()
            })
        })
        .collect();

    for handle in handles {
        let snapshot = handle.join().unwrap();
        assert_eq!(snapshot.value, json!({"message": "hello from writer"}));
        assert_eq!(snapshot.sequence, 1);
    }
}

#[test]
fn test_shared_handle_across_threads() {
    let name = unique("shared_handle");
    let config = MailboxConfig::default().with_capacity(4096);
    let mailbox = Arc::new(Mailbox::create(&name, &config).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let mailbox = Arc::clone(&mailbox);
            thread::spawn(move || {
                for j in 0..25 {
                    mailbox.write(&json!({"writer": i, "n": j})).unwrap();
                    let _: Value = mailbox.read().unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(mailbox.sequence_number().unwrap(), 100);
}

#[test]
fn test_writes_are_never_torn() {
    let name = unique("torn");
    let config = MailboxConfig::default().with_capacity(64 * 1024);
    let writer = Mailbox::create(&name, &config).unwrap();
    let reader = Mailbox::attach(&name, &config).unwrap();
    writer.write(&json!({"n": 0, "pad": ""})).unwrap();

    let handle = thread::spawn(move || {
        for n in 1..=200u64 {
            // Alternate sizes so a torn read would leave stale bytes behind
            let pad = if n % 2 == 0 { "x".repeat(4096) } else { String::new() };
            writer.write(&json!({"n": n, "pad": pad})).unwrap();
        }
        writer
    });

    let mut last = 0;
    while last < 200 {
        let snapshot = reader.read_snapshot::<Value>().unwrap();
        let n = snapshot.value["n"].as_u64().unwrap();
        assert_eq!(snapshot.sequence, n + 1);
        assert!(n >= last);
        last = n;
    }
    let _writer = handle.join().unwrap();
}

#[test]
fn test_owner_close_removes_names() {
    let name = unique("owner_close");
    let config = MailboxConfig::default().with_capacity(4096);
    let owner = Mailbox::create(&name, &config).unwrap();
    let attacher = Mailbox::attach(&name, &config).unwrap();
    owner.write(&json!("last words")).unwrap();

    owner.close();

    let err = Mailbox::attach(&name, &config).err().unwrap();
    assert!(matches!(err, ShmJsonError::OpenFailure { .. }));
    assert_eq!(attacher.read::<String>().unwrap(), "last words");
}

#[test]
fn test_attacher_close_leaves_names() {
    let name = unique("attacher_close");
    let config = MailboxConfig::default().with_capacity(4096);
    let owner = Mailbox::create(&name, &config).unwrap();
    Mailbox::attach(&name, &config).unwrap().close();

    owner.write(&json!(1)).unwrap();
    let again = Mailbox::attach(&name, &config).unwrap();
    assert_eq!(again.read::<u32>().unwrap(), 1);
    assert_eq!(again.role(), Role::Attacher);
}

#[test]
fn test_attach_missing_fails() {
    let err = Mailbox::attach(&unique("missing"), &MailboxConfig::default())
        .err()
        .unwrap();
    assert!(matches!(err, ShmJsonError::OpenFailure { .. }));
}

#[test]
fn test_large_document() {
    let name = unique("large");
    let config = MailboxConfig::default().with_capacity(10 * 1024 * 1024);
    let writer = Mailbox::create(&name, &config).unwrap();
    let reader = Mailbox::attach(&name, &config).unwrap();

    let items: Vec<Value> = (0..1000)
        .map(|i| {
            json!({
                "id": i,
                "name": format!("Item {}", i),
                "value": i as f64 * 2.5,
                "tags": ["tag1", "tag2", "tag3"],
            })
        })
        .collect();
    writer.write(&json!({"items": items})).unwrap();

    let read: Value = reader.read().unwrap();
    let items = read["items"].as_array().unwrap();
    assert_eq!(items.len(), 1000);
    assert_eq!(items[500]["id"], 500);
    assert_eq!(items[999]["name"], "Item 999");
}
