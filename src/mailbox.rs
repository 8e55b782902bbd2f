//! High-level Mailbox API
//!
//! A mailbox is a named shared region holding one JSON document, plus the
//! named lock that serializes every access to it. One process creates it as
//! [`Role::Owner`]; any number of others attach to it.
//!
//! ```no_run
//! use serde_json::{json, Value};
//! use shm_json::{Mailbox, MailboxConfig};
//! use std::time::Duration;
//!
//! let config = MailboxConfig::default();
//! let writer = Mailbox::create("telemetry", &config)?;
//! let reader = Mailbox::attach("telemetry", &config)?;
//!
//! writer.write(&json!({"temperature": 21.5}))?;
//! let value: Value = reader.read_with_timeout(Duration::from_secs(1), 0)?;
//! # Ok::<(), shm_json::ShmJsonError>(())
//! ```

use crate::config::MailboxConfig;
use crate::error::{Result, ShmJsonError};
use crate::header::{now_micros, Header, HEADER_SIZE};
use crate::lock::{LockGuard, NamedLock};
use crate::poll::{Polled, Poller};
use crate::shm::{Role, SharedRegion};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;

/// A value read from the slot with the header it was published under
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub value: T,
    /// Sequence number of the write that produced `value`
    pub sequence: u64,
    /// Writer's wall-clock time in microseconds (advisory)
    pub timestamp_us: u64,
}

/// Shared single-slot JSON mailbox
pub struct Mailbox {
    // Dropped before the lock so the owner unlinks memory, then lock
    region: SharedRegion,
    lock: NamedLock,
    capacity: usize,
    poller: Poller,
    last_error: Mutex<Option<String>>,
}

impl Mailbox {
    /// Create or attach with the default poll interval
    pub fn open(name: &str, capacity: usize, role: Role) -> Result<Self> {
        let config = MailboxConfig::default().with_capacity(capacity);
        Self::open_with(name, &config, role)
    }

    /// Create a new mailbox as its owner
    pub fn create(name: &str, config: &MailboxConfig) -> Result<Self> {
        Self::open_with(name, config, Role::Owner)
    }

    /// Attach to a mailbox created by another process
    pub fn attach(name: &str, config: &MailboxConfig) -> Result<Self> {
        Self::open_with(name, config, Role::Attacher)
    }

    fn open_with(name: &str, config: &MailboxConfig, role: Role) -> Result<Self> {
        let total_size = config.capacity.checked_add(HEADER_SIZE).ok_or_else(|| {
            let source = std::io::Error::new(std::io::ErrorKind::InvalidInput, "capacity overflow");
            match role {
                Role::Owner => ShmJsonError::CreationFailure {
                    name: name.to_string(),
                    source,
                },
                Role::Attacher => ShmJsonError::OpenFailure {
                    name: name.to_string(),
                    source,
                },
            }
        })?;

        let (lock, region) = match role {
            Role::Owner => {
                let lock = NamedLock::create(name)?;
                (lock, SharedRegion::create(name, total_size)?)
            }
            Role::Attacher => {
                let lock = NamedLock::open(name)?;
                (lock, SharedRegion::open(name, total_size)?)
            }
        };

        tracing::info!(
            name = %name,
            role = ?role,
            capacity = config.capacity,
            "Mailbox ready"
        );

        Ok(Self {
            region,
            lock,
            capacity: config.capacity,
            poller: Poller::new(config.poll_interval),
            last_error: Mutex::new(None),
        })
    }

    /// Publish `value`, replacing whatever the slot held
    ///
    /// Returns the sequence number of this write. A value whose JSON form is
    /// larger than the capacity is rejected before the region is touched.
    pub fn write<T: Serialize + ?Sized>(&self, value: &T) -> Result<u64> {
        let result = serde_json::to_vec(value)
            .map_err(ShmJsonError::Serialize)
            .and_then(|payload| self.write_payload(&payload));
        self.record(result)
    }

    /// Publish a JSON document given as text
    ///
    /// The text must parse; it is stored in compact form.
    pub fn write_json(&self, json: &str) -> Result<u64> {
        let result = serde_json::from_str::<serde_json::Value>(json)
            .map_err(ShmJsonError::ParseFailure)
            .and_then(|value| serde_json::to_vec(&value).map_err(ShmJsonError::Serialize))
            .and_then(|payload| self.write_payload(&payload));
        self.record(result)
    }

    fn write_payload(&self, payload: &[u8]) -> Result<u64> {
        if payload.len() > self.capacity {
            return Err(ShmJsonError::PayloadTooLarge {
                max: self.capacity,
                got: payload.len(),
            });
        }

        let guard = self.lock.acquire()?;
        let mut raw = self.load_raw_header(&guard);
        let header = Header::decode(&raw).advance(payload.len() as u64, now_micros());
        header.encode_into(&mut raw);

        // SAFETY: guard is held; payload fits the capacity checked above
        unsafe {
            self.region.write_at(HEADER_SIZE, payload);
            self.region.write_at(0, &raw);
        }
        drop(guard);

        tracing::trace!(
            name = %self.name(),
            sequence = header.sequence_number,
            size = payload.len(),
            "Wrote value"
        );
        Ok(header.sequence_number)
    }

    /// Read the current value
    pub fn read<T: DeserializeOwned>(&self) -> Result<T> {
        self.read_snapshot().map(|snapshot| snapshot.value)
    }

    /// Read the current value with the sequence number it was written under
    pub fn read_snapshot<T: DeserializeOwned>(&self) -> Result<Snapshot<T>> {
        let result = self.read_inner::<T>();
        self.record(result)
    }

    fn read_inner<T: DeserializeOwned>(&self) -> Result<Snapshot<T>> {
        let (header, payload) = {
            let guard = self.lock.acquire()?;
            let header = self.load_header(&guard);
            let len = header.validate(self.capacity)?;

            let mut payload = vec![0u8; len];
            // SAFETY: guard is held; len <= capacity
            unsafe { self.region.read_at(HEADER_SIZE, &mut payload) };
            (header, payload)
        };

        let value = serde_json::from_slice(&payload).map_err(ShmJsonError::ParseFailure)?;

        tracing::trace!(name = %self.name(), sequence = header.sequence_number, "Read value");
        Ok(Snapshot {
            value,
            sequence: header.sequence_number,
            timestamp_us: header.timestamp,
        })
    }

    /// Wait for a value newer than `last_seq` and read it
    ///
    /// With `last_seq == 0` this returns at once if anything was ever
    /// written. Fails with [`ShmJsonError::Timeout`] once `timeout` passes.
    pub fn read_with_timeout<T: DeserializeOwned>(
        &self,
        timeout: Duration,
        last_seq: u64,
    ) -> Result<T> {
        self.wait_snapshot(timeout, last_seq).map(|snapshot| snapshot.value)
    }

    /// Like [`Mailbox::read_with_timeout`], keeping the sequence number
    pub fn wait_snapshot<T: DeserializeOwned>(
        &self,
        timeout: Duration,
        last_seq: u64,
    ) -> Result<Snapshot<T>> {
        let result = self
            .poller
            .poll_until(timeout, || {
                let guard = self.lock.acquire()?;
                let ready = self.load_header(&guard).has_update_since(last_seq);
                drop(guard);

                if ready {
                    self.read_inner::<T>().map(Some)
                } else {
                    Ok(None)
                }
            })
            .and_then(|outcome| match outcome {
                Polled::Ready(snapshot) => Ok(snapshot),
                Polled::TimedOut(waited) => Err(ShmJsonError::Timeout {
                    waited_ms: waited.as_millis() as u64,
                }),
            });
        self.record(result)
    }

    /// Current write counter, without reading the payload
    pub fn sequence_number(&self) -> Result<u64> {
        self.header().map(|header| header.sequence_number)
    }

    /// Decoded copy of the header
    pub fn header(&self) -> Result<Header> {
        let result = self.lock.acquire().map(|guard| self.load_header(&guard));
        self.record(result)
    }

    /// Maximum payload size in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn poll_interval(&self) -> Duration {
        self.poller.interval()
    }

    pub fn name(&self) -> &str {
        self.region.name()
    }

    pub fn role(&self) -> Role {
        self.region.role()
    }

    /// Message of the most recent failed operation on this handle
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Unmap the region; the owner also removes the named memory and lock
    pub fn close(self) {
        tracing::debug!(name = %self.name(), role = ?self.role(), "Closing mailbox");
        drop(self);
    }

    fn load_raw_header(&self, _guard: &LockGuard<'_>) -> [u8; HEADER_SIZE] {
        let mut raw = [0u8; HEADER_SIZE];
        // SAFETY: the caller proves the lock is held by passing its guard
        unsafe { self.region.read_at(0, &mut raw) };
        raw
    }

    fn load_header(&self, guard: &LockGuard<'_>) -> Header {
        Header::decode(&self.load_raw_header(guard))
    }

    fn record<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::debug!(name = %self.name(), error = %e, "Mailbox operation failed");
            *self
                .last_error
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(e.to_string());
        }
        result
    }
}
