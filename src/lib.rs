//! shm_json - Cross-process shared memory JSON mailbox
//!
//! A named shared memory region that holds exactly one JSON value at a time.
//! Unrelated processes publish new values and observe them by polling a
//! monotonic sequence counter.
//!
//! # Architecture
//!
//! - **Owner**: creates the region and its named lock, removes both on close
//! - **Attachers**: open an existing region by name, only unmap on close
//!
//! Every read and write takes the same cross-process lock, so a reader sees
//! either the previous complete value or the next one, never a mix.
//!
//! # Layout
//!
//! A 64-byte header (magic, version, payload size, sequence number,
//! timestamp) followed by `capacity` bytes of payload. See [`header`].

pub mod error;
pub mod shm;
pub mod lock;
pub mod header;
pub mod poll;
pub mod config;
pub mod mailbox;
pub mod bindings;

pub use error::{ShmJsonError, Result};
pub use config::MailboxConfig;
pub use header::Header;
pub use mailbox::{Mailbox, Snapshot};
pub use shm::Role;
