//! JSON-RPC 2.0 client for wirecall.
//!
//! A [`Client`] owns one logical connection that survives transport
//! failures: when the connection drops, in-flight calls fail with
//! [`ClientError::Interrupted`], and the client reconnects through its
//! [`Connector`] and carries on with whatever is still queued.
//!
//! # Architecture
//!
//! ```text
//! callers ──mailbox──▶ owner task ──writer──▶ connection
//!    ▲                    │  ▲
//!    └──── oneshot ───────┘  └──inbound── reader task ◀── connection
//! ```
//!
//! Only the owner task writes to the connection and a helper task owned
//! by it does the reading, so codecs never see concurrent reads or
//! concurrent writes. Request ids are assigned by the owner at send time
//! and go on the wire as lowercase hex strings (`"1"`, `"a"`, `"ff"`).

mod client;
mod config;
mod connector;
mod error;
mod guard;
mod owner;

pub use client::Client;
pub use config::ClientConfig;
pub use connector::Connector;
pub use error::ClientError;
pub use guard::CodecGuard;
