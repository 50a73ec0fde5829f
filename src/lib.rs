//! tlsproto is a sans-IO TLS and DTLS protocol engine.
//!
//! It speaks TLS 1.0 to 1.3 over streams and DTLS 1.0 and 1.2 over
//! datagrams, as client or server. The crate does no I/O of its own. Bytes
//! from the network go into a [`Connection`], and packets, application data
//! and timer deadlines come out of it. [`blocking::BlockingConnection`]
//! drives a connection over a [`blocking::Transport`] for callers that want
//! ordinary blocking reads and writes.
//!
//! Cryptography comes from a [`crypto::CryptoProvider`]. The default one is
//! built on the RustCrypto crates.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use std::time::Instant;
//!
//! use tlsproto::{CipherSuite, Config, Connection, Output, ProtocolVersion};
//!
//! let suites = [CipherSuite::TLS_PSK_WITH_AES_128_GCM_SHA256];
//! let client_config = Config::builder()
//!     .versions(ProtocolVersion::Tls1_2, ProtocolVersion::Tls1_2)
//!     .cipher_suites(suites)
//!     .psk(b"client".to_vec(), vec![1; 16])
//!     .build()
//!     .unwrap();
//!
//! let mut keys = HashMap::new();
//! keys.insert(b"client".to_vec(), vec![1; 16]);
//! let server_config = Config::builder()
//!     .versions(ProtocolVersion::Tls1_2, ProtocolVersion::Tls1_2)
//!     .cipher_suites(suites)
//!     .psk_store(Arc::new(keys))
//!     .build()
//!     .unwrap();
//!
//! let now = Instant::now();
//! let mut client = Connection::client(Arc::new(client_config), now);
//! let mut server = Connection::server(Arc::new(server_config), now);
//!
//! // Kick off the ClientHello.
//! client.handle_timeout(now).unwrap();
//!
//! let mut buf = vec![0; 16384];
//! while !(client.is_connected() && server.is_connected()) {
//!     while let Output::Packet(p) = client.poll_output(&mut buf) {
//!         let p = p.to_vec();
//!         server.handle_input(&p, now).unwrap();
//!     }
//!     while let Output::Packet(p) = server.poll_output(&mut buf) {
//!         let p = p.to_vec();
//!         client.handle_input(&p, now).unwrap();
//!     }
//! }
//! ```
//!
//! The loop above skips the [`Output::Connected`] event, which is polled
//! ahead of packets. A real caller handles every [`Output`] variant.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

#[macro_use]
extern crate log;

mod buffer;
mod codec;
mod engine;
mod event;
mod kx;
mod record;
mod reliable;
mod time_tricks;
mod timer;
mod window;

pub mod blocking;
pub mod certificate;
pub mod crypto;
pub mod message;
pub mod types;

mod config;
mod connection;
mod error;
mod handshake;
mod session;

pub use config::{CertVerifier, Config, ConfigBuilder, RecordSplitting};
pub use connection::{Connection, Output};
pub use error::Error;
pub use handshake::{ConnectionState, SecurityParameters};
pub use kx::PskStore;
pub use session::{InMemorySessionStore, SessionParameters, SessionStore, TlsSession};
pub use types::{AlertDescription, CipherSuite, HeartbeatMode, MaxFragmentLength};
pub use types::{NamedGroup, ProtocolVersion, SignatureScheme};
pub use window::ReplayWindow;
