#![no_main]

//! Fuzz target for DTLS datagram handling.
//!
//! Feeds arbitrary datagrams to a fresh server and to a client that has
//! sent its ClientHello. Errors are fine, panics are not.

use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use std::time::Instant;

use tlsproto::{Config, Connection, Output};

fuzz_target!(|data: &[u8]| {
    let config = match Config::builder().dtls().build() {
        Ok(c) => Arc::new(c),
        Err(_) => return,
    };
    let now = Instant::now();
    let mut buf = vec![0u8; 2048];

    {
        let mut server = Connection::server(Arc::clone(&config), now);
        let _ = server.handle_input(data, now);
        for _ in 0..10 {
            if let Output::Timeout(_) = server.poll_output(&mut buf) {
                break;
            }
        }
    }

    {
        let mut client = Connection::client(config, now);
        let _ = client.handle_timeout(now);
        for _ in 0..10 {
            if let Output::Timeout(_) = client.poll_output(&mut buf) {
                break;
            }
        }
        let _ = client.handle_input(data, now);
    }
});
