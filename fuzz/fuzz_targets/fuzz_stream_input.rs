#![no_main]

//! Fuzz target for TLS stream input.
//!
//! The input is split in two at its first byte so that records straddling
//! reads are exercised too.

use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use std::time::Instant;

use tlsproto::{Config, Connection, Output, ProtocolVersion};

fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let split = (split as usize).min(rest.len());
    let (a, b) = rest.split_at(split);

    let config = match Config::builder()
        .versions(ProtocolVersion::Tls1_0, ProtocolVersion::Tls1_3)
        .build()
    {
        Ok(c) => Arc::new(c),
        Err(_) => return,
    };
    let now = Instant::now();
    let mut buf = vec![0u8; 16384];

    let mut server = Connection::server(Arc::clone(&config), now);
    let _ = server.handle_input(a, now);
    let _ = server.handle_input(b, now);
    while !matches!(server.poll_output(&mut buf), Output::Timeout(_)) {}

    let mut client = Connection::client(config, now);
    let _ = client.handle_timeout(now);
    while !matches!(client.poll_output(&mut buf), Output::Timeout(_)) {}
    let _ = client.handle_input(a, now);
    let _ = client.handle_input(b, now);
});
