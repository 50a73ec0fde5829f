#![no_main]

//! Fuzz target for DTLS record parsing.
//!
//! Besides the raw input, the input is wrapped in a plausible DTLS 1.2
//! record header so that the fuzzer gets past the header checks quickly.
//!
//! DTLS record format:
//! - ContentType: 1 byte
//! - ProtocolVersion: 2 bytes (0xFEFD for DTLS 1.2, 0xFEFF for DTLS 1.0)
//! - Epoch: 2 bytes
//! - Sequence Number: 6 bytes (u48)
//! - Length: 2 bytes
//! - Fragment: variable

use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use std::time::Instant;

use tlsproto::{Config, Connection};

const DTLS_HEADER_LEN: usize = 13;
const MAX_FRAGMENT_SIZE: usize = 16384;

fuzz_target!(|data: &[u8]| {
    let config = match Config::builder().dtls().require_cookie(false).build() {
        Ok(c) => Arc::new(c),
        Err(_) => return,
    };
    let now = Instant::now();
    let mut server = Connection::server(config, now);

    let _ = server.handle_input(data, now);

    if !data.is_empty() {
        let frag_len = data.len().min(MAX_FRAGMENT_SIZE);
        for content_type in [21u8, 22, 23, 24] {
            let mut record = Vec::with_capacity(DTLS_HEADER_LEN + frag_len);
            record.push(content_type);
            record.extend_from_slice(&[0xFE, 0xFD]);
            record.extend_from_slice(&[0, 0]);
            record.extend_from_slice(&[0, 0, 0, 0, 0, 1]);
            record.extend_from_slice(&(frag_len as u16).to_be_bytes());
            record.extend_from_slice(&data[..frag_len]);
            let _ = server.handle_input(&record, now);
        }
    }
});
