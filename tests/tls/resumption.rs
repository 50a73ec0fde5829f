//! Session id resumption.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tlsproto::{AlertDescription, Config, Connection, Error, InMemorySessionStore, ProtocolVersion, SessionStore, TlsSession};

use crate::common::*;

fn resuming_server(store: &Arc<InMemorySessionStore>) -> Arc<Config> {
    let store: Arc<dyn SessionStore> = store.clone();
    server_config(builder(ProtocolVersion::Tls1_2).session_store(store))
}

#[test]
fn abbreviated_handshake_reuses_the_master_secret() {
    init_log();
    let now = Instant::now();
    let store = Arc::new(InMemorySessionStore::new());
    let server_config = resuming_server(&store);
    let client_config = client_config(builder(ProtocolVersion::Tls1_2));

    let mut client = Connection::client(client_config.clone(), now);
    let mut server = Connection::server(server_config.clone(), now);
    let first = connect(&mut client, &mut server, now);
    assert!(first.client.peer_cert.is_some());
    assert_eq!(store.len(), 1);

    let session = client.session().cloned().expect("client session");
    assert!(session.is_resumable());
    let first_params = client.security_parameters().unwrap();
    let first_master = first_params.master_secret().clone();
    let first_suite = first_params.cipher_suite();

    let mut client = Connection::client_resuming(client_config, now, session.clone());
    let mut server = Connection::server(server_config, now);
    let second = connect(&mut client, &mut server, now);

    let c = client.security_parameters().unwrap();
    let s = server.security_parameters().unwrap();
    assert!(c.is_resumed());
    assert!(s.is_resumed());
    assert_eq!(c.session_id(), session.id());
    assert_eq!(c.cipher_suite(), first_suite);
    assert!(*c.master_secret() == first_master);
    assert!(c.master_secret() == s.master_secret());
    // No certificate on an abbreviated handshake, but the old chain is kept.
    assert!(second.client.peer_cert.is_none());
    assert_eq!(client.peer_certificates().len(), 1);

    assert_eq!(transfer(&mut client, &mut server, b"resumed", now), b"resumed");
    assert_eq!(transfer(&mut server, &mut client, b"indeed", now), b"indeed");
}

#[test]
fn unknown_session_falls_back_to_full_handshake() {
    init_log();
    let now = Instant::now();
    let store = Arc::new(InMemorySessionStore::new());
    let client_config = client_config(builder(ProtocolVersion::Tls1_2));

    let mut client = Connection::client(client_config.clone(), now);
    let mut server = Connection::server(resuming_server(&store), now);
    connect(&mut client, &mut server, now);
    let session = client.session().cloned().unwrap();

    // A different server never saw the session.
    let fresh = Arc::new(InMemorySessionStore::new());
    let mut client = Connection::client_resuming(client_config, now, session.clone());
    let mut server = Connection::server(resuming_server(&fresh), now);
    let ex = connect(&mut client, &mut server, now);

    assert!(ex.client.peer_cert.is_some());
    assert!(!client.security_parameters().unwrap().is_resumed());
    assert_ne!(client.security_parameters().unwrap().session_id(), session.id());
    assert_eq!(fresh.len(), 1);
}

#[test]
fn invalidated_session_is_not_resumed() {
    init_log();
    let now = Instant::now();
    let store = Arc::new(InMemorySessionStore::new());
    let server_config = resuming_server(&store);
    let client_config = client_config(builder(ProtocolVersion::Tls1_2));

    let mut client = Connection::client(client_config.clone(), now);
    let mut server = Connection::server(server_config.clone(), now);
    connect(&mut client, &mut server, now);
    let session = client.session().cloned().unwrap();

    // Server side handle shares state with the stored one.
    store.get(session.id()).expect("stored").invalidate();

    let mut client = Connection::client_resuming(client_config, now, session);
    let mut server = Connection::server(server_config, now);
    connect(&mut client, &mut server, now);
    assert!(!client.security_parameters().unwrap().is_resumed());
}

/// A resumable session from a completed handshake.
fn established_session(client_config: &Arc<Config>, now: Instant) -> TlsSession {
    let store = Arc::new(InMemorySessionStore::new());
    let mut client = Connection::client(client_config.clone(), now);
    let mut server = Connection::server(resuming_server(&store), now);
    connect(&mut client, &mut server, now);
    let session = client.session().cloned().expect("client session");
    assert!(session.is_resumable());
    session
}

#[test]
fn offered_session_is_invalidated_by_a_timeout() {
    init_log();
    let now = Instant::now();
    let client_config = client_config(
        builder(ProtocolVersion::Tls1_2).handshake_timeout(Duration::from_secs(5)),
    );
    let session = established_session(&client_config, now);

    // The server never answers.
    let mut client = Connection::client_resuming(client_config, now, session.clone());
    client.handle_timeout(now).unwrap();
    let deadline = drain_outputs(&mut client).timeout.expect("deadline");
    let err = client.handle_timeout(deadline).unwrap_err();
    assert!(err.is_timeout());

    assert!(!session.is_resumable());
}

#[test]
fn offered_session_is_invalidated_by_a_fatal_alert() {
    init_log();
    let now = Instant::now();
    let client_config = client_config(builder(ProtocolVersion::Tls1_2));
    let session = established_session(&client_config, now);

    let mut client = Connection::client_resuming(client_config, now, session.clone());
    client.handle_timeout(now).unwrap();
    drain_outputs(&mut client);

    // Plaintext fatal handshake_failure before any ServerHello.
    let alert = [ALERT, 3, 3, 0, 2, 2, AlertDescription::HandshakeFailure.value()];
    let err = client.handle_input(&alert, now).unwrap_err();
    assert!(matches!(err, Error::PeerAlert(AlertDescription::HandshakeFailure)), "{err:?}");
    assert!(client.is_closed());

    assert!(!session.is_resumable());
}
