//! Resumable session snapshots.
//!
//! A [`TlsSession`] is a shared handle. Every clone sees the same snapshot,
//! and invalidating one destroys the master secret for all of them, so a
//! connection that failed while resuming makes the session unusable for
//! everybody else too.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::crypto::Secret;
use crate::types::{CipherSuite, MaxFragmentLength, ProtocolVersion};

/// What a completed legacy handshake leaves behind for resumption.
#[derive(Clone)]
pub struct SessionParameters {
    pub version: ProtocolVersion,
    pub cipher_suite: CipherSuite,
    pub master_secret: Secret,
    pub peer_certificates: Vec<Vec<u8>>,
    pub extended_master_secret: bool,
    pub max_fragment_length: Option<MaxFragmentLength>,
}

impl fmt::Debug for SessionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionParameters")
            .field("version", &self.version)
            .field("cipher_suite", &self.cipher_suite)
            .field("peer_certificates", &self.peer_certificates.len())
            .field("extended_master_secret", &self.extended_master_secret)
            .finish_non_exhaustive()
    }
}

/// Shared handle to a session snapshot keyed by session id.
#[derive(Clone)]
pub struct TlsSession {
    id: Vec<u8>,
    params: Arc<Mutex<Option<SessionParameters>>>,
}

impl TlsSession {
    pub fn new(id: Vec<u8>, params: SessionParameters) -> Self {
        TlsSession {
            id,
            params: Arc::new(Mutex::new(Some(params))),
        }
    }

    pub fn id(&self) -> &[u8] {
        &self.id
    }

    fn lock(&self) -> MutexGuard<'_, Option<SessionParameters>> {
        self.params.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A copy of the snapshot, if still valid.
    pub fn parameters(&self) -> Option<SessionParameters> {
        self.lock().clone()
    }

    pub fn is_resumable(&self) -> bool {
        !self.id.is_empty() && self.lock().is_some()
    }

    /// Replace the snapshot, keeping the id.
    pub(crate) fn refresh(&self, params: SessionParameters) {
        *self.lock() = Some(params);
    }

    /// Destroy the master secret and make the session unresumable.
    pub fn invalidate(&self) {
        if let Some(mut p) = self.lock().take() {
            p.master_secret.destroy();
        }
    }
}

impl fmt::Debug for TlsSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsSession")
            .field("id_len", &self.id.len())
            .field("resumable", &self.is_resumable())
            .finish()
    }
}

/// Server side session cache.
pub trait SessionStore: Send + Sync {
    fn get(&self, id: &[u8]) -> Option<TlsSession>;

    fn put(&self, session: TlsSession);
}

/// Unbounded in-memory [`SessionStore`]. Invalidated sessions are skipped on lookup.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<Vec<u8>, TlsSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, id: &[u8]) -> Option<TlsSession> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let session = sessions.get(id)?.clone();
        if session.is_resumable() {
            Some(session)
        } else {
            sessions.remove(id);
            None
        }
    }

    fn put(&self, session: TlsSession) {
        if session.id().is_empty() {
            return;
        }
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.insert(session.id().to_vec(), session);
    }
}
