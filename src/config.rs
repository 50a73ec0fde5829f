use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::crypto::dh_groups::{self, DhGroup};
use crate::crypto::{rust_crypto, CryptoProvider, Secret};
use crate::kx::PskStore;
use crate::session::SessionStore;
use crate::types::{CipherSuite, HeartbeatMode, MaxFragmentLength, NamedGroup};
use crate::types::{ProtocolVersion, SignatureScheme};
use crate::Error;

/// Application hook for judging the peer's certificate chain.
///
/// The engine does no path validation of its own. Without a verifier any
/// chain is accepted and the application sees it through
/// [`Output::PeerCert`](crate::Output::PeerCert).
pub trait CertVerifier: Send + Sync {
    /// `chain[0]` is the end-entity certificate, DER.
    fn verify_chain(&self, chain: &[Vec<u8>]) -> Result<(), String>;
}

/// Counter measure against chosen plaintext attacks on the TLS 1.0 CBC IV chain.
///
/// Only applies when a TLS 1.0 CBC cipher protects application data. Later
/// versions and AEAD ciphers never split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordSplitting {
    /// Write records as they come.
    Disabled,
    /// Precede every application data record with an empty one.
    ZeroN,
    /// Send the first byte in a record of its own.
    #[default]
    OneNMinusOne,
}

/// TLS/DTLS configuration
#[derive(Clone)]
pub struct Config {
    min_version: ProtocolVersion,
    max_version: ProtocolVersion,
    cipher_suites: Vec<CipherSuite>,
    named_groups: Vec<NamedGroup>,
    signature_schemes: Vec<SignatureScheme>,
    dh_group: &'static DhGroup,
    mtu: usize,
    max_queue_rx: usize,
    max_queue_tx: usize,
    flight_start_rto: Duration,
    flight_max_rto: Duration,
    handshake_timeout: Duration,
    require_client_certificate: bool,
    certificate_chain: Vec<Vec<u8>>,
    private_key: Option<Vec<u8>>,
    cert_verifier: Option<Arc<dyn CertVerifier>>,
    psk_identity: Option<Vec<u8>>,
    psk: Option<Secret>,
    psk_store: Option<Arc<dyn PskStore>>,
    psk_identity_hint: Option<Vec<u8>>,
    session_store: Option<Arc<dyn SessionStore>>,
    server_name: Option<String>,
    extended_master_secret: bool,
    max_fragment_length: Option<MaxFragmentLength>,
    heartbeat_mode: Option<HeartbeatMode>,
    heartbeat_interval: Option<Duration>,
    heartbeat_timeout: Duration,
    record_splitting: RecordSplitting,
    require_cookie: bool,
    alpn_protocols: Vec<Vec<u8>>,
    crypto_provider: CryptoProvider,
}

impl Config {
    /// Create a new configuration builder for TLS.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            min_version: ProtocolVersion::Tls1_2,
            max_version: ProtocolVersion::Tls1_3,
            cipher_suites: CipherSuite::default_suites().to_vec(),
            named_groups: vec![
                NamedGroup::X25519,
                NamedGroup::Secp256r1,
                NamedGroup::Secp384r1,
            ],
            signature_schemes: SignatureScheme::default_schemes().to_vec(),
            dh_group: dh_groups::ffdhe2048(),
            mtu: 1150,
            max_queue_rx: 30,
            max_queue_tx: 10,
            flight_start_rto: Duration::from_secs(1),
            flight_max_rto: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(40),
            require_client_certificate: false,
            certificate_chain: Vec::new(),
            private_key: None,
            cert_verifier: None,
            psk_identity: None,
            psk: None,
            psk_store: None,
            psk_identity_hint: None,
            session_store: None,
            server_name: None,
            extended_master_secret: true,
            max_fragment_length: None,
            heartbeat_mode: None,
            heartbeat_interval: None,
            heartbeat_timeout: Duration::from_secs(30),
            record_splitting: RecordSplitting::default(),
            require_cookie: true,
            alpn_protocols: Vec::new(),
            crypto_provider: None,
        }
    }

    /// Lowest version we negotiate.
    #[inline(always)]
    pub fn min_version(&self) -> ProtocolVersion {
        self.min_version
    }

    /// Highest version we offer.
    #[inline(always)]
    pub fn max_version(&self) -> ProtocolVersion {
        self.max_version
    }

    /// Whether this configuration is for DTLS.
    #[inline(always)]
    pub fn is_dtls(&self) -> bool {
        self.max_version.is_dtls()
    }

    /// Cipher suites in preference order.
    #[inline(always)]
    pub fn cipher_suites(&self) -> &[CipherSuite] {
        &self.cipher_suites
    }

    /// ECDHE groups in preference order.
    #[inline(always)]
    pub fn named_groups(&self) -> &[NamedGroup] {
        &self.named_groups
    }

    #[inline(always)]
    pub fn signature_schemes(&self) -> &[SignatureScheme] {
        &self.signature_schemes
    }

    /// Finite field group a server uses for DHE suites.
    #[inline(always)]
    pub fn dh_group(&self) -> &'static DhGroup {
        self.dh_group
    }

    /// Max transmission unit.
    ///
    /// The largest datagram we will produce.
    #[inline(always)]
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Max undelivered application data records before rejecting more input.
    #[inline(always)]
    pub fn max_queue_rx(&self) -> usize {
        self.max_queue_rx
    }

    /// Max outgoing packets buffered before application writes are refused.
    #[inline(always)]
    pub fn max_queue_tx(&self) -> usize {
        self.max_queue_tx
    }

    /// Time of first flight retransmission. Doubled for every retry.
    #[inline(always)]
    pub fn flight_start_rto(&self) -> Duration {
        self.flight_start_rto
    }

    /// Cap for the doubling retransmission timeout.
    #[inline(always)]
    pub fn flight_max_rto(&self) -> Duration {
        self.flight_max_rto
    }

    /// Timeout for the entire handshake, regardless of flights.
    #[inline(always)]
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// For a server, require a client certificate.
    ///
    /// Makes the server send a CertificateRequest and fail if the client
    /// answers with an empty chain.
    #[inline(always)]
    pub fn require_client_certificate(&self) -> bool {
        self.require_client_certificate
    }

    /// Our certificate chain, end entity first.
    #[inline(always)]
    pub fn certificate_chain(&self) -> &[Vec<u8>] {
        &self.certificate_chain
    }

    #[inline(always)]
    pub fn private_key(&self) -> Option<&[u8]> {
        self.private_key.as_deref()
    }

    #[inline(always)]
    pub fn cert_verifier(&self) -> Option<&Arc<dyn CertVerifier>> {
        self.cert_verifier.as_ref()
    }

    /// Client PSK identity.
    #[inline(always)]
    pub fn psk_identity(&self) -> Option<&[u8]> {
        self.psk_identity.as_deref()
    }

    /// Client PSK.
    #[inline(always)]
    pub fn psk(&self) -> Option<&Secret> {
        self.psk.as_ref()
    }

    /// Server side PSK lookup.
    #[inline(always)]
    pub fn psk_store(&self) -> Option<&Arc<dyn PskStore>> {
        self.psk_store.as_ref()
    }

    #[inline(always)]
    pub fn psk_identity_hint(&self) -> Option<&[u8]> {
        self.psk_identity_hint.as_deref()
    }

    /// Server side session cache for resumption.
    #[inline(always)]
    pub fn session_store(&self) -> Option<&Arc<dyn SessionStore>> {
        self.session_store.as_ref()
    }

    /// Host name a client sends in server_name.
    #[inline(always)]
    pub fn server_name(&self) -> Option<&str> {
        self.server_name.as_deref()
    }

    /// Whether to use Extended Master Secret (RFC 7627).
    #[inline(always)]
    pub fn extended_master_secret(&self) -> bool {
        self.extended_master_secret
    }

    /// Fragment limit a client requests (RFC 6066).
    #[inline(always)]
    pub fn max_fragment_length(&self) -> Option<MaxFragmentLength> {
        self.max_fragment_length
    }

    /// Heartbeat mode we advertise. `None` disables the extension.
    #[inline(always)]
    pub fn heartbeat_mode(&self) -> Option<HeartbeatMode> {
        self.heartbeat_mode
    }

    /// Idle time before we send a heartbeat request, when the peer allows it.
    #[inline(always)]
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval
    }

    /// Time to wait for a heartbeat response before failing the connection.
    #[inline(always)]
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    #[inline(always)]
    pub fn record_splitting(&self) -> RecordSplitting {
        self.record_splitting
    }

    /// For a DTLS server, answer the first ClientHello with a HelloVerifyRequest.
    #[inline(always)]
    pub fn require_cookie(&self) -> bool {
        self.require_cookie
    }

    /// ALPN protocols, in preference order.
    #[inline(always)]
    pub fn alpn_protocols(&self) -> &[Vec<u8>] {
        &self.alpn_protocols
    }

    /// Cryptographic provider.
    #[inline(always)]
    pub fn crypto_provider(&self) -> &CryptoProvider {
        &self.crypto_provider
    }

    /// Whether `version` lies inside the configured range.
    pub(crate) fn allows_version(&self, version: ProtocolVersion) -> bool {
        version.is_supported()
            && matches!(
                (
                    version.partial_cmp(&self.min_version),
                    version.partial_cmp(&self.max_version)
                ),
                (Some(lo), Some(hi)) if lo.is_ge() && hi.is_le()
            )
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("min_version", &self.min_version)
            .field("max_version", &self.max_version)
            .field("cipher_suites", &self.cipher_suites)
            .field("mtu", &self.mtu)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Config`].
pub struct ConfigBuilder {
    min_version: ProtocolVersion,
    max_version: ProtocolVersion,
    cipher_suites: Vec<CipherSuite>,
    named_groups: Vec<NamedGroup>,
    signature_schemes: Vec<SignatureScheme>,
    dh_group: &'static DhGroup,
    mtu: usize,
    max_queue_rx: usize,
    max_queue_tx: usize,
    flight_start_rto: Duration,
    flight_max_rto: Duration,
    handshake_timeout: Duration,
    require_client_certificate: bool,
    certificate_chain: Vec<Vec<u8>>,
    private_key: Option<Vec<u8>>,
    cert_verifier: Option<Arc<dyn CertVerifier>>,
    psk_identity: Option<Vec<u8>>,
    psk: Option<Secret>,
    psk_store: Option<Arc<dyn PskStore>>,
    psk_identity_hint: Option<Vec<u8>>,
    session_store: Option<Arc<dyn SessionStore>>,
    server_name: Option<String>,
    extended_master_secret: bool,
    max_fragment_length: Option<MaxFragmentLength>,
    heartbeat_mode: Option<HeartbeatMode>,
    heartbeat_interval: Option<Duration>,
    heartbeat_timeout: Duration,
    record_splitting: RecordSplitting,
    require_cookie: bool,
    alpn_protocols: Vec<Vec<u8>>,
    crypto_provider: Option<CryptoProvider>,
}

impl ConfigBuilder {
    /// Restrict the negotiable versions.
    ///
    /// Both ends must be in the same family. A DTLS range makes the
    /// configuration a DTLS one. Defaults to TLS 1.2 to TLS 1.3.
    pub fn versions(mut self, min: ProtocolVersion, max: ProtocolVersion) -> Self {
        self.min_version = min;
        self.max_version = max;
        self
    }

    /// Shorthand for `versions(Dtls1_0, Dtls1_2)`.
    pub fn dtls(self) -> Self {
        self.versions(ProtocolVersion::Dtls1_0, ProtocolVersion::Dtls1_2)
    }

    /// Cipher suites in preference order.
    ///
    /// Suites not usable with a negotiated version are skipped at that point.
    pub fn cipher_suites(mut self, suites: impl IntoIterator<Item = CipherSuite>) -> Self {
        self.cipher_suites = suites.into_iter().collect();
        self
    }

    /// ECDHE groups in preference order.
    ///
    /// Defaults to x25519, secp256r1, secp384r1.
    pub fn named_groups(mut self, groups: impl IntoIterator<Item = NamedGroup>) -> Self {
        self.named_groups = groups.into_iter().collect();
        self
    }

    pub fn signature_schemes(mut self, schemes: impl IntoIterator<Item = SignatureScheme>) -> Self {
        self.signature_schemes = schemes.into_iter().collect();
        self
    }

    /// The group a server offers for DHE suites. Defaults to ffdhe2048.
    pub fn dh_group(mut self, group: &'static DhGroup) -> Self {
        self.dh_group = group;
        self
    }

    /// Set the max transmission unit (MTU).
    ///
    /// Defaults to 1150.
    pub fn mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Defaults to 30.
    pub fn max_queue_rx(mut self, max_queue_rx: usize) -> Self {
        self.max_queue_rx = max_queue_rx;
        self
    }

    /// Defaults to 10.
    pub fn max_queue_tx(mut self, max_queue_tx: usize) -> Self {
        self.max_queue_tx = max_queue_tx;
        self
    }

    /// Set the time of first retry.
    ///
    /// Every flight restarts with this value. Defaults to 1 second.
    pub fn flight_start_rto(mut self, rto: Duration) -> Self {
        self.flight_start_rto = rto;
        self
    }

    /// Defaults to 60 seconds.
    pub fn flight_max_rto(mut self, rto: Duration) -> Self {
        self.flight_max_rto = rto;
        self
    }

    /// Set the timeout for the entire handshake, regardless of flights.
    ///
    /// Defaults to 40 seconds.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Defaults to false.
    pub fn require_client_certificate(mut self, require: bool) -> Self {
        self.require_client_certificate = require;
        self
    }

    /// Our certificate and its private key, both DER.
    pub fn certificate(self, certificate: Vec<u8>, private_key: Vec<u8>) -> Self {
        self.certificate_chain(vec![certificate], private_key)
    }

    /// A chain, end entity first, and the private key of the end entity.
    pub fn certificate_chain(mut self, chain: Vec<Vec<u8>>, private_key: Vec<u8>) -> Self {
        self.certificate_chain = chain;
        self.private_key = Some(private_key);
        self
    }

    pub fn cert_verifier(mut self, verifier: Arc<dyn CertVerifier>) -> Self {
        self.cert_verifier = Some(verifier);
        self
    }

    /// Identity and key a client uses for PSK suites.
    pub fn psk(mut self, identity: Vec<u8>, key: Vec<u8>) -> Self {
        self.psk_identity = Some(identity);
        self.psk = Some(Secret::new(key));
        self
    }

    /// Key lookup a server uses for PSK suites.
    pub fn psk_store(mut self, store: Arc<dyn PskStore>) -> Self {
        self.psk_store = Some(store);
        self
    }

    pub fn psk_identity_hint(mut self, hint: Vec<u8>) -> Self {
        self.psk_identity_hint = Some(hint);
        self
    }

    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Set whether to enable Extended Master Secret (RFC 7627).
    ///
    /// Defaults to true.
    pub fn extended_master_secret(mut self, enabled: bool) -> Self {
        self.extended_master_secret = enabled;
        self
    }

    pub fn max_fragment_length(mut self, mfl: MaxFragmentLength) -> Self {
        self.max_fragment_length = Some(mfl);
        self
    }

    /// Advertise the heartbeat extension with `mode`.
    pub fn heartbeat(mut self, mode: HeartbeatMode) -> Self {
        self.heartbeat_mode = Some(mode);
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Defaults to 30 seconds.
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Defaults to [`RecordSplitting::OneNMinusOne`].
    pub fn record_splitting(mut self, policy: RecordSplitting) -> Self {
        self.record_splitting = policy;
        self
    }

    /// Defaults to true.
    pub fn require_cookie(mut self, require: bool) -> Self {
        self.require_cookie = require;
        self
    }

    pub fn alpn_protocols(mut self, protocols: Vec<Vec<u8>>) -> Self {
        self.alpn_protocols = protocols;
        self
    }

    /// Set a custom crypto provider.
    pub fn with_crypto_provider(mut self, provider: CryptoProvider) -> Self {
        self.crypto_provider = Some(provider);
        self
    }

    /// Build the configuration.
    ///
    /// The crypto provider is selected in the following priority order:
    /// 1. Explicit provider set via `with_crypto_provider()`
    /// 2. Default provider installed via `CryptoProvider::install_default()`
    /// 3. The RustCrypto provider
    pub fn build(self) -> Result<Config, Error> {
        let crypto_provider = self
            .crypto_provider
            .or_else(|| CryptoProvider::get_default().cloned())
            .unwrap_or_else(rust_crypto::default_provider);

        let (min, max) = (self.min_version, self.max_version);
        if !min.is_supported() || !max.is_supported() {
            return Err(Error::Config(format!("unsupported version in {min}..{max}")));
        }
        match min.partial_cmp(&max) {
            Some(o) if o.is_le() => {}
            _ => return Err(Error::Config(format!("bad version range {min}..{max}"))),
        }

        if self.cipher_suites.is_empty() {
            return Err(Error::Config("no cipher suites".into()));
        }
        if let Some(s) = self.cipher_suites.iter().find(|s| s.key_exchange().is_none()) {
            return Err(Error::Config(format!("{s} can not be configured")));
        }

        for g in &self.named_groups {
            if crypto_provider.kx_group(*g).is_none() {
                return Err(Error::Config(format!("provider lacks group {g}")));
            }
        }

        if let Some(key) = &self.private_key {
            if self.certificate_chain.is_empty() {
                return Err(Error::Config("private key without certificate".into()));
            }
            crypto_provider
                .key_provider
                .load_private_key(key)
                .map_err(|e| Error::Config(format!("private key: {e}")))?;
        }

        // A few hundred bytes of headers and expansion must fit.
        if self.mtu < 256 {
            return Err(Error::Config(format!("mtu {} too small", self.mtu)));
        }
        if self.flight_start_rto.is_zero() || self.flight_max_rto < self.flight_start_rto {
            return Err(Error::Config("bad retransmission timeouts".into()));
        }
        if self.alpn_protocols.iter().any(|p| p.is_empty() || p.len() > 255) {
            return Err(Error::Config("ALPN protocol names are 1 to 255 bytes".into()));
        }

        Ok(Config {
            min_version: min,
            max_version: max,
            cipher_suites: self.cipher_suites,
            named_groups: self.named_groups,
            signature_schemes: self.signature_schemes,
            dh_group: self.dh_group,
            mtu: self.mtu,
            max_queue_rx: self.max_queue_rx,
            max_queue_tx: self.max_queue_tx,
            flight_start_rto: self.flight_start_rto,
            flight_max_rto: self.flight_max_rto,
            handshake_timeout: self.handshake_timeout,
            require_client_certificate: self.require_client_certificate,
            certificate_chain: self.certificate_chain,
            private_key: self.private_key,
            cert_verifier: self.cert_verifier,
            psk_identity: self.psk_identity,
            psk: self.psk,
            psk_store: self.psk_store,
            psk_identity_hint: self.psk_identity_hint,
            session_store: self.session_store,
            server_name: self.server_name,
            extended_master_secret: self.extended_master_secret,
            max_fragment_length: self.max_fragment_length,
            heartbeat_mode: self.heartbeat_mode,
            heartbeat_interval: self.heartbeat_interval,
            heartbeat_timeout: self.heartbeat_timeout,
            record_splitting: self.record_splitting,
            require_cookie: self.require_cookie,
            alpn_protocols: self.alpn_protocols,
            crypto_provider,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::builder()
            .build()
            .expect("Default config should always validate")
    }
}
