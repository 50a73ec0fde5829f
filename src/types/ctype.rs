use nom::number::complete::be_u8;

wire_enum! {
    /// Record content type.
    pub enum ContentType(u8, be_u8) {
        ChangeCipherSpec = 20,
        Alert = 21,
        Handshake = 22,
        ApplicationData = 23,
        Heartbeat = 24,
    }
}

wire_enum! {
    pub enum AlertLevel(u8, be_u8) {
        Warning = 1,
        Fatal = 2,
    }
}

wire_enum! {
    /// Alert description.
    ///
    /// This is the only diagnostic that crosses the wire, so every local
    /// failure maps to one of these.
    pub enum AlertDescription(u8, be_u8) {
        CloseNotify = 0,
        UnexpectedMessage = 10,
        BadRecordMac = 20,
        DecryptionFailed = 21,
        RecordOverflow = 22,
        DecompressionFailure = 30,
        HandshakeFailure = 40,
        /// SSLv3 only.
        NoCertificate = 41,
        BadCertificate = 42,
        UnsupportedCertificate = 43,
        CertificateRevoked = 44,
        CertificateExpired = 45,
        CertificateUnknown = 46,
        IllegalParameter = 47,
        UnknownCa = 48,
        AccessDenied = 49,
        DecodeError = 50,
        DecryptError = 51,
        ExportRestriction = 60,
        ProtocolVersion = 70,
        InsufficientSecurity = 71,
        InternalError = 80,
        InappropriateFallback = 86,
        UserCanceled = 90,
        NoRenegotiation = 100,
        MissingExtension = 109,
        UnsupportedExtension = 110,
        UnrecognizedName = 112,
        BadCertificateStatusResponse = 113,
        UnknownPskIdentity = 115,
        CertificateRequired = 116,
        NoApplicationProtocol = 120,
    }
}

impl ContentType {
    /// Content types a record layer accepts. Anything else is fatal.
    pub fn is_recognized(&self) -> bool {
        self.is_known()
    }
}

impl AlertDescription {
    /// Alerts that TLS 1.3 allows at warning level.
    pub fn is_closure(&self) -> bool {
        matches!(
            self,
            AlertDescription::CloseNotify | AlertDescription::UserCanceled
        )
    }
}
