use nom::number::complete::{be_u16, be_u8};

wire_enum! {
    pub enum ExtensionType(u16, be_u16) {
        ServerName = 0,
        MaxFragmentLength = 1,
        StatusRequest = 5,
        SupportedGroups = 10,
        EcPointFormats = 11,
        SignatureAlgorithms = 13,
        Heartbeat = 15,
        ApplicationLayerProtocolNegotiation = 16,
        ExtendedMasterSecret = 23,
        SessionTicket = 35,
        PreSharedKey = 41,
        EarlyData = 42,
        SupportedVersions = 43,
        Cookie = 44,
        PskKeyExchangeModes = 45,
        CertificateAuthorities = 47,
        SignatureAlgorithmsCert = 50,
        KeyShare = 51,
        RenegotiationInfo = 0xff01,
    }
}

wire_enum! {
    /// Max fragment length codes (RFC 6066).
    pub enum MaxFragmentLength(u8, be_u8) {
        Pow9 = 1,
        Pow10 = 2,
        Pow11 = 3,
        Pow12 = 4,
    }
}

impl MaxFragmentLength {
    /// The plaintext limit this code selects, if it is a valid code.
    pub fn limit(&self) -> Option<usize> {
        match self {
            MaxFragmentLength::Pow9 => Some(1 << 9),
            MaxFragmentLength::Pow10 => Some(1 << 10),
            MaxFragmentLength::Pow11 => Some(1 << 11),
            MaxFragmentLength::Pow12 => Some(1 << 12),
            MaxFragmentLength::Unknown(_) => None,
        }
    }
}

wire_enum! {
    /// Heartbeat extension mode (RFC 6520).
    pub enum HeartbeatMode(u8, be_u8) {
        PeerAllowedToSend = 1,
        PeerNotAllowedToSend = 2,
    }
}

wire_enum! {
    pub enum HeartbeatMessageType(u8, be_u8) {
        Request = 1,
        Response = 2,
    }
}

wire_enum! {
    pub enum ClientCertificateType(u8, be_u8) {
        RsaSign = 1,
        EcdsaSign = 64,
    }
}

wire_enum! {
    pub enum KeyUpdateRequest(u8, be_u8) {
        UpdateNotRequested = 0,
        UpdateRequested = 1,
    }
}
