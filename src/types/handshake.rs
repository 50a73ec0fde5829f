use nom::number::complete::be_u8;

wire_enum! {
    /// Handshake message type.
    pub enum HandshakeType(u8, be_u8) {
        HelloRequest = 0,
        ClientHello = 1,
        ServerHello = 2,
        HelloVerifyRequest = 3,
        NewSessionTicket = 4,
        EndOfEarlyData = 5,
        EncryptedExtensions = 8,
        Certificate = 11,
        ServerKeyExchange = 12,
        CertificateRequest = 13,
        ServerHelloDone = 14,
        CertificateVerify = 15,
        ClientKeyExchange = 16,
        Finished = 20,
        CertificateStatus = 22,
        KeyUpdate = 24,
        /// Synthetic message replacing ClientHello1 in the transcript after a
        /// HelloRetryRequest.
        MessageHash = 254,
    }
}
