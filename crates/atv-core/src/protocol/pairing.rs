//! Pairing ("polo") messages and pairing-secret derivation.
//!
//! Pairing runs on its own TLS connection (port 6467) before the remote
//! channel can be used.  The client and TV trade a fixed sequence of
//! messages:
//!
//! ```text
//! client                                   TV
//!   PairingRequest  ───────────────────────►
//!                   ◄───────────────────────  PairingRequestAck
//!   Options         ───────────────────────►
//!                   ◄───────────────────────  Options
//!   Configuration   ───────────────────────►
//!                   ◄───────────────────────  ConfigurationAck   (TV shows code)
//!   Secret          ───────────────────────►
//!                   ◄───────────────────────  SecretAck          (paired)
//! ```
//!
//! # The secret (for beginners)
//!
//! The TV shows a six-hex-digit code.  Both sides hash their RSA public keys
//! together with the last four digits of the code.  The first two digits are
//! a checksum: they must equal the first byte of that hash.  A typo is
//! therefore caught locally before anything is sent, and the TV can tell the
//! client knows the code without the code crossing the wire.

use sha2::{Digest, Sha256};

use crate::domain::error::RemoteError;

/// Protocol version carried in every pairing message.
pub const PAIRING_PROTOCOL_VERSION: i32 = 2;

/// Number of hex digits in a pairing code.
pub const PAIRING_CODE_LEN: usize = 6;

/// Status codes carried in [`OuterMessage::status`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PairingStatus {
    Unknown = 0,
    Ok = 200,
    Error = 400,
    BadConfiguration = 401,
    BadSecret = 402,
}

/// Encoding of the code shown on screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum EncodingType {
    Unknown = 0,
    Alphanumeric = 1,
    Numeric = 2,
    Hexadecimal = 3,
    Qrcode = 4,
}

/// Which side displays the code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum RoleType {
    Unknown = 0,
    Input = 1,
    Output = 2,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PairingRequest {
    #[prost(string, tag = "1")]
    pub service_name: String,
    #[prost(string, tag = "2")]
    pub client_name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PairingRequestAck {
    #[prost(string, tag = "1")]
    pub server_name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PairingEncoding {
    #[prost(enumeration = "EncodingType", tag = "1")]
    pub r#type: i32,
    #[prost(uint32, tag = "2")]
    pub symbol_length: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PairingOption {
    #[prost(message, repeated, tag = "1")]
    pub input_encodings: Vec<PairingEncoding>,
    #[prost(message, repeated, tag = "2")]
    pub output_encodings: Vec<PairingEncoding>,
    #[prost(enumeration = "RoleType", tag = "3")]
    pub preferred_role: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PairingConfiguration {
    #[prost(message, optional, tag = "1")]
    pub encoding: Option<PairingEncoding>,
    #[prost(enumeration = "RoleType", tag = "2")]
    pub client_role: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PairingConfigurationAck {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PairingSecret {
    #[prost(bytes = "vec", tag = "1")]
    pub secret: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PairingSecretAck {
    #[prost(bytes = "vec", tag = "1")]
    pub secret: Vec<u8>,
}

/// Envelope for every pairing message.  Exactly one payload field is set.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct OuterMessage {
    #[prost(int32, tag = "1")]
    pub protocol_version: i32,
    #[prost(enumeration = "PairingStatus", tag = "2")]
    pub status: i32,
    #[prost(message, optional, tag = "10")]
    pub pairing_request: Option<PairingRequest>,
    #[prost(message, optional, tag = "11")]
    pub pairing_request_ack: Option<PairingRequestAck>,
    #[prost(message, optional, tag = "20")]
    pub pairing_option: Option<PairingOption>,
    #[prost(message, optional, tag = "30")]
    pub pairing_configuration: Option<PairingConfiguration>,
    #[prost(message, optional, tag = "31")]
    pub pairing_configuration_ack: Option<PairingConfigurationAck>,
    #[prost(message, optional, tag = "40")]
    pub pairing_secret: Option<PairingSecret>,
    #[prost(message, optional, tag = "41")]
    pub pairing_secret_ack: Option<PairingSecretAck>,
}

impl OuterMessage {
    fn envelope() -> Self {
        Self {
            protocol_version: PAIRING_PROTOCOL_VERSION,
            status: PairingStatus::Ok as i32,
            ..Default::default()
        }
    }

    /// First message of the exchange.
    pub fn pairing_request(service_name: &str, client_name: &str) -> Self {
        Self {
            pairing_request: Some(PairingRequest {
                service_name: service_name.to_string(),
                client_name: client_name.to_string(),
            }),
            ..Self::envelope()
        }
    }

    /// Offers a 6-symbol hexadecimal code with the client as input side.
    pub fn hex_code_options() -> Self {
        Self {
            pairing_option: Some(PairingOption {
                input_encodings: vec![hex_encoding()],
                output_encodings: Vec::new(),
                preferred_role: RoleType::Input as i32,
            }),
            ..Self::envelope()
        }
    }

    pub fn hex_code_configuration() -> Self {
        Self {
            pairing_configuration: Some(PairingConfiguration {
                encoding: Some(hex_encoding()),
                client_role: RoleType::Input as i32,
            }),
            ..Self::envelope()
        }
    }

    pub fn secret(secret: Vec<u8>) -> Self {
        Self {
            pairing_secret: Some(PairingSecret { secret }),
            ..Self::envelope()
        }
    }

    /// Decoded status; unrecognised values read as [`PairingStatus::Unknown`].
    pub fn status_code(&self) -> PairingStatus {
        PairingStatus::try_from(self.status).unwrap_or(PairingStatus::Unknown)
    }
}

fn hex_encoding() -> PairingEncoding {
    PairingEncoding {
        r#type: EncodingType::Hexadecimal as i32,
        symbol_length: PAIRING_CODE_LEN as u32,
    }
}

// ── Secret derivation ─────────────────────────────────────────────────────────

/// RSA public key as big-endian byte strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicComponents {
    pub modulus: Vec<u8>,
    pub exponent: Vec<u8>,
}

impl RsaPublicComponents {
    /// Builds components, stripping leading zero bytes from both values.
    pub fn new(modulus: &[u8], exponent: &[u8]) -> Self {
        Self {
            modulus: strip_leading_zeros(modulus).to_vec(),
            exponent: strip_leading_zeros(exponent).to_vec(),
        }
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// A syntactically valid pairing code split into checksum and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingCode {
    checksum: u8,
    payload: Vec<u8>,
}

impl PairingCode {
    /// Parses a six-hex-digit code, ignoring surrounding whitespace and case.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidPairingCode`] for wrong length or
    /// non-hex characters.
    pub fn parse(code: &str) -> Result<Self, RemoteError> {
        let code = code.trim();
        if code.len() != PAIRING_CODE_LEN {
            return Err(RemoteError::InvalidPairingCode(format!(
                "expected {PAIRING_CODE_LEN} hex digits, got {}",
                code.len()
            )));
        }
        let bytes = hex::decode(code)
            .map_err(|_| RemoteError::InvalidPairingCode("code must be hexadecimal".into()))?;
        Ok(Self {
            checksum: bytes[0],
            payload: bytes[1..].to_vec(),
        })
    }
}

/// Derives the pairing secret for `code`.
///
/// # Errors
///
/// Returns [`RemoteError::InvalidPairingCode`] if the code is malformed or
/// its checksum digits do not match the derived hash.
pub fn derive_secret(
    client: &RsaPublicComponents,
    server: &RsaPublicComponents,
    code: &str,
) -> Result<Vec<u8>, RemoteError> {
    let code = PairingCode::parse(code)?;

    let mut hasher = Sha256::new();
    hasher.update(&client.modulus);
    hasher.update(&client.exponent);
    hasher.update(&server.modulus);
    hasher.update(&server.exponent);
    hasher.update(&code.payload);
    let digest = hasher.finalize();

    if digest[0] != code.checksum {
        return Err(RemoteError::InvalidPairingCode(
            "code does not match this device".into(),
        ));
    }
    Ok(digest.to_vec())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
