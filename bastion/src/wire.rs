//! Binary codec for the `SSH-TRANS` and `SSH-USERAUTH` messages this crate exchanges.

use crate::{Error, Result};

/// Message numbers of the transport and user-auth subprotocols.
pub mod msg {
    /// `SSH_MSG_DISCONNECT`.
    pub const DISCONNECT: u8 = 1;

    /// `SSH_MSG_SERVICE_REQUEST`.
    pub const SERVICE_REQUEST: u8 = 5;

    /// `SSH_MSG_SERVICE_ACCEPT`.
    pub const SERVICE_ACCEPT: u8 = 6;

    /// `SSH_MSG_USERAUTH_REQUEST`.
    pub const USERAUTH_REQUEST: u8 = 50;

    /// `SSH_MSG_USERAUTH_FAILURE`.
    pub const USERAUTH_FAILURE: u8 = 51;

    /// `SSH_MSG_USERAUTH_SUCCESS`.
    pub const USERAUTH_SUCCESS: u8 = 52;

    /// `SSH_MSG_USERAUTH_BANNER`.
    pub const USERAUTH_BANNER: u8 = 53;

    /// `SSH_MSG_USERAUTH_PK_OK`, shared with `SSH_MSG_USERAUTH_INFO_REQUEST`.
    pub const USERAUTH_PK_OK: u8 = 60;

    /// `SSH_MSG_USERAUTH_INFO_RESPONSE`.
    pub const USERAUTH_INFO_RESPONSE: u8 = 61;
}

/// Reason codes carried in a `SSH_MSG_DISCONNECT` message.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `SSH_DISCONNECT_HOST_NOT_ALLOWED_TO_CONNECT`.
    HostNotAllowedToConnect,

    /// `SSH_DISCONNECT_PROTOCOL_ERROR`.
    ProtocolError,

    /// `SSH_DISCONNECT_KEY_EXCHANGE_FAILED`.
    KeyExchangeFailed,

    /// `SSH_DISCONNECT_RESERVED`.
    Reserved,

    /// `SSH_DISCONNECT_MAC_ERROR`.
    MacError,

    /// `SSH_DISCONNECT_COMPRESSION_ERROR`.
    CompressionError,

    /// `SSH_DISCONNECT_SERVICE_NOT_AVAILABLE`.
    ServiceNotAvailable,

    /// `SSH_DISCONNECT_PROTOCOL_VERSION_NOT_SUPPORTED`.
    ProtocolVersionNotSupported,

    /// `SSH_DISCONNECT_HOST_KEY_NOT_VERIFIABLE`.
    HostKeyNotVerifiable,

    /// `SSH_DISCONNECT_CONNECTION_LOST`.
    ConnectionLost,

    /// `SSH_DISCONNECT_BY_APPLICATION`.
    ByApplication,

    /// `SSH_DISCONNECT_TOO_MANY_CONNECTIONS`.
    TooManyConnections,

    /// `SSH_DISCONNECT_AUTH_CANCELLED_BY_USER`.
    AuthCancelledByUser,

    /// `SSH_DISCONNECT_NO_MORE_AUTH_METHODS_AVAILABLE`.
    NoMoreAuthMethodsAvailable,

    /// `SSH_DISCONNECT_ILLEGAL_USER_NAME`.
    IllegalUserName,
}

impl DisconnectReason {
    /// The wire representation of the reason code.
    pub fn to_u32(self) -> u32 {
        match self {
            Self::HostNotAllowedToConnect => 1,
            Self::ProtocolError => 2,
            Self::KeyExchangeFailed => 3,
            Self::Reserved => 4,
            Self::MacError => 5,
            Self::CompressionError => 6,
            Self::ServiceNotAvailable => 7,
            Self::ProtocolVersionNotSupported => 8,
            Self::HostKeyNotVerifiable => 9,
            Self::ConnectionLost => 10,
            Self::ByApplication => 11,
            Self::TooManyConnections => 12,
            Self::AuthCancelledByUser => 13,
            Self::NoMoreAuthMethodsAvailable => 14,
            Self::IllegalUserName => 15,
        }
    }

    /// The reason code for a wire value, if it is a known one.
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::HostNotAllowedToConnect,
            2 => Self::ProtocolError,
            3 => Self::KeyExchangeFailed,
            4 => Self::Reserved,
            5 => Self::MacError,
            6 => Self::CompressionError,
            7 => Self::ServiceNotAvailable,
            8 => Self::ProtocolVersionNotSupported,
            9 => Self::HostKeyNotVerifiable,
            10 => Self::ConnectionLost,
            11 => Self::ByApplication,
            12 => Self::TooManyConnections,
            13 => Self::AuthCancelledByUser,
            14 => Self::NoMoreAuthMethodsAvailable,
            15 => Self::IllegalUserName,
            _ => return None,
        })
    }
}

/// An incremental encoder for a single message payload.
#[derive(Debug)]
pub struct PacketBuilder {
    buf: Vec<u8>,
}

impl PacketBuilder {
    /// Start a payload with the given message number.
    pub fn start(message_id: u8) -> Self {
        Self {
            buf: vec![message_id],
        }
    }

    /// Append a raw byte.
    pub fn put_u8(mut self, value: u8) -> Self {
        self.buf.push(value);
        self
    }

    /// Append a `boolean` field.
    pub fn put_bool(self, value: bool) -> Self {
        self.put_u8(value.into())
    }

    /// Append a big-endian `uint32` field.
    pub fn put_u32(mut self, value: u32) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Append a length-prefixed `string` field.
    pub fn put_cstring(mut self, value: impl AsRef<[u8]>) -> Self {
        let value = value.as_ref();

        self.buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
        self.buf.extend_from_slice(value);
        self
    }

    /// Finalize into the raw payload.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// A cursor decoding the fields of a single message payload.
#[derive(Debug)]
pub struct PacketReader<'p> {
    buf: &'p [u8],
    pos: usize,
}

impl<'p> PacketReader<'p> {
    /// Wrap a raw payload, which must at least carry a message number.
    pub fn new(payload: &'p [u8]) -> Result<Self> {
        if payload.is_empty() {
            return Err(Error::Malformed("empty payload"));
        }

        Ok(Self {
            buf: payload,
            pos: 1,
        })
    }

    /// The message number of the payload.
    pub fn message_id(&self) -> u8 {
        self.buf[0]
    }

    fn take(&mut self, len: usize) -> Result<&'p [u8]> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + len)
            .ok_or(Error::Malformed("truncated field"))?;

        self.pos += len;

        Ok(bytes)
    }

    /// Decode a raw byte.
    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Decode a `boolean` field, any non-zero byte reading as `true`.
    pub fn get_bool(&mut self) -> Result<bool> {
        Ok(self.get_u8()? != 0)
    }

    /// Decode a big-endian `uint32` field.
    pub fn get_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;

        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Decode a length-prefixed `string` field.
    pub fn get_cstring(&mut self) -> Result<&'p [u8]> {
        let len = self.get_u32()? as usize;

        self.take(len)
    }

    /// Decode a length-prefixed `string` field that must be valid UTF-8.
    pub fn get_utf8(&mut self) -> Result<&'p str> {
        std::str::from_utf8(self.get_cstring()?).map_err(|_| Error::Malformed("non UTF-8 string"))
    }

    /// Assert that the payload has been fully consumed.
    pub fn get_end(&self) -> Result<()> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(Error::Malformed("trailing bytes after the last field"))
        }
    }

    /// Bytes left to decode.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

/// The `SSH_MSG_SERVICE_REQUEST` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRequest {
    /// Name of the requested service.
    pub service_name: String,
}

impl ServiceRequest {
    /// Encode the message into a raw payload.
    pub fn encode(&self) -> Vec<u8> {
        PacketBuilder::start(msg::SERVICE_REQUEST)
            .put_cstring(&self.service_name)
            .finish()
    }

    /// Decode the message fields from a positioned reader.
    pub fn decode(reader: &mut PacketReader<'_>) -> Result<Self> {
        let service_name = reader.get_utf8()?.into();
        reader.get_end()?;

        Ok(Self { service_name })
    }
}

/// The `SSH_MSG_SERVICE_ACCEPT` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccept {
    /// Name of the accepted service.
    pub service_name: String,
}

impl ServiceAccept {
    /// Encode the message into a raw payload.
    pub fn encode(&self) -> Vec<u8> {
        PacketBuilder::start(msg::SERVICE_ACCEPT)
            .put_cstring(&self.service_name)
            .finish()
    }

    /// Decode the message fields from a positioned reader.
    pub fn decode(reader: &mut PacketReader<'_>) -> Result<Self> {
        let service_name = reader.get_utf8()?.into();
        reader.get_end()?;

        Ok(Self { service_name })
    }
}

/// The `SSH_MSG_USERAUTH_BANNER` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    /// Banner text to display before authentication.
    pub message: String,

    /// Language tag, unused in practice.
    pub language: String,
}

impl Banner {
    /// Encode the message into a raw payload.
    pub fn encode(&self) -> Vec<u8> {
        PacketBuilder::start(msg::USERAUTH_BANNER)
            .put_cstring(&self.message)
            .put_cstring(&self.language)
            .finish()
    }

    /// Decode the message fields from a positioned reader.
    pub fn decode(reader: &mut PacketReader<'_>) -> Result<Self> {
        let message = reader.get_utf8()?.into();
        let language = reader.get_utf8()?.into();
        reader.get_end()?;

        Ok(Self { message, language })
    }
}

/// The fixed head of a `SSH_MSG_USERAUTH_REQUEST` message.
///
/// Method-specific fields follow in the reader and are left to the
/// method implementation to consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    /// User name, possibly suffixed with a `:style`.
    pub username: String,

    /// Name of the service to start after authentication.
    pub service_name: String,

    /// Name of the authentication method attempted.
    pub method: String,
}

impl AuthRequest {
    /// Encode the fixed head of the message into a builder, for the caller
    /// to append the method-specific fields.
    pub fn encode_head(&self) -> PacketBuilder {
        PacketBuilder::start(msg::USERAUTH_REQUEST)
            .put_cstring(&self.username)
            .put_cstring(&self.service_name)
            .put_cstring(&self.method)
    }

    /// Decode the fixed head, leaving the method-specific fields in the reader.
    pub fn decode(reader: &mut PacketReader<'_>) -> Result<Self> {
        Ok(Self {
            username: reader.get_utf8()?.into(),
            service_name: reader.get_utf8()?.into(),
            method: reader.get_utf8()?.into(),
        })
    }
}

/// The `SSH_MSG_USERAUTH_SUCCESS` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthSuccess;

impl AuthSuccess {
    /// Encode the message into a raw payload.
    pub fn encode(&self) -> Vec<u8> {
        PacketBuilder::start(msg::USERAUTH_SUCCESS).finish()
    }

    /// Decode the message fields from a positioned reader.
    pub fn decode(reader: &mut PacketReader<'_>) -> Result<Self> {
        reader.get_end()?;

        Ok(Self)
    }
}

/// The `SSH_MSG_USERAUTH_FAILURE` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    /// Comma-separated list of the methods able to continue the exchange.
    pub continue_with: String,

    /// Whether the attempted method succeeded as a step of a longer sequence.
    pub partial_success: bool,
}

impl AuthFailure {
    /// Encode the message into a raw payload.
    pub fn encode(&self) -> Vec<u8> {
        PacketBuilder::start(msg::USERAUTH_FAILURE)
            .put_cstring(&self.continue_with)
            .put_bool(self.partial_success)
            .finish()
    }

    /// Decode the message fields from a positioned reader.
    pub fn decode(reader: &mut PacketReader<'_>) -> Result<Self> {
        let continue_with = reader.get_utf8()?.into();
        let partial_success = reader.get_bool()?;
        reader.get_end()?;

        Ok(Self {
            continue_with,
            partial_success,
        })
    }
}

/// The `SSH_MSG_DISCONNECT` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    /// Reason for disconnect.
    pub reason: DisconnectReason,

    /// Human-readable description of the reason.
    pub description: String,
}

impl Disconnect {
    /// Encode the message into a raw payload.
    pub fn encode(&self) -> Vec<u8> {
        PacketBuilder::start(msg::DISCONNECT)
            .put_u32(self.reason.to_u32())
            .put_cstring(&self.description)
            .put_cstring("")
            .finish()
    }

    /// Decode the message fields from a positioned reader.
    pub fn decode(reader: &mut PacketReader<'_>) -> Result<Self> {
        let reason = DisconnectReason::from_u32(reader.get_u32()?)
            .ok_or(Error::Malformed("unknown disconnect reason"))?;
        let description = reader.get_utf8()?.into();
        let _language = reader.get_cstring()?;
        reader.get_end()?;

        Ok(Self {
            reason,
            description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_a_failure_message() {
        let message = AuthFailure {
            continue_with: "publickey,password".into(),
            partial_success: true,
        };

        let payload = message.encode();
        let mut reader = PacketReader::new(&payload).expect("non-empty payload");

        assert_eq!(reader.message_id(), msg::USERAUTH_FAILURE);
        assert_eq!(
            AuthFailure::decode(&mut reader).expect("well-formed message"),
            message
        );
    }

    #[test]
    fn roundtrips_a_disconnect_message() {
        let message = Disconnect {
            reason: DisconnectReason::ProtocolError,
            description: "Change of username or service not allowed".into(),
        };

        let payload = message.encode();
        let mut reader = PacketReader::new(&payload).expect("non-empty payload");

        assert_eq!(
            Disconnect::decode(&mut reader).expect("well-formed message"),
            message
        );
    }

    #[test]
    fn leaves_method_fields_in_the_reader() {
        let payload = AuthRequest {
            username: "alice".into(),
            service_name: "ssh-connection".into(),
            method: "password".into(),
        }
        .encode_head()
        .put_bool(false)
        .put_cstring("hunter2")
        .finish();

        let mut reader = PacketReader::new(&payload).expect("non-empty payload");
        let head = AuthRequest::decode(&mut reader).expect("well-formed head");

        assert_eq!(head.method, "password");
        assert!(!reader.get_bool().expect("boolean field"));
        assert_eq!(reader.get_utf8().expect("password field"), "hunter2");
        assert!(reader.get_end().is_ok());
    }

    #[test]
    fn rejects_a_truncated_string() {
        let payload = [msg::SERVICE_REQUEST, 0, 0, 0, 12, b'x'];
        let mut reader = PacketReader::new(&payload).expect("non-empty payload");

        assert!(matches!(
            ServiceRequest::decode(&mut reader),
            Err(Error::Malformed(_))
        ));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let payload = PacketBuilder::start(msg::USERAUTH_SUCCESS)
            .put_u8(0xff)
            .finish();
        let mut reader = PacketReader::new(&payload).expect("non-empty payload");

        assert!(matches!(
            AuthSuccess::decode(&mut reader),
            Err(Error::Malformed(_))
        ));
    }
}
