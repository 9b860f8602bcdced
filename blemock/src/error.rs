//! Error types for this crate.

use std::fmt::Display;

use btuuid::BluetoothUuid;

/// A convenience type alias for a `Result` with an `Error` type.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur while using a mock device or connection.
#[derive(Debug, Clone)]
pub struct Error {
    data: ErrorData,
}

/// The kind of error that occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    /// A connection to the device is already established.
    AlreadyConnected,
    /// The mock was not configured with the requested value or behavior.
    NotConfigured,
    /// No service with the requested UUID exists.
    ServiceNotFound,
    /// No characteristic with the requested UUID exists.
    CharacteristicNotFound,
    /// No descriptor with the requested UUID exists.
    DescriptorNotFound,
    /// A simulated GATT server error.
    Att(AttError),
    /// An advertisement payload could not be parsed.
    MalformedAdvertisement,
}

/// An ATT protocol error code, as defined in the Bluetooth Core Specification Vol 3, Part F §3.4.1.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttError(pub u8);

impl AttError {
    pub const INVALID_HANDLE: Self = Self(0x01);
    pub const READ_NOT_PERMITTED: Self = Self(0x02);
    pub const WRITE_NOT_PERMITTED: Self = Self(0x03);
    pub const INVALID_PDU: Self = Self(0x04);
    pub const INSUFFICIENT_AUTHENTICATION: Self = Self(0x05);
    pub const REQUEST_NOT_SUPPORTED: Self = Self(0x06);
    pub const INVALID_OFFSET: Self = Self(0x07);
    pub const INSUFFICIENT_AUTHORIZATION: Self = Self(0x08);
    pub const PREPARE_QUEUE_FULL: Self = Self(0x09);
    pub const ATTRIBUTE_NOT_FOUND: Self = Self(0x0a);
    pub const ATTRIBUTE_NOT_LONG: Self = Self(0x0b);
    pub const INSUFFICIENT_ENCRYPTION_KEY_SIZE: Self = Self(0x0c);
    pub const INVALID_ATTRIBUTE_VALUE_LENGTH: Self = Self(0x0d);
    pub const UNLIKELY_ERROR: Self = Self(0x0e);
    pub const INSUFFICIENT_ENCRYPTION: Self = Self(0x0f);
    pub const UNSUPPORTED_GROUP_TYPE: Self = Self(0x10);
    pub const INSUFFICIENT_RESOURCES: Self = Self(0x11);
}

#[derive(Debug, Clone)]
enum ErrorData {
    Simple(ErrorKind),
    Device(ErrorKind, String),
    Attribute(ErrorKind, BluetoothUuid),
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.data {
            ErrorData::Simple(kind) => kind.fmt(f),
            ErrorData::Device(kind, address) => write!(f, "{kind} ({address})"),
            ErrorData::Attribute(kind, uuid) => write!(f, "{kind} ({uuid})"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            data: ErrorData::Simple(kind),
        }
    }
}

impl From<AttError> for Error {
    fn from(error: AttError) -> Self {
        ErrorKind::Att(error).into()
    }
}

impl Error {
    /// Creates an error relating to the device with the given address.
    pub fn with_address(kind: ErrorKind, address: impl Into<String>) -> Self {
        Error {
            data: ErrorData::Device(kind, address.into()),
        }
    }

    /// Creates an error relating to the GATT attribute with the given UUID.
    pub fn with_uuid(kind: ErrorKind, uuid: BluetoothUuid) -> Self {
        Error {
            data: ErrorData::Attribute(kind, uuid),
        }
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> ErrorKind {
        match &self.data {
            ErrorData::Simple(kind)
            | ErrorData::Device(kind, _)
            | ErrorData::Attribute(kind, _) => *kind,
        }
    }

    /// The address of the device this error relates to, if any.
    pub fn address(&self) -> Option<&str> {
        match &self.data {
            ErrorData::Device(_, address) => Some(address),
            _ => None,
        }
    }

    /// The UUID of the attribute this error relates to, if any.
    pub fn uuid(&self) -> Option<&BluetoothUuid> {
        match &self.data {
            ErrorData::Attribute(_, uuid) => Some(uuid),
            _ => None,
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::AlreadyConnected => f.write_str("already connected"),
            ErrorKind::NotConfigured => f.write_str("mock not configured"),
            ErrorKind::ServiceNotFound => f.write_str("service not found"),
            ErrorKind::CharacteristicNotFound => f.write_str("characteristic not found"),
            ErrorKind::DescriptorNotFound => f.write_str("descriptor not found"),
            ErrorKind::Att(att_error) => att_error.fmt(f),
            ErrorKind::MalformedAdvertisement => f.write_str("malformed advertisement data"),
        }
    }
}

impl Display for AttError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            AttError::INVALID_HANDLE => f.write_str("invalid handle"),
            AttError::READ_NOT_PERMITTED => f.write_str("read not permitted"),
            AttError::WRITE_NOT_PERMITTED => f.write_str("write not permitted"),
            AttError::INVALID_PDU => f.write_str("invalid PDU"),
            AttError::INSUFFICIENT_AUTHENTICATION => f.write_str("insufficient authentication"),
            AttError::REQUEST_NOT_SUPPORTED => f.write_str("request not supported"),
            AttError::INVALID_OFFSET => f.write_str("invalid offset"),
            AttError::INSUFFICIENT_AUTHORIZATION => f.write_str("insufficient authorization"),
            AttError::PREPARE_QUEUE_FULL => f.write_str("prepare queue full"),
            AttError::ATTRIBUTE_NOT_FOUND => f.write_str("attribute not found"),
            AttError::ATTRIBUTE_NOT_LONG => f.write_str("attribute not long"),
            AttError::INSUFFICIENT_ENCRYPTION_KEY_SIZE => {
                f.write_str("insufficient encryption key size")
            }
            AttError::INVALID_ATTRIBUTE_VALUE_LENGTH => {
                f.write_str("invalid attribute value length")
            }
            AttError::UNLIKELY_ERROR => f.write_str("unlikely error"),
            AttError::INSUFFICIENT_ENCRYPTION => f.write_str("insufficient encryption"),
            AttError::UNSUPPORTED_GROUP_TYPE => f.write_str("unsupported group type"),
            AttError::INSUFFICIENT_RESOURCES => f.write_str("insufficient resources"),
            _ => write!(f, "unknown ATT error ({:#04x})", self.0),
        }
    }
}
