//! Error kinds surfaced by the core, with a POSIX errno mapping for callers
//! that bridge into C-style return codes.

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WarpcoreError>;

/// Errors the core can return to a caller.
///
/// Malformed or unmatched receive-path packets are never reported through
/// this type: they are dropped (optionally logged) per the error handling
/// policy. `WarpcoreError` covers conditions a caller can act on.
#[derive(Debug, thiserror::Error)]
pub enum WarpcoreError {
    /// Interface name not found, or no usable address after the retry budget
    /// in [`crate::engine::Engine::init`] was exhausted.
    #[error("no such interface")]
    NoSuchInterface,

    /// The buffer pool or socket table has no free slots.
    #[error("resource exhausted")]
    ResourceExhausted,

    /// A socket with this four-tuple is already registered.
    #[error("address in use")]
    AddressInUse,

    /// `connect` was attempted with a peer address family the socket does
    /// not support.
    #[error("unsupported address family")]
    UnsupportedFamily,

    /// A received packet's checksum did not match.
    #[error("invalid checksum")]
    ChecksumInvalid,

    /// A received packet failed structural validation (bad length, version,
    /// fragment, or option field).
    #[error("malformed packet")]
    MalformedPacket,

    /// The requested payload does not fit within one packet's worth of
    /// remaining capacity.
    #[error("invalid argument")]
    InvalidArgument,

    /// No socket is listening on the packet's destination port.
    #[error("no matching socket")]
    NoSuchSocket,
}

impl WarpcoreError {
    /// Map this error onto a negative POSIX errno value, for callers
    /// bridging into a C-style return-code API.
    pub const fn to_errno(&self) -> i32 {
        match self {
            Self::NoSuchInterface => -6,    // ENXIO
            Self::ResourceExhausted => -105, // ENOBUFS
            Self::AddressInUse => -98,      // EADDRINUSE
            Self::UnsupportedFamily => -97, // EAFNOSUPPORT
            Self::ChecksumInvalid | Self::MalformedPacket => -71, // EPROTO
            Self::InvalidArgument => -22,   // EINVAL
            Self::NoSuchSocket => -89,      // EDESTADDRREQ
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping_is_stable() {
        assert_eq!(WarpcoreError::AddressInUse.to_errno(), -98);
        assert_eq!(WarpcoreError::ResourceExhausted.to_errno(), -105);
    }
}
