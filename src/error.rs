use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the stack. All of these are values; none of the
/// library entry points panic on malformed input.
#[derive(Debug)]
pub enum Error {
    /// Header parse failed: length below 20, version other than 1, or an
    /// AVP overrunning the message boundary. The affected peer must be
    /// disconnected.
    MalformedMessage(String),
    /// An AVP payload could not be parsed; carries the AVP code.
    MalformedAvp(u32),
    /// A typed accessor was used on a payload of a different type.
    TypeMismatch {
        code: u32,
        requested: &'static str,
        stored: &'static str,
    },
    /// Capabilities exchange was rejected or incomplete.
    CapabilitiesFailure(String),
    /// The identity is already registered in the realm.
    DuplicateIdentity(String),
    /// Dictionary XML could not be loaded; names the offending element.
    DictionaryError(String),
    DecodeError(String),
    EncodeError(String),
    IoError(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::MalformedMessage(msg) => write!(f, "malformed message: {}", msg),
            Error::MalformedAvp(code) => write!(f, "malformed AVP {}", code),
            Error::TypeMismatch {
                code,
                requested,
                stored,
            } => write!(
                f,
                "AVP {} holds {} but {} was requested",
                code, stored, requested
            ),
            Error::CapabilitiesFailure(msg) => write!(f, "capabilities exchange failed: {}", msg),
            Error::DuplicateIdentity(identity) => {
                write!(f, "identity {} already registered", identity)
            }
            Error::DictionaryError(msg) => write!(f, "dictionary error: {}", msg),
            Error::DecodeError(msg) => write!(f, "{}", msg),
            Error::EncodeError(msg) => write!(f, "{}", msg),
            Error::IoError(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<std::array::TryFromSliceError> for Error {
    fn from(err: std::array::TryFromSliceError) -> Error {
        Error::DecodeError(err.to_string())
    }
}
