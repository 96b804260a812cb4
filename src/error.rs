//! Error types for the codec, validator, and TLV parser.

/// Detail attached to a validation failure: which field, which rule, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: u8,
    pub rule: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "validation failed for field {} ({}): {}",
            self.field, self.rule, self.message
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid MTI")]
    InvalidMti,
    #[error("invalid bitmap")]
    InvalidBitmap,
    #[error("invalid bitmap hex")]
    InvalidBitmapHex,
    #[error("invalid length")]
    InvalidLength,
    #[error("insufficient data")]
    InsufficientData,
    #[error("buffer too small")]
    BufferTooSmall,
    #[error("field not found")]
    FieldNotFound,
    #[error("field {0} not configured")]
    FieldNotConfigured(u8),
    #[error("unsupported length type")]
    UnsupportedLengthType,
    #[error("invalid TLV data")]
    InvalidTlv,
    #[error("invalid header")]
    InvalidHeader,
    #[error("missing mandatory field {0}")]
    MissingMandatoryField(u8),
    #[error("{0}")]
    Validation(ValidationError),
    /// A decode/encode error scoped to a single data element.
    #[error("field {field}: {source}")]
    Field {
        field: u8,
        #[source]
        source: Box<Error>,
    },
    /// Schema-load problem: malformed packager description, bad regex, etc.
    #[error("invalid packager config: {0}")]
    Config(String),
    /// Work skipped because cancellation was requested before it started.
    #[error("cancelled before processing")]
    Cancelled,
}

impl Error {
    /// Wrap an error with the data element number it occurred on.
    /// Errors that already carry a field number are left untouched.
    pub(crate) fn for_field(self, field: u8) -> Error {
        match self {
            Error::Field { .. } | Error::FieldNotConfigured(_) | Error::Validation(_) => self,
            other => Error::Field {
                field,
                source: Box::new(other),
            },
        }
    }

    /// The field number this error is scoped to, if any.
    pub fn field(&self) -> Option<u8> {
        match self {
            Error::Field { field, .. } => Some(*field),
            Error::FieldNotConfigured(n) | Error::MissingMandatoryField(n) => Some(*n),
            Error::Validation(v) => Some(v.field),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
