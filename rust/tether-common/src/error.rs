use thiserror::Error;

/// Error type shared by all `tether` crates.
///
/// The payload is boxed to keep `Result<T>` a single pointer wide on the
/// success path.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    /// An access went through a handle that is (or has become) null.
    pub fn null_deref(context: impl Into<String>) -> Error {
        Error(
            ErrorKind::NullDereference {
                context: context.into(),
            }
            .into(),
        )
    }

    /// A derived address fell outside the allocation it was projected from.
    pub fn out_of_range(context: impl Into<String>) -> Error {
        Error(
            ErrorKind::OutOfRange {
                context: context.into(),
            }
            .into(),
        )
    }

    pub fn allocation(context: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Allocation {
                context: context.into(),
                source,
            }
            .into(),
        )
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("null handle dereference: {context}")]
    NullDereference { context: String },

    #[error("derived pointer is outside its source allocation: {context}")]
    OutOfRange { context: String },

    #[error("block allocation failed for '{context}': {source}")]
    Allocation {
        context: String,
        source: std::io::Error,
    },

    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}
