use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

pub type StdErrorBoxed = Box<dyn std::error::Error + Send + Sync + 'static>;

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    pub fn invalid_format(element: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidFormat {
                element: element.into(),
                message: message.into(),
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

    pub fn duplicate_field(path: impl Into<String>) -> Error {
        Error(ErrorKind::DuplicateField { path: path.into() }.into())
    }

    pub fn layout_inconsistency(path: impl Into<String>) -> Error {
        Error(ErrorKind::LayoutInconsistency { path: path.into() }.into())
    }

    pub fn resource(operation: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::Resource {
                operation: operation.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn source_read<E>(table: impl Into<String>, record: usize, source: E) -> Error
    where
        E: Into<StdErrorBoxed>,
    {
        Error(
            ErrorKind::SourceRead {
                table: table.into(),
                record,
                source: source.into(),
            }
            .into(),
        )
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Io {
                context: context.into(),
                source,
            }
            .into(),
        )
    }

    /// Returns `true` if the error was raised while reading a record from the input.
    pub fn is_source_read(&self) -> bool {
        matches!(self.kind(), ErrorKind::SourceRead { .. })
    }

    /// Returns `true` if the error originates from an output resource operation.
    pub fn is_resource(&self) -> bool {
        matches!(self.kind(), ErrorKind::Resource { .. })
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error("invalid format for '{element}': {message}")]
    InvalidFormat { element: String, message: String },

    #[error("duplicate field '{path}'")]
    DuplicateField { path: String },

    #[error("layout has no entry for '{path}'")]
    LayoutInconsistency { path: String },

    #[error("output operation '{operation}' failed: {message}")]
    Resource { operation: String, message: String },

    #[error("failed to load record {record} of table '{table}': {source}")]
    SourceRead {
        table: String,
        record: usize,
        source: StdErrorBoxed,
    },

    #[error("IO error for '{context}': {source}'")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io("", e)
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(_: std::convert::Infallible) -> Self {
        Error::invalid_operation("conversion")
    }
}
