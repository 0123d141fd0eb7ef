use std::borrow::Cow;
use std::error;
use std::error::Error as StdError;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::io;


mod private {
    pub trait Sealed {}

    impl<T> Sealed for Option<T> {}
    impl<T, E> Sealed for Result<T, E> {}
}


/// An enum providing a rough classification of errors.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An entity was not found, often a file.
    NotFound,
    /// A parameter was incorrect.
    InvalidInput,
    /// Data not valid for the operation were encountered.
    InvalidData,
    /// This operation is unsupported.
    Unsupported,
    /// A custom error that does not fall under any other error kind.
    Other,
}

impl ErrorKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "entity not found",
            Self::InvalidInput => "invalid input parameter",
            Self::InvalidData => "invalid data",
            Self::Unsupported => "unsupported",
            Self::Other => "other error",
        }
    }
}

impl From<io::ErrorKind> for ErrorKind {
    fn from(other: io::ErrorKind) -> Self {
        match other {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::InvalidInput => Self::InvalidInput,
            io::ErrorKind::InvalidData => Self::InvalidData,
            io::ErrorKind::Unsupported => Self::Unsupported,
            _ => Self::Other,
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}


enum ErrorImpl {
    Basic {
        kind: ErrorKind,
        message: Cow<'static, str>,
    },
    Io(io::Error),
    Context {
        context: Cow<'static, str>,
        source: Box<ErrorImpl>,
    },
}

impl ErrorImpl {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Basic { kind, .. } => *kind,
            Self::Io(error) => ErrorKind::from(error.kind()),
            Self::Context { source, .. } => source.kind(),
        }
    }
}

impl Debug for ErrorImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Basic { kind, message } => f
                .debug_struct("Basic")
                .field("kind", kind)
                .field("message", message)
                .finish(),
            Self::Io(error) => f.debug_tuple("Io").field(error).finish(),
            Self::Context { context, source } => f
                .debug_struct("Context")
                .field("context", context)
                .field("source", source)
                .finish(),
        }
    }
}

impl Display for ErrorImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Basic { message, .. } => f.write_str(message),
            Self::Io(error) => Display::fmt(error, f),
            Self::Context { context, source } => write!(f, "{context}: {source}"),
        }
    }
}


/// The error type used by the library.
///
/// Errors carry a rough [`ErrorKind`] classification and a chain of
/// human readable context, rendered as `outer: inner: cause`.
pub struct Error {
    error: Box<ErrorImpl>,
}

impl Error {
    fn with_message<M>(kind: ErrorKind, message: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        Self {
            error: Box::new(ErrorImpl::Basic {
                kind,
                message: message.into(),
            }),
        }
    }

    #[doc(hidden)]
    pub fn with_not_found<M>(message: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        Self::with_message(ErrorKind::NotFound, message)
    }

    #[doc(hidden)]
    pub fn with_invalid_input<M>(message: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        Self::with_message(ErrorKind::InvalidInput, message)
    }

    #[doc(hidden)]
    pub fn with_invalid_data<M>(message: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        Self::with_message(ErrorKind::InvalidData, message)
    }

    #[doc(hidden)]
    pub fn with_unsupported<M>(message: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        Self::with_message(ErrorKind::Unsupported, message)
    }

    #[doc(hidden)]
    pub fn with_other<M>(message: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        Self::with_message(ErrorKind::Other, message)
    }

    /// Retrieve a rough error classification in the form of an
    /// [`ErrorKind`].
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    fn layer_context<C>(self, context: C) -> Self
    where
        C: Into<Cow<'static, str>>,
    {
        Self {
            error: Box::new(ErrorImpl::Context {
                context: context.into(),
                source: self.error,
            }),
        }
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if f.alternate() {
            Debug::fmt(&self.error, f)
        } else {
            write!(f, "Error: {}", self.error)
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self.error, f)
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &*self.error {
            ErrorImpl::Io(error) => error.source(),
            ErrorImpl::Basic { .. } | ErrorImpl::Context { .. } => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(other: io::Error) -> Self {
        Self {
            error: Box::new(ErrorImpl::Io(other)),
        }
    }
}


/// A trait providing ergonomic chaining capabilities to [`Error`].
pub trait ErrorExt: private::Sealed {
    /// The output type produced by [`context`](Self::context) and
    /// [`with_context`](Self::with_context).
    type Output;

    /// Add context to this error.
    fn context<C>(self, context: C) -> Self::Output
    where
        C: Into<Cow<'static, str>>;

    /// Add context to this error, using a closure for lazy evaluation.
    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C;
}

impl<T, E> ErrorExt for Result<T, E>
where
    E: Into<Error>,
{
    type Output = Result<T, Error>;

    fn context<C>(self, context: C) -> Self::Output
    where
        C: Into<Cow<'static, str>>,
    {
        self.map_err(|err| err.into().layer_context(context))
    }

    fn with_context<C, F>(self, f: F) -> Self::Output
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C,
    {
        self.map_err(|err| err.into().layer_context(f()))
    }
}


/// A trait providing conversion shortcuts for creating `Error`
/// instances.
pub trait IntoError<T>: private::Sealed
where
    Self: Sized,
{
    /// Convert into an [`ErrorKind::InvalidInput`] error.
    fn ok_or_invalid_input<C, F>(self, f: F) -> Result<T, Error>
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C;

    /// Convert into an [`ErrorKind::InvalidData`] error.
    fn ok_or_invalid_data<C, F>(self, f: F) -> Result<T, Error>
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C;
}

impl<T> IntoError<T> for Option<T> {
    #[inline]
    fn ok_or_invalid_input<C, F>(self, f: F) -> Result<T, Error>
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::with_invalid_input(f()))
    }

    #[inline]
    fn ok_or_invalid_data<C, F>(self, f: F) -> Result<T, Error>
    where
        C: Into<Cow<'static, str>>,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::with_invalid_data(f()))
    }
}
