//! **profsym** is a library for symbolizing execution profiles.
//!
//! Profiles record raw instruction addresses. This crate turns them
//! into readable source locations (function, file, line, column) by
//! consulting binaries on disk, a remote symbol service, or both, and it
//! cleans up compiler-mangled symbol names for display.
//!
//! The main entry point is [`Symbolizer`], which interprets a
//! colon-separated mode directive such as `local:demangle=full` and runs
//! the requested stages over a [`Profile`]:
//! ```no_run
//! use profsym::obj::Frame;
//! use profsym::obj::ObjFile;
//! use profsym::obj::ObjTool;
//! use profsym::obj::OpenRequest;
//! use profsym::remote::MappingSources;
//! use profsym::Addr;
//! use profsym::Profile;
//! use profsym::Result;
//! use profsym::Symbolizer;
//!
//! # #[derive(Debug)]
//! # struct MyObjTool;
//! # impl ObjTool for MyObjTool {
//! #     fn open(&self, _req: &OpenRequest<'_>) -> Result<Box<dyn ObjFile>> { unimplemented!() }
//! # }
//! # fn load_profile() -> Profile { Profile::default() }
//! let symbolizer = Symbolizer::builder()
//!     .set_obj_tool(MyObjTool)
//!     .build();
//!
//! let mut profile = load_profile();
//! let () = symbolizer
//!     .symbolize("local:demangle=templates", &MappingSources::new(), &mut profile)
//!     .unwrap();
//! ```

#![allow(clippy::let_and_return, clippy::let_unit_value)]

mod diag;
pub mod demangle;
mod error;
pub mod local;
mod mode;
pub mod obj;
mod profile;
pub mod remote;
mod symbolizer;

pub use crate::diag::CollectDiagnostics;
pub use crate::diag::Diagnostics;
pub use crate::diag::LogDiagnostics;
pub use crate::error::Error;
pub use crate::error::ErrorExt;
pub use crate::error::ErrorKind;
pub use crate::error::IntoError;
pub use crate::mode::Mode;
pub use crate::profile::Function;
pub use crate::profile::FunctionId;
pub use crate::profile::Line;
pub use crate::profile::Location;
pub use crate::profile::Mapping;
pub use crate::profile::MappingId;
pub use crate::profile::Profile;
pub use crate::symbolizer::Builder;
pub use crate::symbolizer::DemangleProfile;
pub use crate::symbolizer::SymbolizeLocal;
pub use crate::symbolizer::SymbolizeRemote;
pub use crate::symbolizer::Symbolizer;


/// A type representing addresses.
pub type Addr = u64;

/// A result type using our [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;


#[cfg(feature = "tracing")]
#[macro_use]
#[allow(unused_imports)]
mod log {
    pub(crate) use tracing::debug;
    pub(crate) use tracing::error;
    pub(crate) use tracing::info;
    pub(crate) use tracing::instrument;
    pub(crate) use tracing::trace;
    pub(crate) use tracing::warn;
}

#[cfg(not(feature = "tracing"))]
#[macro_use]
#[allow(unused_imports)]
mod log {
    macro_rules! debug {
        ($($args:tt)*) => {{
          if false {
            // Make sure to use `args` to prevent any warnings about
            // unused variables.
            let _args = format_args!($($args)*);
          }
        }};
    }
    pub(crate) use debug;
    pub(crate) use debug as error;
    pub(crate) use debug as info;
    pub(crate) use debug as trace;
    pub(crate) use debug as warn;
}
