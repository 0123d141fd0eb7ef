//! The interface to the object file tool used for local symbolization.
//!
//! Parsing binaries and their debug information is not the business of
//! this crate. Instead, the [`LocalSymbolizer`][crate::local::LocalSymbolizer]
//! consumes an [`ObjTool`] from which it opens mapped binaries.

use crate::Addr;
use crate::Error;
use crate::Result;


/// A single source level frame an address resolves to.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Frame {
    /// The (raw) name of the function.
    pub func: String,
    /// The source file the function is defined in.
    pub file: String,
    /// The line number, or zero if not known.
    pub line: u32,
    /// The column number, or zero if not known.
    pub column: u32,
}


/// The parameters for opening a mapped binary.
#[derive(Clone, Debug)]
pub struct OpenRequest<'req> {
    /// The path of the binary.
    pub file: &'req str,
    /// The address at which the binary's mapping starts.
    pub start: Addr,
    /// The address one past the mapping's end.
    pub limit: Addr,
    /// The file offset corresponding to `start`.
    pub offset: u64,
    /// The kernel relocation symbol, if any.
    pub relocation_symbol: &'req str,
    /// Whether to favor speed over line level detail.
    ///
    /// Tools are free to report frames without file, line, or column
    /// information when set.
    pub fast: bool,
}


/// A tool for opening binaries.
pub trait ObjTool {
    /// Open the binary described by `req`.
    fn open(&self, req: &OpenRequest<'_>) -> Result<Box<dyn ObjFile>>;
}

impl<T> ObjTool for &T
where
    T: ObjTool + ?Sized,
{
    fn open(&self, req: &OpenRequest<'_>) -> Result<Box<dyn ObjFile>> {
        (**self).open(req)
    }
}


/// An opened binary.
pub trait ObjFile {
    /// The name of the binary.
    fn name(&self) -> &str;

    /// The build ID of the binary, or an empty string if it has none.
    fn build_id(&self) -> &str;

    /// Translate a runtime address into the binary's address space.
    fn obj_addr(&self, addr: Addr) -> Result<Addr>;

    /// Report the frames at the given (binary relative) address.
    ///
    /// Frames are reported innermost first; more than one frame means
    /// that calls were inlined.
    fn source_line(&self, addr: Addr) -> Result<Vec<Frame>>;
}


/// An [`ObjTool`] that cannot open anything.
///
/// This is the tool used when none was configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoObjTool;

impl ObjTool for NoObjTool {
    fn open(&self, req: &OpenRequest<'_>) -> Result<Box<dyn ObjFile>> {
        Err(Error::with_unsupported(format!(
            "no object file tool configured to open `{}`",
            req.file
        )))
    }
}
