//! Symbolization of addresses using binaries available on the local
//! system.

use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;

use crate::log::debug;
use crate::log::trace;
use crate::obj::Frame;
use crate::obj::ObjFile;
use crate::obj::ObjTool;
use crate::obj::OpenRequest;
use crate::profile::FunctionTable;
use crate::symbolizer::SymbolizeLocal;
use crate::Addr;
use crate::Diagnostics;
use crate::Line;
use crate::Mapping;
use crate::MappingId;
use crate::Profile;
use crate::Result;


const MISSING_BINARIES: &str = "Some binary filenames not available. Symbolization may be incomplete.\n\
Try setting PPROF_BINARY_PATH to the search path for local binaries.";


/// The outcome of symbolizing a single mapping.
enum Outcome {
    /// The mapping was symbolized (possibly only partially).
    Symbolized,
    /// The mapping was skipped for a benign reason.
    Skipped,
    /// The mapping's binary could not be found or opened.
    MissingBinary,
}


/// Resolve addresses by inspecting the binaries backing mappings.
pub struct LocalSymbolizer<O> {
    obj: O,
}

impl<O> LocalSymbolizer<O>
where
    O: ObjTool,
{
    /// Create a new [`LocalSymbolizer`] opening binaries using `obj`.
    pub fn new(obj: O) -> Self {
        Self { obj }
    }

    /// Symbolize locations of `profile` in place.
    ///
    /// Unless `force` is set, only locations without any lines are
    /// considered. Problems with individual mappings are reported to
    /// `diag` and do not affect other mappings.
    pub fn symbolize(
        &self,
        profile: &mut Profile,
        fast: bool,
        force: bool,
        diag: &dyn Diagnostics,
    ) -> Result<()> {
        let mut pending = profile.pending_locations(force);
        let mut functions = FunctionTable::new(&profile.functions);
        let mut missing_binaries = false;

        for idx in 0..profile.mappings.len() {
            let mapping_id = MappingId(idx);
            let Some(locs) = pending.remove(&mapping_id) else {
                continue
            };

            let outcome = self.symbolize_mapping(
                profile,
                mapping_id,
                &locs,
                fast,
                &mut functions,
                diag,
            );
            if let Outcome::MissingBinary = outcome {
                missing_binaries = true;
            }
        }

        if missing_binaries {
            let () = diag.print_err(MISSING_BINARIES);
        }
        Ok(())
    }

    fn open(&self, mapping: &Mapping, fast: bool) -> Result<Box<dyn ObjFile>> {
        let req = OpenRequest {
            file: &mapping.file,
            start: mapping.start,
            limit: mapping.limit,
            offset: mapping.offset,
            relocation_symbol: &mapping.kernel_relocation_symbol,
            fast,
        };
        self.obj.open(&req)
    }

    fn symbolize_mapping(
        &self,
        profile: &mut Profile,
        mapping_id: MappingId,
        locs: &[usize],
        fast: bool,
        functions: &mut FunctionTable,
        diag: &dyn Diagnostics,
    ) -> Outcome {
        let Profile {
            mappings,
            locations,
            functions: function_list,
            ..
        } = profile;
        let mapping = &mappings[mapping_id.0];

        if mapping.file.is_empty() {
            if mapping_id.0 == 0 {
                let () = diag.print_err("Main binary filename not available.");
                return Outcome::Skipped
            }
            return Outcome::MissingBinary
        }

        if mapping.is_unsymbolizable() || mapping.is_url() {
            debug!("skipping mapping `{}`: not a local binary", mapping.file);
            return Outcome::Skipped
        }

        let name = mapping.display_name();
        let obj = match self.open(mapping, fast) {
            Ok(obj) => obj,
            Err(err) => {
                let () = diag.print_err(&format!("Local symbolization failed for {name}: {err}"));
                return Outcome::MissingBinary
            }
        };

        let build_id = obj.build_id();
        if !mapping.build_id.is_empty() && !build_id.is_empty() && build_id != mapping.build_id {
            let () = diag.print_err(&format!(
                "Local symbolization failed for {name}: build ID mismatch"
            ));
            return Outcome::Skipped
        }

        debug!(
            "symbolizing {} locations of mapping `{}` using `{}`",
            locs.len(),
            mapping.file,
            obj.name()
        );

        for &idx in locs {
            let loc = &mut locations[idx];
            let frames = match resolve(&*obj, loc.address) {
                Ok(frames) if !frames.is_empty() => frames,
                Ok(_) => {
                    trace!("no frames for address {:#x}", loc.address);
                    continue
                }
                Err(err) => {
                    trace!("failed to resolve address {:#x}: {err}", loc.address);
                    continue
                }
            };

            loc.lines = frames
                .iter()
                .map(|frame| Line {
                    function: functions.intern(function_list, &frame.func, &frame.file),
                    line: i64::from(frame.line),
                    column: i64::from(frame.column),
                })
                .collect();
        }
        Outcome::Symbolized
    }
}

fn resolve(obj: &dyn ObjFile, addr: Addr) -> Result<Vec<Frame>> {
    let obj_addr = obj.obj_addr(addr)?;
    obj.source_line(obj_addr)
}

impl<O> SymbolizeLocal for LocalSymbolizer<O>
where
    O: ObjTool,
{
    fn symbolize_local(
        &self,
        profile: &mut Profile,
        fast: bool,
        force: bool,
        diag: &dyn Diagnostics,
    ) -> Result<()> {
        self.symbolize(profile, fast, force, diag)
    }
}

impl<O> Debug for LocalSymbolizer<O> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("LocalSymbolizer").finish_non_exhaustive()
    }
}
