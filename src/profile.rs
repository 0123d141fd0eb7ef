//! The in-memory profile representation the symbolizer operates on.
//!
//! Entities reference each other through typed indices into the
//! vectors owned by [`Profile`]. The symbolizer never removes entities:
//! it only adds [`Line`]s to locations, rewrites [`Function::name`], and
//! appends to [`Profile::comments`].

use std::collections::HashMap;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::path::Path;

use crate::Addr;


/// An index referencing a [`Mapping`] in [`Profile::mappings`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MappingId(pub usize);

/// An index referencing a [`Function`] in [`Profile::functions`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FunctionId(pub usize);


/// A loaded binary's address range and identity.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Mapping {
    /// The mapping's identifier as recorded in the profile.
    pub id: u64,
    /// The first address covered by the mapping.
    pub start: Addr,
    /// The address one past the last one covered by the mapping.
    pub limit: Addr,
    /// The offset of `start` in the backing file.
    pub offset: u64,
    /// The path of the backing file, or a pseudo name such as `[vdso]`.
    pub file: String,
    /// The build ID of the binary that was running, if known.
    pub build_id: String,
    /// The name of the kernel relocation symbol, used only for kernel
    /// mappings.
    pub kernel_relocation_symbol: String,
}

impl Mapping {
    /// Check whether `addr` lies in `[start, limit)`.
    #[inline]
    pub fn contains(&self, addr: Addr) -> bool {
        (self.start..self.limit).contains(&addr)
    }

    /// Check whether the mapping's file is well known to not denote a
    /// binary that could be inspected.
    pub fn is_unsymbolizable(&self) -> bool {
        let name = base_name(&self.file);
        name.starts_with('[')
            || name.starts_with("linux-vdso")
            || self.file.starts_with("/dev/dri/")
            || self.file == "//anon"
    }

    /// Check whether the mapping's file is an absolute `http(s)` URL,
    /// i.e., the source the profile was fetched from.
    pub fn is_url(&self) -> bool {
        match self.file.split_once("://") {
            Some((scheme, rest)) => {
                !rest.is_empty() && scheme.to_ascii_lowercase().contains("http")
            }
            None => false,
        }
    }

    /// A short name for the mapping, suitable for reporting.
    pub(crate) fn display_name(&self) -> String {
        let name = base_name(&self.file);
        if self.build_id.is_empty() {
            name.to_string()
        } else {
            format!("{name} (build ID {})", self.build_id)
        }
    }
}


fn base_name(file: &str) -> &str {
    Path::new(file)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(file)
}


/// One resolution of an address to a function and source position.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Line {
    /// The function the address belongs to.
    pub function: FunctionId,
    /// The line number, or zero if unknown.
    pub line: i64,
    /// The column number, or zero if unknown.
    pub column: i64,
}


/// A sampled instruction address.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Location {
    /// The location's identifier as recorded in the profile.
    pub id: u64,
    /// The mapping the address belongs to, if any.
    pub mapping: Option<MappingId>,
    /// The instruction address.
    pub address: Addr,
    /// The resolved frames, innermost (inlined) first.
    ///
    /// An empty list means the location is not symbolized.
    pub lines: Vec<Line>,
}


/// A function referenced by [`Line`]s.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Function {
    /// The function's identifier as recorded in the profile.
    pub id: u64,
    /// The display name.
    pub name: String,
    /// The raw name as reported by the symbol source.
    pub system_name: String,
    /// The source file defining the function.
    pub filename: String,
}


/// A profile to symbolize.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Profile {
    /// All mappings of the profile.
    pub mappings: Vec<Mapping>,
    /// All locations of the profile.
    pub locations: Vec<Location>,
    /// All functions of the profile.
    pub functions: Vec<Function>,
    /// Free form comments, used as audit log of symbolization.
    pub comments: Vec<String>,
}

impl Profile {
    /// Add a mapping to the profile, assigning it the next ID.
    pub fn add_mapping(&mut self, mut mapping: Mapping) -> MappingId {
        let idx = self.mappings.len();
        mapping.id = idx as u64 + 1;
        let () = self.mappings.push(mapping);
        MappingId(idx)
    }

    /// Add an unsymbolized location for `address` in `mapping`.
    pub fn add_location(&mut self, mapping: Option<MappingId>, address: Addr) -> usize {
        let idx = self.locations.len();
        let location = Location {
            id: idx as u64 + 1,
            mapping,
            address,
            lines: Vec::new(),
        };
        let () = self.locations.push(location);
        idx
    }

    /// Retrieve the mapping referenced by `id`.
    #[inline]
    pub fn mapping(&self, id: MappingId) -> Option<&Mapping> {
        self.mappings.get(id.0)
    }

    /// Retrieve the function referenced by `id`.
    #[inline]
    pub fn function(&self, id: FunctionId) -> Option<&Function> {
        self.functions.get(id.0)
    }

    /// Check whether any function carries a name.
    pub fn has_functions(&self) -> bool {
        self.locations
            .iter()
            .flat_map(|loc| &loc.lines)
            .filter_map(|line| self.function(line.function))
            .any(|function| !function.name.is_empty())
    }

    /// Check whether any line carries a file name and line number.
    pub fn has_file_lines(&self) -> bool {
        self.locations.iter().flat_map(|loc| &loc.lines).any(|line| {
            self.function(line.function)
                .is_some_and(|function| !function.filename.is_empty())
                && line.line != 0
        })
    }

    /// Gather the indices of the locations needing symbolization,
    /// grouped by mapping.
    ///
    /// A location needs symbolization if it does not carry lines yet
    /// (or `force` is set) and its address lies within its mapping.
    pub(crate) fn pending_locations(&self, force: bool) -> HashMap<MappingId, Vec<usize>> {
        let mut pending = HashMap::<_, Vec<_>>::new();
        for (idx, loc) in self.locations.iter().enumerate() {
            if !force && !loc.lines.is_empty() {
                continue
            }
            let Some(mapping_id) = loc.mapping else {
                continue
            };
            match self.mapping(mapping_id) {
                Some(mapping) if mapping.contains(loc.address) => {
                    let () = pending.entry(mapping_id).or_default().push(idx);
                }
                Some(_) => {
                    crate::log::trace!(
                        "location {} with address {:#x} lies outside of its mapping; skipping",
                        loc.id,
                        loc.address
                    );
                }
                None => (),
            }
        }
        pending
    }
}

impl Display for Profile {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(f, "Mappings")?;
        for m in &self.mappings {
            writeln!(
                f,
                "{}: {:#x}/{:#x}/{:#x} {} {} [{}]",
                m.id, m.start, m.limit, m.offset, m.file, m.build_id, m.kernel_relocation_symbol
            )?;
        }

        writeln!(f, "Locations")?;
        for loc in &self.locations {
            let mapping = loc
                .mapping
                .and_then(|id| self.mapping(id))
                .map(|m| m.id)
                .unwrap_or(0);
            write!(f, "{:6}: {:#x} M={mapping}", loc.id, loc.address)?;
            if loc.lines.is_empty() {
                writeln!(f, " ??")?;
                continue
            }
            for (i, line) in loc.lines.iter().enumerate() {
                let indent = if i == 0 { " " } else { "             " };
                match self.function(line.function) {
                    Some(function) => writeln!(
                        f,
                        "{indent}{} {} {}:{} s=0",
                        function.name, function.filename, line.line, line.column
                    )?,
                    None => writeln!(f, "{indent}<invalid function>")?,
                }
            }
        }

        writeln!(f, "Functions")?;
        for function in &self.functions {
            writeln!(
                f,
                "{}: {} [{}] {}",
                function.id, function.name, function.system_name, function.filename
            )?;
        }

        for comment in &self.comments {
            writeln!(f, "Comment: {comment}")?;
        }
        Ok(())
    }
}


/// An index for deduplicating [`Function`]s by raw name and file name.
#[derive(Debug)]
pub(crate) struct FunctionTable {
    index: HashMap<(String, String), FunctionId>,
}

impl FunctionTable {
    /// Create a table seeded with the functions already present.
    pub fn new(functions: &[Function]) -> Self {
        let index = functions
            .iter()
            .enumerate()
            .map(|(idx, f)| ((f.system_name.clone(), f.filename.clone()), FunctionId(idx)))
            .collect();
        Self { index }
    }

    /// Look up the function with the given identity, creating it if it
    /// does not exist yet.
    pub fn intern(&mut self, functions: &mut Vec<Function>, name: &str, filename: &str) -> FunctionId {
        let key = (name.to_string(), filename.to_string());
        *self.index.entry(key).or_insert_with(|| {
            let idx = functions.len();
            let function = Function {
                id: idx as u64 + 1,
                name: name.to_string(),
                system_name: name.to_string(),
                filename: filename.to_string(),
            };
            let () = functions.push(function);
            FunctionId(idx)
        })
    }
}
