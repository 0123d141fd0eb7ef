//! Symbolization of addresses using a remote symbol service.
//!
//! The service speaks the `symbolz` protocol: a request carries a list
//! of `+` separated hexadecimal addresses and the response contains one
//! `0x<address> <name>` line per address that could be resolved. The
//! transport itself is provided by the caller, in the form of a lookup
//! function.

use std::collections::HashMap;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::sync::OnceLock;

use regex::Regex;

use crate::log::debug;
use crate::profile::FunctionTable;
use crate::symbolizer::SymbolizeRemote;
use crate::Addr;
use crate::Diagnostics;
use crate::Error;
use crate::ErrorExt as _;
use crate::IntoError as _;
use crate::Line;
use crate::Mapping;
use crate::MappingId;
use crate::Profile;
use crate::Result;


/// A location a profile was retrieved from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MappingSource {
    /// The URL (or path) the profile was fetched from.
    pub source: String,
    /// The start address of the mapping as seen by the source.
    pub start: Addr,
}

/// Sources of mappings, keyed by mapping file name or build ID.
pub type MappingSources = HashMap<String, Vec<MappingSource>>;


const GPERFTOOLS_SUFFIXES: [&str; 6] = [
    "/pprof/heap",
    "/pprof/growth",
    "/pprof/profile",
    "/pprof/pmuprofile",
    "/pprof/filteredprofile",
    "/pprof/contention",
];


/// Lexically normalize an absolute URL path.
fn clean_path(path: &str) -> String {
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => (),
            ".." => {
                let _part = parts.pop();
            }
            part => parts.push(part),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Derive the URL of the symbol service from the URL a profile was
/// fetched from.
///
/// Profiles served by Go's `net/http/pprof` or by gperftools have a
/// sibling `symbol` handler; everybody else is expected to serve
/// `/symbolz`. `None` is returned if `source` is not a URL.
pub fn symbolz_url(source: &str) -> Option<String> {
    let (scheme, rest) = source.split_once("://")?;
    if scheme.is_empty() {
        return None
    }

    let host_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (host, tail) = rest.split_at(host_end);
    if host.is_empty() {
        return None
    }

    let path = tail.split(['?', '#']).next().unwrap_or("");
    let path = if path.contains("/debug/pprof/")
        || GPERFTOOLS_SUFFIXES
            .iter()
            .any(|suffix| path.ends_with(suffix))
    {
        clean_path(&format!("{path}/../symbol"))
    } else {
        "/symbolz".to_string()
    };
    Some(format!("{scheme}://{host}{path}"))
}


fn symbol_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    // The pattern is constant and known to be valid.
    REGEX.get_or_init(|| Regex::new(r"(0x[[:xdigit:]]+)\s+(.*)").unwrap())
}

/// Parse a symbol service response into `(address, name)` pairs.
fn parse_response(data: &[u8]) -> Result<Vec<(Addr, String)>> {
    let text = String::from_utf8_lossy(data);
    let mut symbols = Vec::new();
    for line in text.lines() {
        let Some(captures) = symbol_regex().captures(line) else {
            continue
        };
        let (Some(addr), Some(name)) = (captures.get(1), captures.get(2)) else {
            continue
        };
        let addr = addr.as_str();
        let addr = Addr::from_str_radix(&addr[2..], 16)
            .map_err(|err| Error::with_invalid_data(err.to_string()))
            .with_context(|| format!("failed to parse address `{addr}`"))?;
        let () = symbols.push((addr, name.as_str().trim_end().to_string()));
    }
    Ok(symbols)
}

/// Shift `addr` by `offset`, reporting overflows.
fn adjust(addr: Addr, offset: i128) -> Result<Addr> {
    Addr::try_from(i128::from(addr) + offset)
        .ok()
        .ok_or_invalid_data(|| format!("cannot adjust address {addr:#x} by {offset}"))
}


/// Resolve addresses by querying a remote symbol service.
pub struct RemoteSymbolizer<F> {
    lookup: F,
}

impl<F> RemoteSymbolizer<F>
where
    F: Fn(&str, &str) -> Result<Vec<u8>>,
{
    /// Create a new [`RemoteSymbolizer`].
    ///
    /// `lookup` receives the URL of the symbol service as well as the
    /// query (the `+` separated addresses) and returns the raw response.
    /// Retrying failed requests, if desired, is the business of `lookup`.
    pub fn new(lookup: F) -> Self {
        Self { lookup }
    }

    /// Symbolize locations of `profile` in place.
    ///
    /// One request is issued per mapping for which `sources` contains a
    /// symbol service. Failures are reported to `diag` and only affect
    /// the mapping in question.
    pub fn symbolize(
        &self,
        profile: &mut Profile,
        force: bool,
        sources: &MappingSources,
        diag: &dyn Diagnostics,
    ) -> Result<()> {
        let mut pending = profile.pending_locations(force);
        let mut functions = FunctionTable::new(&profile.functions);

        for idx in 0..profile.mappings.len() {
            let mapping_id = MappingId(idx);
            let Some(locs) = pending.remove(&mapping_id) else {
                continue
            };

            let mapping = &profile.mappings[idx];
            if mapping.is_unsymbolizable() {
                continue
            }

            let Some((url, start)) = find_service(mapping, sources) else {
                debug!("no symbol service known for mapping `{}`", mapping.file);
                continue
            };

            let result =
                self.symbolize_mapping(profile, mapping_id, &locs, &url, start, &mut functions);
            if let Err(err) = result {
                let name = profile.mappings[idx].display_name();
                let () = diag.print_err(&format!("Remote symbolization failed for {name}: {err}"));
            }
        }
        Ok(())
    }

    #[cfg_attr(feature = "tracing", crate::log::instrument(skip(self, profile, locs, functions), fields(locs = locs.len())))]
    fn symbolize_mapping(
        &self,
        profile: &mut Profile,
        mapping_id: MappingId,
        locs: &[usize],
        url: &str,
        start: Addr,
        functions: &mut FunctionTable,
    ) -> Result<()> {
        let mapping = &profile.mappings[mapping_id.0];
        // Compensate for address normalization by the source.
        let offset = i128::from(start) - i128::from(mapping.start);

        let mut addrs = Vec::with_capacity(locs.len());
        for &idx in locs {
            let addr = profile.locations[idx].address;
            if addr == 0 {
                continue
            }
            let () = addrs.push(format!("{:#x}", adjust(addr, offset)?));
        }
        if addrs.is_empty() {
            return Ok(())
        }

        let data = (self.lookup)(url, &addrs.join("+"))
            .with_context(|| format!("failed to look up symbols at {url}"))?;
        let symbols = parse_response(&data)?
            .into_iter()
            .map(|(addr, name)| Ok((adjust(addr, -offset)?, name)))
            .collect::<Result<Vec<_>>>()?;

        let mut resolved = HashMap::with_capacity(symbols.len());
        for (addr, name) in symbols {
            let function = functions.intern(&mut profile.functions, &name, "");
            let _prev = resolved.insert(addr, function);
        }

        for &idx in locs {
            let loc = &mut profile.locations[idx];
            if let Some(function) = resolved.get(&loc.address) {
                loc.lines = vec![Line {
                    function: *function,
                    line: 0,
                    column: 0,
                }];
            }
        }
        Ok(())
    }
}

/// Find the symbol service URL for `mapping`, along with the mapping's
/// start address as seen by the service.
fn find_service(mapping: &Mapping, sources: &MappingSources) -> Option<(String, Addr)> {
    let by_build_id = if mapping.build_id.is_empty() {
        None
    } else {
        sources.get(&mapping.build_id)
    };

    sources
        .get(&mapping.file)
        .into_iter()
        .chain(by_build_id)
        .flatten()
        .find_map(|source| symbolz_url(&source.source).map(|url| (url, source.start)))
}

impl<F> SymbolizeRemote for RemoteSymbolizer<F>
where
    F: Fn(&str, &str) -> Result<Vec<u8>>,
{
    fn symbolize_remote(
        &self,
        profile: &mut Profile,
        force: bool,
        sources: &MappingSources,
        diag: &dyn Diagnostics,
    ) -> Result<()> {
        self.symbolize(profile, force, sources, diag)
    }
}

impl<F> Debug for RemoteSymbolizer<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("RemoteSymbolizer").finish_non_exhaustive()
    }
}
