use std::str::FromStr;

use crate::demangle::DemangleLevel;
use crate::Error;
use crate::ErrorExt as _;
use crate::Result;


const GRAMMAR: &str =
    "expecting [local|fastlocal|remote|none][:force][:demangle=[none|templates|full|default]]";


/// The symbolization policy described by a mode directive.
///
/// A directive is a colon separated list of tokens, e.g.,
/// `local:demangle=full`. Tokens may appear in any order:
/// - `local` resolves addresses using binaries on disk
/// - `fastlocal` does the same, favoring speed over line level detail
/// - `remote` resolves addresses using a remote symbol service
/// - `force` re-resolves locations that were symbolized already
/// - `demangle=<level>` assigns display names at the given level and
///   implies `force`
/// - `none` disables symbolization altogether
///
/// If neither a local nor the remote source was requested, both are
/// used.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Mode {
    /// Whether symbolization is enabled at all.
    pub enabled: bool,
    /// Whether to resolve addresses using local binaries.
    pub local: bool,
    /// Whether local resolution should only care about function names.
    pub fast: bool,
    /// Whether to resolve addresses using the remote symbol service.
    pub remote: bool,
    /// Whether to overwrite existing symbolization results.
    pub force: bool,
    /// The demangling to perform, if any.
    pub demangle: Option<DemangleLevel>,
}

impl Default for Mode {
    fn default() -> Self {
        Self {
            enabled: true,
            local: true,
            fast: false,
            remote: true,
            force: false,
            demangle: None,
        }
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let directive = s.to_ascii_lowercase();
        let mut local = false;
        let mut fast = false;
        let mut remote = false;
        let mut force = false;
        let mut demangle = None;

        for token in directive.split(':') {
            match token {
                "" => continue,
                "none" | "no" => {
                    return Ok(Self {
                        enabled: false,
                        local: false,
                        fast: false,
                        remote: false,
                        force: false,
                        demangle: None,
                    })
                }
                "local" => local = true,
                "fastlocal" => {
                    local = true;
                    fast = true;
                }
                "remote" => remote = true,
                "force" => force = true,
                _ => match token.strip_prefix("demangle=") {
                    Some("default") => (),
                    Some(level) => {
                        let level = DemangleLevel::from_str(level)
                            .with_context(|| format!("invalid symbolization mode `{s}`"))?;
                        demangle = Some(level);
                        // Names should be derived from fresh resolution
                        // results.
                        force = true;
                    }
                    None => {
                        return Err(Error::with_invalid_input(format!(
                            "unrecognized symbolization option `{token}` in `{s}`; {GRAMMAR}"
                        )))
                    }
                },
            }
        }

        if !local && !remote {
            local = true;
            remote = true;
        }

        Ok(Self {
            enabled: true,
            local,
            fast,
            remote,
            force,
            demangle,
        })
    }
}
