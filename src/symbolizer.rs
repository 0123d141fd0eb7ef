use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::str::FromStr as _;

use crate::demangle::Decode;
use crate::demangle::DemangleLevel;
use crate::demangle::DemangleSelector;
use crate::demangle::Demangler;
use crate::local::LocalSymbolizer;
use crate::log::debug;
use crate::obj::NoObjTool;
use crate::obj::ObjTool;
use crate::remote::MappingSources;
use crate::remote::RemoteSymbolizer;
use crate::Diagnostics;
use crate::Error;
use crate::ErrorExt as _;
use crate::LogDiagnostics;
use crate::Mode;
use crate::Profile;
use crate::Result;


/// A stage resolving addresses using binaries on the local system.
pub trait SymbolizeLocal {
    /// Symbolize the locations of `profile` in place.
    fn symbolize_local(
        &self,
        profile: &mut Profile,
        fast: bool,
        force: bool,
        diag: &dyn Diagnostics,
    ) -> Result<()>;
}

/// A stage resolving addresses using a remote symbol service.
pub trait SymbolizeRemote {
    /// Symbolize the locations of `profile` in place, using the symbol
    /// services referenced by `sources`.
    fn symbolize_remote(
        &self,
        profile: &mut Profile,
        force: bool,
        sources: &MappingSources,
        diag: &dyn Diagnostics,
    ) -> Result<()>;
}

/// A stage assigning display names to the functions of a profile.
pub trait DemangleProfile {
    /// Demangle the function names of `profile` at the given level.
    fn demangle_profile(&self, profile: &mut Profile, force: bool, level: DemangleLevel);
}


fn no_lookup(url: &str, _query: &str) -> Result<Vec<u8>> {
    Err(Error::with_unsupported(format!(
        "no symbol service lookup configured; cannot query {url}"
    )))
}


/// A builder for configurable construction of [`Symbolizer`] objects.
///
/// By default no object tool and no symbol service lookup are
/// configured, meaning that the local and remote stages report every
/// mapping they encounter as failed. Diagnostics are emitted as
/// `tracing` warnings.
pub struct Builder {
    local: Box<dyn SymbolizeLocal>,
    remote: Box<dyn SymbolizeRemote>,
    demangler: Box<dyn DemangleProfile>,
    diag: Box<dyn Diagnostics>,
}

impl Builder {
    /// Set the [`ObjTool`] used for opening binaries during local
    /// symbolization.
    pub fn set_obj_tool<O>(mut self, obj: O) -> Builder
    where
        O: ObjTool + 'static,
    {
        self.local = Box::new(LocalSymbolizer::new(obj));
        self
    }

    /// Set the function used for talking to remote symbol services.
    ///
    /// Refer to [`RemoteSymbolizer::new`] for details.
    pub fn set_lookup<F>(mut self, lookup: F) -> Builder
    where
        F: Fn(&str, &str) -> Result<Vec<u8>> + 'static,
    {
        self.remote = Box::new(RemoteSymbolizer::new(lookup));
        self
    }

    /// Set the [`Decode`] implementation used for decoding mangled
    /// names.
    pub fn set_decoder<D>(mut self, decoder: D) -> Builder
    where
        D: Decode + 'static,
    {
        self.demangler = Box::new(DemangleSelector::new(decoder));
        self
    }

    /// Set the sink receiving diagnostics.
    pub fn set_diagnostics<D>(mut self, diag: D) -> Builder
    where
        D: Diagnostics + 'static,
    {
        self.diag = Box::new(diag);
        self
    }

    /// Replace the local symbolization stage altogether.
    pub fn set_local<L>(mut self, local: L) -> Builder
    where
        L: SymbolizeLocal + 'static,
    {
        self.local = Box::new(local);
        self
    }

    /// Replace the remote symbolization stage altogether.
    pub fn set_remote<R>(mut self, remote: R) -> Builder
    where
        R: SymbolizeRemote + 'static,
    {
        self.remote = Box::new(remote);
        self
    }

    /// Replace the demangling stage altogether.
    pub fn set_demangler<D>(mut self, demangler: D) -> Builder
    where
        D: DemangleProfile + 'static,
    {
        self.demangler = Box::new(demangler);
        self
    }

    /// Create the [`Symbolizer`] object.
    pub fn build(self) -> Symbolizer {
        let Builder {
            local,
            remote,
            demangler,
            diag,
        } = self;

        Symbolizer {
            local,
            remote,
            demangler,
            diag,
        }
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            local: Box::new(LocalSymbolizer::new(NoObjTool)),
            remote: Box::new(RemoteSymbolizer::new(no_lookup)),
            demangler: Box::new(DemangleSelector::new(Demangler)),
            diag: Box::new(LogDiagnostics),
        }
    }
}

impl Debug for Builder {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Builder").finish_non_exhaustive()
    }
}


/// Symbolizer provides the main API for symbolizing profiles.
///
/// A symbolizer runs up to three stages over a profile, as selected by a
/// [`Mode`]: local symbolization, remote symbolization, and demangling,
/// in that order. Each stage that ran leaves a comment in the profile.
pub struct Symbolizer {
    local: Box<dyn SymbolizeLocal>,
    remote: Box<dyn SymbolizeRemote>,
    demangler: Box<dyn DemangleProfile>,
    diag: Box<dyn Diagnostics>,
}

impl Symbolizer {
    /// Create a new [`Symbolizer`].
    ///
    /// This method is just a short hand for instantiating a `Symbolizer`
    /// from the default [`Builder`].
    #[inline]
    pub fn new() -> Self {
        Builder::default().build()
    }

    /// Retrieve a [`Builder`] object for configurable construction of a
    /// [`Symbolizer`].
    #[inline]
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Symbolize `profile` in place, as instructed by the mode directive
    /// `mode`.
    ///
    /// See [`Mode`] for the accepted directive syntax. A malformed
    /// directive is reported as an error before the profile is touched.
    pub fn symbolize(
        &self,
        mode: &str,
        sources: &MappingSources,
        profile: &mut Profile,
    ) -> Result<()> {
        let mode = Mode::from_str(mode)?;
        self.symbolize_mode(&mode, sources, profile)
    }

    /// Symbolize `profile` in place, as instructed by an already parsed
    /// [`Mode`].
    ///
    /// Failure of one stage does not prevent later stages from running.
    /// Each failure is reported to the diagnostic sink and the first one
    /// is returned, annotated with the list of failed stages, once all
    /// stages ran.
    #[cfg_attr(feature = "tracing", crate::log::instrument(skip_all, fields(mode = ?mode)))]
    pub fn symbolize_mode(
        &self,
        mode: &Mode,
        sources: &MappingSources,
        profile: &mut Profile,
    ) -> Result<()> {
        if !mode.enabled {
            debug!("symbolization disabled; leaving profile untouched");
            return Ok(())
        }

        let diag = &*self.diag;
        let mut failures = Vec::new();

        if mode.force {
            let () = profile.comments.push("force".to_string());
        }

        if mode.local {
            let mut flags = Vec::new();
            if mode.fast {
                let () = flags.push("fast");
            }
            if mode.force {
                let () = flags.push("force");
            }

            let result = self
                .local
                .symbolize_local(profile, mode.fast, mode.force, diag);
            if let Err(err) = result {
                let () = failures.push(("local", err));
            }
            let () = profile
                .comments
                .push(format!("local=[{}]", flags.join(",")));
        }

        if mode.remote {
            let flags = if mode.force { "force" } else { "" };
            let result = self
                .remote
                .symbolize_remote(profile, mode.force, sources, diag);
            if let Err(err) = result {
                let () = failures.push(("remote", err));
            }
            let () = profile.comments.push(format!("symbolz=[{flags}]"));
        }

        if let Some(level) = mode.demangle {
            let () = self.demangler.demangle_profile(profile, mode.force, level);
            let () = profile.comments.push(format!("demangle=[{level}]"));
        }

        for (stage, err) in &failures {
            let () = diag.print_err(&format!("{stage} symbolization: {err}"));
        }

        let stages = failures
            .iter()
            .map(|(stage, _err)| *stage)
            .collect::<Vec<_>>()
            .join(", ");
        match failures.into_iter().next() {
            None => Ok(()),
            Some((_stage, err)) => {
                Err(err).with_context(|| format!("symbolization failed in stage(s): {stages}"))
            }
        }
    }
}

impl Default for Symbolizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Symbolizer {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Symbolizer").finish_non_exhaustive()
    }
}
