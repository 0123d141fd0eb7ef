//! Functionality for turning raw symbol names into display names.
//!
//! Names are classified by the naming convention of the language that
//! produced them. Go and Java toolchains already emit readable names,
//! which are left alone. Everything else is treated as a (potentially
//! mangled) C++ or Rust symbol: mangled names are decoded with a
//! [`Decode`] implementation, while names that already look demangled are
//! canonicalized according to the requested [`DemangleLevel`].

use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::log::trace;
use crate::symbolizer::DemangleProfile;
use crate::Error;
use crate::Function;
use crate::Profile;
use crate::Result;


/// The amount of detail to keep when demangling.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DemangleLevel {
    /// Only keep the qualified name, without template arguments or
    /// parameters.
    None,
    /// Keep template arguments, but drop parameters.
    Templates,
    /// Keep everything the decoder produced.
    Full,
}

impl DemangleLevel {
    /// The name of the level as used in mode directives.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Templates => "templates",
            Self::Full => "full",
        }
    }
}

impl Display for DemangleLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for DemangleLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "templates" => Ok(Self::Templates),
            "full" => Ok(Self::Full),
            _ => Err(Error::with_invalid_input(format!(
                "unknown demangle level `{s}`; expecting one of none, templates, full"
            ))),
        }
    }
}


/// The naming convention a symbol name follows.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SymbolKind {
    /// A package qualified Go name, e.g., `example.com/foo.(*Bar).Bat`.
    Go,
    /// A fully qualified Java method, e.g., `java.lang.Float.<init>`.
    Java,
    /// Anything else, which is treated as a C++ (or Rust) symbol.
    Cpp,
}


fn go_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    // The pattern is constant and known to be valid.
    REGEX.get_or_init(|| Regex::new(r"^(?:[\w\-.]+/)+[^.]+\..+").unwrap())
}

fn java_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^(?:[a-z]\w*\.)*[A-Z][\w$]*\.(?:<init>|[a-z][\w$]*(?:\$\d+)?)(?:\(|$)")
            .unwrap()
    })
}

/// Classify a symbol name by its naming convention.
pub fn classify(name: &str) -> SymbolKind {
    if go_regex().is_match(name) {
        SymbolKind::Go
    } else if java_regex().is_match(name) {
        SymbolKind::Java
    } else {
        SymbolKind::Cpp
    }
}


/// A decoder for mangled symbol names.
pub trait Decode {
    /// Decode `symbol`, honoring `level` where the decoder supports it.
    ///
    /// `None` indicates that the symbol could not be decoded.
    fn decode(&self, symbol: &str, level: DemangleLevel) -> Option<String>;
}

impl<T> Decode for &T
where
    T: Decode + ?Sized,
{
    fn decode(&self, symbol: &str, level: DemangleLevel) -> Option<String> {
        (**self).decode(symbol, level)
    }
}


/// Check whether `body` ends in a legacy Rust hash component, i.e.,
/// `17h` followed by 16 hexadecimal digits.
fn has_rust_hash(body: &str) -> bool {
    const HASH_LEN: usize = 19;

    body.len()
        .checked_sub(HASH_LEN)
        .and_then(|idx| body.get(idx..))
        .and_then(|hash| hash.strip_prefix("17h"))
        .is_some_and(|digits| digits.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Check whether a mangled symbol was produced by the Rust compiler.
fn is_rust_symbol(symbol: &str) -> bool {
    if symbol.starts_with("_R") {
        return true
    }

    symbol.starts_with("_ZN")
        && symbol
            .strip_suffix('E')
            .is_some_and(has_rust_hash)
}


/// The default [`Decode`] implementation.
///
/// Rust symbols (both v0 and legacy) are decoded with `rustc-demangle`,
/// everything else is interpreted as an Itanium ABI C++ symbol and
/// decoded with `cpp_demangle`. Without the `demangle` feature nothing
/// can be decoded.
#[derive(Clone, Copy, Debug, Default)]
pub struct Demangler;

impl Decode for Demangler {
    #[cfg(feature = "demangle")]
    fn decode(&self, symbol: &str, level: DemangleLevel) -> Option<String> {
        use cpp_demangle::BorrowedSymbol;
        use cpp_demangle::DemangleOptions;
        use cpp_demangle::Symbol;

        if is_rust_symbol(symbol) {
            let demangled = rustc_demangle::try_demangle(symbol).ok()?;
            // The alternate format omits the hash.
            return Some(format!("{demangled:#}"))
        }

        let options = match level {
            DemangleLevel::Full => DemangleOptions::new(),
            DemangleLevel::None | DemangleLevel::Templates => {
                DemangleOptions::new().no_params().no_return_type()
            }
        };
        let demangled = match Symbol::new(symbol.as_bytes()) {
            Ok(symbol) => symbol.demangle(&options),
            Err(_) => {
                // Decode the longest valid prefix, ignoring trailing
                // garbage.
                let (symbol, _tail) = BorrowedSymbol::with_tail(symbol.as_bytes()).ok()?;
                symbol.demangle(&options)
            }
        };
        demangled.ok()
    }

    #[cfg(not(feature = "demangle"))]
    fn decode(&self, _symbol: &str, _level: DemangleLevel) -> Option<String> {
        None
    }
}


/// Check whether a name looks like a C++ name that was demangled
/// already.
fn looks_like_demangled_cpp(name: &str) -> bool {
    // Java names of the form `class.<init>` and Go names of the form
    // `foo.(*Bar[...]).Method`.
    if name.contains(".<") || name.contains("]).") {
        return false
    }
    name.contains(['<', '>', '[', ']']) || name.contains("::")
}

const QUALIFIERS: [&str; 5] = [" const", " volatile", " noexcept", " &&", " &"];

/// Remove trailing cv and ref qualifiers as well as compiler generated
/// `[clone ...]` suffixes.
fn trim_qualifiers(mut name: &str) -> &str {
    loop {
        let trimmed = name.trim_end();
        let next = if trimmed.ends_with(']') {
            trimmed.rfind(" [clone ").map(|idx| &trimmed[..idx])
        } else {
            QUALIFIERS.iter().find_map(|q| trimmed.strip_suffix(q))
        };

        match next {
            Some(rest) => name = rest,
            None => return trimmed,
        }
    }
}

/// Find the opening parenthesis of the balanced group that `name` ends
/// in.
fn param_list_start(name: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, c) in name.char_indices().rev() {
        match c {
            ')' => depth += 1,
            '(' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx)
                }
            }
            _ => (),
        }
    }
    None
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Check whether the `operator` starting at byte `idx` of `name` is the
/// keyword and not part of a longer identifier.
fn is_operator_keyword(name: &str, idx: usize) -> bool {
    let before = name[..idx].chars().next_back();
    let after = name[idx + "operator".len()..].chars().next();
    !before.is_some_and(is_ident_char) && !after.is_some_and(is_ident_char)
}

/// Strip the trailing parameter list from a demangled name.
fn strip_params(name: &str) -> String {
    let trimmed = trim_qualifiers(name);
    if !trimmed.ends_with(')') {
        return trimmed.to_string()
    }

    match param_list_start(trimmed) {
        Some(idx) if idx > 0 => {
            let head = &trimmed[..idx];
            // `operator()` without parameter list.
            if head.ends_with("operator")
                && is_operator_keyword(head, head.len() - "operator".len())
            {
                trimmed.to_string()
            } else {
                head.trim_end().to_string()
            }
        }
        _ => name.to_string(),
    }
}

const OPERATOR_TOKENS: [&str; 11] = [
    "<=>", "<<=", ">>=", "->*", "<<", ">>", "<=", ">=", "->", "<", ">",
];

/// Remove all balanced template argument lists from a demangled name.
fn strip_template_args(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut depth = 0usize;
    let mut rest = name;

    while let Some(c) = rest.chars().next() {
        let idx = name.len() - rest.len();
        if let Some(tail) = rest
            .strip_prefix("operator")
            .filter(|_| is_operator_keyword(name, idx))
        {
            let token = OPERATOR_TOKENS
                .iter()
                .find(|token| tail.starts_with(**token))
                .copied()
                .unwrap_or("");
            if depth == 0 {
                let () = out.push_str("operator");
                let () = out.push_str(token);
            }
            rest = &tail[token.len()..];
            continue
        }

        match c {
            '<' => depth += 1,
            '>' => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return name.to_string(),
            },
            _ if depth == 0 => out.push(c),
            _ => (),
        }
        rest = &rest[c.len_utf8()..];
    }

    if depth != 0 {
        return name.to_string()
    }
    out
}

/// Reduce a demangled name to the detail requested by `level`.
fn simplify(name: &str, level: DemangleLevel) -> String {
    match level {
        DemangleLevel::Full => name.to_string(),
        DemangleLevel::Templates => strip_params(name),
        DemangleLevel::None => strip_template_args(&strip_params(name)),
    }
}

/// Canonicalize a name that is assumed to be human readable already.
fn canonicalize(name: &str, level: DemangleLevel) -> String {
    if level != DemangleLevel::Full && looks_like_demangled_cpp(name) {
        simplify(name, level)
    } else {
        name.to_string()
    }
}

/// Extract the mangled symbol from `name`, if it is one.
///
/// Some platforms prepend an additional underscore to symbols, which is
/// removed.
fn mangled_symbol(name: &str) -> Option<&str> {
    let is_mangled = |s: &str| s.starts_with("_Z") || s.starts_with("_R");

    match name.strip_prefix('_') {
        Some(rest) if is_mangled(rest) => Some(rest),
        _ if is_mangled(name) => Some(name),
        _ => None,
    }
}


/// Assign display names to functions, based on their raw names.
#[derive(Clone, Debug, Default)]
pub struct DemangleSelector<D = Demangler> {
    decoder: D,
}

impl<D> DemangleSelector<D>
where
    D: Decode,
{
    /// Create a new [`DemangleSelector`] using the provided decoder.
    pub fn new(decoder: D) -> Self {
        Self { decoder }
    }

    /// Produce the display name for the raw symbol `name`.
    pub fn demangle_name(&self, name: &str, level: DemangleLevel) -> String {
        match classify(name) {
            SymbolKind::Go | SymbolKind::Java => name.to_string(),
            SymbolKind::Cpp => self.demangle_native(name, level),
        }
    }

    fn demangle_native(&self, name: &str, level: DemangleLevel) -> String {
        if let Some(symbol) = mangled_symbol(name) {
            return match self.decoder.decode(symbol, level) {
                Some(decoded) if is_rust_symbol(symbol) => decoded,
                Some(decoded) => simplify(&decoded, level),
                None => {
                    trace!("failed to decode `{symbol}`; canonicalizing");
                    canonicalize(symbol, level)
                }
            }
        }

        // Reserved names, e.g., runtime internals.
        if name.starts_with("__") {
            return name.to_string()
        }
        canonicalize(name, level)
    }

    /// Set the display name of `function` from its raw name.
    ///
    /// Functions with a display name differing from the raw one were
    /// demangled already and are left alone.
    pub fn demangle_function(&self, function: &mut Function, level: DemangleLevel) {
        if function.system_name.is_empty() {
            return
        }
        if !function.name.is_empty() && function.name != function.system_name {
            return
        }
        function.name = self.demangle_name(&function.system_name, level);
    }
}

impl<D> DemangleProfile for DemangleSelector<D>
where
    D: Decode,
{
    fn demangle_profile(&self, profile: &mut Profile, force: bool, level: DemangleLevel) {
        for function in &mut profile.functions {
            if force && !function.name.is_empty() && !function.system_name.is_empty() {
                function.name.clone_from(&function.system_name);
            }
            let () = self.demangle_function(function, level);
        }
    }
}
