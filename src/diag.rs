use std::sync::Mutex;
use std::sync::PoisonError;

use crate::log::warn;


/// A sink for human readable diagnostics.
///
/// Diagnostics are advisory: reporting one never aborts the caller.
pub trait Diagnostics {
    /// Report a diagnostic message.
    fn print_err(&self, msg: &str);
}

impl<F> Diagnostics for F
where
    F: Fn(&str),
{
    #[inline]
    fn print_err(&self, msg: &str) {
        self(msg)
    }
}


/// A [`Diagnostics`] implementation forwarding messages to the `tracing`
/// infrastructure, as warnings.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn print_err(&self, msg: &str) {
        warn!("{msg}")
    }
}


/// A [`Diagnostics`] implementation recording all messages.
#[derive(Debug, Default)]
pub struct CollectDiagnostics {
    messages: Mutex<Vec<String>>,
}

impl CollectDiagnostics {
    /// Create a new, empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve a copy of the messages collected so far.
    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Diagnostics for CollectDiagnostics {
    fn print_err(&self, msg: &str) {
        let () = self
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(msg.to_string());
    }
}
