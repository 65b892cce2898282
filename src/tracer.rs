//! Structured, toggleable interpreter tracing (§4.J), distinct from the
//! unstructured `log` facade used for incidental diagnostics. Grounded in
//! the bundled tool's own tracer module: a scope-gated [Tracer] trait plus
//! a [DefaultTracer] that forwards to `log`/`println!` depending on build
//! mode, so production embedding pays nothing when tracing is disabled.

use std::fmt::Debug;
use std::str::FromStr;

#[cfg(test)]
use std::{println as trace_line};
#[cfg(not(test))]
use log::debug as trace_line;

/// What scope of interpreter activity to trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceMode {
    Methods,
    States,
    Events,
    All,
    None,
}

impl FromStr for TraceMode {
    type Err = ();

    fn from_str(input: &str) -> Result<TraceMode, ()> {
        match input.to_lowercase().as_str() {
            "methods" => Ok(TraceMode::Methods),
            "states" => Ok(TraceMode::States),
            "events" => Ok(TraceMode::Events),
            "all" => Ok(TraceMode::All),
            "none" => Ok(TraceMode::None),
            _ => Err(()),
        }
    }
}

/// Traces method entry/exit, state entry/exit, and event dispatch for one
/// session id. The interpreter holds a `Box<dyn Tracer>` (§9 "The log
/// adapter is carried in the state chart itself — no ambient logger").
pub trait Tracer: Debug {
    fn trace(&self, session_id: &str, message: &str);
    fn enable(&mut self, mode: TraceMode);
    fn disable(&mut self, mode: TraceMode);
    fn is_enabled(&self, mode: TraceMode) -> bool;

    fn trace_state_entered(&self, session_id: &str, state_id: &str) {
        if self.is_enabled(TraceMode::States) {
            self.trace(session_id, &format!("enter {state_id}"));
        }
    }

    fn trace_state_exited(&self, session_id: &str, state_id: &str) {
        if self.is_enabled(TraceMode::States) {
            self.trace(session_id, &format!("exit {state_id}"));
        }
    }

    fn trace_event(&self, session_id: &str, event_name: &str) {
        if self.is_enabled(TraceMode::Events) {
            self.trace(session_id, &format!("event {event_name}"));
        }
    }
}

/// Forwards trace lines to the `log` facade (`println!` under `#[cfg(test)]`,
/// matching the rest of the crate's logging convention).
#[derive(Debug)]
pub struct DefaultTracer {
    enabled: Vec<TraceMode>,
}

impl Default for DefaultTracer {
    fn default() -> Self {
        DefaultTracer::new()
    }
}

impl DefaultTracer {
    pub fn new() -> DefaultTracer {
        DefaultTracer { enabled: vec![TraceMode::States] }
    }

    pub fn silent() -> DefaultTracer {
        DefaultTracer { enabled: vec![] }
    }
}

impl Tracer for DefaultTracer {
    fn trace(&self, session_id: &str, message: &str) {
        trace_line!("[{session_id}] {message}");
    }

    fn enable(&mut self, mode: TraceMode) {
        if !self.enabled.contains(&mode) {
            self.enabled.push(mode);
        }
    }

    fn disable(&mut self, mode: TraceMode) {
        self.enabled.retain(|m| *m != mode);
    }

    fn is_enabled(&self, mode: TraceMode) -> bool {
        self.enabled.contains(&TraceMode::All) || self.enabled.contains(&mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_scope_is_silent() {
        let tracer = DefaultTracer::silent();
        assert!(!tracer.is_enabled(TraceMode::States));
        assert!(!tracer.is_enabled(TraceMode::Events));
    }

    #[test]
    fn enable_all_covers_every_scope() {
        let mut tracer = DefaultTracer::silent();
        tracer.enable(TraceMode::All);
        assert!(tracer.is_enabled(TraceMode::Methods));
        assert!(tracer.is_enabled(TraceMode::Events));
    }
}
