//! A synchronous, embeddable SCXML (Harel Statecharts) interpreter.
//!
//! The crate is layered from the document up: [document] holds the frozen,
//! parsed-and-validated tree; [configuration] and [event] hold the pieces
//! of runtime state a chart carries between steps; [datamodel] defines the
//! pluggable expression/evaluator boundary and [actions] the executable
//! content that runs through it; [resolver] finds and resolves enabled
//! transitions; [fsm] drives the actual macrostep/microstep loop on top of
//! all of the above. [reader] (behind the `xml` feature) parses SCXML
//! source into a [document::Document]; [test] runs declarative JSON test
//! scenarios against a built chart.

pub mod actions;
pub mod configuration;
pub mod datamodel;
pub mod document;
pub mod error;
pub mod evaluator;
pub mod event;
pub mod features;
pub mod fsm;
pub mod hierarchy;
pub mod resolver;
pub mod tracer;
pub mod validator;

#[cfg(feature = "xml")]
pub mod reader;

#[cfg(feature = "json-config")]
pub mod serialize;

use std::collections::HashMap;
use std::env;
use std::str::FromStr;

use crate::tracer::{TraceMode, Tracer};

/// Looks up a named trace scope and enables or disables it on `tracer`,
/// printing a usage hint to stderr on an unrecognized name rather than
/// failing the whole CLI invocation over a typo'd flag.
pub fn handle_trace(tracer: &mut dyn Tracer, opt: &str, enable: bool) {
    match TraceMode::from_str(opt) {
        Ok(mode) => {
            if enable {
                tracer.enable(mode);
            } else {
                tracer.disable(mode);
            }
        }
        Err(_) => {
            eprintln!("Unknown trace option. Use one of:\n methods\n states\n events\n all\n none\n");
        }
    }
}

/// Descriptor of a program argument option.
pub struct ArgOption {
    pub name: &'static str,
    pub required: bool,
    pub with_value: bool,
}

impl ArgOption {
    /// Creates a new option with the specified name.
    pub fn new(name: &'static str) -> ArgOption {
        ArgOption {
            name,
            required: false,
            with_value: false,
        }
    }

    /// Defines this option as "required".
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Defines that this option needs a value.
    pub fn with_value(mut self) -> Self {
        self.with_value = true;
        self
    }
}

/// Parses program arguments against a fixed set of known options, returning
/// the matched option values plus every plain (non-flag) argument.
pub fn get_arguments(arguments: &[&ArgOption]) -> (HashMap<&'static str, String>, Vec<String>) {
    let mut final_args = Vec::<String>::new();

    let args: Vec<String> = env::args().collect();
    let mut idx = 1;
    let mut map = HashMap::new();

    // Don't use clap to parse arguments for now to reduce dependencies.
    while idx < args.len() {
        let arg = &args[idx];
        idx += 1;

        if let Some(sarg) = arg.strip_prefix('-') {
            let sarg = sarg.trim_start_matches('-');
            let mut match_found = false;
            for opt in arguments {
                match_found = opt.name == sarg;
                if match_found {
                    if opt.with_value {
                        if idx >= args.len() {
                            panic!("Missing value for argument '{}'", opt.name);
                        }
                        map.insert(opt.name, args[idx].clone());
                        idx += 1;
                    } else {
                        map.insert(opt.name, String::new());
                    }
                    break;
                }
            }
            if !match_found {
                panic!("Unknown option '{arg}'");
            }
        } else {
            final_args.push(arg.clone());
        }
    }

    for opt in arguments {
        if opt.required && !map.contains_key(opt.name) {
            panic!("Missing required argument '-{}'", opt.name);
        }
    }

    (map, final_args)
}
