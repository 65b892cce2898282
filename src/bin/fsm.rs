//! Demonstration and test application.
//! Usage:
//!    fsm scxmlfile [-trace flag]

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use scxml_interpreter::evaluator::NullEvaluator;
use scxml_interpreter::event::Event;
use scxml_interpreter::fsm::{InitOptions, StateChart};
use scxml_interpreter::tracer::{DefaultTracer, TraceMode};
use scxml_interpreter::{get_arguments, handle_trace, ArgOption};

fn main() {
    #[cfg(feature = "EnvLog")]
    env_logger::init();

    let trace_opt = ArgOption::new("trace").with_value();
    let (named_opt, final_args) = get_arguments(&[&trace_opt]);

    if final_args.is_empty() {
        println!("Missing argument. Please specify one or more scxml files");
        process::exit(1);
    }

    let mut tracer = DefaultTracer::new();
    if let Some(opt) = named_opt.get("trace") {
        handle_trace(&mut tracer, opt, true);
    } else {
        tracer.enable(TraceMode::States);
        tracer.enable(TraceMode::Events);
    }

    let evaluator = Box::new(NullEvaluator::new());
    let (document, warnings) = match scxml_interpreter::reader::read_from_xml_file(
        std::fs::File::open(&final_args[0]).unwrap_or_else(|e| {
            eprintln!("Cannot open '{}': {e}", final_args[0]);
            process::exit(1);
        }),
        evaluator.as_ref(),
    ) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed to read '{}': {e}", final_args[0]);
            process::exit(1);
        }
    };
    for warning in &warnings {
        eprintln!("Warning: {warning}");
    }

    let options = InitOptions {
        evaluator,
        tracer: Box::new(tracer),
        ..InitOptions::default()
    };
    let mut chart = StateChart::initialize(Arc::new(document), options);

    let mut line = String::new();
    let stdin = io::stdin();

    loop {
        let leaves = chart.active_leaf_states();
        if leaves.is_empty() {
            println!("\nSM finished!");
            break;
        }

        print!("\nEnter Event >>");
        let _ = io::stdout().flush();
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim_end_matches(['\n', '\r']);
                if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("help") {
                    println!(
                        r#"Usage:
To send events, type the name of the event and press enter.
Events are case sensitive.
To print this information enter 'help' or an empty line.
"#
                    );
                } else {
                    chart.send_event(Event::external(trimmed.to_string()));
                }
            }
            Err(e) => {
                eprintln!("Error: {e}. aborting...");
                process::exit(1);
            }
        }
    }
}
