//! Dumps a parsed SCXML document as a JSON summary (§6, the `scxml_to_fsm`
//! tool). Usage:
//!    scxml_to_fsm scxmlfile [-o outfile]

use std::fs::File;
use std::io::Write;
use std::process;

use scxml_interpreter::evaluator::NullEvaluator;
use scxml_interpreter::serialize::summarize;
use scxml_interpreter::{get_arguments, ArgOption};

fn main() {
    let out_opt = ArgOption::new("o").with_value();
    let (named_opt, final_args) = get_arguments(&[&out_opt]);

    if final_args.is_empty() {
        println!("Missing argument. Please specify an scxml file");
        process::exit(1);
    }

    let evaluator = NullEvaluator::new();
    let file = File::open(&final_args[0]).unwrap_or_else(|e| {
        eprintln!("Cannot open '{}': {e}", final_args[0]);
        process::exit(1);
    });

    let (document, warnings) = scxml_interpreter::reader::read_from_xml_file(file, &evaluator).unwrap_or_else(|e| {
        eprintln!("Failed to read '{}': {e}", final_args[0]);
        process::exit(1);
    });
    for warning in &warnings {
        eprintln!("Warning: {warning}");
    }

    let summary = summarize(&document);
    let json = serde_json::to_string_pretty(&summary).expect("summary is always serializable");

    match named_opt.get("o") {
        Some(path) => {
            let mut file = File::create(path).unwrap_or_else(|e| {
                eprintln!("Cannot create '{path}': {e}");
                process::exit(1);
            });
            file.write_all(json.as_bytes()).expect("write to output file");
        }
        None => println!("{json}"),
    }
}
