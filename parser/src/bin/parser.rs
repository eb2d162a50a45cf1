use parser::parse_source;
use std::env;
use std::fs;
use std::process::exit;

fn main() {
    let mut args = env::args().skip(1);
    let input = match args.next() {
        Some(v) => v,
        None => {
            eprintln!("usage: parser <input> [output.dot]");
            exit(2);
        }
    };
    let output = args.next();
    if args.next().is_some() {
        eprintln!("usage: parser <input> [output.dot]");
        exit(2);
    }

    let source = match fs::read_to_string(&input) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("failed to read {}: {}", input, err);
            exit(1);
        }
    };

    let unit = match parse_source(&source) {
        Ok(unit) => unit,
        Err(err) => {
            eprintln!("{}:{}: {}", input, err.span.start, err.message);
            exit(1);
        }
    };

    let dot = unit.to_dot();
    match output {
        Some(output) => {
            if let Err(err) = fs::write(&output, dot) {
                eprintln!("failed to write {}: {}", output, err);
                exit(1);
            }
        }
        None => print!("{}", dot),
    }
}
