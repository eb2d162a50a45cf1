use clap::Parser as ClapParser;
use std::{
    fs,
    path::{Path, PathBuf},
    process,
};

use analysis::{Analysis, AnalysisError, Layout, analyze};
use log::{LevelFilter, debug, info};
use parser::{CompilationUnit, ParseError, parse_source};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Source files, each analysed as its own compilation unit
    #[arg(required = true, help = "The class definition files to analyse")]
    files: Vec<PathBuf>,

    /// Print the parsed AST as a Graphviz graph
    #[arg(long, help = "Dump the AST in dot format")]
    dump_ast: bool,

    /// Print the analysed scope tree
    #[arg(long, help = "Dump scopes with their variables and captures")]
    dump_scopes: bool,

    /// Print the layout handed to code generation
    #[arg(long, help = "Dump frames, entry points and class templates")]
    dump_layout: bool,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let mut builder = env_logger::Builder::from_default_env();
    let level = match verbose {
        0 => None,
        1 => Some(LevelFilter::Info),
        2 => Some(LevelFilter::Debug),
        _ => Some(LevelFilter::Trace),
    };
    if let Some(level) = level {
        builder.filter_level(level);
    }
    builder.format_timestamp(None).init();
}

fn parse_error(file: &str, err: &ParseError) -> String {
    format!("{}:{}: {}", file, err.span.start, err.message)
}

fn analysis_error(file: &str, err: &AnalysisError) -> String {
    match err.span {
        Some(span) => format!("{}:{}: {}", file, span.start, err.kind),
        None => format!("{}: {}", file, err.kind),
    }
}

fn analyse_file(cli: &Cli, path: &Path) -> Result<(), String> {
    let file = path.display().to_string();
    let source =
        fs::read_to_string(path).map_err(|err| format!("error reading file '{}': {}", file, err))?;

    info!("parsing {}", file);
    let unit: CompilationUnit = parse_source(&source).map_err(|err| parse_error(&file, &err))?;
    debug!("{} classes in {}", unit.classes.len(), file);
    if cli.dump_ast {
        print!("{}", unit.to_dot());
    }

    let analysis: Analysis = analyze(&unit).map_err(|err| analysis_error(&file, &err))?;
    if cli.dump_scopes {
        println!("== {} scopes ==", file);
        print!("{}", analysis.dump_scopes());
    }
    if cli.dump_layout {
        println!("== {} layout ==", file);
        print!("{}", Layout::build(&unit, &analysis));
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    for path in &cli.files {
        if let Err(message) = analyse_file(&cli, path) {
            eprintln!("{}", message);
            process::exit(1);
        }
    }
}
