use std::cell::RefCell;
use std::rc::Rc;

use clap::Parser as CParser;
use log::error;
use tsar_lang::runtime::{ExecMode, StdoutSink};

#[derive(CParser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(short, long)]
    file: std::path::PathBuf,

    /// Interpret the program (the default).
    #[arg(short, long)]
    run: bool,

    /// Compile to the in-memory instruction stream and run that.
    #[arg(short, long)]
    compile: bool,

    /// Type check only; no code runs.
    #[arg(long)]
    check: bool,
}

fn main() -> anyhow::Result<()> {
    simple_logger::init_with_level(log::Level::Warn)?;
    let args = Cli::parse();

    if args.check {
        let source = std::fs::read_to_string(&args.file)?;
        if let Err(check_error) = tsar_lang::check_source(&source) {
            error!("{check_error}");
            std::process::exit(-1);
        }
        return Ok(());
    }

    let mode = if args.compile {
        ExecMode::Compile
    } else {
        ExecMode::Interpret
    };
    let _ = args.run;

    let sink = Rc::new(RefCell::new(StdoutSink));
    if let Err(run_error) = tsar_lang::run_file(&args.file, mode, sink) {
        error!("{run_error}");
        std::process::exit(-1);
    }

    Ok(())
}
