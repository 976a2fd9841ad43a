use clap::Parser;
use env_logger::Builder;
use log::{error, LevelFilter};
use std::path::PathBuf;
use std::process;

use peview::pe::PeHeaders;

/// peview
/// Inspect the header region of a Windows PE file
#[derive(Parser)]
#[command(name = "peview")]
#[command(version = "0.1.0")]
#[command(about = "Inspect the header region of a Windows PE file", long_about = None)]
struct Args {
    /// Input PE file path
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logger based on verbosity
    let mut builder = Builder::new();
    builder.filter_level(if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
    builder.init();

    // Decode first, report after; the dump never interleaves with reads
    match PeHeaders::from_file(&args.input) {
        Ok(headers) => print!("{}", headers),
        Err(e) => {
            error!("Error reading {}: {}", args.input.display(), e);
            process::exit(1);
        }
    }
}
