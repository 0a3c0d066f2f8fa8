//! Avalanche effect analyzer
//!
//! Reads a DES or AES experiment trace and reports how many bits flip in
//! each round of every perturbed run compared to the control run.

use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::Level;

use avalanche_core::chart::{self, ChartOptions};
use avalanche_core::record::load_records;
use avalanche_core::{AnalysisEvent, CipherFamily, Criteria, analyze};

const RULE: &str =
    "================================================================================";

/// Avalanche effect analyzer
#[derive(Parser, Debug)]
#[command(name = "avalanche")]
#[command(author, version, about = "Measure the avalanche effect of block cipher round traces", long_about = None)]
struct Args {
    /// JSON experiment data (control run first, then perturbed runs)
    #[arg(short = 'f', long = "file")]
    file: PathBuf,

    /// Encryption method: DES (Feistel) or AES (SPN)
    #[arg(short = 'e', long = "encryption")]
    encryption: CipherFamily,

    /// Avalanche criteria: SPAC (plaintext) or SKAC (key)
    #[arg(short = 'c', long = "criteria")]
    criteria: Criteria,

    /// Directory the chart image is written to
    #[arg(long = "chart-dir", default_value = ".")]
    chart_dir: PathBuf,

    /// Do not render the chart
    #[arg(long = "no-chart")]
    no_chart: bool,

    /// Also write the results as JSON to this path
    #[arg(long = "json")]
    json: Option<PathBuf>,

    /// Print round-by-round progress while analysing
    #[arg(short = 'p', long = "progress")]
    progress: bool,

    /// Do not print the per-task tables
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Verbose (debug) logging
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::WARN })
        .with_ansi(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[+] ERROR: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    if !args.file.is_file() {
        return Err(format!(
            "File not found in path provided ({})",
            args.file.display()
        )
        .into());
    }

    let records = load_records(&args.file)?;
    let analysis = analyze(&records, args.encryption, args.criteria)?;

    if args.progress {
        for event in &analysis.events {
            print_event(event, args.encryption);
        }
    }

    if !args.quiet {
        analysis.results.print_summary();
    }

    if let Some(path) = &args.json {
        std::fs::write(path, analysis.results.to_json()?)?;
        println!("Results written to {}", path.display());
    }

    if !args.no_chart {
        let path = chart::save_chart(&analysis.results, &args.chart_dir, ChartOptions::default())?;
        println!("Chart written to {}", path.display());
        for (task, color) in chart::legend(&analysis.results) {
            println!("  {}  {task}", chart::hex_color(color));
        }
    }

    Ok(())
}

fn print_event(event: &AnalysisEvent, family: CipherFamily) {
    let state_label = match family {
        CipherFamily::Feistel => "Intermediate Cipher",
        CipherFamily::Spn => "Block State",
    };
    match event {
        AnalysisEvent::VariantStarted { task, context } => {
            println!("Task: {task}");
            let label = context.criteria.input_label();
            let bits = |b: &Option<String>| b.as_deref().unwrap_or("(not hex)").to_string();
            println!("Original {label} (in Binary): {}", bits(&context.original_bits));
            println!("Modified {label} (in Binary): {}", bits(&context.modified_bits));
            println!("{RULE}");
        }
        AnalysisEvent::RoundCompared {
            round_id,
            original_value,
            modified_value,
            bit_difference,
            ..
        } => {
            println!("[+] Round {round_id} Bit Difference");
            println!("\tOriginal {state_label}:");
            println!("\t{original_value}");
            println!("\tModified {state_label}:");
            println!("\t{modified_value}");
            println!("\tNumber of bit differences: {bit_difference}\n");
        }
        AnalysisEvent::FinalCompared {
            original_bits,
            modified_bits,
            bit_difference,
            ..
        } => {
            println!("Final Ciphertext (Original):   {original_bits}");
            println!("Final Ciphertext (Experiment): {modified_bits}");
            println!("Bit difference: {bit_difference}");
            println!("{RULE}");
        }
    }
}
