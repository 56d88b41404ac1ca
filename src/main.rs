use std::io::Read;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use dupe_guard::{AnalysisResult, Config};

// Background colours for palette slots 0..PALETTE_SIZE (256-colour ANSI).
const ANSI_BACKGROUNDS: [u8; dupe_guard::PALETTE_SIZE] = [229, 157, 153, 183, 218, 223];

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Text,
}

#[derive(Parser)]
#[command(
    name = "dupe-guard",
    about = "Find near-duplicate sentences in prose",
    version
)]
struct Cli {
    /// File paths to analyze (reads stdin if none provided)
    files: Vec<String>,

    /// JSON file with detector settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Similarity threshold for grouping sentences (0.0 - 1.0)
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Ignore lines and sentences this many characters long or shorter
    #[arg(short = 'm', long)]
    min_length: Option<usize>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Json)]
    format: Format,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(cli: &Cli) -> dupe_guard::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };
    if let Some(threshold) = cli.threshold {
        config.threshold = threshold;
    }
    if let Some(min_length) = cli.min_length {
        config.min_sentence_chars = min_length;
    }
    config.validate()?;
    Ok(config)
}

fn render_text(text: &str, result: &AnalysisResult) -> String {
    let mut out = String::new();
    for span in dupe_guard::highlight(text, &result.duplicates) {
        match span.color {
            Some(slot) => {
                out.push_str(&format!(
                    "\x1b[48;5;{}m\x1b[30m{}\x1b[0m",
                    ANSI_BACKGROUNDS[slot], span.text
                ));
            }
            None => out.push_str(span.text),
        }
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&format!(
        "-- {} sentences, {} duplicate groups, {} highlighted ranges\n",
        result.sentence_count,
        result.group_count,
        result.duplicates.len()
    ));
    out
}

fn report(text: &str, config: &Config, format: Format) {
    let result = match dupe_guard::analyze_with(text, config) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    match format {
        Format::Json => match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing result: {e}");
                std::process::exit(1);
            }
        },
        Format::Text => print!("{}", render_text(text, &result)),
    }
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = load_config(&cli).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    if cli.files.is_empty() {
        let mut input = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut input) {
            eprintln!("Error reading stdin: {e}");
            std::process::exit(1);
        }
        report(&input, &config, cli.format);
    } else {
        for path in &cli.files {
            let text = std::fs::read_to_string(path).unwrap_or_else(|e| {
                eprintln!("Error reading {path}: {e}");
                std::process::exit(1);
            });
            report(&text, &config, cli.format);
        }
    }
}
