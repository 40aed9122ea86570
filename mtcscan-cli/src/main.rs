use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use mtcscan_core::{
    Detection, Detector, ImageReader, LogDiagnostics, PeImage, ProtectedHeader, SignatureTable,
};
use serde::Serialize;
use std::process::ExitCode;
use tabled::{settings::Style, Table, Tabled};

/// Detect the protector revision of a PE image and recover its unlock key
#[derive(Parser)]
#[command(
    name = "mtcscan",
    about = "Locate the protector control header in a PE image and recover its unlock key",
    version,
    author
)]
struct Cli {
    /// Path to binary file
    #[arg(required = true)]
    path: std::path::PathBuf,

    /// JSON signature table mapping fingerprint pairs to revisions
    #[arg(short, long, global = true)]
    signatures: Option<std::path::PathBuf>,

    /// Log search progress (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Identify the protector revision and unlock key
    Detect {
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all sections
    Sections,
    /// Dump de-scrambled words from the start of the control header
    Header {
        /// Number of 32-bit words to print
        #[arg(short, long, default_value_t = 16)]
        words: usize,
    },
}

#[derive(Serialize)]
struct Report {
    path: String,
    detected: bool,
    version: Option<String>,
    header_offset: Option<u64>,
    unlock_key: Option<String>,
    key_validated: Option<bool>,
    key_rva: Option<String>,
}

impl Report {
    fn new(path: String, header: Option<&ProtectedHeader>) -> Self {
        Self {
            path,
            detected: header.is_some(),
            version: header.map(|h| h.version().to_string()),
            header_offset: header.map(|h| h.header_offset()),
            unlock_key: header.map(|h| format!("{:#010x}", h.unlock_key())),
            key_validated: header.map(|h| h.key_validated()),
            key_rva: header.map(|h| format!("{:#x}", h.key_rva())),
        }
    }
}

#[derive(Tabled)]
struct SectionRow {
    #[tabled(rename = "Section")]
    name: String,
    #[tabled(rename = "RVA")]
    rva: String,
    #[tabled(rename = "VSize")]
    vsize: String,
    #[tabled(rename = "Offset")]
    offset: String,
    #[tabled(rename = "RawSize")]
    raw_size: String,
    #[tabled(rename = "Flags")]
    flags: String,
}

fn load_table(path: Option<&std::path::Path>) -> Result<SignatureTable> {
    let path = path.context("--signatures <FILE> is required for this command")?;
    SignatureTable::load(path)
}

fn detect(bin: &PeImage, table: &SignatureTable) -> Detection {
    Detector::new(table)
        .with_diagnostics(&LogDiagnostics)
        .detect(bin)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "warn" }),
    )
    .init();

    let bin = PeImage::open(&cli.path)?;
    log::debug!(
        "Opened {} ({} bytes, {} sections)",
        cli.path.display(),
        bin.len(),
        bin.sections().len()
    );

    match cli.command {
        Command::Detect { json } => {
            let table = load_table(cli.signatures.as_deref())?;
            let detection = detect(&bin, &table);
            let header = detection.header();

            if json {
                let report = Report::new(cli.path.display().to_string(), header);
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if let Some(h) = header {
                println!("{} {}", "Protected:".green().bold(), h.version());
                println!("Header offset: 0x{:x}", h.header_offset());
                let validity = if h.key_validated() {
                    "validated".green()
                } else {
                    "unvalidated".yellow()
                };
                println!("Unlock key:    {:#010x} ({})", h.unlock_key(), validity);
                println!("Key block RVA: {:#x}", h.key_rva());
            } else {
                println!("{}", "No known protector header found.".red());
            }

            if header.is_none() {
                return Ok(ExitCode::from(2));
            }
        }

        Command::Sections => {
            if bin.sections().is_empty() {
                println!("No sections found.");
            } else {
                let rows = bin.sections().iter().map(|s| SectionRow {
                    name: s.name.clone(),
                    rva: format!("0x{:x}", s.virtual_address),
                    vsize: format!("{:x}", s.virtual_size),
                    offset: format!("{:x}", s.file_offset),
                    raw_size: format!("{:x}", s.raw_size),
                    flags: format!("{:08x}", s.characteristics),
                });
                let mut table = Table::new(rows);
                table.with(Style::rounded());
                println!("{table}");
            }
        }

        Command::Header { words } => {
            let table = load_table(cli.signatures.as_deref())?;
            let Some(h) = detect(&bin, &table).into_header() else {
                println!("{}", "No known protector header found.".red());
                return Ok(ExitCode::from(2));
            };

            println!(
                "{} header at 0x{:x}, key {:#010x}",
                h.version(),
                h.header_offset(),
                h.unlock_key()
            );
            println!("{:<8} {:<10} {:<10}", "Offset", "Raw", "Clear");
            println!("{}", "-".repeat(30));
            for offset in (0..words).map(|i| i * 4) {
                let (Some(raw), Some(clear)) = (h.read_u32(offset), h.descramble(offset)) else {
                    break;
                };
                println!("0x{:<6x} {:08x}   {:08x}", offset, raw, clear);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
