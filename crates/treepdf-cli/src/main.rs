#![allow(
    clippy::needless_pass_by_value,    // clap hands over owned values
    clippy::fn_params_excessive_bools, // convert has several on/off flags
)]

//! treepdf - convert a directory tree or archive into one PDF
//!
//! Every file below the input is converted through the configured converter
//! chain; archives are opened and walked like directories. Each page of the
//! result is labelled with the name of the file it came from.

mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use env_logger::Env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use treepdf_archive::path::folder_name;
use treepdf_archive::{ArchiveFormat, ArchiveGuard, ArchiveLimits, ByteSource, DriverStatus};
use treepdf_backend::{ConversionReport, ConverterChain, ConverterStatus, Pipeline, Stage};
use treepdf_core::size::{format_size, parse_size};
use treepdf_core::Settings;
use treepdf_pdf::{FontCatalog, PdfSynthesizer, SynthesizerOptions};

/// Verbosity level for output control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    const fn from_flags(quiet: bool, verbose: bool) -> Self {
        if quiet {
            Self::Quiet
        } else if verbose {
            Self::Verbose
        } else {
            Self::Normal
        }
    }

    /// Default log filter; `RUST_LOG` still wins
    const fn log_filter(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "warn",
            Self::Verbose => "info",
        }
    }

    const fn should_show_output(self) -> bool {
        !matches!(self, Self::Quiet)
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "treepdf",
    about = "Convert a directory tree or archive into one labelled PDF",
    version
)]
struct Args {
    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show detailed processing information
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Settings file (replaces ~/.treepdf.toml and ./.treepdf.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert a directory or archive into one PDF
    #[command(long_about = "Convert a directory or archive into one PDF.\n\
                      \n\
                      Archives (zip, tar, tar.gz, tar.bz2, 7z) are walked like directories,\n\
                      nested ones included. Files that cannot be converted are replaced by\n\
                      an error page, so one broken file never aborts the run.")]
    Convert {
        /// Directory, archive or single file
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output file (default: INPUT name with .pdf, in the current directory)
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Overwrite an existing output file
        #[arg(short, long)]
        force: bool,

        /// Refuse archives whose uncompressed size exceeds SIZE (e.g. 100M)
        #[arg(long, value_name = "SIZE", value_parser = parse_size)]
        archive_size_limit: Option<u64>,

        /// Maximum number of nested archive levels
        #[arg(long, value_name = "N")]
        max_depth: Option<usize>,

        /// Convert archives as files instead of opening them
        #[arg(long)]
        no_archives: bool,

        /// Do not stamp page labels
        #[arg(long)]
        no_labels: bool,

        /// Converter tried first for every file
        #[arg(long, value_name = "PROGRAM")]
        universal: Option<String>,

        /// Converter tried after every other converter failed
        #[arg(long, value_name = "PROGRAM")]
        fallback: Option<String>,

        /// Number of files converted concurrently
        #[arg(short = 'j', long, value_name = "N")]
        jobs: Option<usize>,

        /// Write a JSON report of the run to FILE
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,

        /// Exit with status 2 when any file needed an error page
        #[arg(long)]
        strict: bool,
    },

    /// List the fonts available for labels and generated pages
    Fonts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a one-page font sample
    Sample {
        /// Text to render
        #[arg(value_name = "TEXT")]
        text: String,

        /// Font identifier (see `treepdf fonts`)
        #[arg(long, default_value = "helvetica")]
        font: String,

        /// Font size in points
        #[arg(long, default_value_t = 24.0)]
        size: f32,

        /// Output file
        #[arg(short, long, value_name = "OUTPUT")]
        output: PathBuf,
    },

    /// Show what an archive contains without converting it
    Inspect {
        /// Archive file
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// Size limit applied when opening (default: archive.size_limit)
        #[arg(long, value_name = "SIZE", value_parser = parse_size)]
        size_limit: Option<u64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the archive formats and the mime-types they are recognised by
    Formats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the configured converter chain and which programs are installed
    Converters {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let args = Args::parse();
    let verbosity = Verbosity::from_flags(args.quiet, args.verbose);
    env_logger::Builder::from_env(Env::default().default_filter_or(verbosity.log_filter()))
        .target(env_logger::Target::Stderr)
        .init();

    match run(args, verbosity) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {e:#}", "Error:".red().bold());
            std::process::exit(1);
        }
    }
}

fn run(args: Args, verbosity: Verbosity) -> Result<i32> {
    let settings = config::load(args.config.as_deref())?;
    match args.command {
        Commands::Convert {
            input,
            output,
            force,
            archive_size_limit,
            max_depth,
            no_archives,
            no_labels,
            universal,
            fallback,
            jobs,
            report,
            strict,
        } => {
            let mut settings = settings;
            if archive_size_limit.is_some() {
                settings.archive.size_limit = archive_size_limit;
            }
            if let Some(depth) = max_depth {
                settings.archive.max_depth = depth;
            }
            if no_archives {
                settings.archive.enabled = false;
            }
            if no_labels {
                settings.pdf.page_labels = false;
            }
            if universal.is_some() {
                settings.converters.universal = universal;
            }
            if fallback.is_some() {
                settings.converters.fallback = fallback;
            }
            if let Some(jobs) = jobs {
                settings.pipeline.jobs = jobs;
            }
            let output = output.unwrap_or_else(|| default_output(&input));
            cmd_convert(&settings, &input, &output, force, report.as_deref(), verbosity)
                .map(|report| if strict && report.error_pages() > 0 { 2 } else { 0 })
        }
        Commands::Fonts { json } => cmd_fonts(&settings, json).map(|()| 0),
        Commands::Sample {
            text,
            font,
            size,
            output,
        } => cmd_sample(&settings, &text, &font, size, &output, verbosity).map(|()| 0),
        Commands::Inspect {
            archive,
            size_limit,
            json,
        } => cmd_inspect(&settings, &archive, size_limit, json).map(|()| 0),
        Commands::Formats { json } => cmd_formats(json).map(|()| 0),
        Commands::Converters { json } => cmd_converters(&settings, json).map(|()| 0),
    }
}

/// `docs/` becomes `docs.pdf`, `backup.tar.gz` becomes `backup.pdf`
fn default_output(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map_or_else(|| "output".to_string(), |n| folder_name(&n.to_string_lossy()));
    PathBuf::from(format!("{name}.pdf"))
}

/// Whether both paths name the same existing file
fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn synthesizer(settings: &Settings) -> Result<PdfSynthesizer> {
    let catalog = Arc::new(FontCatalog::new(settings.pdf.font_dir.clone()));
    let options = SynthesizerOptions {
        label_font: settings.pdf.page_label_font.clone(),
        generated_font: settings.pdf.generated_pages_font.clone(),
        label_size: settings.pdf.label_font_size,
    };
    PdfSynthesizer::new(catalog, &options).context("Invalid [pdf] settings")
}

fn cmd_convert(
    settings: &Settings,
    input: &Path,
    output: &Path,
    force: bool,
    report_path: Option<&Path>,
    verbosity: Verbosity,
) -> Result<ConversionReport> {
    for target in std::iter::once(output).chain(report_path) {
        if is_same_file(input, target) {
            bail!(
                "{} is the input; choose another output path",
                target.display()
            );
        }
    }
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }

    let pipeline = Pipeline::from_settings(settings)?;
    let result = pipeline
        .run(input)
        .with_context(|| format!("Failed to convert {}", input.display()))?;
    fs::write(output, &result.pdf)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let report = result.report;
    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    }

    if verbosity.should_show_output() {
        for diagnostic in &report.diagnostics {
            eprintln!(
                "{} {}: {}: {}",
                "Warning:".yellow().bold(),
                diagnostic.path,
                diagnostic.kind,
                diagnostic.message
            );
            for attempt in &diagnostic.attempts {
                eprintln!("  {attempt}");
            }
        }
        println!(
            "{} {} ({} pages from {} files, {} error pages)",
            "Wrote".green().bold(),
            output.display(),
            report.pages,
            report.documents,
            report.error_pages()
        );
    }
    Ok(report)
}

fn cmd_fonts(settings: &Settings, json: bool) -> Result<()> {
    let catalog = FontCatalog::new(settings.pdf.font_dir.clone());
    let fonts = catalog.fonts();
    if json {
        println!("{}", serde_json::to_string_pretty(fonts)?);
        return Ok(());
    }
    println!("{:<14} {:<24} FLAGS", "FONT", "BASE FONT");
    for font in fonts {
        println!(
            "{:<14} {:<24} {}",
            font.id(),
            font.base_font,
            font.flags.names().join(",")
        );
    }
    Ok(())
}

fn cmd_sample(
    settings: &Settings,
    text: &str,
    font: &str,
    size: f32,
    output: &Path,
    verbosity: Verbosity,
) -> Result<()> {
    let synth = synthesizer(settings)?;
    let pdf = synth
        .render_sample(text, font, size)
        .with_context(|| format!("Failed to render sample in font '{font}'"))?;
    fs::write(output, pdf).with_context(|| format!("Failed to write {}", output.display()))?;
    if verbosity.should_show_output() {
        println!("{} {}", "Wrote".green().bold(), output.display());
    }
    Ok(())
}

fn cmd_inspect(settings: &Settings, archive: &Path, size_limit: Option<u64>, json: bool) -> Result<()> {
    if !archive.is_file() {
        bail!("{} is not a file", archive.display());
    }
    let name = archive
        .file_name()
        .map_or_else(|| archive.display().to_string(), |n| n.to_string_lossy().into_owned());
    let source = ByteSource::file(archive).with_name(name);

    let mut guard = ArchiveGuard::new(ArchiveLimits::new(settings.archive.size_limit));
    guard.open(&source, size_limit)?;
    let format = guard.format()?;
    let size = guard.uncompressed_size()?;
    let folder = guard.folder_name()?;
    let top_level = guard.top_level_folder()?;
    let entries = guard.entries()?.to_vec();
    guard.close();

    if json {
        let value = serde_json::json!({
            "format": format,
            "uncompressed_size": size,
            "folder_name": folder,
            "top_level_folder": top_level,
            "entries": entries,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    println!("Format:            {format}");
    println!("Uncompressed size: {}", format_size(size));
    println!("Folder name:       {folder}");
    println!("Top-level folder:  {}", top_level.as_deref().unwrap_or("-"));
    println!("Entries:           {}", entries.len());
    for entry in &entries {
        println!("  {entry}");
    }
    Ok(())
}

fn cmd_formats(json: bool) -> Result<()> {
    if json {
        let value: Vec<_> = ArchiveFormat::ALL
            .iter()
            .map(|format| {
                serde_json::json!({
                    "format": format,
                    "status": format.driver_status(),
                    "mime_types": format.mime_types(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    println!("{:<9} {:<12} MIME-TYPES", "FORMAT", "STATUS");
    for format in ArchiveFormat::ALL {
        let status = match format.driver_status() {
            DriverStatus::Supported => format!("{:<12}", "supported").green(),
            DriverStatus::Unsupported => format!("{:<12}", "unsupported").yellow(),
        };
        println!("{:<9} {status} {}", format.to_string(), format.mime_types().join(", "));
    }
    Ok(())
}

fn cmd_converters(settings: &Settings, json: bool) -> Result<()> {
    let synth = Arc::new(synthesizer(settings)?);
    let chain = ConverterChain::from_settings(&settings.converters, &synth);
    let entries = chain.describe();
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("Status of the configured Converters");
    if entries.is_empty() {
        println!("  (none)");
        return Ok(());
    }
    let mut last_mime: Option<&str> = None;
    for entry in &entries {
        let heading = match entry.stage {
            Stage::Universal => Some("Universal converter".to_string()),
            Stage::Fallback => Some("Fallback converter".to_string()),
            Stage::Specific => {
                let mime = entry.mime_type.as_deref().unwrap_or_default();
                (last_mime != Some(mime)).then(|| {
                    let alternatives = chain.converters_for(mime).len();
                    if alternatives > 1 {
                        format!("{mime} (alternatives: {alternatives})")
                    } else {
                        mime.to_string()
                    }
                })
            }
        };
        if let Some(heading) = heading {
            println!("{}", heading.bold());
        }
        last_mime = entry.mime_type.as_deref();

        let status = match &entry.status {
            ConverterStatus::Available => "ok".green(),
            ConverterStatus::Missing(program) => {
                format!("Please install the \"{program}\" program on the server.").red()
            }
        };
        println!("  {:<40} {:<18} {status}", entry.converter, entry.kind.describe());
    }
    Ok(())
}
