use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use pdf_autoproc::{CycleReport, Ledger, Pipeline, PipelineConfig, ProcessingResult};
use std::path::{Path, PathBuf};

mod logger;

use logger::AppLogger;

/// Configuration read when `--config` is not given, if present
const DEFAULT_CONFIG_FILE: &str = "autoproc.json";

/// Log entries kept in memory for the end-of-run summary
const LOG_MEMORY: usize = 1000;

#[derive(Parser)]
#[command(
    name = "autoproc",
    about = "Stamp and impose scanned PDFs dropped into an inbox",
    version
)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the inbox until interrupted with Ctrl-C
    Run,

    /// Run a single poll cycle and exit
    Once,

    /// Process one archive now, even if it was processed before
    Process {
        /// ZIP archive to process
        archive: PathBuf,
    },

    /// List inbox archives that are not yet processed
    Scan,

    /// Show the ledger and inbox state
    Status {
        /// Number of recent ledger records to show
        #[arg(long, default_value = "10")]
        recent: usize,
    },

    /// Remove every scratch folder, including ones kept after failures
    Clean,

    /// Write a configuration file with every default filled in
    InitConfig {
        /// Destination file
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Stamp a single PDF with the processed mark
    Stamp {
        /// Input PDF file
        #[arg(short, long)]
        input: PathBuf,

        /// Output PDF file
        #[arg(short, long)]
        output: PathBuf,

        /// Stamp text; `{date}` is replaced by the date
        #[arg(long)]
        text: Option<String>,

        /// Corner to place the stamp in
        #[arg(long, value_enum)]
        corner: Option<CornerArg>,

        /// Date to stamp (YYYY-MM-DD), today if omitted
        #[arg(long)]
        date: Option<chrono::NaiveDate>,
    },

    /// Impose a single PDF two pages per sheet
    Impose {
        /// Input PDF file
        #[arg(short, long)]
        input: PathBuf,

        /// Output PDF file
        #[arg(short, long)]
        output: PathBuf,

        /// Sheet size: B5, B5-ISO, A4, ... or WIDTHxHEIGHT in mm
        #[arg(long)]
        paper: Option<String>,

        /// Sheet orientation
        #[arg(long, value_enum)]
        orientation: Option<OrientationArg>,

        /// How the two pages share the sheet
        #[arg(long, value_enum)]
        arrangement: Option<ArrangementArg>,

        /// Show statistics only, don't generate PDF
        #[arg(long)]
        stats_only: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CornerArg {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Clone, Copy, ValueEnum)]
enum OrientationArg {
    Portrait,
    Landscape,
}

#[derive(Clone, Copy, ValueEnum)]
enum ArrangementArg {
    SideBySide,
    Stacked,
}

impl From<CornerArg> for pdf_stamp::Corner {
    fn from(arg: CornerArg) -> Self {
        match arg {
            CornerArg::TopLeft => Self::TopLeft,
            CornerArg::TopRight => Self::TopRight,
            CornerArg::BottomLeft => Self::BottomLeft,
            CornerArg::BottomRight => Self::BottomRight,
        }
    }
}

impl From<OrientationArg> for pdf_impose::Orientation {
    fn from(arg: OrientationArg) -> Self {
        match arg {
            OrientationArg::Portrait => Self::Portrait,
            OrientationArg::Landscape => Self::Landscape,
        }
    }
}

impl From<ArrangementArg> for pdf_impose::Arrangement {
    fn from(arg: ArrangementArg) -> Self {
        match arg {
            ArrangementArg::SideBySide => Self::SideBySide,
            ArrangementArg::Stacked => Self::Stacked,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { path, force } = &cli.command {
        return init_config(path, *force).await;
    }

    let mut config = load_config(cli.config.as_deref()).await?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    let logger = AppLogger::from_config(&config.logging, LOG_MEMORY)
        .context("Failed to open log file")?;
    logger.clone().init()?;

    let outcome = run_command(cli.command, config).await;

    let (warnings, errors) = logger.problem_counts();
    if warnings + errors > 0 {
        eprintln!("{} warning(s) and {} error(s) logged", warnings, errors);
    }
    log::logger().flush();
    outcome
}

async fn run_command(command: Commands, config: PipelineConfig) -> Result<()> {
    match command {
        Commands::Run => {
            pdf_autoproc::run_forever(config).await?;
        }

        Commands::Once => {
            let pipeline = Pipeline::new(config).await?;
            let report = pipeline.run_cycle().await?;
            let handled = report.succeeded + report.failed;
            let results: Vec<_> = pipeline.last_results().into_iter().take(handled).collect();
            print_results(&results);
            print_report(&report);
            if report.failed > 0 {
                bail!("{} archive(s) failed", report.failed);
            }
        }

        Commands::Process { archive } => {
            let pipeline = Pipeline::new(config).await?;
            let result = pipeline.process_one(&archive).await;
            print_results(std::slice::from_ref(&result));
            if !result.is_success() {
                bail!("Processing {} failed", archive.display());
            }
        }

        Commands::Scan => {
            let pipeline = Pipeline::new(config).await?;
            let pending = pipeline.pending_archives().await?;
            if pending.is_empty() {
                println!("No pending archives");
            }
            for item in pending {
                println!("{}  {}", item.fingerprint.short(), item.source_path.display());
            }
        }

        Commands::Status { recent } => {
            let pipeline = Pipeline::new(config).await?;
            let pending = pipeline.pending_archives().await?;
            let status = pipeline.status();
            let config = pipeline.config();
            let layout = pipeline.layout();

            println!("Inbox:   {}", config.inbox_path.display());
            println!("Output:  {}", config.output_path.display());
            println!(
                "Sheet:   {} {:?} {:?}",
                layout.paper, layout.orientation, layout.arrangement
            );
            println!(
                "Printing: {}",
                if config.print_enabled { "on" } else { "off" }
            );
            println!("Recorded archives: {}", status.ledger_records);
            println!("Pending archives:  {}", pending.len());

            let ledger = Ledger::open(&config.ledger_path).await?;
            let records = ledger.records();
            if !records.is_empty() && recent > 0 {
                println!("Recently processed:");
                for record in records.iter().rev().take(recent) {
                    println!(
                        "  {}  {}  {}",
                        record.processed_at.format("%Y-%m-%d %H:%M:%S"),
                        record.fingerprint.short(),
                        record.archive.as_deref().unwrap_or("-")
                    );
                }
            }
        }

        Commands::Clean => {
            let pipeline = Pipeline::new(config).await?;
            let removed = pipeline.clean_scratch().await?;
            println!("Removed {} scratch folder(s)", removed);
        }

        Commands::InitConfig { path, force } => {
            init_config(&path, force).await?;
        }

        Commands::Stamp {
            input,
            output,
            text,
            corner,
            date,
        } => {
            let mut spec = config.stamp_spec();
            if let Some(text) = text {
                spec.text_template = text;
            }
            if let Some(corner) = corner {
                spec.corner = corner.into();
            }
            let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());

            let document = pdf_impose::load_pdf(&input).await?;
            let stamped = pdf_stamp::stamp_document(&document, &spec, date)?;
            pdf_impose::save_pdf(stamped, &output).await?;
            println!(
                "Stamped {} page(s) with \"{}\" → {}",
                document.get_pages().len(),
                spec.render_text(date)?,
                output.display()
            );
        }

        Commands::Impose {
            input,
            output,
            paper,
            orientation,
            arrangement,
            stats_only,
        } => {
            let mut config = config;
            if let Some(paper) = paper {
                config.sheet_size = paper;
            }
            if let Some(orientation) = orientation {
                config.sheet_orientation = orientation.into();
            }
            if let Some(arrangement) = arrangement {
                config.arrangement = arrangement.into();
            }
            let layout = config.sheet_layout()?;

            let document = pdf_impose::load_pdf(&input).await?;

            // Calculate and show statistics
            let stats = pdf_impose::calculate_statistics(&document)?;
            println!("Imposition Statistics:");
            println!("  Source pages: {}", stats.source_pages);
            println!("  Output sheets: {}", stats.output_sheets);
            println!("  Blank slots: {}", stats.blank_slots);

            if stats_only {
                return Ok(());
            }

            let imposed = pdf_impose::impose(&document, &layout).await?;
            pdf_impose::save_pdf(imposed, &output).await?;
            println!("Imposed on {} → {}", layout.paper, output.display());
        }
    }

    Ok(())
}

/// Explicit file, else `autoproc.json` in the working folder, else defaults
async fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let path = match path {
        Some(path) => path,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Path::new(DEFAULT_CONFIG_FILE),
        None => return Ok(PipelineConfig::default()),
    };
    let config = PipelineConfig::load(path).await?;
    Ok(config)
}

async fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    PipelineConfig::default().save(path).await?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn print_results(results: &[ProcessingResult]) {
    for result in results.iter().rev() {
        println!("{}", result);
        for output in &result.outputs {
            println!("  → {}", output.display());
        }
    }
}

fn print_report(report: &CycleReport) {
    println!(
        "{} archive(s) found: {} processed, {} failed, {} already done",
        report.scanned, report.succeeded, report.failed, report.skipped
    );
}
