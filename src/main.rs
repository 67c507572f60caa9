//! mathpool - convert TeX and MathML to SVG through pooled renderer processes.

use anyhow::{Context, Result, bail};
use clap::Parser;
use mathpool::cli::{self, Cli, Commands, Verbosity};
use mathpool::equation::{ConversionResult, Equation, InputFormat};
use mathpool::logging::{self, LogConfig};
use mathpool::output::{self, BatchOutcome, BatchReport, Outcome, TableOptions};
use mathpool::pool::WorkerPool;
use mathpool::theme::{self, Themed};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info};

/// Program entry point: parses arguments, dispatches the subcommand and
/// prints the error chain on failure before exiting with status 1.
fn main() {
    let cli = Cli::parse();

    // Affects both owo_colors and comfy_table
    if cli.no_color {
        theme::disable_colors();
    }
    init_logging(&cli);

    let result = match &cli.command {
        Commands::Convert(args) => cmd_convert(&cli, args),
        Commands::Batch(args) => cmd_batch(&cli, args),
        Commands::Completions(args) => {
            args.generate();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "error".error_style(), e);
        for cause in e.chain().skip(1) {
            eprintln!("  {}: {}", "caused by".label(), cause);
        }
        std::process::exit(1);
    }
}

/// `-v`/`-q` pick the filter; `MATHPOOL_LOG*` variables fill in the rest.
fn init_logging(cli: &Cli) {
    let mut config = LogConfig::new().with_thread_names(cli.verbosity() >= Verbosity::Trace);
    if let Some(filter) = cli.log_filter() {
        config = config.with_filter(filter.to_string());
    }
    logging::init(config.with_env_overrides());
}

fn open_pool(cli: &Cli) -> Result<WorkerPool> {
    let renderer = cli.renderer.to_config();
    let config = cli.pool.to_config();
    debug!(
        launcher = ?renderer.launcher,
        renderer = %renderer.executable.display(),
        max_instances = config.max_instances,
        "Opening renderer pool"
    );
    WorkerPool::with_renderer(renderer, config).context("Failed to create renderer pool")
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read from stdin")?;
    Ok(buf)
}

/// Converts a single equation and prints its SVG (or MathML).
fn cmd_convert(cli: &Cli, args: &cli::ConvertArgs) -> Result<()> {
    let content = match args.content.as_deref() {
        None | Some("-") => read_stdin()?,
        Some(text) => text.to_string(),
    };
    if content.trim().is_empty() {
        bail!("No equation given");
    }

    let font = Some(args.font.as_str());
    let equation = match InputFormat::from(args.format) {
        InputFormat::Mathml => Equation::from_mathml(&content, font),
        format => Equation::new(format, content).with_font(font),
    };

    let pool = open_pool(cli)?;
    let result = pool.convert(&equation);
    pool.shutdown();
    let result = result?;

    if args.mathml {
        println!("{}", result.mathml());
    } else {
        println!("{}", result.svg());
    }
    Ok(())
}

/// Converts every equation in a JSON-lines file and prints a report.
fn cmd_batch(cli: &Cli, args: &cli::BatchArgs) -> Result<()> {
    if args.threads == 0 {
        bail!("--threads must be at least 1");
    }

    let input = if args.input == Path::new("-") {
        read_stdin()?
    } else {
        std::fs::read_to_string(&args.input)
            .with_context(|| format!("Failed to read {}", args.input.display()))?
    };
    let equations = parse_batch(&input)?;

    let pool = open_pool(cli)?;
    info!(
        equations = equations.len(),
        threads = args.threads,
        "Starting batch"
    );
    let start = Instant::now();
    let results = run_batch(&equations, args.threads, |equation| pool.convert(equation));
    let report = BatchReport {
        results,
        status: pool.status(),
    };
    pool.shutdown();
    info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        converted = report.count("converted"),
        "Batch finished"
    );

    output::print_report(
        &report,
        args.output.into(),
        TableOptions { ascii: args.ascii },
    );
    Ok(())
}

/// Parse JSON-lines input into `(line number, equation)` pairs.
///
/// Blank lines are skipped. MathML carrying a TeX annotation is converted
/// from the TeX.
fn parse_batch(input: &str) -> Result<Vec<(usize, Equation)>> {
    let mut equations = Vec::new();
    for (index, line) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let equation: Equation = serde_json::from_str(line)
            .with_context(|| format!("Invalid equation on line {line_no}"))?;
        if !equation.is_font_valid() {
            bail!("Unknown font '{}' on line {line_no}", equation.font());
        }
        let equation = match equation.format() {
            InputFormat::Mathml => {
                Equation::from_mathml(equation.content(), Some(equation.font()))
            }
            _ => equation,
        };
        equations.push((line_no, equation));
    }
    Ok(equations)
}

/// Feed equations to `threads` callers sharing one converter.
///
/// A panic on any caller thread is re-raised once the others finish.
fn run_batch<F>(equations: &[(usize, Equation)], threads: usize, convert: F) -> Vec<BatchOutcome>
where
    F: Fn(&Equation) -> mathpool::Result<Arc<ConversionResult>> + Sync,
{
    let (work_tx, work_rx) = crossbeam_channel::unbounded();
    for item in equations {
        let _ = work_tx.send(item);
    }
    drop(work_tx);

    let convert = &convert;
    let callers = threads.min(equations.len()).max(1);
    let mut results: Vec<BatchOutcome> = thread::scope(|scope| {
        let handles: Vec<_> = (0..callers)
            .map(|_| {
                let work_rx = work_rx.clone();
                scope.spawn(move || {
                    let mut done = Vec::new();
                    for (line, equation) in work_rx.iter() {
                        let started = Instant::now();
                        let outcome = match convert(equation) {
                            Ok(result) => Outcome::Converted {
                                svg_bytes: result.svg().len(),
                            },
                            Err(err) => Outcome::from_error(&err),
                        };
                        done.push(BatchOutcome::new(
                            *line,
                            equation,
                            started.elapsed(),
                            outcome,
                        ));
                    }
                    done
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| match handle.join() {
                Ok(done) => done,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    results.sort_by_key(|r| r.line);
    results
}
