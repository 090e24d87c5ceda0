use std::process;
use std::thread;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use tracing_subscriber::EnvFilter;

use tictoc::error::Error;
use tictoc::runtime::{self, RenderConfig};

#[derive(Parser)]
#[command(
    name = "tictoc",
    about = "Hierarchical tic/toc timing reports",
    version,
    after_help = "Set TICTOC_LOG (e.g. TICTOC_LOG=debug) to see collection diagnostics on stderr."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Time a sample workload (nested intervals, threads, a parallel loop)
    /// and print its report.
    Demo {
        /// Number of extra threads, each timing one interval.
        #[arg(long, default_value_t = 4)]
        threads: usize,

        /// Base duration of one unit of simulated work, in milliseconds.
        #[arg(long, default_value_t = 20)]
        millis: u64,

        /// Iterations of the parallel loop.
        #[arg(long, default_value_t = 50)]
        iterations: usize,

        #[command(flatten)]
        render: RenderArgs,
    },
}

#[derive(Args)]
struct RenderArgs {
    /// Narrowest label column.
    #[arg(long, default_value_t = 10)]
    min_label_width: usize,

    /// Indentation added per tree level.
    #[arg(long = "indent", default_value_t = 3)]
    indent_step: usize,

    /// Share of a parent's time the "(other)" remainder must exceed to be shown.
    #[arg(long, default_value_t = 0.01)]
    other_threshold: f64,

    /// Decimals printed for durations.
    #[arg(long, default_value_t = 3)]
    precision: usize,
}

impl From<RenderArgs> for RenderConfig {
    fn from(args: RenderArgs) -> Self {
        RenderConfig {
            min_label_width: args.min_label_width,
            indent_step: args.indent_step,
            other_threshold: args.other_threshold,
            precision: args.precision,
        }
    }
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("TICTOC_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Commands::Demo {
            threads,
            millis,
            iterations,
            render,
        } => cmd_demo(threads, millis, iterations, render.into()),
    }
}

fn cmd_demo(
    threads: usize,
    millis: u64,
    iterations: usize,
    render: RenderConfig,
) -> Result<(), Error> {
    let unit = Duration::from_millis(millis);

    runtime::tic("demo")?;
    runtime::time("setup", || thread::sleep(unit * 2))?;

    runtime::tic("nested")?;
    thread::sleep(unit);
    for _ in 0..2 {
        let _step = runtime::scope("step")?;
        runtime::time("load", || thread::sleep(unit / 4))?;
        runtime::time("compute", || thread::sleep(unit / 4))?;
    }
    runtime::toc("nested")?;

    let handles = (0..threads)
        .map(|i| {
            thread::Builder::new()
                .name(format!("worker-{i}"))
                .spawn(move || runtime::time(&format!("thread {i}"), || thread::sleep(unit)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    for handle in handles {
        match handle.join() {
            Ok(result) => result?,
            Err(_) => return Err(Error::WorkerPanicked),
        }
    }

    runtime::tic("parallel loop")?;
    (0..iterations)
        .into_par_iter()
        .try_for_each(|_| runtime::time("iteration", || thread::sleep(unit / 10)))?;
    runtime::toc("parallel loop")?;

    runtime::toc("demo")?;

    let report = runtime::report()?.with_render_config(render);
    anstream::print!("{report}");
    Ok(())
}
