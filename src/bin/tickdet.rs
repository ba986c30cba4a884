use std::path::PathBuf;

use anyhow::Context as _;
use clap::{ArgAction, Parser, Subcommand};
use tickdet::{
    CompiledGraph, CpuBackend, CpuBackendOpts, DetectionSession, ErrorKind, FrameSource,
    HostResult, LabelMap, Presenter, SessionOpts, StepBudget, SyntheticSource,
    SyntheticSourceOpts,
};

#[derive(Parser, Debug)]
#[command(name = "tickdet", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a model description's input, steps and declared outputs.
    Inspect(InspectArgs),
    /// Run a synthetic camera through the scheduler on the CPU backend.
    Run(RunArgs),
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Model description JSON.
    #[arg(long)]
    model: PathBuf,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Model description JSON.
    #[arg(long)]
    model: PathBuf,

    /// Session options JSON. Flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of frames to process.
    #[arg(long, default_value_t = 4)]
    frames: u64,

    /// Graph steps per tick.
    #[arg(long)]
    step_budget: Option<u32>,

    /// Label file, one name per line.
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Print one JSON object per result instead of text.
    #[arg(long)]
    json: bool,

    /// Skip the warm-up pass.
    #[arg(long)]
    no_warm_up: bool,

    /// Give up after this many host ticks.
    #[arg(long, default_value_t = 1_000_000)]
    max_ticks: u64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Command::Inspect(args) => cmd_inspect(args),
        Command::Run(args) => cmd_run(args),
    }
}

fn load_model(path: &std::path::Path) -> anyhow::Result<CompiledGraph> {
    CompiledGraph::from_path(path).with_context(|| format!("load model '{}'", path.display()))
}

fn cmd_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let graph = load_model(&args.model)?;
    println!("model: {}", graph.name());
    println!("input: {}", graph.input_shape());
    println!("steps: {}", graph.step_count());
    for (i, out) in graph.outputs().iter().enumerate() {
        println!(
            "output {i}: {} ({:?}, {:?})",
            out.name, out.dtype, out.role
        );
    }
    Ok(())
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let graph = load_model(&args.model)?;

    let mut opts = match &args.config {
        Some(p) => SessionOpts::from_path(p)
            .with_context(|| format!("load session options '{}'", p.display()))?,
        None => SessionOpts::default(),
    };
    if let Some(steps) = args.step_budget {
        opts.controller.step_budget = StepBudget::new(steps).context("--step-budget")?;
    }
    if args.no_warm_up {
        opts.warm_up = false;
    }

    let labels = match &args.labels {
        Some(p) => Some(
            LabelMap::from_path(p).with_context(|| format!("load labels '{}'", p.display()))?,
        ),
        None => None,
    };

    let square = graph.input_shape().dims().iter().skip(2).copied().min().unwrap_or(1);
    let mut synthetic = SyntheticSource::new(SyntheticSourceOpts {
        shape: graph.input_shape().clone(),
        square: (square / 2).max(1),
        ..Default::default()
    })
    .context("build synthetic source")?;
    let mut remaining = args.frames;
    let source = move || {
        if remaining == 0 {
            return None;
        }
        let frame = synthetic.next_frame();
        if frame.is_some() {
            remaining -= 1;
        }
        frame
    };

    let presenter = StdoutPresenter {
        labels,
        json: args.json,
    };
    let mut session = DetectionSession::new(
        CpuBackend::new(CpuBackendOpts::default()),
        graph,
        source,
        presenter,
        opts,
    )
    .context("start detection session")?;

    // Every frame ends exactly one way: presented, failed, or superseded by a newer one.
    let finished = |s: tickdet::SessionStats| s.completed + s.failed + s.superseded;
    while finished(session.stats()) < args.frames {
        if session.stats().ticks >= args.max_ticks {
            anyhow::bail!(
                "gave up after {} ticks ({:?})",
                args.max_ticks,
                session.controller().state()
            );
        }
        session.tick();
        std::thread::yield_now();
    }

    let stats = session.stats();
    drop(session.shutdown());
    if !args.json {
        println!(
            "frames: {} completed, {} failed, {} superseded in {} ticks",
            stats.completed, stats.failed, stats.superseded, stats.ticks
        );
    }
    Ok(())
}

struct StdoutPresenter {
    labels: Option<LabelMap>,
    json: bool,
}

impl Presenter for StdoutPresenter {
    fn present(&mut self, result: &HostResult) {
        if self.json {
            match serde_json::to_string(result) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "serialize result"),
            }
            return;
        }

        let cap = result.capture();
        println!(
            "run {} frame {}: {} detection(s)",
            result.run_id(),
            cap.frame_index,
            result.detections().len()
        );
        for d in result.detections() {
            let name = self
                .labels
                .as_ref()
                .and_then(|l| l.name(d.label_id))
                .map_or_else(|| format!("#{}", d.label_id), str::to_string);
            println!(
                "  {name} {:.3} [{:.1} {:.1} {:.1} {:.1}]",
                d.score, d.bbox.x, d.bbox.y, d.bbox.w, d.bbox.h
            );
        }
    }

    fn on_error(&mut self, kind: ErrorKind) {
        if self.json {
            println!("{}", serde_json::json!({ "error": kind }));
        } else {
            println!("run failed: {kind}");
        }
    }
}
