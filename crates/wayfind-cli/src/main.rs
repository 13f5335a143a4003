//! Wayfind CLI - navigation discovery and per-screen capture
//!
//! Usage:
//!   wayfind init [path]                       Write default .wayfind/config.toml
//!   wayfind graph <project>                   Build and print the navigation graph
//!   wayfind capture <project> --out <dir>     Capture one screenshot per scene
//!   wayfind recognize <image> --label <L>...  Classify a captured image

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wayfind_capture::{CaptureOutcome, CaptureRequest, CaptureStrategySelector};
use wayfind_core::{FallbackKind, SceneNode, WayfindConfig};
use wayfind_graph::GraphBuilder;
use wayfind_process::CapturedImage;
use wayfind_vision::{SceneLabel, SceneRecognizer, TextSceneRecognizer};

#[derive(Parser)]
#[command(name = "wayfind")]
#[command(author, version, about = "Automated navigation discovery and screen capture")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Init {
        /// Project path (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Build the navigation graph of a project
    Graph {
        /// Project root
        project: PathBuf,

        /// Write the graph JSON to a file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Ignore .wayfind/navigation.toml
        #[arg(long)]
        no_manifest: bool,
    },

    /// Capture one screenshot per reachable scene
    Capture {
        /// Project root
        project: PathBuf,

        /// Output directory for screenshots and coverage.json
        #[arg(long, value_name = "DIR")]
        out: PathBuf,

        /// Compiled application to launch
        #[arg(long, value_name = "PATH")]
        exe: Option<PathBuf>,

        /// Wait after each input before capturing
        #[arg(long)]
        settle_delay_ms: Option<u64>,

        /// Attempts per transition edge
        #[arg(long)]
        max_retries: Option<u32>,

        /// Wall-clock budget for the whole traversal
        #[arg(long)]
        budget_ms: Option<u64>,

        /// Minimum fuzzy similarity for scene recognition
        #[arg(long)]
        similarity: Option<f64>,

        /// Capture used when traversal is impossible
        #[arg(long)]
        fallback: Option<CliFallback>,

        /// Source directory for the import fallback
        #[arg(long, value_name = "DIR")]
        import_dir: Option<PathBuf>,
    },

    /// Recognize which scene an image shows
    Recognize {
        /// Captured image
        image: PathBuf,

        /// Candidate scene ids
        #[arg(short, long = "label", required = true)]
        labels: Vec<String>,

        /// Project whose configuration to use
        #[arg(long)]
        project: Option<PathBuf>,
    },
}

/// CLI-friendly fallback enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliFallback {
    None,
    Desktop,
    Import,
}

impl From<CliFallback> for FallbackKind {
    fn from(f: CliFallback) -> Self {
        match f {
            CliFallback::None => FallbackKind::None,
            CliFallback::Desktop => FallbackKind::Desktop,
            CliFallback::Import => FallbackKind::Import,
        }
    }
}

/// Overrides applied on top of `.wayfind/config.toml`
struct CaptureOverrides {
    settle_delay_ms: Option<u64>,
    max_retries: Option<u32>,
    budget_ms: Option<u64>,
    similarity: Option<f64>,
    fallback: Option<CliFallback>,
    import_dir: Option<PathBuf>,
}

impl CaptureOverrides {
    fn apply(self, config: &mut WayfindConfig) {
        if let Some(ms) = self.settle_delay_ms {
            config.traversal.settle_delay_ms = ms;
        }
        if let Some(n) = self.max_retries {
            config.traversal.max_retries_per_edge = n;
        }
        if let Some(ms) = self.budget_ms {
            config.traversal.traversal_budget_ms = ms;
        }
        if let Some(s) = self.similarity {
            config.recognition.recognition_similarity_threshold = s;
        }
        if let Some(f) = self.fallback {
            config.capture.fallback = f.into();
        }
        if let Some(dir) = self.import_dir {
            config.capture.import_dir = Some(dir);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Graph {
            project,
            out,
            no_manifest,
        } => cmd_graph(&project, out, no_manifest).await,
        Commands::Capture {
            project,
            out,
            exe,
            settle_delay_ms,
            max_retries,
            budget_ms,
            similarity,
            fallback,
            import_dir,
        } => {
            let overrides = CaptureOverrides {
                settle_delay_ms,
                max_retries,
                budget_ms,
                similarity,
                fallback,
                import_dir,
            };
            let code = cmd_capture(project, out, exe, overrides).await?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Recognize {
            image,
            labels,
            project,
        } => cmd_recognize(&image, labels, project).await,
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    let config_path = path.join(WayfindConfig::RELATIVE_PATH);
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }

    let written = WayfindConfig::write_default(path)
        .with_context(|| format!("Failed to initialize {}", path.display()))?;

    println!("Initialized Wayfind in {}", path.display());
    println!("Created:");
    println!("  {}", written.display());
    Ok(())
}

async fn cmd_graph(project: &Path, out: Option<PathBuf>, no_manifest: bool) -> Result<()> {
    let builder = if no_manifest {
        GraphBuilder::new().without_manifest()
    } else {
        GraphBuilder::new()
    };

    let graph = builder
        .build(project)
        .with_context(|| format!("Failed to build navigation graph for {}", project.display()))?;

    let summary = graph.summary();
    info!(
        "{} scenes ({} enabled), {} edges ({} unresolved)",
        summary.scenes, summary.enabled_scenes, summary.edges, summary.unresolved_edges
    );
    if let Some(entry) = graph.entry() {
        info!("Entry scene: {}", entry);
    }

    let json = serde_json::to_string_pretty(&graph)?;
    match out {
        Some(path) => {
            tokio::fs::write(&path, json)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Navigation graph written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn cmd_capture(
    project: PathBuf,
    out: PathBuf,
    exe: Option<PathBuf>,
    overrides: CaptureOverrides,
) -> Result<i32> {
    let mut config = WayfindConfig::load_or_default(&project)
        .with_context(|| format!("Failed to load configuration for {}", project.display()))?;
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current step");
            on_interrupt.cancel();
        }
    });

    let mut request = CaptureRequest::new(&project, &out)
        .with_config(config)
        .with_cancellation(cancel);
    if let Some(exe) = exe {
        request = request.with_executable(exe);
    }

    let outcome = CaptureStrategySelector::new().run(request).await;

    match &outcome {
        CaptureOutcome::Succeeded(report) | CaptureOutcome::SucceededViaFallback(report) => {
            println!(
                "Captured {} screenshots via {} ({}/{} scenes, {:.0}%)",
                report.screenshot_count(),
                report.strategy,
                report.visited_count,
                report.total_scenes,
                report.completion_rate * 100.0
            );
            if let Some(fallback) = &report.fallback {
                println!("Fallback reason: {} ({})", fallback.reason, fallback.detail);
            }
            for edge in &report.failed_edges {
                println!(
                    "  failed: {} -> {} via {} ({}x, {})",
                    edge.from, edge.to, edge.control, edge.count, edge.reason
                );
            }
            for warning in &report.warnings {
                println!("  warning: {}", warning);
            }
            println!("Output: {}", out.display());
        }
        CaptureOutcome::Failed(reason) => {
            eprintln!("Capture failed: {}", reason);
        }
    }

    Ok(outcome.exit_code())
}

async fn cmd_recognize(image: &Path, labels: Vec<String>, project: Option<PathBuf>) -> Result<()> {
    let config = match &project {
        Some(root) => WayfindConfig::load_or_default(root)?,
        None => WayfindConfig::default(),
    };

    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("Failed to read {}", image.display()))?;
    let extension = image
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png");
    let captured = CapturedImage::new(bytes, extension);

    let candidates: Vec<SceneLabel> = labels
        .iter()
        .map(|l| SceneLabel::from(&SceneNode::new(l.as_str(), PathBuf::new())))
        .collect();

    let recognizer = TextSceneRecognizer::new(&config.recognition);
    let result = recognizer.recognize(&captured, &candidates).await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
