use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use quire_core::bootstrap::{AppBuilder, AppPipeline, resolve_config_path};
use quire_core::eval::{EvalSuite, run_suite};
use quire_core::format::format_response;
use quire_core::pipeline::RebuildReport;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(
    name = "quire",
    version,
    about = "Answer questions from a fixed document corpus with cited sources"
)]
struct Cli {
    /// Config file (default: `QUIRE_CONFIG` or config/default.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Answer a single question and exit
    #[arg(long)]
    query: Option<String>,

    /// Re-index the corpus before answering
    #[arg(long, global = true)]
    rebuild: bool,

    /// Chunks retrieved per question
    #[arg(long = "top-k", global = true)]
    top_k: Option<usize>,

    /// Hide retrieved context in the output
    #[arg(long = "no-context")]
    no_context: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run an evaluation question set and write a JSON report
    Eval {
        /// TOML file with `[[questions]]`; the built-in set is used otherwise
        #[arg(long)]
        questions: Option<PathBuf>,

        #[arg(long, default_value = "eval/report.json")]
        report: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber();

    let config_path = resolve_config_path(cli.config.as_deref());
    let builder = AppBuilder::load(config_path).await?;
    let mut pipeline = builder.build_pipeline().await?;
    if let Some(top_k) = cli.top_k {
        pipeline.set_top_k(top_k);
    }

    let built = if cli.rebuild {
        Some(pipeline.rebuild().await.context("index rebuild failed")?)
    } else {
        pipeline.ensure_index().await.context("index build failed")?
    };
    if let Some(report) = &built {
        print_rebuild(report);
    }

    if let Some(Command::Eval { questions, report }) = cli.command {
        return run_eval(&pipeline, questions, report).await;
    }

    let show_context = !cli.no_context;
    if let Some(question) = cli.query {
        let response = pipeline
            .query(question.trim())
            .await
            .context("query failed")?;
        println!("{}", format_response(&response, show_context));
        if let Some(e) = response.audit_error {
            eprintln!("warning: audit record not written: {e}");
        }
        return Ok(());
    }

    interactive(&pipeline, show_context).await
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn print_rebuild(report: &RebuildReport) {
    println!(
        "Indexed {} chunks from {} file(s) in {} ms",
        report.stats.chunks,
        report.files.len(),
        report.stats.elapsed_ms
    );
    for file in &report.files {
        println!("  {} ({}): {} chunks", file.source_name, file.doc_type, file.chunks);
    }
    for skipped in &report.skipped {
        println!("  skipped {}: {}", skipped.file, skipped.reason);
    }
}

async fn run_eval(
    pipeline: &AppPipeline,
    questions: Option<PathBuf>,
    report_path: PathBuf,
) -> anyhow::Result<()> {
    let suite = match questions {
        Some(path) => EvalSuite::load(&path)?,
        None => EvalSuite::builtin(),
    };
    let report = run_suite(pipeline, &suite).await;
    for record in &report.records {
        println!("\n{}", record.render());
    }
    println!("\n{}", report.summary());
    report.write(&report_path).await?;
    println!("\nReport saved -> {}", report_path.display());
    Ok(())
}

async fn interactive(pipeline: &AppPipeline, show_context: bool) -> anyhow::Result<()> {
    println!("quire ready. Commands: 'quit' to exit | 'rebuild' to re-index\n");
    println!("{}", "-".repeat(70));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nQuestion: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!("\nGoodbye.");
            return Ok(());
        };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        match question.to_lowercase().as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                return Ok(());
            }
            "rebuild" => {
                match pipeline.rebuild().await {
                    Ok(report) => print_rebuild(&report),
                    Err(e) => eprintln!("ERROR: rebuild failed: {e}"),
                }
                continue;
            }
            _ => {}
        }

        match pipeline.query(question).await {
            Ok(response) => {
                println!("{}", format_response(&response, show_context));
                if let Some(e) = response.audit_error {
                    eprintln!("warning: audit record not written: {e}");
                }
            }
            Err(e) => eprintln!("ERROR: {e}"),
        }
    }
}
