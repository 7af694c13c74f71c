use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use taskforge::build::CommandBuildChecker;
use taskforge::config::{self, PipelineConfig};
use taskforge::generate::LlmGenerator;
use taskforge::llm::ChatClient;
use taskforge::logging;
use taskforge::pipeline::Orchestrator;
use taskforge::report::ReportWriter;
use taskforge::resilient::RetryPolicy;
use taskforge::review::LlmReviewer;
use taskforge::task::{Task, TaskQueue};
use taskforge::writer::{ChangeWriter, NoopHook};

#[derive(Parser, Debug)]
#[command(name = "taskforge", version, about = "Queue-driven code generation and repair pipeline")]
struct Args {
    /// Target repository root
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Directory holding queued/ and processed/ task files
    #[arg(long, default_value = "tasks")]
    tasks: PathBuf,

    /// Maximum number of queued tasks to consume this run
    #[arg(long, default_value_t = 1)]
    max_tasks: u32,

    /// Show the next queued task without calling any service
    #[arg(long)]
    dry_run: bool,

    /// Override the build-repair round budget
    #[arg(long)]
    build_repair: Option<u32>,

    /// Override the design-iteration budget
    #[arg(long)]
    design_iterations: Option<u32>,
}

#[tokio::main]
async fn main() {
    logging::init();
    let args = Args::parse();
    if let Err(err) = run(args).await {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = PipelineConfig::load();
    if let Some(rounds) = args.build_repair {
        config.budgets.build_repair = rounds;
    }
    if let Some(iterations) = args.design_iterations {
        config.budgets.design_iterations = iterations;
    }

    let queue = TaskQueue::new(&args.tasks);

    if args.dry_run {
        return match queue.next()? {
            Some((path, task)) => {
                println!("Next task: {} ({})", task.id, path.display());
                for deliverable in &task.deliverables {
                    println!("  deliverable: {}", deliverable.path.display());
                }
                Ok(())
            }
            None => {
                println!("Task queue is empty.");
                Ok(())
            }
        };
    }

    // Credentials are checked before any task is consumed so a missing
    // key cannot half-process the queue.
    let api_key = config::api_key()
        .context("OPENROUTER_API_KEY is not set; export it before running")?;

    let reports = ReportWriter::new(&args.tasks);
    let mut processed = 0;
    while processed < args.max_tasks {
        let Some((task_path, task)) = queue.next()? else {
            println!("Task queue is empty.");
            break;
        };

        let orchestrator = build_orchestrator(&config, &api_key, &args.repo, &task)?;
        match orchestrator.run_task(&task).await {
            Ok(outcome) => {
                let report_path = reports.write(&task.id, &outcome)?;
                queue.archive(&task_path)?;
                println!(
                    "{} {} - {} (report: {})",
                    if outcome.succeeded() { "✓" } else { "✗" },
                    task.id,
                    outcome.title,
                    report_path.display()
                );
                processed += 1;
            }
            Err(err) => {
                // The task file stays queued for a manual reattempt.
                eprintln!("Task {} aborted: {:#}", task.id, err);
                return Err(err);
            }
        }
    }

    Ok(())
}

/// Wire the collaborators for one task. Built per task so a task-level
/// model override takes effect without global state.
fn build_orchestrator(
    config: &PipelineConfig,
    api_key: &str,
    repo: &PathBuf,
    task: &Task,
) -> Result<Orchestrator> {
    let policy = RetryPolicy::new(config.call_attempts, config.backoff_base);
    let generate_model = task
        .model
        .clone()
        .unwrap_or_else(|| config.generate_model.clone());

    let generator = LlmGenerator::new(
        ChatClient::new(api_key.to_string(), config.request_timeout)?,
        policy,
        generate_model,
    );
    let reviewer = LlmReviewer::new(
        ChatClient::new(api_key.to_string(), config.request_timeout)?,
        policy,
        config.review_model.clone(),
    );
    let build = CommandBuildChecker {
        timeout: config.build_timeout,
        max_diagnostics: config.max_diagnostics,
    };
    let writer = ChangeWriter::new(repo.clone(), Box::new(NoopHook))
        .with_fuzzy_threshold(config.fuzzy_threshold)
        .with_rerun_hook_after_fallback(config.rerun_hook_after_fallback);

    Ok(Orchestrator::new(
        Box::new(generator),
        Box::new(build),
        Box::new(reviewer),
        writer,
        config.budgets,
        repo.clone(),
    ))
}
