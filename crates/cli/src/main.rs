//! `scenario-runner` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate`: import a scenario and report problems.
//! - `plan`: print the execution plan.
//! - `render`: interpolate a piece of text against a context file.
//! - `run`: step through a scenario interactively.
//! - `mount`: merge a template into a scenario under a namespace.
//! - `extract`: copy a namespaced subgraph out as a template.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use engine::executor::StepPrompt;
use engine::scenario::ScenarioImport;
use engine::{
    execution_plan, interpolate, mount, unresolved_references, validate_graph, ContextStore,
    ExecutorConfig, ScenarioExecutor, StepOutcome, Template,
};
use plugins::PluginRegistry;

#[derive(Parser)]
#[command(
    name = "scenario-runner",
    about = "Step through prompt scenarios and propagate answers between them",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a scenario file: import issues, cycles, dangling references.
    Validate {
        /// Path to the scenario JSON file.
        scenario: PathBuf,
        /// Context file whose keys count as resolvable bindings.
        #[arg(long)]
        context: Option<PathBuf>,
    },
    /// Print the execution plan of a scenario.
    Plan {
        scenario: PathBuf,
    },
    /// Interpolate `{{…}}` tokens in TEXT against a context file.
    Render {
        text: String,
        #[arg(long)]
        context: Option<PathBuf>,
    },
    /// Run a scenario interactively. Answer each prompt on stdin;
    /// `:skip` skips a step, `:retry` re-runs a failed plugin, `:cancel` stops.
    Run {
        scenario: PathBuf,
        /// Initial context (a JSON object).
        #[arg(long)]
        context: Option<PathBuf>,
        /// Write the context back here when the run ends.
        #[arg(long)]
        save_context: Option<PathBuf>,
        #[command(flatten)]
        executor: ExecutorArgs,
    },
    /// Mount a template into a scenario below an existing node.
    Mount {
        scenario: PathBuf,
        template: PathBuf,
        /// Node the template's entry nodes are attached to.
        #[arg(long)]
        at: String,
        #[arg(long)]
        namespace: String,
        /// Output path; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Extract the `NAMESPACE.*` nodes of a scenario as a template.
    Extract {
        scenario: PathBuf,
        #[arg(long)]
        namespace: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ExecutorArgs {
    /// Retries for plugin failures marked retryable.
    #[arg(long, env = "SCENARIO_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,
    /// Base back-off delay between retries, in milliseconds.
    #[arg(long, env = "SCENARIO_RETRY_DELAY_MS", default_value_t = 100)]
    retry_delay_ms: u64,
    /// Pass plugin configs through without interpolating them.
    #[arg(long)]
    raw_plugin_params: bool,
}

impl From<ExecutorArgs> for ExecutorConfig {
    fn from(args: ExecutorArgs) -> Self {
        Self {
            max_retries: args.max_retries,
            retry_base_delay: Duration::from_millis(args.retry_delay_ms),
            interpolate_plugin_params: !args.raw_plugin_params,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("scenario_runner=info,engine=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { scenario, context } => validate(&scenario, context.as_deref()),
        Command::Plan { scenario } => {
            let imported = load_scenario(&scenario)?;
            let plan = execution_plan(imported.scenario.graph());
            for (i, id) in plan.iter().enumerate() {
                println!("{:>3}. {id}", i + 1);
            }
            Ok(())
        }
        Command::Render { text, context } => {
            let context = load_context(context.as_deref())?;
            println!("{}", interpolate(&text, &context));
            Ok(())
        }
        Command::Run {
            scenario,
            context,
            save_context,
            executor,
        } => {
            run(
                &scenario,
                context.as_deref(),
                save_context.as_deref(),
                executor.into(),
            )
            .await
        }
        Command::Mount {
            scenario,
            template,
            at,
            namespace,
            output,
        } => {
            let mut host = load_scenario(&scenario)?.scenario;
            let text = read_file(&template)?;
            let imported = Template::from_json_str(&text)
                .with_context(|| format!("invalid template {}", template.display()))?;
            report_issues(&template, &imported.issues);

            let report = mount(host.graph_mut(), &imported.template, &at, &namespace)?;
            info!(
                "mounted {} nodes under '{namespace}', attached to '{at}'",
                report.id_map.len()
            );
            write_output(output.as_deref(), &host.to_json_string()?)
        }
        Command::Extract {
            scenario,
            namespace,
            output,
        } => {
            let imported = load_scenario(&scenario)?;
            let template = Template::extract(imported.scenario.graph(), &namespace)?;
            write_output(output.as_deref(), &template.to_json_string()?)
        }
    }
}

// ---------------------------------------------------------------------------
// Sub-commands
// ---------------------------------------------------------------------------

fn validate(path: &Path, context: Option<&Path>) -> Result<()> {
    let imported = load_scenario(path)?;
    let graph = imported.scenario.graph();
    let context = load_context(context)?;

    if let Err(e) = validate_graph(graph) {
        println!("⚠️  {e}");
    }
    for unresolved in unresolved_references(graph, &context) {
        println!(
            "⚠️  node '{}' references '{{{{{}}}}}', which nothing provides",
            unresolved.node_id, unresolved.binding
        );
    }

    if !imported.issues.is_empty() {
        eprintln!("❌ {} item(s) rejected", imported.issues.len());
        std::process::exit(1);
    }
    println!(
        "✅ Scenario is valid. Execution order: {:?}",
        execution_plan(graph)
    );
    Ok(())
}

async fn run(
    path: &Path,
    context_path: Option<&Path>,
    save_context: Option<&Path>,
    config: ExecutorConfig,
) -> Result<()> {
    let scenario = load_scenario(path)?.scenario;
    let graph = scenario.graph();
    let mut context = load_context(context_path)?;

    let executor = ScenarioExecutor::new(Arc::new(PluginRegistry::with_builtins()), config);
    let mut run = executor.start(graph)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let summary = loop {
        match executor.drive(&mut run, graph, &mut context).await? {
            StepOutcome::Completed(summary) => break Some(summary),
            StepOutcome::Discarded { .. } => break None,
            StepOutcome::PluginFailed { node_id, error } => {
                eprintln!("❌ plugin step '{node_id}' failed: {error}");
                eprintln!("   answer it by hand, or :retry / :skip / :cancel");
            }
            StepOutcome::AwaitingInput { .. } | StepOutcome::Advanced { .. } => {}
        }

        let prompt = run.current_step(graph, &context)?;
        show_prompt(&prompt)?;

        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            warn!("stdin closed; cancelling run");
            run.cancel()?;
            break None;
        };

        let outcome = match line.trim() {
            ":cancel" => {
                run.cancel()?;
                break None;
            }
            ":skip" => run.skip()?,
            ":retry" if prompt.plugin.is_some() => continue,
            _ => run.submit(graph, &mut context, line.clone())?,
        };
        if let StepOutcome::Completed(summary) = outcome {
            break Some(summary);
        }
    };

    match summary {
        Some(summary) => {
            println!("\n✅ Run complete.");
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        None => println!("\nRun cancelled. Answers already committed to the context are kept."),
    }

    if let Some(out) = save_context {
        let text = serde_json::to_string_pretty(&context.to_value())?;
        std::fs::write(out, text)
            .with_context(|| format!("cannot write context to {}", out.display()))?;
        info!("context saved to {}", out.display());
    }
    Ok(())
}

fn show_prompt(prompt: &StepPrompt) -> Result<()> {
    println!(
        "\n[{}/{}] {}",
        prompt.position + 1,
        prompt.total,
        prompt.label
    );
    if !prompt.text.is_empty() {
        println!("{}", prompt.text);
    }
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("cannot read file {}", path.display()))
}

fn load_scenario(path: &Path) -> Result<ScenarioImport> {
    let text = read_file(path)?;
    let imported = engine::Scenario::from_json_str(&text)
        .with_context(|| format!("invalid scenario {}", path.display()))?;
    report_issues(path, &imported.issues);
    Ok(imported)
}

fn report_issues(path: &Path, issues: &[engine::ImportIssue]) {
    for issue in issues {
        eprintln!("⚠️  {}: rejected {issue}", path.display());
    }
}

fn load_context(path: Option<&Path>) -> Result<ContextStore> {
    let Some(path) = path else {
        return Ok(ContextStore::new());
    };
    let value: serde_json::Value = serde_json::from_str(&read_file(path)?)
        .with_context(|| format!("invalid JSON in {}", path.display()))?;
    if !value.is_object() {
        bail!("context file {} must contain a JSON object", path.display());
    }
    Ok(ContextStore::from_value(value))
}

fn write_output(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(path) => std::fs::write(path, text)
            .with_context(|| format!("cannot write {}", path.display())),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}
