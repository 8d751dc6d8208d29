mod cli;
mod completion;
mod core;
mod notify;
mod pipeline;
mod provision;
mod registry;

use anyhow::{Context, Result};
use cli::commands::{
    LaunchCommand, ListCommand, RegisterCommand, RunStepCommand, StatusCommand, TerminateCommand,
};
use cli::output::*;
use cli::{Cli, Command};
use crate::core::template::TemplateFile;
use notify::LogNotifier;
use pipeline::{LaunchInput, LaunchPipeline, PipelineSettings};
use provision::{ClusterApi, ClusterStep, LocalClusterApi};
use registry::{InMemoryRegistry, Registry, TemplateKind, TemplateStore};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let store = TemplateStore::new(open_registry(cli.ephemeral).await?);

    // Execute command
    match &cli.command {
        Command::Register(cmd) => register_template(cmd, &store).await?,
        Command::Launch(cmd) => launch_cluster(cmd, store).await?,
        Command::Status(cmd) => show_status(cmd).await?,
        Command::Terminate(cmd) => terminate_cluster(cmd).await?,
        Command::List(cmd) => list_templates(cmd, &store).await?,
        Command::RunStep(cmd) => run_step(cmd).await?,
    }

    Ok(())
}

#[cfg(feature = "sqlite")]
async fn open_registry(ephemeral: bool) -> Result<Arc<dyn Registry>> {
    if ephemeral {
        Ok(Arc::new(InMemoryRegistry::new()))
    } else {
        Ok(Arc::new(registry::SqliteRegistry::with_default_path().await?))
    }
}

#[cfg(not(feature = "sqlite"))]
async fn open_registry(_ephemeral: bool) -> Result<Arc<dyn Registry>> {
    Ok(Arc::new(InMemoryRegistry::new()))
}

// TODO: replace with a real provisioning service client once one exists
fn cluster_api() -> Arc<dyn ClusterApi> {
    Arc::new(LocalClusterApi::new())
}

async fn register_template(cmd: &RegisterCommand, store: &TemplateStore) -> Result<()> {
    let template = TemplateFile::from_file(&cmd.file).context("Failed to load template file")?;

    let (kind, namespace, name) = match &template {
        TemplateFile::Profile(t) => ("profile", t.namespace.clone(), t.name.clone()),
        TemplateFile::Configuration(t) => ("configuration", t.namespace.clone(), t.name.clone()),
        TemplateFile::Function(t) => ("function", t.namespace.clone(), t.name.clone()),
    };

    if cmd.dry_run {
        println!(
            "{} {} {}/{} is valid",
            CHECK,
            kind,
            style(&namespace).dim(),
            style(&name).bold()
        );
        return Ok(());
    }

    match template {
        TemplateFile::Profile(t) => store.save_profile(&t.to_profile()?).await?,
        TemplateFile::Configuration(t) => store.save_configuration(&t.to_configuration()?).await?,
        TemplateFile::Function(t) => store.save_function(&t.to_function()).await?,
    }

    println!(
        "{} Registered {} {}/{}",
        CHECK,
        kind,
        style(&namespace).dim(),
        style(&name).bold()
    );
    Ok(())
}

async fn launch_cluster(cmd: &LaunchCommand, store: TemplateStore) -> Result<()> {
    let engine = LaunchPipeline::new(
        store,
        cluster_api(),
        Arc::new(LogNotifier),
        PipelineSettings::default(),
    );
    engine
        .add_event_handler(|event| println!("{}", format_launch_event(&event)))
        .await;

    let mut input = LaunchInput::new(&cmd.namespace, &cmd.function);
    input.cluster_name = cmd.cluster_name.clone();
    for (field, value) in &cmd.overrides {
        input.overrides.insert(field.clone(), value.clone());
    }
    for (key, value) in &cmd.tag {
        input.tags.insert(key.clone(), value.clone());
    }
    if cmd.allow_running {
        input.fail_if_running = Some(false);
    }
    if cmd.wait {
        input.wait_for_completion = Some(true);
        engine.spawn_poller();
    }

    let spinner = cmd.wait.then(|| create_wait_spinner(&cmd.function));

    let result = engine.run(input).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    match result {
        Ok(report) => {
            println!(
                "\n{} Cluster {} ({}) launched {}",
                CHECK,
                style(&report.cluster_id).bold(),
                style(&report.cluster_name).dim(),
                style("successfully").green()
            );
            Ok(())
        }
        Err(error) => {
            println!("\n{} {}", CROSS, style(&error).red());
            std::process::exit(1);
        }
    }
}

async fn show_status(cmd: &StatusCommand) -> Result<()> {
    let clusters = cluster_api();
    match clusters.describe(&cmd.cluster_id).await {
        Ok(status) => {
            println!(
                "{} {} is {}",
                INFO,
                style(&cmd.cluster_id).bold(),
                format_status(status)
            );
            Ok(())
        }
        Err(error) => {
            println!("{} {}", CROSS, style(&error).red());
            std::process::exit(1);
        }
    }
}

async fn terminate_cluster(cmd: &TerminateCommand) -> Result<()> {
    let clusters = cluster_api();
    clusters
        .terminate(&cmd.cluster_id)
        .await
        .context("Termination request failed")?;
    println!(
        "{} Termination requested for {}",
        CHECK,
        style(&cmd.cluster_id).bold()
    );
    Ok(())
}

async fn list_templates(cmd: &ListCommand, store: &TemplateStore) -> Result<()> {
    let kinds = [
        TemplateKind::Profile,
        TemplateKind::Configuration,
        TemplateKind::Function,
    ];

    let mut all = serde_json::Map::new();
    let mut empty = true;
    for kind in kinds {
        let names = store.list_names(kind, &cmd.namespace).await?;
        if !names.is_empty() {
            empty = false;
        }

        if cmd.json {
            all.insert(format!("{}s", kind.as_str()), serde_json::json!(names));
        } else if !names.is_empty() {
            println!("{} {}s:", INFO, style(kind.as_str()).bold());
            for name in names {
                println!("  {}", name);
            }
        }
    }

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&all)?);
    } else if empty {
        println!(
            "{} No templates registered in namespace '{}'",
            INFO, cmd.namespace
        );
    }
    Ok(())
}

async fn run_step(cmd: &RunStepCommand) -> Result<()> {
    let clusters = cluster_api();
    let step = ClusterStep {
        name: cmd.name.clone(),
        jar: cmd.jar.clone(),
        args: cmd.args.clone(),
        main_class: cmd.main_class.clone(),
    };

    match clusters.add_step(&cmd.cluster_id, &step).await {
        Ok(step_id) => {
            println!(
                "{} Step {} submitted to {}",
                CHECK,
                style(&step_id).bold(),
                style(&cmd.cluster_id).dim()
            );
            Ok(())
        }
        Err(error) => {
            println!("{} {}", CROSS, style(&error).red());
            std::process::exit(1);
        }
    }
}
