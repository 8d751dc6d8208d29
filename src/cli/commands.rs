//! CLI command definitions

use clap::Args;
use serde_json::Value;

/// Register a template from a YAML file
#[derive(Debug, Args, Clone)]
pub struct RegisterCommand {
    /// Path to the template YAML file
    #[arg(short, long)]
    pub file: String,

    /// Validate and print without writing to the registry
    #[arg(long)]
    pub dry_run: bool,
}

/// Launch a cluster through a registered launch function
#[derive(Debug, Args, Clone)]
pub struct LaunchCommand {
    /// Launch function name
    pub function: String,

    /// Template namespace
    #[arg(short, long, default_value = "default")]
    pub namespace: String,

    /// Cluster name, replacing the function's name template
    #[arg(long)]
    pub cluster_name: Option<String>,

    /// Field overrides (field=json-value)
    #[arg(short = 'o', long = "override", value_parser = parse_override)]
    pub overrides: Vec<(String, Value)>,

    /// Run-scoped tags (key=value)
    #[arg(short, long, value_parser = parse_key_value)]
    pub tag: Vec<(String, String)>,

    /// Launch even when a same-named cluster is active
    #[arg(long)]
    pub allow_running: bool,

    /// Block until the cluster reaches its ready state
    #[arg(short, long)]
    pub wait: bool,
}

/// Show the current status of a cluster
#[derive(Debug, Args, Clone)]
pub struct StatusCommand {
    /// Cluster id
    pub cluster_id: String,
}

/// Request termination of a cluster
#[derive(Debug, Args, Clone)]
pub struct TerminateCommand {
    /// Cluster id
    pub cluster_id: String,
}

/// List registered templates in a namespace
#[derive(Debug, Args, Clone)]
pub struct ListCommand {
    /// Template namespace
    #[arg(short, long, default_value = "default")]
    pub namespace: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Submit a step to a running cluster
#[derive(Debug, Args, Clone)]
pub struct RunStepCommand {
    /// Cluster id
    pub cluster_id: String,

    /// Step name
    #[arg(long)]
    pub name: String,

    /// Jar the step runs
    #[arg(long)]
    pub jar: String,

    /// Main class, when the jar does not name one
    #[arg(long)]
    pub main_class: Option<String>,

    /// Step arguments
    #[arg(last = true)]
    pub args: Vec<String>,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 {
        return Err(format!("Invalid key=value pair: {}", s));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}

/// Parse field=value overrides; the value is JSON, falling back to a string
pub fn parse_override(s: &str) -> Result<(String, Value), String> {
    let (field, raw) = parse_key_value(s)?;
    let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
    Ok((field, value))
}
