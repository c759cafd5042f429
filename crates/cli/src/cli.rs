use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use taskscope_core::{MutationKind, TaskCollection, TaskState};
use taskscope_filter::FilterSpec;

/// Search task-queue collections from the terminal.
///
/// Connection and scan settings come from the environment (`.env` is read
/// first, `{PROFILE}_{KEY}` beats `{KEY}`); flags override them.
#[derive(Parser, Debug)]
#[command(name = "taskscope", version, about = "Filter and act on task-queue collections")]
pub struct CliArgs {
    /// Monitoring API base URL
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan a task collection and print the tasks that match
    Filter(FilterArgs),
}

#[derive(Args, Debug)]
pub struct FilterArgs {
    /// Queue to scan
    #[arg(long, short)]
    pub queue: String,

    /// Task state: active, pending, aggregating, scheduled, retry, archived, completed
    #[arg(long, short, default_value = "pending")]
    pub state: TaskState,

    /// Group name (required for aggregating tasks)
    #[arg(long, short)]
    pub group: Option<String>,

    /// JSON file with saved filter criteria; flags below override its fields
    #[arg(long)]
    pub spec: Option<PathBuf>,

    /// Substring of the JSON-encoded payload
    #[arg(long)]
    pub payload: Option<String>,

    /// Substring of the JSON-encoded result
    #[arg(long)]
    pub result: Option<String>,

    /// Regex searched in the JSON-encoded payload
    #[arg(long)]
    pub payload_regex: Option<String>,

    /// Regex searched in the JSON-encoded result
    #[arg(long)]
    pub result_regex: Option<String>,

    /// Boolean expression over task fields, e.g. `retried > 2 && type == "email:send"`
    #[arg(long = "expr", short = 'e')]
    pub expression: Option<String>,

    /// Stop after this many matches; negative means unlimited
    #[arg(long, allow_negative_numbers = true)]
    pub limit: Option<i64>,

    /// Tasks requested per page
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Apply run, archive or delete to every match once the scan completes
    #[arg(long)]
    pub then: Option<MutationKind>,

    /// Print matching task ids only, one per line
    #[arg(long)]
    pub ids_only: bool,
}

impl FilterArgs {
    pub fn collection(&self) -> TaskCollection {
        let collection = TaskCollection::new(self.queue.clone(), self.state);
        match &self.group {
            Some(group) => collection.in_group(group.clone()),
            None => collection,
        }
    }

    /// Criteria from `--spec`, with flag values taking precedence.
    pub fn filter_spec(&self) -> Result<FilterSpec> {
        let base = match &self.spec {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read spec file {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("invalid spec file {}", path.display()))?
            }
            None => FilterSpec::default(),
        };
        Ok(self.override_spec(base))
    }

    fn override_spec(&self, mut spec: FilterSpec) -> FilterSpec {
        let flags = [
            (&self.payload, &mut spec.payload_query),
            (&self.result, &mut spec.result_query),
            (&self.payload_regex, &mut spec.payload_regex),
            (&self.result_regex, &mut spec.result_regex),
            (&self.expression, &mut spec.custom_expression),
        ];
        for (flag, field) in flags {
            if flag.is_some() {
                field.clone_from(flag);
            }
        }
        if self.limit.is_some() {
            spec.result_limit = self.limit;
        }
        spec
    }
}
