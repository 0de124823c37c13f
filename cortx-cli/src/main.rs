use std::collections::HashMap;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use log::LevelFilter;

use cortx_core::differ::{Diff, diff};
use cortx_core::provider::{Provider, ResourceType};
use cortx_core::resource::{Resource, ResourceId, State, Value};
use cortx_provider::config::ProviderConfig;
use cortx_provider::validation::parse_versioning;
use cortx_provider::{BUCKET_TYPE, BucketType, CortxProvider, OBJECT_TYPE};

#[derive(Parser)]
#[command(name = "cortx")]
#[command(about = "Provision buckets on a CORTX S3 object store", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// CORTX S3 endpoint host
    #[arg(long, env = "CORTX_ENDPOINT_HOST", global = true)]
    endpoint_host: Option<String>,

    /// CORTX S3 endpoint port
    #[arg(long, env = "CORTX_ENDPOINT_PORT", default_value = "80", global = true)]
    endpoint_port: String,

    /// Region reported for buckets
    #[arg(long, env = "CORTX_REGION", default_value = "us-east-1", global = true)]
    region: String,

    /// Access key
    #[arg(long, env = "CORTX_ACCESS_KEY", hide_env_values = true, global = true)]
    access_key: Option<String>,

    /// Secret access key
    #[arg(long, env = "CORTX_SECRET_ACCESS_KEY", hide_env_values = true, global = true)]
    secret_access_key: Option<String>,
}

impl From<ConnectionArgs> for ProviderConfig {
    fn from(args: ConnectionArgs) -> Self {
        ProviderConfig {
            endpoint_host: args.endpoint_host.unwrap_or_default(),
            endpoint_port: args.endpoint_port,
            region: args.region,
            access_key: args.access_key.unwrap_or_default(),
            secret_access_key: args.secret_access_key.unwrap_or_default(),
        }
    }
}

#[derive(Args, Clone)]
struct BucketArgs {
    /// Bucket name
    bucket: String,

    /// Versioning status (enabled or suspended)
    #[arg(long)]
    versioning: Option<String>,

    /// Enable object lock (only takes effect at creation)
    #[arg(long)]
    object_lock: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what apply would change
    Plan(BucketArgs),
    /// Create or update a bucket to match the arguments
    Apply(BucketArgs),
    /// Show the current state of a bucket
    Read {
        /// Bucket name
        bucket: String,
    },
    /// Delete a bucket
    Destroy {
        /// Bucket name
        bucket: String,

        /// Empty the bucket first, removing legal holds
        #[arg(long)]
        force_destroy: bool,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Delete every object version and delete marker, keeping the bucket
    Empty {
        /// Bucket name
        bucket: String,

        /// Retry legal hold removal while the backend reports conflicts
        #[arg(long)]
        retry_legal_hold: bool,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Read a data source
    Data {
        #[command(subcommand)]
        command: DataCommands,
    },
}

#[derive(Subcommand)]
enum DataCommands {
    /// Bucket attributes (ARN, region, endpoints)
    Bucket {
        /// Bucket name
        bucket: String,
    },
    /// Object metadata
    Object {
        /// Bucket name
        bucket: String,

        /// Object key
        key: String,

        /// Specific object version
        #[arg(long)]
        version_id: Option<String>,

        /// Byte range, e.g. "bytes=0-9"
        #[arg(long)]
        range: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = run(cli).await;

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = ProviderConfig::from(cli.connection);
    let provider = CortxProvider::new(&config)
        .await
        .map_err(|e| e.to_string())?;

    // Ctrl-C stops retries and teardown between calls
    let cancel = provider.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    match cli.command {
        Commands::Plan(args) => run_plan(&provider, &args).await,
        Commands::Apply(args) => run_apply(&provider, &args).await,
        Commands::Read { bucket } => run_read(&provider, &bucket).await,
        Commands::Destroy {
            bucket,
            force_destroy,
            auto_approve,
        } => run_destroy(&provider, &bucket, force_destroy, auto_approve).await,
        Commands::Empty {
            bucket,
            retry_legal_hold,
            auto_approve,
        } => {
            let provider = provider.with_legal_hold_retry(retry_legal_hold);
            run_empty(&provider, &bucket, auto_approve).await
        }
        Commands::Data { command } => run_data(&provider, command).await,
    }
}

/// Build the declared bucket from command-line arguments
fn desired_bucket(args: &BucketArgs) -> Result<Resource, String> {
    let mut resource =
        Resource::new(BUCKET_TYPE, &args.bucket).with_attribute("bucket", args.bucket.as_str());

    if let Some(versioning) = &args.versioning {
        let status = parse_versioning(versioning).ok_or_else(|| {
            format!(
                "Invalid versioning value '{}'. Must be one of: enabled, suspended",
                versioning
            )
        })?;
        resource = resource.with_attribute("versioning", status.as_str());
    }
    if args.object_lock {
        resource = resource.with_attribute("object_lock_enabled", true);
    }
    Ok(resource)
}

async fn plan_bucket(provider: &CortxProvider, args: &BucketArgs) -> Result<Diff, String> {
    let desired = desired_bucket(args)?;
    let current = provider
        .read(&desired.id, Some(&args.bucket))
        .await
        .map_err(|e| format!("Failed to read state: {}", e))?;
    Ok(diff(&desired, &current, &BucketType.schema()))
}

async fn run_plan(provider: &CortxProvider, args: &BucketArgs) -> Result<(), String> {
    let plan = plan_bucket(provider, args).await?;
    print_plan(&plan);
    Ok(())
}

async fn run_apply(provider: &CortxProvider, args: &BucketArgs) -> Result<(), String> {
    let plan = plan_bucket(provider, args).await?;
    if !plan.is_change() {
        println!("{}", "No changes needed.".green());
        return Ok(());
    }

    print_plan(&plan);
    println!();
    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let state = match &plan {
        Diff::Create(resource) => provider.create(resource).await,
        Diff::Update { id, from, to, .. } => {
            let identifier = from.identifier.as_deref().unwrap_or(&id.name);
            provider.update(id, identifier, from, to).await
        }
        Diff::Replace { from, to, .. } => {
            let identifier = from.identifier.as_deref().unwrap_or(&to.id.name);
            match provider.delete(to, identifier).await {
                Ok(()) => provider.create(to).await,
                Err(e) => Err(e),
            }
        }
        Diff::NoChange(_) => return Ok(()),
    };

    match state {
        Ok(state) => {
            println!("  {} {}", "✓".green(), format_diff(&plan));
            println!();
            println!("{}", "Apply complete!".green().bold());
            print_state(&state);
            Ok(())
        }
        Err(e) => {
            println!("  {} {} - {}", "✗".red(), format_diff(&plan), e);
            Err("Apply failed.".to_string())
        }
    }
}

async fn run_read(provider: &CortxProvider, bucket: &str) -> Result<(), String> {
    let id = ResourceId::new(BUCKET_TYPE, bucket);
    let state = provider
        .read(&id, Some(bucket))
        .await
        .map_err(|e| format!("Failed to read state: {}", e))?;

    if !state.exists {
        println!("{}", format!("Bucket {} does not exist.", bucket).yellow());
        return Ok(());
    }
    print_state(&state);
    Ok(())
}

/// Ask for a typed "yes"
fn confirm(question: &str) -> Result<bool, String> {
    println!("{}", question.yellow().bold());
    println!(
        "  {}",
        "This action cannot be undone. Type 'yes' to confirm.".yellow()
    );
    print!("\n  Enter a value: ");
    std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|e| e.to_string())?;
    println!();
    Ok(input.trim() == "yes")
}

async fn run_destroy(
    provider: &CortxProvider,
    bucket: &str,
    force_destroy: bool,
    auto_approve: bool,
) -> Result<(), String> {
    let resource = Resource::new(BUCKET_TYPE, bucket)
        .with_attribute("bucket", bucket)
        .with_attribute("force_destroy", force_destroy);

    let state = provider
        .read(&resource.id, Some(bucket))
        .await
        .map_err(|e| format!("Failed to read state: {}", e))?;
    if !state.exists {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    println!("  {} {}", "-".red().bold(), resource.id);
    if force_destroy {
        println!(
            "    {}",
            "force_destroy: every object version will be deleted".red()
        );
    }
    println!();

    if !auto_approve && !confirm("Do you really want to destroy this bucket?")? {
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let identifier = state.identifier.as_deref().unwrap_or(bucket);
    match provider.delete(&resource, identifier).await {
        Ok(()) => {
            println!("  {} delete {}", "✓".green(), resource.id);
            println!();
            println!("{}", "Destroy complete!".green().bold());
            Ok(())
        }
        Err(e) => {
            println!("  {} delete {} - {}", "✗".red(), resource.id, e);
            Err("Destroy failed.".to_string())
        }
    }
}

async fn run_empty(
    provider: &CortxProvider,
    bucket: &str,
    auto_approve: bool,
) -> Result<(), String> {
    if !auto_approve
        && !confirm(&format!(
            "Do you really want to delete every object in {}?",
            bucket
        ))?
    {
        println!("{}", "Empty cancelled.".yellow());
        return Ok(());
    }

    let outcome = provider.empty_bucket(bucket).await;
    let deleted = outcome.deleted;
    match outcome.result {
        Ok(()) => {
            println!(
                "{}",
                format!(
                    "Deleted {} object versions and delete markers from {}.",
                    deleted, bucket
                )
                .green()
                .bold()
            );
            Ok(())
        }
        Err(e) => {
            println!(
                "{}",
                format!("Deleted {} entries before failing.", deleted).yellow()
            );
            Err(e.to_string())
        }
    }
}

async fn run_data(provider: &CortxProvider, command: DataCommands) -> Result<(), String> {
    let resource = match command {
        DataCommands::Bucket { bucket } => Resource::new(BUCKET_TYPE, &bucket)
            .with_attribute("bucket", bucket.as_str())
            .with_read_only(true),
        DataCommands::Object {
            bucket,
            key,
            version_id,
            range,
        } => {
            let mut resource = Resource::new(OBJECT_TYPE, &key)
                .with_attribute("bucket", bucket)
                .with_attribute("key", key.as_str())
                .with_read_only(true);
            if let Some(version_id) = version_id {
                resource = resource.with_attribute("version_id", version_id);
            }
            if let Some(range) = range {
                resource = resource.with_attribute("range", range);
            }
            resource
        }
    };

    let state = provider
        .read_data_source(&resource)
        .await
        .map_err(|e| e.to_string())?;

    let output = serde_json::json!({
        "id": state.identifier,
        "attributes": attributes_to_json(&state.attributes),
    });
    let rendered = serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?;
    println!("{}", rendered);
    Ok(())
}

fn print_plan(plan: &Diff) {
    if !plan.is_change() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    match plan {
        Diff::Create(resource) => {
            println!("  {} {}", "+".green().bold(), resource.id);
            for (key, value) in sorted(&resource.attributes) {
                println!("      {}: {}", key, format_value(value).green());
            }
        }
        Diff::Update {
            id,
            from,
            to,
            changed_attributes,
        } => {
            println!("  {} {}", "~".yellow().bold(), id);
            print_changes(from, to, changed_attributes);
        }
        Diff::Replace {
            from,
            to,
            changed_attributes,
        } => {
            println!(
                "  {} {} (forces replacement)",
                "-/+".red().bold(),
                to.id
            );
            print_changes(from, to, changed_attributes);
        }
        Diff::NoChange(_) => {}
    }

    let (create, update, replace) = match plan {
        Diff::Create(_) => (1, 0, 0),
        Diff::Update { .. } => (0, 1, 0),
        Diff::Replace { .. } => (0, 0, 1),
        Diff::NoChange(_) => (0, 0, 0),
    };
    println!();
    println!(
        "Plan: {} to create, {} to update, {} to replace.",
        create.to_string().green(),
        update.to_string().yellow(),
        replace.to_string().red()
    );
}

fn print_changes(from: &State, to: &Resource, changed: &[String]) {
    for key in changed {
        let old = from
            .attributes
            .get(key)
            .map(format_value)
            .unwrap_or_else(|| "(none)".to_string());
        let new = to
            .attributes
            .get(key)
            .map(format_value)
            .unwrap_or_else(|| "(none)".to_string());
        println!("      {}: {} → {}", key, old.red(), new.green());
    }
}

fn print_state(state: &State) {
    println!();
    println!("{}", state.id.to_string().cyan().bold());
    for (key, value) in sorted(&state.attributes) {
        println!("  {}: {}", key, format_value(value));
    }
}

fn format_diff(plan: &Diff) -> String {
    match plan {
        Diff::Create(resource) => format!("create {}", resource.id),
        Diff::Update { id, .. } => format!("update {}", id),
        Diff::Replace { to, .. } => format!("replace {}", to.id),
        Diff::NoChange(id) => format!("no change {}", id),
    }
}

fn sorted(attributes: &HashMap<String, Value>) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = attributes.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let strs: Vec<_> = sorted(map)
                .into_iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            format!("{{{}}}", strs.join(", "))
        }
    }
}

fn attributes_to_json(attributes: &HashMap<String, Value>) -> serde_json::Value {
    let obj: serde_json::Map<_, _> = attributes
        .iter()
        .map(|(k, v)| (k.clone(), value_to_json(v)))
        .collect();
    serde_json::Value::Object(obj)
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Int(n) => serde_json::Value::Number((*n).into()),
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => attributes_to_json(map),
    }
}
