//! snowflake-migrate CLI - Idempotent Snowflake database, schema and table migration.

use clap::{Parser, Subcommand};
use snowflake_migrate::{
    Config, ConfigOverrides, MappingFile, MergePlan, MigrateError, Orchestrator, RunSummary,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "snowflake-migrate")]
#[command(about = "Idempotent Snowflake database, schema and table migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (optional; environment and flags fill gaps)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Snowflake account identifier
    #[arg(long, global = true, env = "SNOWFLAKE_ACCOUNT")]
    account: Option<String>,

    /// Login user
    #[arg(long, global = true, env = "DESTINATION_USER")]
    user: Option<String>,

    /// Password or programmatic access token
    #[arg(long, global = true, env = "SNOWFLAKE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Default session role
    #[arg(long, global = true, env = "SNOWFLAKE_ROLE")]
    role: Option<String>,

    /// Compute warehouse
    #[arg(long, global = true, env = "SNOWFLAKE_WAREHOUSE")]
    warehouse: Option<String>,

    /// Role that owns migrated databases
    #[arg(long, global = true, env = "SNOWFLAKE_ADMIN_ROLE")]
    admin_role: Option<String>,

    /// Role granted read access on migrated databases
    #[arg(long, global = true, env = "SNOWFLAKE_READONLY_ROLE")]
    readonly_role: Option<String>,

    /// Concurrent database units (default: 8)
    #[arg(long, global = true)]
    database_workers: Option<usize>,

    /// Concurrent schema units (default: 2)
    #[arg(long, global = true)]
    schema_workers: Option<usize>,

    /// Concurrent table statements per schema (default: 4)
    #[arg(long, global = true)]
    table_workers: Option<usize>,

    /// Target database to leave out (repeatable)
    #[arg(long = "exclude-database", global = true)]
    exclude_databases: Vec<String>,

    /// Output JSON result to stdout
    #[arg(long, global = true)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, global = true, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create every target database in the mapping, with grants
    CreateDatabases {
        /// JSON-lines mapping file
        #[arg(short, long)]
        mapping: PathBuf,
    },

    /// Create every target schema and copy its tables
    CreateTables {
        /// JSON-lines mapping file
        #[arg(short, long)]
        mapping: PathBuf,
    },

    /// Create databases, then schemas and tables
    Migrate {
        /// JSON-lines mapping file
        #[arg(short, long)]
        mapping: PathBuf,
    },

    /// Write a mapping from a database whose schemas are named <DB>__<SCHEMA>
    GenerateMapping {
        /// Database holding the <DB>__<SCHEMA> schemas
        #[arg(long)]
        source_database: String,

        /// Output path for the JSON-lines mapping
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Clone every database's schemas into one database as <DB>__<SCHEMA>
    Merge {
        /// Database receiving the cloned schemas
        #[arg(long)]
        output_database: String,

        /// Execute the clones (default is a dry run that prints them)
        #[arg(long)]
        apply: bool,
    },

    /// Test the warehouse connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };
    let config = config.with_overrides(overrides(&cli));
    config.validate()?;

    match &cli.command {
        Commands::CreateDatabases { mapping } => {
            let mapping = load_mapping(mapping)?;
            let orchestrator = Orchestrator::new(config)?;
            let summary = orchestrator.create_databases(&mapping).await;
            print_summaries(&[summary], cli.output_json)?;
        }

        Commands::CreateTables { mapping } => {
            let mapping = load_mapping(mapping)?;
            let orchestrator = Orchestrator::new(config)?;
            let summary = orchestrator.create_tables(&mapping).await;
            print_summaries(&[summary], cli.output_json)?;
        }

        Commands::Migrate { mapping } => {
            let mapping = load_mapping(mapping)?;
            let orchestrator = Orchestrator::new(config)?;
            let summaries = orchestrator.migrate(&mapping).await;
            print_summaries(&summaries, cli.output_json)?;
        }

        Commands::GenerateMapping {
            source_database,
            output,
        } => {
            let orchestrator = Orchestrator::new(config)?;
            let mapping = orchestrator.generate_mapping(source_database).await?;
            mapping.save(output)?;
            println!(
                "Wrote {} mapping records to {}",
                mapping.records.len(),
                output.display()
            );
        }

        Commands::Merge {
            output_database,
            apply,
        } => {
            let orchestrator = Orchestrator::new(config)?;
            let plan = orchestrator.plan_merge(output_database).await?;
            if *apply {
                let summary = orchestrator.apply_merge(&plan).await?;
                print_summaries(&[summary], cli.output_json)?;
            } else {
                print_plan(&plan, cli.output_json)?;
            }
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::new(config)?;
            let result = orchestrator.health_check().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Snowflake: {} ({}ms)",
                    if result.healthy { "OK" } else { "FAILED" },
                    result.latency_ms
                );
                if let Some(ref version) = result.version {
                    println!("    Version: {}", version);
                }
                if let Some(ref err) = result.error {
                    println!("    Error: {}", err);
                }
            }

            if let Some(err) = result.error {
                return Err(MigrateError::warehouse("SELECT CURRENT_VERSION()", err));
            }
        }
    }

    Ok(())
}

fn overrides(cli: &Cli) -> ConfigOverrides {
    ConfigOverrides {
        account: cli.account.clone(),
        user: cli.user.clone(),
        password: cli.password.clone(),
        role: cli.role.clone(),
        warehouse: cli.warehouse.clone(),
        admin_role: cli.admin_role.clone(),
        readonly_role: cli.readonly_role.clone(),
        database_workers: cli.database_workers,
        schema_workers: cli.schema_workers,
        table_workers: cli.table_workers,
        exclude_databases: cli.exclude_databases.clone(),
    }
}

fn load_mapping(path: &Path) -> Result<MappingFile, MigrateError> {
    let mapping = MappingFile::load(path)?;
    info!(
        "Loaded {} mapping records from {:?}",
        mapping.records.len(),
        path
    );
    Ok(mapping)
}

fn print_summaries(summaries: &[RunSummary], output_json: bool) -> Result<(), MigrateError> {
    if output_json {
        println!("{}", serde_json::to_string_pretty(summaries)?);
        return Ok(());
    }

    for summary in summaries {
        println!("\nPhase '{}' completed!", summary.phase);
        println!("  Run ID: {}", summary.run_id);
        println!("  Duration: {:.2}s", summary.duration_seconds);
        println!("  Units: {}", summary.units_total);
        println!("  Done: {}", summary.counts.done);
        println!("  Skipped: {}", summary.counts.skipped);
        println!("  Failed: {}", summary.counts.failed);
        println!("  Error: {}", summary.counts.error);
        if !summary.failed_units.is_empty() {
            println!("  Needs rerun: {:?}", summary.failed_units);
        }
    }
    Ok(())
}

fn print_plan(plan: &MergePlan, output_json: bool) -> Result<(), MigrateError> {
    let statements = plan.statements();
    if output_json {
        println!("{}", serde_json::to_string_pretty(&statements)?);
        return Ok(());
    }

    println!("Dry run: {} statements (pass --apply to execute)", statements.len());
    for statement in &statements {
        println!("  {};", statement);
    }
    if !plan.skipped_imported.is_empty() {
        println!("  Skipped imported databases: {:?}", plan.skipped_imported);
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
