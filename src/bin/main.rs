//! Books Migrate CLI

use books_migrate::{MigrateConfig, MigrationPhase, Migrator, Table};
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(name = "books-migrate")]
#[command(author, version, about = "Copy a MongoDB books collection into PostgreSQL")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level
    #[arg(long, default_value = "info", global = true, env = "LOG_LEVEL")]
    log_level: String,

    /// Log format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true, env = "LOG_FORMAT")]
    log_format: LogFormat,

    /// JSON output
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the migration (default)
    Migrate,
    /// Test connectivity and the destination table layout
    Test,
    /// Show source document and destination row counts
    Status,
    /// Print the DDL the destination table must have
    Schema {
        /// Table name, optionally schema-qualified
        #[arg(short, long, default_value = "books", env = "BOOKS_TABLE")]
        table: String,
    },
    /// Generate sample config
    Init {
        #[arg(short, long, default_value = "books-migrate.toml")]
        output: String,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let quiet = cli.quiet;
    init_logging(&cli.log_level, cli.log_format, quiet, cli.json);

    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            if quiet {
                eprintln!("{} {}", style("✗").red(), e);
            } else {
                error!("Error: {}", e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    // Commands that need no config
    match cli.command {
        Some(Commands::Init { ref output, force }) => return run_init(output, force),
        Some(Commands::Schema { ref table }) => return run_schema(table, cli.json),
        _ => {}
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        None | Some(Commands::Migrate) => run_migrate(config, cli.json, cli.quiet).await,
        Some(Commands::Test) => run_test(config, cli.json).await,
        Some(Commands::Status) => run_status(config, cli.json).await,
        Some(Commands::Init { .. }) | Some(Commands::Schema { .. }) => unreachable!(), // Handled above
    }
}

fn load_config(path: Option<&str>) -> Result<MigrateConfig, Box<dyn std::error::Error>> {
    if let Some(p) = path {
        info!("Loading config from: {}", p);
        return Ok(MigrateConfig::from_file(p)?);
    }

    for default in &["books-migrate.toml", ".books-migrate.toml"] {
        if std::path::Path::new(default).exists() {
            info!("Loading config from: {}", default);
            return Ok(MigrateConfig::from_file(default)?);
        }
    }

    info!("Loading config from environment");
    Ok(MigrateConfig::from_env()?)
}

async fn run_migrate(
    config: MigrateConfig,
    json: bool,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !quiet && !json {
        println!("Books Migrate v{}", books_migrate::VERSION);
        println!(
            "{}.{} → {}\n",
            config.mongo.database, config.mongo.collection, config.migration.target_table
        );
    }

    let mut migrator = Migrator::connect(&config).await?;

    if !quiet && !json {
        let bar = progress_bar();
        migrator = migrator.with_progress(move |p| match p.phase {
            MigrationPhase::Scanning => bar.set_message("scanning source"),
            MigrationPhase::Writing => {
                if let Some(total) = p.total {
                    bar.set_length(total);
                }
                bar.set_message("writing");
                bar.set_position(p.processed);
            }
            MigrationPhase::Committing => bar.set_message("committing"),
            MigrationPhase::Done => bar.finish_and_clear(),
        });
    }

    // Both connections are released whether or not the run succeeded.
    let result = migrator.run().await;
    migrator.close().await;
    let report = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !quiet {
        println!("{} Migration completed successfully", style("✓").green());
        println!("\nDuration: {}ms", report.duration_ms);
        println!("  Scanned:  {}", report.records_scanned);
        println!("  Inserted: {}", report.records_inserted);
        println!("  Skipped:  {} (already present)", report.records_skipped);
        if report.is_clean() {
            println!("  Failed:   0");
        } else {
            println!(
                "  Failed:   {}",
                style(report.records_failed).red().bold()
            );
        }
    }

    Ok(())
}

async fn run_test(config: MigrateConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !json {
        println!("Testing connectivity...\n");
    }

    let migrator = Migrator::connect(&config).await?;
    let result = migrator.test_connectivity().await;
    migrator.close().await;
    result?;

    if json {
        println!(r#"{{"mongodb":"ok","postgres":"ok","table":"ok"}}"#);
    } else {
        println!("\n{} All connectivity tests passed!", style("✓").green());
    }
    Ok(())
}

async fn run_status(config: MigrateConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let migrator = Migrator::connect(&config).await?;
    let result = migrator.counts().await;
    migrator.close().await;
    let (documents, rows) = result?;

    if json {
        let status = serde_json::json!({
            "source_collection": config.mongo.collection,
            "source_documents": documents,
            "target_table": config.migration.target_table,
            "target_rows": rows,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("Migration Status\n");
        println!(
            "  {}.{}: {} documents",
            config.mongo.database, config.mongo.collection, documents
        );
        println!("  {}: {} rows", config.migration.target_table, rows);
    }
    Ok(())
}

fn run_schema(table: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let table = Table::books(table);

    if json {
        println!("{}", serde_json::to_string_pretty(&table)?);
    } else {
        println!("{}", table.to_postgres_ddl());
    }
    Ok(())
}

fn run_init(output: &str, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if std::path::Path::new(output).exists() && !force {
        return Err(format!("{} already exists (use --force to overwrite)", output).into());
    }

    let config = r#"# Books Migrate Configuration

[mongo]
uri = "mongodb://localhost:27017"
database = "library"
collection = "books"
batch_size = 1000
connect_timeout = "30s"

[postgres]
host = "localhost"
port = 5432
database = "library"
user = "postgres"
password = "postgres"
ssl_mode = "prefer"
connect_timeout = "30s"

[migration]
target_table = "books"
"#;

    std::fs::write(output, config)?;
    println!("{} Created: {}", style("✓").green(), output);
    println!("\nEdit the file or use environment variables:");
    println!("  MONGO_URI, MONGO_DB, PG_HOST, PG_DATABASE, PG_USER, PG_PASSWORD, PG_PORT");
    Ok(())
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar
}

fn init_logging(level: &str, format: LogFormat, quiet: bool, json_output: bool) {
    if quiet {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // When JSON output is enabled, send logs to stderr to avoid mixing with JSON on stdout
    match (format, json_output) {
        (LogFormat::Json, true) => fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        (LogFormat::Json, false) => fmt().json().with_env_filter(filter).init(),
        (LogFormat::Text, true) => fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
        (LogFormat::Text, false) => fmt().with_env_filter(filter).with_target(false).init(),
    }
}
