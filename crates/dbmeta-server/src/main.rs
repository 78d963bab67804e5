use anyhow::Context;
use clap::Parser;
use dbmeta_catalog::MySqlCatalog;
use dbmeta_core::{DbMetaConfig, LoggingConfig};
use dbmeta_server::{MetadataServer, ToolDispatcher, create_router, serve};
use dbmeta_telemetry::{init_telemetry, sink_from_config};
use rmcp::ServiceExt;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "dbmeta-server")]
#[command(version)]
#[command(about = "Read-only MySQL schema metadata over MCP")]
#[command(long_about = "Read-only MySQL schema metadata over MCP

Speaks MCP over stdin/stdout by default. Pass --http to serve the
streamable HTTP transport on /mcp instead, with /health and /readiness
probes alongside.

Settings come from environment variables, optionally loaded from a
dotenv file: DB_HOST, DB_PORT, DB_USER, DB_PASSWORD, DB_NAME, DB_SSL,
DB_CONNECT_TIMEOUT and DB_QUERY_TIMEOUT for the connection;
RATE_LIMIT_RPM, MAX_TABLES_PER_REQUEST, MAX_IDENTIFIER_LENGTH,
MAX_LIST_TABLES_RESULT, MAX_CONCURRENT_REQUESTS and ALLOWED_SCHEMAS for
limits; AUDIT_ENABLED, AUDIT_LOG_PATH and AUDIT_FORMAT for the audit log;
LOG_FORMAT (text or json) and RUST_LOG for diagnostics.")]
struct Args {
    /// Serve over HTTP on this port instead of stdio
    #[arg(long, value_name = "PORT")]
    http: Option<u16>,

    /// Bind address for --http
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Dotenv file to load before reading the environment
    #[arg(long, value_name = "FILE")]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_file = DbMetaConfig::load_env_file(args.env_file.as_deref())
        .context("failed to load configuration")?;
    init_telemetry(&LoggingConfig::from_env())?;
    if let Some(path) = &env_file {
        tracing::debug!("Loaded environment from: {:?}", path);
    }
    let config = DbMetaConfig::from_env();

    tracing::info!(
        host = %config.database.host,
        port = config.database.port,
        "Starting dbmeta server"
    );

    let catalog = Arc::new(MySqlCatalog::new(&config.database));
    let audit = sink_from_config(&config.audit).context("failed to open audit log")?;
    let dispatcher = Arc::new(ToolDispatcher::from_config(&config.limits, catalog, audit));
    let server = MetadataServer::new(dispatcher);

    match args.http {
        Some(port) => serve(create_router(server), &args.host, port).await?,
        None => {
            tracing::info!("Serving MCP over stdio");
            let running = server.serve(rmcp::transport::stdio()).await?;
            running.waiting().await?;
        }
    }

    Ok(())
}
