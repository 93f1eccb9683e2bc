use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use qcflow_transport::config::TransportConfig;
use qcflow_transport::credentials::{
    ChainProvider, CredentialProvider, CredentialRecord, EnvVarNames, EnvironmentProvider,
    StaticProvider,
};
use qcflow_transport::http::{Method, RestClient};
use qcflow_transport::runtime::RealRuntime;

/// qcflow-transport - talk to a tracking server the way the client library does
///
/// Credentials come from --host/--token when given, otherwise from the
/// QCFLOW_TRACKING_* environment variables and ~/.qcflow/credentials.
/// Retries follow the QCFLOW_HTTP_REQUEST_* variables.
///
/// Examples:
///   qcflow-transport call GET /api/2.0/qcflow/experiments/search --data '{"max_results":5}'
///   qcflow-transport env
#[derive(Parser, Debug)]
#[command(author, version = env!("QCFLOW_TRANSPORT_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Tracking server URL (takes precedence over QCFLOW_TRACKING_URI)
    #[arg(long, value_name = "URL", global = true)]
    pub host: Option<String>,

    /// Bearer token used with --host
    #[arg(long, value_name = "TOKEN", requires = "host", global = true)]
    pub token: Option<String>,

    /// Skip TLS verification for --host
    #[arg(long, requires = "host", global = true)]
    pub insecure: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Call a REST endpoint and print the response body
    Call(CallArgs),

    /// Print the resolved credentials as KEY=VALUE lines
    Env,
}

#[derive(clap::Args, Debug)]
pub struct CallArgs {
    /// GET or POST
    #[arg(value_name = "METHOD")]
    pub method: Method,

    /// Endpoint path, e.g. /api/2.0/qcflow/runs/get
    #[arg(value_name = "PATH")]
    pub path: String,

    /// Request payload as JSON (query parameters for GET)
    #[arg(long, short = 'd', value_name = "JSON")]
    pub data: Option<String>,
}

/// Variable names the artifact CLI reads its login from.
fn artifact_cli_env_names() -> EnvVarNames {
    EnvVarNames {
        host: "DATABRICKS_HOST".to_string(),
        username: "DATABRICKS_USERNAME".to_string(),
        password: "DATABRICKS_PASSWORD".to_string(),
        token: "DATABRICKS_TOKEN".to_string(),
        insecure_tls: "DATABRICKS_INSECURE".to_string(),
    }
}

fn build_provider(cli: &Cli, runtime: RealRuntime) -> ChainProvider {
    let mut chain = ChainProvider::default();
    if let Some(host) = &cli.host {
        let mut record = CredentialRecord::new(host.clone()).with_insecure_tls(cli.insecure);
        if let Some(token) = &cli.token {
            record = record.with_token(token.clone());
        }
        chain = chain.push(Arc::new(StaticProvider::new(record)));
    }
    chain.push(Arc::new(EnvironmentProvider::new(runtime)))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = RealRuntime;
    let provider = build_provider(&cli, runtime);

    match &cli.command {
        Commands::Call(args) => {
            let config = TransportConfig::from_runtime(&runtime)?;
            let client = RestClient::new(Arc::new(provider), config);
            let body = client
                .call(args.method, &args.path, args.data.as_deref())
                .await
                .with_context(|| format!("{} {} failed", args.method, args.path))?;
            println!("{}", String::from_utf8_lossy(&body));
        }
        Commands::Env => {
            let record = provider
                .get_credentials()
                .context("Failed to resolve tracking credentials")?;
            for (key, value) in record.to_env_vars(&artifact_cli_env_names()) {
                println!("{}={}", key, value);
            }
        }
    }
    Ok(())
}
