// Otter CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Requests go through the refresh interceptor; `--trace` prints the state trail.
// Design Decision: The refresh token persists in a file between invocations, the access token does not.

mod output;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use otter_client::{ApiRequest, Client, ClientConfig, FileTokenStore};
use reqwest::Method;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use crate::output::{field_line, OutputFormat};

#[derive(Parser)]
#[command(name = "otter")]
#[command(about = "Otter CLI - Sign in and call services through the gateway")]
#[command(version)]
pub struct Cli {
    /// Gateway base URL
    #[arg(long, env = "OTTER_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Gateway prefix of the auth backend
    #[arg(long, env = "OTTER_AUTH_PATH", default_value = "/auth")]
    pub auth_path: String,

    /// Refresh token file (default: ~/.otter/refresh-token)
    #[arg(long, env = "OTTER_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    /// Output format
    #[arg(long, short, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in with email and password
    Login {
        email: String,
        #[arg(long, env = "OTTER_PASSWORD")]
        password: String,
    },

    /// Create an account and sign in
    Signup {
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long, env = "OTTER_PASSWORD")]
        password: String,
    },

    /// Sign in with a Google ID token
    Google {
        #[arg(long)]
        id_token: String,
    },

    /// Revoke the stored refresh token
    Logout,

    /// Show the current user
    Whoami,

    /// GET a gateway path, e.g. /budget/user
    Get {
        path: String,
        /// Print the interceptor state trail to stderr
        #[arg(long)]
        trace: bool,
    },

    /// POST a JSON body to a gateway path
    Post {
        path: String,
        /// JSON body
        #[arg(long, default_value = "{}")]
        data: String,
        #[arg(long)]
        trace: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = FileTokenStore::new(
        cli.token_file
            .clone()
            .unwrap_or_else(FileTokenStore::default_path),
    );
    let client = Client::new(
        ClientConfig::new(&cli.api_url, &cli.auth_path),
        Arc::new(store),
    )?;
    let output_format = cli.output;

    match cli.command {
        Commands::Login { email, password } => {
            println!("{}", client.login(&email, &password).await?);
        }
        Commands::Signup {
            email,
            name,
            password,
        } => {
            println!("{}", client.signup(&email, &password, &name).await?);
        }
        Commands::Google { id_token } => {
            println!("{}", client.google(&id_token).await?);
        }
        Commands::Logout => {
            println!("{}", client.logout().await?);
        }
        Commands::Whoami => {
            let user = client.whoami().await?;
            if output_format.is_text() {
                print_user(&user);
            } else {
                output_format.print(&user)?;
            }
        }
        Commands::Get { path, trace } => {
            call(&client, ApiRequest::get(path), trace, output_format).await?;
        }
        Commands::Post { path, data, trace } => {
            let body: Value = serde_json::from_str(&data).context("--data must be valid JSON")?;
            let request = ApiRequest::new(Method::POST, path).with_body(body);
            call(&client, request, trace, output_format).await?;
        }
    }

    Ok(())
}

async fn call(
    client: &Client,
    request: ApiRequest,
    trace: bool,
    output: OutputFormat,
) -> Result<()> {
    let exchange = client.request(&request).await?;
    if trace {
        eprintln!("{}", serde_json::to_string(&exchange.trail)?);
    }

    let status = exchange.response.status();
    let text = exchange.response.text().await?;
    if output.is_text() {
        println!("{}", field_line("Status", status.as_str()));
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => output.print(&json)?,
        Err(_) => println!("{text}"),
    }

    if !status.is_success() {
        anyhow::bail!("Request failed with status {status}");
    }
    Ok(())
}

fn print_user(user: &Value) {
    let field = |key: &str| user.get(key).and_then(|v| v.as_str()).unwrap_or("-").to_string();
    println!("{}", field_line("ID", &field("sub")));
    println!("{}", field_line("Email", &field("email")));
    println!("{}", field_line("Name", &field("name")));
    let services = user
        .get("services")
        .and_then(|s| s.as_array())
        .map(|s| {
            s.iter()
                .filter_map(|v| v.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    println!("{}", field_line("Services", &services));
}
