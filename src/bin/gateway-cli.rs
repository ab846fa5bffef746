use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Client CLI for the session gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    #[arg(long, default_value = "/mcp")]
    path: String,

    #[arg(long, default_value = "mcp-session-id")]
    session_header: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway health
    Health {
        #[arg(long, default_value = "/health")]
        health_path: String,
    },
    /// Send a JSON-RPC request
    Call {
        method: String,
        /// JSON params
        #[arg(short, long)]
        params: Option<String>,
        /// Continue an existing session
        #[arg(short, long)]
        session: Option<String>,
        /// Bearer API key
        #[arg(short, long)]
        key: Option<String>,
    },
    /// Terminate a session
    Terminate { session: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let endpoint = format!("{}{}", cli.url, cli.path);

    match cli.command {
        Commands::Health { health_path } => {
            let res = client.get(format!("{}{}", cli.url, health_path)).send().await?;
            print_response(res, None).await?;
        }
        Commands::Call { method, params, session, key } => {
            let params: Value = match params {
                Some(raw) => serde_json::from_str(&raw)?,
                None => json!({}),
            };

            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            if let Some(key) = key {
                headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
            }
            if let Some(session) = session {
                headers.insert(
                    reqwest::header::HeaderName::from_bytes(cli.session_header.as_bytes())?,
                    HeaderValue::from_str(&session)?,
                );
            }

            let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
            let res = client.post(&endpoint).headers(headers).json(&body).send().await?;
            print_response(res, Some(&cli.session_header)).await?;
        }
        Commands::Terminate { session } => {
            let res = client
                .delete(&endpoint)
                .header(cli.session_header.as_str(), session)
                .send()
                .await?;
            print_response(res, None).await?;
        }
    }

    Ok(())
}

async fn print_response(
    res: reqwest::Response,
    session_header: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if let Some(session) = session_header
        .and_then(|name| res.headers().get(name))
        .and_then(|v| v.to_str().ok())
    {
        eprintln!("Session: {}", session);
    }

    if status == reqwest::StatusCode::ACCEPTED {
        eprintln!("Accepted");
        return Ok(());
    }

    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
