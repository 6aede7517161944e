use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gate-cli")]
#[command(about = "Management CLI for the Admin Gate", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    /// Session token from `gate-cli login`
    #[arg(short, long, env = "ADMIN_GATE_SESSION")]
    session: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and print a session token
    Login {
        #[arg(short, long, env = "ADMIN_PASSWORD")]
        password: String,
    },
    /// Show gate status
    Status,
    /// Show recent audit entries and the login summary
    Audit {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Download the full audit document
    Export,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(session) = &cli.session {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", session))?);
    }

    match cli.command {
        Commands::Login { password } => {
            let token: Value = client
                .get(format!("{}/admin/csrf-token", cli.url))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            let csrf = token["csrfToken"].as_str().unwrap_or_default();

            let res = client
                .post(format!("{}/admin/login", cli.url))
                .header("x-csrf-token", csrf)
                .json(&json!({ "password": password }))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Status => {
            let res = client
                .get(format!("{}/admin/status", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Audit { limit } => {
            let res = client
                .get(format!("{}/admin/audit", cli.url))
                .query(&[("limit", limit)])
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Export => {
            let res = client
                .get(format!("{}/admin/audit/export", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
