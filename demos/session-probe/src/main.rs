//! StrateZone Session Probe
//!
//! Small command-line tool for poking at a StrateZone backend session:
//! 1. `login <username>` signs in and caches the credential pair
//! 2. `status` shows whether a session is cached
//! 3. `get <path>` performs a protected GET (refreshing on 401)
//! 4. `burst <path> [n]` fires n concurrent GETs to watch a single refresh
//! 5. `logout` drops the cached session
//!
//! Configuration comes from `STRATEZONE_API_URL` and friends.
//! Run with: cargo run -p stratezone-session-probe -- status

use std::io::{BufRead, Write};
use std::sync::Arc;

use futures::future::join_all;
use stratezone_client::auth::{
    AuthCoordinator, CredentialVault, FileCredentialStore, HttpRefresher,
};
use stratezone_client::{ApiClient, ApiError, ClientConfig, ReqwestTransport, Transport};

const DEFAULT_BURST: usize = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stratezone_client=debug".parse().unwrap()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_help();
        return Ok(());
    };

    let client = build_client()?;

    match command.as_str() {
        "login" => {
            let username = args
                .get(1)
                .ok_or_else(|| anyhow::anyhow!("usage: login <username>"))?;
            let password = read_password()?;
            let credentials = client.login(username, &password).await?;
            println!("✓ Signed in (token {:?})", credentials.access_token);
        }
        "logout" => {
            client.logout()?;
            println!("✓ Signed out");
        }
        "status" => status(&client)?,
        "get" => {
            let path = args
                .get(1)
                .ok_or_else(|| anyhow::anyhow!("usage: get <path>"))?;
            let body: serde_json::Value = client.get_json(path).await.map_err(explain)?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        "burst" => {
            let path = args
                .get(1)
                .ok_or_else(|| anyhow::anyhow!("usage: burst <path> [n]"))?;
            let count = match args.get(2) {
                Some(n) => n.parse()?,
                None => DEFAULT_BURST,
            };
            burst(&client, path, count).await;
        }
        "help" | "--help" | "-h" => print_help(),
        other => {
            eprintln!("Unknown command: {other}");
            print_help();
        }
    }

    Ok(())
}

fn build_client() -> anyhow::Result<ApiClient> {
    let config = ClientConfig::from_env()?;
    let store = Arc::new(FileCredentialStore::new());
    tracing::debug!(path = %store.path().display(), "Using credential file");

    let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(&config)?);
    let refresher = HttpRefresher::new(
        Arc::clone(&transport),
        config.refresh_path.clone(),
        config.refresh_placement.clone(),
    );
    let coordinator = AuthCoordinator::new(CredentialVault::new(store), Arc::new(refresher))
        .with_refresh_timeout(config.refresh_timeout)
        .on_session_expired(|reason| {
            eprintln!("Session expired ({reason}). Run `login <username>` again.");
        });

    Ok(ApiClient::with_coordinator(config, transport, coordinator))
}

fn status(client: &ApiClient) -> anyhow::Result<()> {
    println!("Backend: {}", client.config().base_url);
    match client.current_credentials()? {
        Some(credentials) => {
            println!("✓ Session cached");
            println!("  access token:  {:?}", credentials.access_token);
            println!("  refresh token: {:?}", credentials.refresh_token);
        }
        None => println!("✗ No session cached"),
    }
    Ok(())
}

async fn burst(client: &ApiClient, path: &str, count: usize) {
    let results = join_all(
        (0..count).map(|_| client.get_json::<serde_json::Value>(path)),
    )
    .await;

    let ok = results.iter().filter(|r| r.is_ok()).count();
    println!("{ok}/{count} succeeded");
    for err in results.into_iter().filter_map(Result::err) {
        println!("  ✗ {err}");
    }
}

fn read_password() -> anyhow::Result<String> {
    if let Ok(password) = std::env::var("STRATEZONE_PASSWORD") {
        return Ok(password);
    }
    print!("Password: ");
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().lock().read_line(&mut input)?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}

fn explain(err: ApiError) -> anyhow::Error {
    if err.is_auth_expired() {
        anyhow::anyhow!("{err}\nSign in again with: login <username>")
    } else {
        err.into()
    }
}

fn print_help() {
    println!("StrateZone session probe");
    println!();
    println!("Commands:");
    println!("  login <username>    Sign in (password from STRATEZONE_PASSWORD or prompt)");
    println!("  logout              Drop the cached session");
    println!("  status              Show the cached session");
    println!("  get <path>          Protected GET, pretty-printed");
    println!("  burst <path> [n]    n concurrent protected GETs (default {DEFAULT_BURST})");
    println!();
    println!("Environment:");
    println!("  STRATEZONE_API_URL               Backend base URL (required)");
    println!("  STRATEZONE_REFRESH_TIMEOUT_SECS  Refresh timeout in seconds");
    println!("  STRATEZONE_REQUEST_TIMEOUT_SECS  Request timeout in seconds");
}
