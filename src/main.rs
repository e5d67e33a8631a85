use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use opsboard::auth::AuthContext;
use opsboard::client::activity::{spawn_feed_refresh, FEED_REFRESH_INTERVAL};
use opsboard::client::users::NewUser;
use opsboard::client::ApiClient;
use opsboard::config::Config;
use opsboard::geocode::Geocoder;
use opsboard::idp::IdpClient;
use opsboard::prefs::{PrefsStore, SidebarPrefs, StoredSession};
use opsboard::utils::logging;

#[derive(Parser)]
#[command(name = "opsboard", version = opsboard::VERSION, about = "Ops Board admin dashboard CLI")]
struct AppCli {
    /// Log debug detail (RUST_LOG overrides)
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with a phone number via OTP
    Login {
        #[arg(long)]
        phone: String,
    },
    /// Revoke and forget the stored session
    Logout,
    /// Show the signed-in user's profile
    Whoami,
    /// User management
    #[command(subcommand)]
    Users(UsersCommand),
    /// Role permission maps
    #[command(subcommand)]
    Rbac(RbacCommand),
    /// Activity logs
    Logs {
        /// Entries per page
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Number of pages to fetch
        #[arg(long, default_value_t = 1)]
        pages: u32,
        /// Keep refreshing until interrupted
        #[arg(long)]
        follow: bool,
    },
    /// Headline dashboard numbers
    Stats,
    /// List stations
    Stations,
    /// List reported user issues
    Issues,
    /// Route analytics
    Routes,
    /// Reverse-geocode a coordinate pair
    Geocode {
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lon: f64,
    },
    /// Sidebar layout preferences
    #[command(subcommand)]
    Sidebar(SidebarCommand),
}

#[derive(Subcommand)]
enum UsersCommand {
    /// Fetch a user by id
    Get { id: String },
    /// Check whether a phone number has an account
    Exists { phone: String },
    /// Create a user
    Create {
        #[arg(long)]
        phone: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long, default_value = "admin")]
        role: String,
    },
    /// Apply a JSON patch to a user
    Update {
        id: String,
        /// Fields to change, as a JSON object
        #[arg(long)]
        patch: String,
    },
    /// Delete a user
    Delete { id: String },
}

#[derive(Subcommand)]
enum RbacCommand {
    /// Show the permission map for a role
    Show {
        #[arg(long)]
        role: String,
    },
    /// Rebuild the backend RBAC cache
    Sync,
}

#[derive(Subcommand)]
enum SidebarCommand {
    /// Print the stored layout
    Get {
        #[arg(long)]
        user: Option<String>,
    },
    /// Store a layout
    Set {
        #[arg(long)]
        user: Option<String>,
        /// Section names in order, comma separated
        #[arg(long, value_delimiter = ',')]
        order: Vec<String>,
        /// Apply the custom order instead of the default layout
        #[arg(long)]
        custom: bool,
    },
    /// Forget the stored layout
    Reset {
        #[arg(long)]
        user: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = AppCli::parse();
    if cli.verbose {
        logging::init_with("opsboard=debug,info");
    } else {
        logging::init();
    }

    let config = Config::from_env();
    let prefs = PrefsStore::open_default()?;
    let ctx = AuthContext::init(&config).await;

    let outcome = run(cli.command, &config, &prefs, &ctx).await;

    if let Err(err) = &outcome {
        match err.downcast_ref::<opsboard::Error>() {
            Some(api_err) if api_err.is_auth() => {
                eprintln!("Authentication required. Run `opsboard login --phone <number>`.");
            }
            Some(opsboard::Error::Forbidden(reason)) => {
                eprintln!("Access denied: {reason}. Signing out.");
                let _ = prefs.clear_session();
            }
            _ => {}
        }
    }

    ctx.teardown().await;
    outcome
}

async fn run(
    command: Commands,
    config: &Config,
    prefs: &PrefsStore,
    ctx: &AuthContext,
) -> Result<()> {
    match command {
        Commands::Login { phone } => login(&phone, config, prefs, ctx).await,
        Commands::Logout => logout(config, prefs, ctx).await,
        Commands::Whoami => {
            let stored = prefs.load_session().context("not signed in")?;
            let client = api_client(config, prefs, ctx).await?;
            match client.get_user(&stored.user_id).await {
                Ok(profile) => print_json(&profile),
                Err(err) => {
                    warn!(error = %err, "profile fetch failed, showing stored session");
                    print_json(&json!({
                        "userId": stored.user_id,
                        "sessionId": stored.session_id,
                    }))
                }
            }
        }
        Commands::Users(cmd) => {
            let client = api_client(config, prefs, ctx).await?;
            match cmd {
                UsersCommand::Get { id } => print_json(&client.get_user(&id).await?),
                UsersCommand::Exists { phone } => {
                    let exists = client.user_exists(&phone).await?;
                    print_json(&json!({ "exists": exists }))
                }
                UsersCommand::Create {
                    phone,
                    first_name,
                    last_name,
                    role,
                } => {
                    let created = client
                        .create_user(&NewUser {
                            phone_number: phone,
                            first_name,
                            last_name,
                            role,
                        })
                        .await?;
                    print_json(&created)
                }
                UsersCommand::Update { id, patch } => {
                    let patch: Value =
                        serde_json::from_str(&patch).context("--patch is not valid JSON")?;
                    print_json(&client.update_user(&id, patch).await?)
                }
                UsersCommand::Delete { id } => {
                    client.delete_user(&id).await?;
                    println!("deleted {id}");
                    Ok(())
                }
            }
        }
        Commands::Rbac(cmd) => {
            let client = api_client(config, prefs, ctx).await?;
            match cmd {
                RbacCommand::Show { role } => {
                    let set = client.permissions_for(&role).await?;
                    print_json(&serde_json::to_value(&set)?)
                }
                RbacCommand::Sync => print_json(&client.sync_and_assign().await?),
            }
        }
        Commands::Logs {
            limit,
            pages,
            follow,
        } => {
            let client = api_client(config, prefs, ctx).await?;
            if follow {
                follow_logs(client, limit).await
            } else {
                let mut loader = client.activity_feed(limit);
                loader.load_initial().await;
                if let Some(err) = loader.error() {
                    bail!("activity fetch failed: {err}");
                }
                for _ in 1..pages {
                    if !loader.has_more() {
                        break;
                    }
                    loader.load_more().await;
                    if let Some(err) = loader.error() {
                        bail!("activity fetch failed: {err}");
                    }
                }
                print_json(&Value::Array(loader.items().to_vec()))
            }
        }
        Commands::Stats => {
            let client = api_client(config, prefs, ctx).await?;
            print_json(&client.dashboard_stats().await?)
        }
        Commands::Stations => {
            let client = api_client(config, prefs, ctx).await?;
            print_json(&Value::Array(client.stations().await?))
        }
        Commands::Issues => {
            let client = api_client(config, prefs, ctx).await?;
            print_json(&Value::Array(client.user_issues().await?))
        }
        Commands::Routes => {
            let client = api_client(config, prefs, ctx).await?;
            print_json(&Value::Array(client.route_analytics().await?))
        }
        Commands::Geocode { lat, lon } => {
            let geocoder = Geocoder::new(config)?;
            println!("{}", geocoder.reverse(lat, lon).await?);
            Ok(())
        }
        Commands::Sidebar(cmd) => sidebar(cmd, prefs),
    }
}

async fn login(
    phone: &str,
    config: &Config,
    prefs: &PrefsStore,
    ctx: &AuthContext,
) -> Result<()> {
    let idp = IdpClient::new(config)?;
    let challenge = idp.start_otp(phone).await?;

    print!("Enter the code sent to your phone: ");
    io::stdout().flush()?;
    let mut code = String::new();
    io::stdin()
        .read_line(&mut code)
        .context("reading otp code")?;

    let session = idp.verify_otp(&challenge, code.trim()).await?;
    prefs.save_session(&StoredSession {
        session_id: session.session_id.clone(),
        user_id: session.user_id.clone(),
    })?;

    let handle = Arc::new(idp.session_handle(session.session_id.clone()));
    ctx.sign_in(session.session_id, handle, &config.token_template)
        .await;

    println!("signed in as {}", session.user_id);
    Ok(())
}

async fn logout(config: &Config, prefs: &PrefsStore, ctx: &AuthContext) -> Result<()> {
    if let Some(stored) = prefs.load_session() {
        match IdpClient::new(config) {
            Ok(idp) => {
                if let Err(err) = idp.sign_out(&stored.session_id).await {
                    warn!(error = %err, "session revoke failed, clearing local state anyway");
                }
            }
            Err(err) => warn!(error = %err, "identity provider not configured"),
        }
    }

    prefs.clear_session()?;
    ctx.teardown().await;
    println!("signed out");
    Ok(())
}

/// Rebind the stored session, if any, then hand out an API client.
/// Commands still run without one; the backend answers 401 and the error
/// path explains itself.
async fn api_client(config: &Config, prefs: &PrefsStore, ctx: &AuthContext) -> Result<ApiClient> {
    if let Some(stored) = prefs.load_session() {
        match IdpClient::new(config) {
            Ok(idp) => {
                let handle = Arc::new(idp.session_handle(stored.session_id.clone()));
                ctx.sign_in(stored.session_id, handle, &config.token_template)
                    .await;
            }
            Err(err) => {
                warn!(error = %err, "identity provider unavailable, continuing unauthenticated")
            }
        }
    }
    Ok(ApiClient::new(config, ctx.clone())?)
}

async fn follow_logs(client: ApiClient, limit: u32) -> Result<()> {
    let first = client.activity_page(1, limit).await?;
    print_json(&Value::Array(first.items))?;

    let (handle, mut rx) = spawn_feed_refresh(client, limit, FEED_REFRESH_INTERVAL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            entries = rx.recv() => match entries {
                Ok(entries) => print_json(&Value::Array(entries))?,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "feed receiver lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    handle.abort();
    Ok(())
}

fn sidebar(cmd: SidebarCommand, prefs: &PrefsStore) -> Result<()> {
    match cmd {
        SidebarCommand::Get { user } => {
            let user = resolve_user(user, prefs)?;
            match prefs.load_sidebar(&user) {
                Some(layout) => print_json(&serde_json::to_value(&layout)?),
                None => {
                    println!("no stored layout for {user}");
                    Ok(())
                }
            }
        }
        SidebarCommand::Set {
            user,
            order,
            custom,
        } => {
            let user = resolve_user(user, prefs)?;
            prefs.save_sidebar(
                &user,
                &SidebarPrefs {
                    order,
                    custom_order_enabled: custom,
                },
            )?;
            println!("layout saved for {user}");
            Ok(())
        }
        SidebarCommand::Reset { user } => {
            let user = resolve_user(user, prefs)?;
            prefs.clear_sidebar(&user)?;
            println!("layout reset for {user}");
            Ok(())
        }
    }
}

fn resolve_user(user: Option<String>, prefs: &PrefsStore) -> Result<String> {
    user.or_else(|| prefs.load_session().map(|s| s.user_id))
        .context("no --user given and no stored session")
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
