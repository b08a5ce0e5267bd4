//! carlot -- vehicle listing catalog.
//!
//! Seller commands run the core as a client with their own session; the
//! signed-in credential persists in the local account database between
//! invocations.  Visitor commands need no identity.  `serve` exposes the
//! read-only HTTP surface.

use std::future::IntoFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use carlot::assets::{Draft, SelectedFile};
use carlot::catalog::{Listing, ListingFields};
use carlot::config::Config;
use carlot::errors::CatalogError;
use carlot::identity::local::LocalIdentityProvider;
use carlot::identity::provider::Identity;
use carlot::session::{Session, SignOutOutcome, SignUpInput};
use carlot::AppState;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "carlot", version, about = "Vehicle listing catalog")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "carlot.yaml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a seller account and sign in as it.
    SignUp {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign in to an existing seller account.
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign out of the current account.
    SignOut,
    /// Show the signed-in seller.
    Whoami,
    /// Upload photos and publish a listing.
    Publish(PublishArgs),
    /// List the signed-in seller's listings.
    Mine,
    /// Delete one of the signed-in seller's listings and its photos.
    Delete { id: String },
    /// List every listing, newest first.
    List,
    /// Find listings whose title starts with a prefix.
    Search { prefix: String },
    /// Show one listing as JSON.
    Show { id: String },
    /// Print the chat link for contacting a listing's seller.
    Contact { id: String },
    /// Start the public HTTP server.
    Serve {
        /// Override the bind address (host:port).
        #[arg(short, long)]
        bind: Option<String>,
    },
}

#[derive(Args, Debug)]
struct PublishArgs {
    #[arg(long)]
    title: String,
    #[arg(long)]
    model: String,
    #[arg(long)]
    city: String,
    #[arg(long)]
    year: u16,
    #[arg(long)]
    km: u64,
    #[arg(long)]
    price: u64,
    /// Chat number, 10 or 11 digits.
    #[arg(long)]
    phone: String,
    #[arg(long)]
    description: String,
    /// Photo files (JPEG or PNG), in display order of completion.
    #[arg(required = true)]
    photos: Vec<PathBuf>,
}

impl PublishArgs {
    fn fields(&self) -> ListingFields {
        ListingFields {
            title: self.title.clone(),
            model: self.model.clone(),
            city: self.city.clone(),
            year: self.year,
            odometer_km: self.km,
            price: self.price,
            phone_contact: self.phone.clone(),
            description: self.description.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if Path::new(&cli.config).exists() {
        carlot::config::load_config(&cli.config)?
    } else {
        Config::default()
    };
    init_logging(&config);
    if !Path::new(&cli.config).exists() {
        info!("No configuration at {}, using defaults", cli.config);
    }

    match cli.command {
        Command::Serve { bind } => serve(config, bind).await,
        command => run_client(config, command).await,
    }
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn serve(config: Config, bind: Option<String>) -> anyhow::Result<()> {
    let bind_addr = bind.unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        carlot::metrics::init_metrics()?;
        carlot::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let shutdown_timeout = config.server.shutdown_timeout;
    let state = Arc::new(AppState::from_config(config)?);
    let app = carlot::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("carlot listening on {}", bind_addr);

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();
    // In-flight requests get `shutdown_timeout` seconds after the signal.
    tokio::select! {
        result = server => result?,
        _ = async {
            shutdown_signal().await;
            tokio::time::sleep(std::time::Duration::from_secs(shutdown_timeout)).await;
        } => warn!("Shutdown timeout of {}s reached, exiting", shutdown_timeout),
    }

    info!("carlot shut down");
    Ok(())
}

async fn run_client(config: Config, command: Command) -> anyhow::Result<()> {
    let site_name = config.catalog.site_name.clone();
    let identity_path = config.identity.path.clone();
    let state = AppState::from_config(config)?;
    let catalog = &state.catalog;

    match command {
        Command::List => print_listings(&catalog.list_all().await?),
        Command::Search { prefix } => print_listings(&catalog.search_by_name(&prefix).await?),
        Command::Show { id } => {
            let listing = catalog.get_listing(&id).await?;
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Command::Contact { id } => {
            let listing = catalog.get_listing(&id).await?;
            println!("{}", listing.contact_link(&site_name));
        }
        command => {
            carlot::ensure_parent_dir(&identity_path)?;
            let provider = Arc::new(LocalIdentityProvider::new(&identity_path)?);
            let session = Session::start(provider);
            session.ready().await;
            let result = run_seller(&state, &session, command).await;
            session.shutdown();
            result?;
        }
    }
    Ok(())
}

async fn run_seller(state: &AppState, session: &Session, command: Command) -> anyhow::Result<()> {
    let catalog = &state.catalog;
    match command {
        Command::SignUp {
            name,
            email,
            password,
        } => {
            let identity = session
                .sign_up(SignUpInput {
                    display_name: name,
                    email,
                    password,
                })
                .await?;
            println!("Signed up as {} <{}>", identity.display_name, identity.email);
        }
        Command::SignIn { email, password } => {
            let identity = session.sign_in(&email, &password).await?;
            println!("Signed in as {} <{}>", identity.display_name, identity.email);
        }
        Command::SignOut => match session.sign_out().await {
            SignOutOutcome::Complete => println!("Signed out"),
            SignOutOutcome::LocalOnly { reason } => {
                println!("Signed out locally; the credential may still be valid: {reason}")
            }
        },
        Command::Whoami => match session.current_identity() {
            Some(identity) => println!("{}", serde_json::to_string_pretty(&identity)?),
            None => println!("Not signed in"),
        },
        Command::Publish(args) => {
            let identity = session.current_identity();
            let id = publish(state, identity.as_ref(), args).await?;
            println!("{id}");
        }
        Command::Mine => {
            let identity = require_identity(session)?;
            print_listings(&catalog.list_owned_by(&identity.uid).await?);
        }
        Command::Delete { id } => {
            let identity = require_identity(session)?;
            let listing = catalog.get_listing(&id).await?;
            let report = catalog.delete_listing(Some(&identity), &listing).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_complete() {
                warn!(
                    "{} photo(s) could not be deleted and remain in storage",
                    report.failed.len()
                );
            }
        }
        other => anyhow::bail!("{other:?} does not need a session"),
    }
    Ok(())
}

fn require_identity(session: &Session) -> anyhow::Result<Identity> {
    session
        .current_identity()
        .ok_or_else(|| CatalogError::Unauthenticated.into())
}

/// Stage every photo concurrently, then create the listing.
///
/// A failed upload or a rejected listing abandons the draft.  When the
/// store fails during create the listing may exist, so the staged photos
/// are kept and their ids printed.
async fn publish(
    state: &AppState,
    identity: Option<&Identity>,
    args: PublishArgs,
) -> anyhow::Result<String> {
    let catalog = &state.catalog;
    let owner_uid = identity.map(|i| i.uid.as_str());
    let draft = Draft::new(Arc::clone(catalog.coordinator()));

    let mut files = Vec::with_capacity(args.photos.len());
    for path in &args.photos {
        files.push(SelectedFile::from_path(path).await?);
    }

    let staged =
        futures::future::join_all(files.into_iter().map(|f| draft.stage(owner_uid, f))).await;
    if let Some(err) = staged.into_iter().find_map(Result::err) {
        draft.abandon().await;
        return Err(err.into());
    }

    let result = catalog.publish_draft(identity, args.fields(), &draft).await;
    if let Err(CatalogError::StoreUnavailable(_)) = &result {
        eprintln!("The listing may have been saved. Staged photos kept:");
        for asset in draft.snapshot() {
            eprintln!("  {}", asset.storage_key());
        }
    }
    result.map_err(Into::into)
}

fn print_listings(listings: &[Listing]) {
    if listings.is_empty() {
        println!("No listings");
        return;
    }
    for l in listings {
        println!(
            "{}  {} {} ({})  {} km  {}  {}  [{} photo(s)]",
            l.id,
            l.title,
            l.model,
            l.year,
            l.odometer_km,
            l.price,
            l.city,
            l.assets.len()
        );
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
