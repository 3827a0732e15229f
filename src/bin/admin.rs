//! CLI administration tool for quill.
//!
//! Inspects and maintains the document store without going through the
//! HTTP API.
//!
//! # Usage
//!
//! ```bash
//! # Check the store connection
//! cargo run --bin admin -- db check
//!
//! # List collections with document counts
//! cargo run --bin admin -- collections
//!
//! # List registered models and their references
//! cargo run --bin admin -- models
//!
//! # Delete every document of a collection
//! cargo run --bin admin -- drop posts
//!
//! # Insert demo users and posts
//! cargo run --bin admin -- seed
//! ```
//!
//! # Environment Variables
//!
//! The same storage variables as the server (`DATABASE_URL`, or `DB_*`),
//! see `quill::config`.

use quill::config::Config;
use quill::domain::entities::{Comment, Post, PostStatus, Profile, Role, User};
use quill::infrastructure::connection::connect;
use quill::odm::{DocumentStore, Odm};
use quill::server::build_odm;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Confirm;
use std::sync::Arc;

/// CLI tool for managing quill.
#[derive(Parser)]
#[command(name = "admin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Top-level command groups.
#[derive(Subcommand)]
enum Commands {
    /// Database operations
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// List collections with document counts
    Collections,

    /// List registered models
    Models,

    /// Delete every document of a collection
    Drop {
        /// Collection name (e.g., "posts")
        collection: String,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Insert demo users and posts
    Seed,
}

/// Database operation subcommands.
#[derive(Subcommand)]
enum DbAction {
    /// Check database connection
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    let connection = config.connection_string()?;
    let store = connect(&connection, &config.pool_settings())
        .await
        .context("Failed to open the document store")?;
    let odm = build_odm(store.clone())?;

    let result = match cli.command {
        Commands::Db { action } => match action {
            DbAction::Check => check_db(&store, &connection.to_string()).await,
        },
        Commands::Collections => list_collections(&store).await,
        Commands::Models => {
            list_models(&odm);
            Ok(())
        }
        Commands::Drop { collection, yes } => drop_collection(&store, &collection, yes).await,
        Commands::Seed => seed(&odm).await,
    };

    odm.close().await;
    result
}

/// Pings the store and reports the (masked) connection string.
async fn check_db(store: &Arc<dyn DocumentStore>, target: &str) -> Result<()> {
    println!("{}", "🔍 Checking database connection...".bright_blue());

    store.ping().await.context("Ping failed")?;

    println!("{}", "✅ Database connection OK".green().bold());
    println!("  Target: {}", target.bright_black());
    Ok(())
}

/// Lists collections with their document counts.
///
/// # Output Format
///
/// ```text
/// 📚 Collections
///
///   Name                 Documents
///   ──────────────────────────────
///   posts                12
///   users                3
/// ```
async fn list_collections(store: &Arc<dyn DocumentStore>) -> Result<()> {
    println!("{}", "📚 Collections".bright_blue().bold());
    println!();

    let collections = store.collections().await?;
    if collections.is_empty() {
        println!("{}", "  No collections found".yellow());
        println!();
        println!(
            "  Insert demo data with: {} admin seed",
            "cargo run --bin".bright_cyan()
        );
        return Ok(());
    }

    println!(
        "  {:<20} {}",
        "Name".bright_white().bold(),
        "Documents".bright_white().bold()
    );
    println!("  {}", "─".repeat(30).bright_black());

    for collection in &collections {
        println!(
            "  {:<20} {}",
            collection.name.cyan(),
            collection.documents.to_string().bright_white()
        );
    }
    println!();
    Ok(())
}

/// Lists the registered models, their collections and references.
fn list_models(odm: &Odm) {
    println!("{}", "🧩 Models".bright_blue().bold());
    println!();

    for model in odm.registry().iter() {
        println!(
            "  {} → {}",
            model.name.cyan().bold(),
            model.collection.bright_white()
        );
        for reference in &model.references {
            let arity = if reference.many { "many" } else { "one" };
            println!(
                "      {} → {} ({})",
                reference.path,
                reference.target.cyan(),
                arity.bright_black()
            );
        }
    }
    println!();
}

/// Deletes every document of a collection after confirmation.
///
/// # Safety
///
/// - Requires confirmation (default: No) unless `--yes` is given
async fn drop_collection(
    store: &Arc<dyn DocumentStore>,
    collection: &str,
    skip_confirm: bool,
) -> Result<()> {
    println!("{}", "🗑️  Drop Collection".bright_blue().bold());
    println!();
    println!("  Collection: {}", collection.cyan());
    println!();

    if !skip_confirm {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete every document in '{collection}'?"))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("{}", "❌ Cancelled".red());
            return Ok(());
        }
    }

    let deleted = store.drop_collection(collection).await?;
    println!(
        "{} {} documents deleted",
        "✅".green(),
        deleted.to_string().bright_white().bold()
    );
    Ok(())
}

/// Inserts two users and a few posts through the ODM, so every document
/// passes validation like API writes do.
async fn seed(odm: &Odm) -> Result<()> {
    println!("{}", "🌱 Seeding demo data".bright_blue().bold());
    println!();

    let users = odm.model::<User>()?;
    let posts = odm.model::<Post>()?;

    let ada = users
        .create(User {
            username: "ada".into(),
            email: "ada@example.com".into(),
            display_name: Some("Ada Lovelace".into()),
            role: Role::Author,
            age: Some(36),
            profile: Profile {
                bio: Some("Wrote the first program.".into()),
                website: Some("https://example.com/ada".into()),
                interests: vec!["mathematics".into(), "engines".into()],
            },
        })
        .await
        .context("Failed to create user 'ada' (already seeded?)")?;

    let grace = users
        .create(User {
            username: "grace".into(),
            email: "grace@example.com".into(),
            display_name: Some("Grace Hopper".into()),
            role: Role::Reader,
            age: None,
            profile: Profile::default(),
        })
        .await
        .context("Failed to create user 'grace' (already seeded?)")?;

    let mut intro = posts.new_document(Post {
        title: "Notes on the Analytical Engine".into(),
        body: "The engine weaves algebraic patterns.".into(),
        author: ada.to_ref(),
        tags: vec!["history".into(), "computing".into()],
        status: PostStatus::Published,
        comments: vec![Comment::new(grace.to_ref(), "A classic.".into())],
        likes: vec![],
    });
    intro.like(grace.to_ref());
    posts.save(&mut intro).await?;

    posts
        .create(Post {
            title: "Bernoulli numbers".into(),
            body: String::new(),
            author: ada.to_ref(),
            tags: vec!["math".into()],
            status: PostStatus::Draft,
            comments: vec![],
            likes: vec![],
        })
        .await?;

    println!("  {} users", "2".bright_white().bold());
    println!("  {} posts", "2".bright_white().bold());
    println!();
    println!("{}", "✅ Seed complete".green().bold());
    Ok(())
}
