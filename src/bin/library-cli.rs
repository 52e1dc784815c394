use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Duration;
use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use library_hub::client::{
    filter_views, format_file_size, Catalog, CatalogScope, ItemView, LibraryClient, UploadFile,
    UploadOptions, UploadPipeline, UploadProgress,
};
use library_hub::config::{debug_from_env, AuthConfig, DEFAULT_MAX_UPLOAD_BYTES};
use library_hub::middleware::issue_token;
use library_hub::models::{ListItemsParams, UpdateItemRequest, UpdateUserRequest};
use library_hub::types::{ItemType, SortBy, SortOrder, Visibility};
use library_hub::utils::init_logger;

const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Command-line front-end for the library API
#[derive(Parser, Debug)]
#[command(name = "library-cli", version)]
struct Cli {
    /// API base URL (default: LIBRARY_API_URL or http://localhost:8000)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Bearer token (default: LIBRARY_API_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload a file and register it as a library item
    Upload {
        path: PathBuf,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        public: bool,
        #[arg(long)]
        preview: Option<String>,
    },
    /// List your items
    List(ListArgs),
    /// List public items of all users
    Public(ListArgs),
    Show {
        id: Uuid,
    },
    Update {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_parser = parse_wire::<Visibility>)]
        visibility: Option<Visibility>,
        #[arg(long, conflicts_with = "clear_preview")]
        preview: Option<String>,
        /// Remove the preview text
        #[arg(long)]
        clear_preview: bool,
    },
    /// Delete one or more items (moved to trash unless --permanent)
    Delete {
        #[arg(required = true)]
        ids: Vec<Uuid>,
        #[arg(long)]
        permanent: bool,
    },
    Restore {
        id: Uuid,
    },
    /// Print a presigned download URL
    Download {
        id: Uuid,
    },
    Register {
        nickname: String,
    },
    /// Show (or change) your profile
    Me {
        #[arg(long)]
        nickname: Option<String>,
    },
    Stats,
    NicknameAvailable {
        nickname: String,
    },
    Health,
    /// Sign a development token with the server's auth settings
    DevToken {
        username: String,
        /// Lifetime (default: ACCESS_TOKEN_EXPIRE_MINUTES)
        #[arg(long)]
        minutes: Option<i64>,
    },
}

#[derive(Args, Debug)]
struct ListArgs {
    #[arg(long)]
    search: Option<String>,
    #[arg(long = "type", value_parser = parse_wire::<ItemType>)]
    item_type: Option<ItemType>,
    #[arg(long, value_parser = parse_wire::<Visibility>)]
    visibility: Option<Visibility>,
    #[arg(long, value_parser = parse_wire::<SortBy>)]
    sort_by: Option<SortBy>,
    #[arg(long, value_parser = parse_wire::<SortOrder>)]
    order: Option<SortOrder>,
    #[arg(long)]
    skip: Option<i64>,
    #[arg(long)]
    limit: Option<i64>,
    #[arg(long)]
    include_deleted: bool,
    /// Narrow the fetched page locally by name instead of asking the server
    #[arg(long)]
    filter: Option<String>,
}

impl ListArgs {
    fn params(&self) -> ListItemsParams {
        ListItemsParams {
            skip: self.skip,
            limit: self.limit,
            sort_by: self.sort_by,
            sort_order: self.order,
            item_type: self.item_type,
            visibility: self.visibility,
            search: self.search.clone(),
            include_deleted: self.include_deleted.then_some(true),
        }
    }
}

/// Parse a lowercase wire name (`image`, `public`, `file_size`, `asc`)
fn parse_wire<T: DeserializeOwned>(value: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_lowercase()))
        .map_err(|_| format!("invalid value: {}", value))
}

fn print_views(catalog: &Catalog, filter: Option<&str>) {
    if let Some(notice) = &catalog.notice {
        eprintln!("Could not load items ({}), showing sample data", notice);
    }

    let rows: Vec<&ItemView> = match filter {
        Some(term) => filter_views(&catalog.items, term, None),
        None => catalog.items.iter().collect(),
    };
    if rows.is_empty() {
        println!("No items");
        return;
    }

    for view in rows {
        println!(
            "{} {:<32} {:<9} {:>9}  {}  {:<7} {}{}",
            view.icon,
            view.name,
            view.type_label,
            view.size_label,
            view.date_label,
            view.visibility_badge,
            view.id,
            if view.is_deleted { "  (deleted)" } else { "" },
        );
    }
    println!("{} item(s){}", catalog.total, if catalog.has_more { ", more available" } else { "" });
}

fn render_progress(progress: UploadProgress) {
    let mut stderr = std::io::stderr();
    let _ = write!(
        stderr,
        "\r{:<12} {:>3}%  {}/{}",
        format!("{:?}", progress.stage),
        progress.percent,
        format_file_size(progress.bytes_sent),
        format_file_size(progress.total_bytes),
    );
    let _ = stderr.flush();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_logger("library_hub=warn", "library-cli.log");
    let cli = Cli::parse();

    let api_url = cli
        .api_url
        .or_else(|| std::env::var("LIBRARY_API_URL").ok())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    let token = cli.token.or_else(|| std::env::var("LIBRARY_API_TOKEN").ok());

    let mut client = LibraryClient::new(&api_url);
    if let Some(token) = token {
        client = client.with_token(token);
    }

    match cli.command {
        Command::Upload {
            path,
            name,
            public,
            preview,
        } => {
            let file = UploadFile::from_path(&path)
                .await
                .with_context(|| format!("Cannot read {}", path.display()))?;
            let options = UploadOptions {
                name,
                visibility: if public { Visibility::Public } else { Visibility::Private },
                preview_text: preview,
                max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            };
            let item = UploadPipeline::new(&client)
                .run(&file, &options, render_progress)
                .await;
            eprintln!();
            let item = item?;
            println!("Uploaded {} ({})", item.name, item.id);
        }
        Command::List(args) => {
            let catalog = Catalog::load(&client, CatalogScope::Mine, &args.params()).await;
            print_views(&catalog, args.filter.as_deref());
        }
        Command::Public(args) => {
            let catalog = Catalog::load(&client, CatalogScope::Public, &args.params()).await;
            print_views(&catalog, args.filter.as_deref());
        }
        Command::Show { id } => {
            let item = client.get_item(id).await?;
            println!("{}", serde_json::to_string_pretty(&item)?);
        }
        Command::Update {
            id,
            name,
            visibility,
            preview,
            clear_preview,
        } => {
            let changes = UpdateItemRequest {
                name,
                visibility,
                preview_text: if clear_preview { Some(None) } else { preview.map(Some) },
            };
            let item = client.update_item(id, &changes).await?;
            println!("Updated {} ({})", item.name, item.id);
        }
        Command::Delete { ids, permanent } => {
            let outcomes = client.bulk_delete(&ids, permanent).await;
            let mut failed = 0;
            for (id, outcome) in outcomes {
                match outcome {
                    Ok(()) => println!("Deleted {}", id),
                    Err(e) => {
                        failed += 1;
                        eprintln!("Failed to delete {}: {}", id, e);
                    }
                }
            }
            if failed > 0 {
                bail!("{} of {} deletions failed", failed, ids.len());
            }
        }
        Command::Restore { id } => {
            let item = client.restore_item(id).await?;
            println!("Restored {} ({})", item.name, item.id);
        }
        Command::Download { id } => {
            let download = client.download_url(id).await?;
            println!("{}", download.download_url);
            eprintln!("{} ({} bytes)", download.filename, download.file_size);
        }
        Command::Register { nickname } => {
            let user = client.register(&nickname).await?;
            println!("Registered {} as {}", user.username, user.nickname);
        }
        Command::Me { nickname } => {
            let user = match nickname {
                Some(nickname) => {
                    client
                        .update_me(&UpdateUserRequest {
                            nickname: Some(nickname),
                        })
                        .await?
                }
                None => client.me().await?,
            };
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Command::Stats => {
            let stats = client.stats().await?;
            println!("Items:          {}", stats.total_items);
            println!("Total size:     {}", format_file_size(u64::try_from(stats.total_file_size).unwrap_or(0)));
            println!("Last 7 days:    {}", stats.recent_uploads);
            for item_type in ItemType::ALL {
                let count = stats.items_by_type.get(&item_type).copied().unwrap_or(0);
                println!("  {:<12} {}", item_type.as_str(), count);
            }
        }
        Command::NicknameAvailable { nickname } => {
            let available = client.nickname_available(&nickname).await?;
            println!("{}", if available { "available" } else { "taken" });
        }
        Command::Health => {
            let health = client.health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        Command::DevToken { username, minutes } => {
            let auth = AuthConfig::from_env(debug_from_env()?)?;
            let minutes = minutes.unwrap_or(auth.access_token_expire_minutes);
            let token = issue_token(&username, &auth.jwt_secret, Duration::minutes(minutes))?;
            println!("{}", token);
        }
    }

    Ok(())
}
