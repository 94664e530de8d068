use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use lexchat_client::{init_tracing, ChatSession, ClientConfig, DecryptedMessage, DEFAULT_LOG_FILTER};
use lexchat_shared::{ConversationId, MessageId, UserId};

#[derive(Parser)]
#[command(name = "lexchat")]
#[command(about = "Encrypted direct messages over a local store", long_about = None)]
struct Cli {
    /// Database file (overrides LEXCHAT_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Act as this user
    #[arg(short, long, env = "LEXCHAT_USER")]
    user: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List conversations with decrypted previews
    List,

    /// Start a conversation with a friend, or reuse the existing one
    Start {
        /// The other participant
        friend: String,
    },

    /// Send a message
    Send {
        conversation: String,
        /// Message text
        #[arg(required = true)]
        text: Vec<String>,
    },

    /// Print a conversation and mark it read
    Read { conversation: String },

    /// Follow a conversation until Ctrl+C
    Watch { conversation: String },

    /// Delete every message of a conversation, keeping the conversation
    Clear { conversation: String },

    /// Delete a conversation with its messages and key
    Delete { conversation: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(DEFAULT_LOG_FILTER);

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    if let Some(db) = cli.db {
        config.db_path = Some(db);
    }

    let user = UserId::from(cli.user.trim());
    if user.as_str().is_empty() {
        bail!("user must not be empty");
    }

    let session = ChatSession::open(config, user)?;

    match cli.command {
        Commands::List => {
            let conversations = session.directory().load().await?;
            println!("{}", serde_json::to_string_pretty(&conversations)?);
        }

        Commands::Start { friend } => {
            let id = session
                .directory()
                .start_or_reuse_conversation(&UserId::from(friend.trim()))
                .await?;
            println!("{id}");
        }

        Commands::Send { conversation, text } => {
            let channel = session.channel(conversation_id(&conversation)).await?;
            let outcome = channel.send_message(&text.join(" ")).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }

        Commands::Read { conversation } => {
            let channel = session.channel(conversation_id(&conversation)).await?;
            for message in channel.load().await? {
                print_message(&message);
            }
            channel.mark_read().await?;
        }

        Commands::Watch { conversation } => {
            let id = conversation_id(&conversation);
            let channel = session.channel(id.clone()).await?;
            let mut live = channel.subscribe();
            let mut shown = HashSet::new();

            info!(conversation = %id, "Watching conversation");

            loop {
                tokio::select! {
                    snapshot = live.next() => {
                        let Some(snapshot) = snapshot else { break };
                        if let Some(error) = &snapshot.error {
                            eprintln!("refresh failed: {error}");
                            continue;
                        }
                        for message in unseen(&snapshot.items, &shown) {
                            print_message(message);
                        }
                        shown = snapshot.items.iter().map(|m| m.id.clone()).collect();
                        channel.mark_read().await?;
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            live.cancel();
        }

        Commands::Clear { conversation } => {
            let id = conversation_id(&conversation);
            let removed = session.directory().clear_conversation(&id).await?;
            println!("removed {removed} messages");
        }

        Commands::Delete { conversation } => {
            let id = conversation_id(&conversation);
            session.directory().delete_conversation(&id).await?;
            println!("deleted {id}");
        }
    }

    Ok(())
}

fn conversation_id(raw: &str) -> ConversationId {
    ConversationId::from(raw.trim())
}

/// Messages of a snapshot not printed yet, oldest first whatever the
/// configured display order.
fn unseen<'a>(
    items: &'a [DecryptedMessage],
    shown: &HashSet<MessageId>,
) -> Vec<&'a DecryptedMessage> {
    let mut fresh: Vec<_> = items.iter().filter(|m| !shown.contains(&m.id)).collect();
    fresh.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    fresh
}

fn print_message(message: &DecryptedMessage) {
    println!(
        "[{}] {}: {}",
        message.timestamp.format("%Y-%m-%d %H:%M:%S"),
        message.sender_id,
        message.text
    );
}
