use std::sync::Arc;

use anyhow::Context;
use bazaar_chat_client::{ChatClient, ConversationId, Message, StaticTokenSource};
use bazaar_shared_config::{get_required_env, CommonConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Which conversation to open, from the first argument or `BAZAAR_CONVERSATION_ID`
///
/// `ad:<id>` starts (or reopens) the conversation about that ad.
enum Target {
    Conversation(ConversationId),
    Ad(String),
}

fn target_from_args() -> anyhow::Result<Target> {
    let raw = match std::env::args().nth(1) {
        Some(arg) => arg,
        None => get_required_env("BAZAAR_CONVERSATION_ID")
            .context("pass a conversation id or ad:<ad id> as the first argument")?,
    };
    Ok(match raw.strip_prefix("ad:") {
        Some(ad_id) => Target::Ad(ad_id.to_string()),
        None => Target::Conversation(raw.as_str().into()),
    })
}

fn print_message(message: &Message) {
    println!("[{}] {}: {}", message.created_at.format("%H:%M"), message.sender_id, message.content);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bazaar_messenger=debug,bazaar_chat_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = CommonConfig::from_env()?;
    let token = get_required_env("BAZAAR_ACCESS_TOKEN")?;
    let client = ChatClient::new(&config, Arc::new(StaticTokenSource::new(token)))?;

    tracing::info!(
        environment = %config.environment,
        api = %config.api.url,
        hub = %config.hub.url,
        "Starting Bazaar messenger"
    );

    let conversation_id = match target_from_args()? {
        Target::Conversation(id) => id,
        Target::Ad(ad_id) => client.create_conversation(&ad_id).await?.id,
    };

    let _connection = client.subscribe_to_connection_state(|connected| {
        println!("-- live updates {}", if connected { "on" } else { "off" });
    });

    // Register the view before fetching history so no push falls in between
    let view = client.open_conversation(conversation_id.clone(), print_message);
    for message in client.list_messages(&conversation_id).await? {
        print_message(&message);
    }
    if let Err(e) = client.mark_read(&conversation_id).await {
        tracing::warn!(error = %e, "Could not mark conversation read");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match line.trim() {
                    "" => {}
                    "/quit" => break,
                    "/enable" => client.connection().enable(),
                    "/disable" => client.connection().disable(),
                    "/status" => println!("-- {}", client.connection().state()),
                    content => {
                        if let Err(e) = client.send_message(&conversation_id, content).await {
                            eprintln!("-- {}", e.user_message());
                        }
                    }
                }
            }
        }
    }

    view.close();
    client.connection().stop();
    tracing::info!("Messenger stopped");

    Ok(())
}
