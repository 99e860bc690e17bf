use std::io::Write as _;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::EnvFilter;

use hugchat::api::{ChatClient, ChatTransport};
use hugchat::config;
use hugchat::services::{
    AppSettings, AuthService, ConversationService, ConversationSynchronizer, CredentialStore,
    SendOptions, SettingsService,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let settings = SettingsService::load(&SettingsService::default_path());
    let base_url = settings
        .custom_base_url
        .clone()
        .unwrap_or_else(|| config::DEFAULT_BASE_URL.to_string());

    let client = Arc::new(ChatClient::new(base_url)?);
    let credentials = CredentialStore::new().await?;
    let auth = AuthService::new(client.clone(), credentials);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("login") => {
            let callback = args.get(1).with_context(|| {
                format!(
                    "Usage: hugchat login <callback-url>\nAuthorize at {} first",
                    auth.authorize_url()
                )
            })?;
            auth.complete_login(callback).await?;
            println!("Logged in.");
            Ok(())
        }
        Some("logout") => {
            auth.logout().await?;
            println!("Logged out.");
            Ok(())
        }
        None | Some("chat") => chat(client, auth, settings).await,
        Some(other) => bail!("Unknown command: {}", other),
    }
}

async fn chat(client: Arc<ChatClient>, auth: AuthService, settings: AppSettings) -> Result<()> {
    if !auth.restore_session().await? {
        bail!(
            "Not authenticated. Authorize at {} and run `hugchat login <callback-url>`",
            auth.authorize_url()
        );
    }

    let models = client.list_models().await.context("Failed to list models")?;
    let model = settings
        .active_model
        .clone()
        .or_else(|| models.first().map(|m| m.id.clone()))
        .context("No models available")?;

    let mut conversations = ConversationService::new(client.clone());
    let conversation = conversations.create(&model).await?;
    let conversation_id = conversation.id.clone();
    println!("Chatting with {}. Ctrl-D to quit.", model);

    let transport: Arc<dyn ChatTransport> = client.clone();
    let mut sync = ConversationSynchronizer::new(conversation, transport);
    let mut titled = false;

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }

        let options = SendOptions {
            web_search: settings.web_search,
            ..Default::default()
        };
        let result = sync
            .send_message(prompt, options, |delta| {
                print!("{}", delta);
                let _ = std::io::stdout().flush();
            })
            .await;

        println!();
        match result {
            Ok(_) if !titled => {
                titled = true;
                if let Err(e) = conversations.generate_title(&conversation_id).await {
                    tracing::debug!("Title generation failed: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    println!();
    Ok(())
}
