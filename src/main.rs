mod config;
mod gate;
mod telegram_log;

use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use config::Config;
use gate::reply::DEFAULT_INFO;
use gate::{Database, HttpOracle, Inbound, Router, RouterConfig, TelegramClient};

struct BotState {
    router: Router<HttpOracle>,
    telegram: TelegramClient,
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "keygate.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let file_appender = tracing_appender::rolling::never(&log_dir, "keygate.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        );

    if let Some(log_chat_id) = config.log_chat_id {
        let tg_layer = telegram_log::TelegramLogLayer::new(bot.clone(), log_chat_id);
        registry.with(tg_layer).init();
    } else {
        registry.init();
    }

    info!("🚀 Starting keygate...");
    info!("Loaded config from {config_path}");
    info!("Gated channel: {}", config.channel_username);

    let store = match Database::open(&config.database_path) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to open database {:?}: {e}", config.database_path);
            std::process::exit(1);
        }
    };

    let oracle = match HttpOracle::new(
        &config.oracle_api_base,
        &config.telegram_bot_token,
        &config.channel_username,
        config.oracle_timeout,
    ) {
        Ok(oracle) => oracle,
        Err(e) => {
            error!("Failed to build membership client: {e}");
            std::process::exit(1);
        }
    };

    let router_config = RouterConfig {
        channel_link: config.channel_link(),
        info_text: config.info_text.clone().unwrap_or_else(|| DEFAULT_INFO.to_string()),
        require_subscription: config.require_subscription,
    };
    if router_config.require_subscription {
        info!("Keywords are only redeemable by channel members");
    }

    let state = Arc::new(BotState {
        router: Router::new(oracle, store, router_config),
        telegram: TelegramClient::new(bot.clone(), config.files_dir.clone()),
    });

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(event) = telegram_to_inbound(&msg) else {
        return Ok(());
    };

    let reply = state.router.handle(&event).await;
    if let Err(e) = state.telegram.deliver(event.chat_id, &reply).await {
        warn!("Reply to user {} not delivered: {e}", event.user_id);
    }

    Ok(())
}

/// Private-chat text or contact messages; everything else is ignored.
fn telegram_to_inbound(msg: &Message) -> Option<Inbound> {
    if !msg.chat.is_private() {
        return None;
    }
    let user = msg.from.as_ref()?;

    let text = msg.text().map(str::to_string);
    let contact = msg.contact().map(|c| c.phone_number.clone());
    if text.is_none() && contact.is_none() {
        return None;
    }

    Some(Inbound {
        user_id: user.id.0 as i64,
        chat_id: msg.chat.id.0,
        text,
        contact,
    })
}
