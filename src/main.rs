use std::env;
use std::sync::Arc;

use poise::serenity_prelude::{self as serenity};
use serenity::GatewayIntents;
use tracing::{error, info};

use sentinel_warden::audit::AuditLog;
use sentinel_warden::config::{CONFIG_FILE, WardenConfig};
use sentinel_warden::expiry::{MuteSweeper, SweepRequest};
use sentinel_warden::gateway::{ModerationGateway, SerenityGateway};
use sentinel_warden::store::{HttpStore, RecordStore};
use sentinel_warden::{Data, Error, commands, handlers, logging};

/// Main function to run the bot
async fn async_main() -> Result<(), Error> {
    // Initialize logging
    logging::init()?;

    // Load configuration and validate the punishment ladder before anything
    // connects.
    let config = WardenConfig::load(CONFIG_FILE).await?;
    let policy = config.policy()?;
    info!(
        "Loaded punishment policy with {} tier(s)",
        policy.tiers().len()
    );

    // Load environment variables
    let token = env::var("DISCORD_TOKEN").map_err(|_| "DISCORD_TOKEN must be set")?;
    let store_endpoint =
        env::var("WARDEN_DB_ENDPOINT").map_err(|_| "WARDEN_DB_ENDPOINT must be set")?;
    let store_bot_id = env::var("WARDEN_BOT_ID").map_err(|_| "WARDEN_BOT_ID must be set")?;

    let store: Arc<dyn RecordStore> = Arc::new(HttpStore::new(store_endpoint, store_bot_id));

    // The sweep channel is created up front: the event handler requests
    // catch-up sweeps and the shutdown path sends the stop signal, while the
    // task itself only starts once the gateway is ready.
    let (sweep_tx, sweep_rx) = MuteSweeper::channel();
    let handler = handlers::Handler::new(store.clone(), sweep_tx.clone());

    // Configure the Poise framework
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            pre_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_start(ctx);
                })
            },
            post_command: |ctx| {
                Box::pin(async move {
                    logging::log_command_end(ctx);
                })
            },
            on_error: |error| {
                Box::pin(async move {
                    sentinel_warden::logging::log_command_error(&error);
                })
            },
            ..Default::default()
        })
        .setup({
            let store = store.clone();
            move |ctx, ready, framework| {
                Box::pin(async move {
                    logging::log_console("Registering slash commands".to_string());
                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                    let gateway: Arc<dyn ModerationGateway> =
                        Arc::new(SerenityGateway::new(ctx.http.clone()));
                    let audit = AuditLog::new(store.clone(), gateway.clone());

                    // Setup runs on Ready, so the sweep's first tick cannot
                    // precede the gateway handshake.
                    MuteSweeper::new(store.clone(), gateway.clone(), audit)
                        .spawn(sweep_rx, config.sweep_interval_secs);

                    Ok(Data::new(
                        store,
                        gateway,
                        policy,
                        config,
                        ready.user.id.get(),
                    ))
                })
            }
        })
        .build();

    // Configure the Serenity client
    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::MESSAGE_CONTENT;
    let mut client = serenity::ClientBuilder::new(token, intents)
        .event_handler(handler)
        .framework(framework)
        .await?;

    info!("Starting bot...");
    tokio::select! {
        result = client.start() => {
            if let Err(err) = result {
                error!("Error running the bot: {err}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received ctrl-c, shutting down");
            let _ = sweep_tx.send(SweepRequest::Shutdown).await;
        }
    }

    Ok(())
}

fn main() {
    // Run the async main function
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
        .block_on(async_main());

    // Handle any errors that occurred during execution
    if let Err(err) = result {
        eprintln!("Error: {err}");
    }
}
