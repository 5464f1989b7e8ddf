//! CLI for busrest
//!
//! Subcommands:
//! - `publish`: create a topic and send a numbered message to it periodically
//! - `subscribe`: provision a filtered subscription and print what arrives
//! - `entity`: get, create or delete a single entity

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use busrest::auth::TokenProvider;
use busrest::client::{MessageClient, ReceiveMode};
use busrest::config::{Settings, load_config, load_config_from};
use busrest::entity::{
    DEFAULT_RULE_NAME, EntityAddress, EntityDescription, EntityManager,
};
use busrest::message::{Message, MessageEnvelope};
use busrest::retry::{ReceiveLoop, RetryPolicy};
use busrest::transport::{BusSession, ReqwestTransport, Transport};
use busrest::utils::error::Result;
use busrest::utils::{logging, shutdown};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Name of the subscription rule that routes messages by recipient.
const RECIPIENT_RULE: &str = "RecipientFilter";

#[derive(Parser)]
#[command(name = "busrest", about = "Service Bus REST client")]
struct Cli {
    /// Configuration file, extension optional (default: config/default)
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the topic and publish a message every interval
    Publish {
        #[arg(long)]
        topic: String,
        #[arg(long, default_value_t = 5)]
        interval_secs: u64,
        /// Stop after this many messages (default: run until Ctrl-C)
        #[arg(long)]
        count: Option<u64>,
        /// RecipientId stamped on each message (default: this host)
        #[arg(long)]
        recipient: Option<String>,
    },
    /// Provision a subscription filtered on RecipientId and consume it
    Subscribe {
        #[arg(long)]
        topic: String,
        #[arg(long)]
        subscription: String,
        /// Recipient this subscriber answers to besides `*` (default: this host)
        #[arg(long)]
        recipient: Option<String>,
        /// Lock messages and delete them after processing instead of
        /// removing them on receipt
        #[arg(long)]
        peek_lock: bool,
    },
    /// Manage a single entity by path, e.g. `orders` or `news/Subscriptions/all`
    Entity {
        #[command(subcommand)]
        action: EntityAction,
    },
}

#[derive(Subcommand)]
enum EntityAction {
    Get {
        path: String,
    },
    Create {
        path: String,
        /// Atom entry document to send as the entity description
        #[arg(long)]
        description: Option<PathBuf>,
    },
    Delete {
        path: String,
    },
}

/// Everything a subcommand needs, built once from the settings.
struct Context {
    settings: Settings,
    addresses: EntityAddress,
    tokens: Arc<TokenProvider>,
    entities: EntityManager,
    messages: MessageClient,
    retry: RetryPolicy,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let loaded = match cli.config.as_deref() {
        Some(path) => load_config_from(path),
        None => load_config(),
    };
    let settings = match loaded {
        Ok(settings) => settings,
        Err(e) => {
            logging::init(&Settings::default().log);
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    logging::init(&settings.log);

    if let Err(e) = run(cli.command, settings).await {
        error!("busrest failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Command, settings: Settings) -> Result<()> {
    let (stop_tx, stop_rx) = watch::channel(false);
    let stop_tx = Arc::new(stop_tx);
    let ctx = connect(settings).await?;
    let renewal = ctx.tokens.spawn_renewal(stop_rx.clone());
    let shutdown = shutdown::stop_on(tokio::signal::ctrl_c(), Arc::clone(&stop_tx));

    let outcome = dispatch(&ctx, command, stop_rx).await;

    shutdown.abort();
    if stop_tx.send(true).is_err() {
        debug!("token renewal task already stopped");
    }
    if let Err(e) = renewal.await {
        error!("token renewal task ended abnormally: {}", e);
    }
    outcome
}

async fn connect(settings: Settings) -> Result<Context> {
    let transport: Arc<dyn Transport> =
        Arc::new(ReqwestTransport::new(settings.bus.accept_invalid_certs)?);
    let tokens = Arc::new(
        TokenProvider::acquire(
            settings.bus.namespace.clone(),
            settings.auth.credential_source()?,
            settings.auth.token_ttl(),
            settings.auth.renewal_margin(),
            Arc::clone(&transport),
        )
        .await?,
    );
    let session = Arc::new(
        BusSession::new(transport, Arc::clone(&tokens))
            .with_api_version(settings.bus.api_version.clone()),
    );
    let addresses = match &settings.bus.base_url {
        Some(base_url) => EntityAddress::with_base_url(base_url),
        None => EntityAddress::for_namespace(&settings.bus.namespace),
    };

    Ok(Context {
        addresses,
        tokens,
        entities: EntityManager::new(Arc::clone(&session)),
        messages: MessageClient::new(session),
        retry: settings.retry.policy(),
        settings,
    })
}

async fn dispatch(ctx: &Context, command: Command, stop: watch::Receiver<bool>) -> Result<()> {
    match command {
        Command::Publish {
            topic,
            interval_secs,
            count,
            recipient,
        } => {
            let recipient = recipient.unwrap_or_else(local_recipient);
            publish(
                ctx,
                &topic,
                Duration::from_secs(interval_secs),
                count,
                &recipient,
                stop,
            )
            .await
        }
        Command::Subscribe {
            topic,
            subscription,
            recipient,
            peek_lock,
        } => {
            let recipient = recipient.unwrap_or_else(local_recipient);
            let mode = if peek_lock {
                ReceiveMode::PeekLock
            } else {
                ReceiveMode::ReceiveAndDelete
            };
            subscribe(ctx, &topic, &subscription, &recipient, mode, stop).await
        }
        Command::Entity { action } => entity(ctx, action).await,
    }
}

async fn publish(
    ctx: &Context,
    topic: &str,
    interval: Duration,
    count: Option<u64>,
    recipient: &str,
    mut stop: watch::Receiver<bool>,
) -> Result<()> {
    let address = ctx.addresses.topic(topic);
    let timeout = ctx.settings.receiver.request_timeout();
    let hook = ctx.tokens.as_ref();

    info!("Creating topic {}", address);
    // 1 GB, messages expire after ten minutes unless set otherwise.
    let description = EntityDescription::topic(Duration::from_secs(600), 1024);
    ctx.retry
        .run_with_renewal(|| ctx.entities.create(&address, &description, timeout), hook)
        .await?;
    let current = ctx
        .retry
        .run_with_renewal(|| ctx.entities.get(&address, timeout), hook)
        .await?;
    info!("Topic:\n{}", String::from_utf8_lossy(&current));

    let mut sent = 0u64;
    while !*stop.borrow() && count.is_none_or(|limit| sent < limit) {
        sent += 1;
        let message = Message::new(format!("This is message #{sent}"))
            .with_envelope(
                MessageEnvelope::new()
                    .with_label("M1")
                    .with_message_id(sent.to_string()),
            )
            .with_property("Priority", "High")
            .with_property("CustomerId", "12345")
            .with_property("CustomerName", "ABC")
            .with_property("RecipientId", recipient);

        info!("Sending message {}", sent);
        ctx.retry
            .run_with_renewal(|| ctx.messages.send(&address, &message, timeout), hook)
            .await?;
        if count.is_none_or(|limit| sent < limit) {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = stop.changed() => {}
            }
        }
    }
    Ok(())
}

async fn subscribe(
    ctx: &Context,
    topic: &str,
    subscription: &str,
    recipient: &str,
    mode: ReceiveMode,
    stop: watch::Receiver<bool>,
) -> Result<()> {
    let timeout = ctx.settings.receiver.request_timeout();
    let hook = ctx.tokens.as_ref();
    let topic_address = ctx.addresses.topic(topic);
    let subscription_address = ctx.addresses.subscription(topic, subscription);
    let recipient_rule = ctx.addresses.rule(topic, subscription, RECIPIENT_RULE);

    info!("Creating topic {}", topic_address);
    let description = EntityDescription::topic(Duration::from_secs(600), 1024);
    ctx.retry
        .run_with_renewal(|| ctx.entities.create(&topic_address, &description, timeout), hook)
        .await?;

    info!("Creating subscription {}", subscription_address);
    let description = EntityDescription::subscription();
    ctx.retry
        .run_with_renewal(
            || ctx.entities.create(&subscription_address, &description, timeout),
            hook,
        )
        .await?;

    info!("Replacing subscription rule {}", RECIPIENT_RULE);
    ctx.retry
        .run_with_renewal(|| ctx.entities.delete(&recipient_rule, timeout), hook)
        .await?;
    let filter = format!("RecipientId = '*' OR RecipientId = '{recipient}'");
    let description = EntityDescription::sql_rule(&filter);
    ctx.retry
        .run_with_renewal(|| ctx.entities.create(&recipient_rule, &description, timeout), hook)
        .await?;

    info!("Deleting default rule");
    let default_rule = ctx.addresses.rule(topic, subscription, DEFAULT_RULE_NAME);
    ctx.retry
        .run_with_renewal(|| ctx.entities.delete(&default_rule, timeout), hook)
        .await?;

    let rules_address = ctx.addresses.subscription_rules(topic, subscription);
    let rules = ctx
        .retry
        .run_with_renewal(|| ctx.entities.get(&rules_address, timeout), hook)
        .await?;
    info!("Subscription rules:\n{}", String::from_utf8_lossy(&rules));

    let receiver = ReceiveLoop::new(
        ctx.messages.clone(),
        subscription_address,
        mode,
        ctx.settings.receiver.loop_settings(),
    )
    .on_unauthorized(ctx.tokens.clone());

    receiver
        .run(stop, |message| async move {
            print_message(&message);
            Ok(())
        })
        .await
}

async fn entity(ctx: &Context, action: EntityAction) -> Result<()> {
    let timeout = ctx.settings.receiver.request_timeout();
    let hook = ctx.tokens.as_ref();

    match action {
        EntityAction::Get { path } => {
            let address = ctx.addresses.entity(&path);
            let body = ctx
                .retry
                .run_with_renewal(|| ctx.entities.get(&address, timeout), hook)
                .await?;
            println!("{}", String::from_utf8_lossy(&body));
        }
        EntityAction::Create { path, description } => {
            let address = ctx.addresses.entity(&path);
            let description = match description {
                Some(file) => EntityDescription::from_file(file)?,
                None => EntityDescription::new(Vec::<u8>::new()),
            };
            ctx.retry
                .run_with_renewal(|| ctx.entities.create(&address, &description, timeout), hook)
                .await?;
        }
        EntityAction::Delete { path } => {
            let address = ctx.addresses.entity(&path);
            ctx.retry
                .run_with_renewal(|| ctx.entities.delete(&address, timeout), hook)
                .await?;
        }
    }
    Ok(())
}

fn print_message(message: &Message) {
    let envelope = &message.envelope;
    println!("Body           : {}", message.body_text());
    println!("Message ID     : {}", envelope.message_id.as_deref().unwrap_or("-"));
    println!("Label          : {}", envelope.label.as_deref().unwrap_or("-"));
    println!(
        "SequenceNumber : {}",
        envelope
            .sequence_number
            .map_or_else(|| "-".to_string(), |n| n.to_string())
    );
    match envelope.enqueued_time {
        Some(at) => println!("EnqueuedTime   : {at}"),
        None => println!("EnqueuedTime   : -"),
    }
    match envelope.locked_until {
        Some(at) => println!("Locked until   : {at}"),
        None => println!("Locked until   : unlocked"),
    }
    for key in message.properties.keys() {
        println!(
            "Custom property: {} = {}",
            key,
            message.properties.get_all(key).join(",")
        );
    }
}

/// Lower-cased host name, used as the default recipient id.
fn local_recipient() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .map(|name| name.to_lowercase())
        .unwrap_or_else(|_| "localhost".to_string())
}
