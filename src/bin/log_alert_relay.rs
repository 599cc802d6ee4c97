//! Relays one Pub/Sub push delivery read from stdin to Slack.
//!
//! ```bash
//! # Pub/Sub push envelope
//! log-alert-relay < push.json
//!
//! # bare LogEntry JSON
//! log-alert-relay --raw < entry.json
//! ```

use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use logv2::init::init_diagnostics;
use logv2::relay::{relay_logger, relay_logger_config, AlertRelay, ChannelConfig, PubSubMessage, PushEnvelope};
use logv2::slack::SlackClient;
use logv2::RelayError;

/// Relay a Cloud Logging entry delivered over Pub/Sub to a Slack channel
#[derive(Parser, Debug)]
#[command(
    name = "log-alert-relay",
    version,
    about = "Relay a Cloud Logging entry delivered over Pub/Sub to Slack",
    long_about = "Reads one Pub/Sub push delivery from stdin and posts it to the Slack \
channel selected by the entry severity.\n\n\
Configuration comes from the environment (or a .env file): SLACK_BOT_TOKEN, \
SLACK_ERROR_CHANNEL_ID, SLACK_WARNING_CHANNEL_ID, SLACK_DEFAULT_CHANNEL_ID and \
the usual project id variables."
)]
struct Args {
    /// Read a bare LogEntry JSON object instead of a push envelope
    #[arg(long)]
    raw: bool,
}

fn read_message(raw: bool) -> Result<PubSubMessage, RelayError> {
    let mut body = Vec::new();
    std::io::stdin()
        .read_to_end(&mut body)
        .map_err(|e| RelayError::InvalidEnvelope(format!("reading stdin: {}", e)))?;

    if raw {
        return Ok(PubSubMessage {
            data: body,
            ..Default::default()
        });
    }
    PushEnvelope::from_slice(&body)?.into_message()
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    // .env is optional; deployed environments set the variables directly
    let _ = dotenvy::dotenv();
    let _ = init_diagnostics();

    // Built once here and handed to the relay; nothing else constructs it.
    let logger = Arc::new(relay_logger(relay_logger_config()).await);
    let slack = SlackClient::from_env().await;
    let relay = AlertRelay::new(Arc::clone(&logger), Arc::new(slack), ChannelConfig::from_env());

    let result = match read_message(args.raw) {
        Ok(message) => relay.handle(&message).await,
        Err(e) => {
            logger.error(None, "could not read pubsub message", &e);
            Err(e)
        }
    };

    logger.close().await;

    match result {
        Ok(delivery) => {
            tracing::info!(channel = %delivery.channel, ts = %delivery.token, "relayed log alert");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "relay failed");
            ExitCode::FAILURE
        }
    }
}
