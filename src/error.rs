use reqwest::StatusCode;

/// Errors returned when constructing a [`Logger`](crate::logger::Logger).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("remote sink required but no project id could be resolved")]
    NoProject,

    #[error("remote sink required but stdout-only mode was requested")]
    StdoutOnlyConflict,

    #[error("remote sink requires the `cloud` feature")]
    CloudFeatureDisabled,

    #[error("failed to build HTTP client for the remote sink: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Transport errors of the Cloud Logging sink and the metadata server.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("reqwest error with context '{context}': {source}")]
    Reqwest {
        context: String,
        source: reqwest::Error,
    },

    #[error("unsuccessful HTTP response with context '{context}'. HTTP status code: '{status}', body: '{body}'")]
    HttpResponse {
        context: String,
        status: StatusCode,
        body: String,
    },

    #[error("no 'access_token' found in the metadata server response body")]
    TokenNotFound,
}

/// Errors from the message-relay capability (Slack).
#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("slack is not properly configured")]
    NotConfigured,

    #[error("slack bot token appears to be invalid (should start with 'xoxb-')")]
    InvalidToken,

    #[error("channel ID is required")]
    MissingChannel,

    #[error("slack authentication failed - please check your bot token and permissions")]
    AuthFailed,

    #[error("slack channel not found - please check your channel ID")]
    ChannelNotFound,

    #[error("slack bot is not in the specified channel - please invite the bot to the channel")]
    NotInChannel,

    #[error("failed to send slack message: {0}")]
    Api(String),

    #[error("failed to send slack message: {0}")]
    Http(#[from] reqwest::Error),
}

impl DeliveryError {
    /// Rewrite a Slack API error code into a recognised variant.
    pub fn from_api_code(code: &str) -> Self {
        if code.contains("invalid_auth") {
            DeliveryError::AuthFailed
        } else if code.contains("channel_not_found") {
            DeliveryError::ChannelNotFound
        } else if code.contains("not_in_channel") {
            DeliveryError::NotInChannel
        } else {
            DeliveryError::Api(code.to_string())
        }
    }
}

/// Errors returned by [`AlertRelay::handle`](crate::relay::AlertRelay::handle).
#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error("empty pubsub data")]
    EmptyPayload,

    #[error("failed to parse pubsub json: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error("invalid push envelope: {0}")]
    InvalidEnvelope(String),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}
