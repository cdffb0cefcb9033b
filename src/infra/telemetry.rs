use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

pub const METRIC_POSTS_CREATED: &str = "yatube_posts_created_total";
pub const METRIC_POSTS_UPDATED: &str = "yatube_posts_updated_total";
pub const METRIC_POST_EDIT_DENIED: &str = "yatube_post_edit_denied_total";
pub const METRIC_COMMENTS_CREATED: &str = "yatube_comments_created_total";
pub const METRIC_LOGIN_FAILURES: &str = "yatube_login_failures_total";
pub const METRIC_HTTP_REQUEST_MS: &str = "yatube_http_request_ms";

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_POSTS_CREATED,
            Unit::Count,
            "Total number of posts published."
        );
        describe_counter!(
            METRIC_POSTS_UPDATED,
            Unit::Count,
            "Total number of posts edited by their authors."
        );
        describe_counter!(
            METRIC_POST_EDIT_DENIED,
            Unit::Count,
            "Total number of edit attempts by someone other than the author."
        );
        describe_counter!(
            METRIC_COMMENTS_CREATED,
            Unit::Count,
            "Total number of comments added."
        );
        describe_counter!(
            METRIC_LOGIN_FAILURES,
            Unit::Count,
            "Total number of rejected login attempts."
        );
        describe_histogram!(
            METRIC_HTTP_REQUEST_MS,
            Unit::Milliseconds,
            "HTTP request latency in milliseconds."
        );
    });
}
