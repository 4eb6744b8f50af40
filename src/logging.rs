use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "WHISPER_GATEWAY_LOG";

/// Install the JSON subscriber at `info`, unless `WHISPER_GATEWAY_LOG` says otherwise.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init() -> bool {
    init_with_default(LevelFilter::INFO)
}

pub fn init_with_default(default: LevelFilter) -> bool {
    tracing_subscriber::registry()
        .with(env_filter(default))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false),
        )
        .try_init()
        .is_ok()
}

fn env_filter(default: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_env_var(LOG_ENV)
        .with_default_directive(default.into())
        .from_env_lossy()
}
