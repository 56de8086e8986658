use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `logging.level` applies. Calling this
/// twice is harmless, the second install is ignored.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", logging.level)));

    let builder = fmt().with_env_filter(filter).with_target(true);

    let result = if logging.json {
        builder.json().flatten_event(true).try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = result {
        tracing::debug!("tracing subscriber already installed: {}", e);
    }
}
