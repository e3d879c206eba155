//! Logging system demonstration
//!
//! Run with:
//! ```bash
//! cargo run -p core-runtime --example logging_demo -- json
//! cargo run -p core-runtime --example logging_demo -- compact "core_playback=trace"
//! ```

use bridge_traits::time::{ConsoleLogger, LogLevel};
use core_runtime::logging::{init_logging, strip_url_query, LogFormat, LoggingConfig};
use std::env;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args: Vec<String> = env::args().collect();

    let format = match args.get(1).map(String::as_str) {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        Some("pretty") => LogFormat::Pretty,
        _ => LogFormat::default(),
    };

    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Trace)
        .with_logger_sink(Arc::new(ConsoleLogger {
            min_level: LogLevel::Warn,
        }));

    if let Some(filter) = args.get(2) {
        config = config.with_filter(filter.clone());
    }

    init_logging(config).expect("Failed to initialize logging");

    let url = "https://cdn.example.com/vod/clip.mp4?token=secret";
    let span = info_span!(target: "core_playback", "set_active_item", item_index = 0);
    let _guard = span.enter();

    info!(target: "core_playback", url = %strip_url_query(url), "loading item");
    debug!(target: "core_playback", provider = "html5", generation = 1u64, "provider created");
    warn!(target: "core_playback", code = 224003u32, attempt = 1u32, "decode error, reloading");
}
