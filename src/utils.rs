use tracing_subscriber::EnvFilter;

const MAX_BODY_CHARS: usize = 200;

/// Log to stderr so stdout only carries the probe result. `RUST_LOG` wins
/// over the configured level.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,supabase_handshake={}", level)));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Milliseconds since the unix epoch, 0 if the clock is before it.
pub fn unix_millis() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

/// Shorten a response body for inclusion in an error message.
pub fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_BODY_CHARS {
        return body.to_string();
    }
    let mut out: String = body.chars().take(MAX_BODY_CHARS).collect();
    out.push('…');
    out
}
