use clap::Parser;

/// Overrides for the config values the host's embedding process would
/// otherwise hand in (spec §1 "out of scope: config file loading" — this
/// binary still needs a way to point at a non-default socket for local
/// development and debugging).
#[derive(Debug, Parser)]
#[command(name = "atest-ext-ai", about = "AI-backed SQL generation plugin core")]
pub struct Cli {
    /// Overrides `server.socket_path`.
    #[arg(long)]
    pub socket_path: Option<String>,

    /// Overrides `server.listen_address` (used on platforms without Unix sockets).
    #[arg(long)]
    pub listen_address: Option<String>,

    /// Overrides `server.max_connections`.
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// `tracing-subscriber` env-filter directive, e.g. `info` or `ai_manager=debug`.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
