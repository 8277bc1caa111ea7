use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the ogcache binary.
#[derive(Debug, Parser)]
#[command(name = "ogcache", version, about = "Cached OG image server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "OGCACHE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the public OG endpoint and the admin listener.
    Serve(Box<ServeArgs>),
    /// Print the cache fingerprint for a parameter set.
    Key(KeyArgs),
    /// Print the HTTP caching headers for a policy.
    Headers(HeadersArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the public listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the administrative listener host.
    #[arg(long = "server-admin-host", value_name = "HOST")]
    pub server_admin_host: Option<String>,

    /// Override the public listener port.
    #[arg(long = "server-public-port", value_name = "PORT")]
    pub public_port: Option<u16>,

    /// Override the administrative listener port.
    #[arg(long = "server-admin-port", value_name = "PORT")]
    pub admin_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    #[command(flatten)]
    pub cache: CacheOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CacheOverrides {
    /// Override the key namespace.
    #[arg(long = "cache-namespace", value_name = "NAME")]
    pub cache_namespace: Option<String>,

    /// Override the store TTL used when callers pass none.
    #[arg(long = "cache-default-ttl-seconds", value_name = "SECONDS")]
    pub cache_default_ttl_seconds: Option<u64>,

    /// Override the maximum number of stored artifacts.
    #[arg(long = "cache-max-entries", value_name = "COUNT")]
    pub cache_max_entries: Option<usize>,

    /// Override the stored artifact byte budget.
    #[arg(long = "cache-max-bytes", value_name = "BYTES")]
    pub cache_max_bytes: Option<usize>,

    /// Toggle coalescing of concurrent misses.
    #[arg(
        long = "cache-coalesce-misses",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_coalesce_misses: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct KeyArgs {
    #[command(flatten)]
    pub cache: CacheOverrides,

    /// Parameters as `name=value` pairs.
    #[arg(value_name = "NAME=VALUE", required = true)]
    pub params: Vec<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct HeadersArgs {
    /// max-age / s-maxage in seconds.
    #[arg(long, value_name = "SECONDS")]
    pub ttl: Option<u64>,

    /// stale-while-revalidate in seconds.
    #[arg(long, value_name = "SECONDS")]
    pub swr: Option<u64>,

    /// Surrogate key; repeatable.
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// Vary header value.
    #[arg(long, value_name = "HEADERS")]
    pub vary: Option<String>,
}
