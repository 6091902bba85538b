use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::time::Duration;
use grouphead_wire::{MAX_GROUPS, grouphead::ShardedConfig};

/// Which allocator the server runs.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorKind {
    /// Two-generation entries with per-group locks and administrative
    /// operations.
    Actor,
    /// Single-range entries cached in hashed shards.
    Sharded,
}

/// Runtime configuration for the `grouphead-server` binary.
///
/// All values are parsed from CLI arguments or environment variables.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "grouphead-server",
    version,
    about = "Remote article number allocator for NNTP storage"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix
    /// socket).
    ///
    /// Example: "0.0.0.0:11119" or "/tmp/grouphead.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:11119"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be
    /// a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Allocator implementation.
    ///
    /// Environment variable: `ALLOCATOR`
    #[arg(long, env = "ALLOCATOR", value_enum, default_value_t = AllocatorKind::Actor)]
    pub allocator: AllocatorKind,

    /// Number of shards of the sharded allocator.
    ///
    /// Environment variable: `SHARDS`
    #[arg(long, env = "SHARDS", default_value_t = 256)]
    pub shards: usize,

    /// How long the sharded allocator trusts a cached entry, in milliseconds.
    ///
    /// Environment variable: `CACHE_TTL_MS`
    #[arg(long, env = "CACHE_TTL_MS", default_value_t = 5_000)]
    pub cache_ttl_ms: u64,

    /// Largest number of groups accepted in one insert or revert request.
    ///
    /// Environment variable: `MAX_GROUPS_PER_REQUEST`
    #[arg(long, env = "MAX_GROUPS_PER_REQUEST", default_value_t = 255)]
    pub max_groups_per_request: usize,

    /// Seconds to wait for in-flight requests during shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub allocator: AllocatorKind,
    pub sharded: ShardedConfig,
    pub max_groups_per_request: usize,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.shards == 0 {
            bail!("SHARDS must be greater than 0");
        }

        if args.max_groups_per_request == 0 || args.max_groups_per_request > MAX_GROUPS {
            bail!(
                "MAX_GROUPS_PER_REQUEST ({}) must be between 1 and {}",
                args.max_groups_per_request,
                MAX_GROUPS
            );
        }

        if args.uds && args.server_addr.is_empty() {
            bail!("SERVER_ADDR must be a socket path when --uds is set");
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            allocator: args.allocator,
            sharded: ShardedConfig {
                shards: args.shards,
                cache_ttl: Duration::from_millis(args.cache_ttl_ms),
            },
            max_groups_per_request: args.max_groups_per_request,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let argv = core::iter::once("grouphead-server").chain(args.iter().copied());
        ServerConfig::try_from(CliArgs::try_parse_from(argv)?)
    }

    #[test]
    fn defaults_are_valid() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.allocator, AllocatorKind::Actor);
        assert_eq!(config.max_groups_per_request, MAX_GROUPS);
        assert_eq!(config.sharded.cache_ttl, Duration::from_secs(5));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
    }

    #[test]
    fn sharded_options_are_carried() {
        let config = parse(&["--allocator", "sharded", "--shards", "16", "--cache-ttl-ms", "250"]).unwrap();
        assert_eq!(config.allocator, AllocatorKind::Sharded);
        assert_eq!(config.sharded.shards, 16);
        assert_eq!(config.sharded.cache_ttl, Duration::from_millis(250));
    }

    #[test]
    fn out_of_range_values_are_refused() {
        assert!(parse(&["--shards", "0"]).is_err());
        assert!(parse(&["--max-groups-per-request", "0"]).is_err());
        assert!(parse(&["--max-groups-per-request", "256"]).is_err());
        assert!(parse(&["--allocator", "postgres"]).is_err());
    }
}
