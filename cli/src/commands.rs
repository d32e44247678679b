pub mod discover;
pub mod interfaces;
pub mod watch;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use netsweep_common::config::{Config, LinkLayerBackend, PerKind};
use netsweep_common::models::ProbeKind;
use netsweep_common::network::target::parse_targets;

#[derive(Parser)]
#[command(name = "netsweep")]
#[command(about = "Concurrent ICMP/ARP/TCP presence and service discovery.")]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one discovery scan and print what answered
    #[command(alias = "d")]
    Discover(ScanArgs),
    /// Scan periodically and print discovered/removed events
    #[command(alias = "w")]
    Watch(ScanArgs),
    /// Show the interfaces discovery would scan
    #[command(alias = "i")]
    Interfaces,
}

#[derive(Args, Clone)]
pub struct ScanArgs {
    /// Targets: a.b.c.d, a.b.c.d/nn, a.b.c.d-e or a.b.c.d-a.b.c.e, comma separated.
    /// Defaults to every address on the local interfaces.
    pub targets: Vec<String>,

    /// Strategies to run
    #[arg(short, long, value_delimiter = ',', default_value = "icmp,arp,tcp")]
    pub strategies: Vec<ProbeKind>,

    /// Candidate TCP ports
    #[arg(short, long, value_delimiter = ',', default_value = "80,548,554,1025")]
    pub ports: Vec<u16>,

    /// Per-probe timeout in milliseconds
    #[arg(short, long, default_value_t = 1000)]
    pub timeout_ms: u64,

    /// Whole-scan deadline in seconds
    #[arg(short, long, default_value_t = 60)]
    pub deadline: u64,

    /// Workers per available core
    #[arg(long, default_value_t = 2)]
    pub pool_multiplier: usize,

    /// Exact worker count, overrides the multiplier
    #[arg(long)]
    pub pool_size: Option<usize>,

    /// Use the kernel ARP table instead of the arping tool
    #[arg(long)]
    pub arp_table: bool,

    #[arg(long, default_value = "arping")]
    pub arping_path: PathBuf,

    #[arg(long, default_value = "ping")]
    pub ping_path: PathBuf,

    /// Skip network and broadcast addresses of each subnet
    #[arg(long)]
    pub exclude_broadcast: bool,

    /// Drop records not seen again after each full scan
    #[arg(long)]
    pub prune: bool,

    /// Seconds between background scans (watch only)
    #[arg(short, long, default_value_t = 300)]
    pub interval: u64,
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl ScanArgs {
    pub fn into_config(self) -> anyhow::Result<Config> {
        let mut targets = Vec::new();
        for raw in &self.targets {
            targets.extend(parse_targets(raw)?);
        }

        let timeout = Duration::from_millis(self.timeout_ms);
        Ok(Config {
            strategies: self.strategies,
            timeouts: PerKind::uniform(timeout),
            scan_deadline: Duration::from_secs(self.deadline),
            pool_multiplier: self.pool_multiplier,
            pool_size: self.pool_size,
            ports: self.ports,
            background_interval: Duration::from_secs(self.interval.max(1)),
            ping_path: self.ping_path,
            arping_path: self.arping_path,
            link_layer_backend: if self.arp_table {
                LinkLayerBackend::ArpTable
            } else {
                LinkLayerBackend::ArpingTool
            },
            targets,
            exclude_network_broadcast: self.exclude_broadcast,
            prune_after_scan: self.prune,
            ..Config::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn parse(args: &[&str]) -> CommandLine {
        CommandLine::try_parse_from(args).unwrap()
    }

    #[test]
    fn discover_defaults_match_config_defaults() {
        let Commands::Discover(args) = parse(&["netsweep", "discover"]).command else {
            panic!("expected discover");
        };
        let cfg = args.into_config().unwrap();
        let defaults = Config::default();

        assert_eq!(cfg.strategies, defaults.strategies);
        assert_eq!(cfg.ports, defaults.ports);
        assert_eq!(cfg.timeouts, defaults.timeouts);
        assert_eq!(cfg.scan_deadline, defaults.scan_deadline);
        assert!(cfg.targets.is_empty());
    }

    #[test]
    fn targets_and_flags_map_onto_config() {
        let cli = parse(&[
            "netsweep",
            "-v",
            "d",
            "192.168.1.0/30,10.0.0.5",
            "-s",
            "tcp",
            "-p",
            "80",
            "--arp-table",
            "--timeout-ms",
            "200",
        ]);
        assert_eq!(cli.verbose, 1);
        let Commands::Discover(args) = cli.command else {
            panic!("expected discover");
        };
        let cfg = args.into_config().unwrap();

        assert_eq!(cfg.strategies, vec![ProbeKind::Port]);
        assert_eq!(cfg.ports, vec![80]);
        assert_eq!(cfg.link_layer_backend, LinkLayerBackend::ArpTable);
        assert_eq!(cfg.timeouts.port, Duration::from_millis(200));
        assert_eq!(cfg.targets.len(), 2);
        assert_eq!(cfg.targets[1].start_addr, Ipv4Addr::new(10, 0, 0, 5));
    }

    #[test]
    fn bad_target_is_rejected() {
        let Commands::Watch(args) = parse(&["netsweep", "watch", "10.0.0.300"]).command else {
            panic!("expected watch");
        };
        assert!(args.into_config().is_err());
    }

    #[test]
    fn unknown_strategy_fails_to_parse() {
        assert!(CommandLine::try_parse_from(["netsweep", "discover", "-s", "udp"]).is_err());
    }
}
