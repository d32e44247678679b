mod commands;
mod terminal;

use commands::{CommandLine, Commands, discover, interfaces, watch};
use netsweep_common::config::Config;
use terminal::{logging, print};
use tracing::warn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CommandLine::parse_args();

    logging::init_logging(cli.verbose);

    if !is_root::is_root() {
        warn!("Not running as root, ICMP falls back to the ping tool and ARP may be unavailable");
    }

    match cli.command {
        Commands::Discover(args) => {
            print::header("getting ready for discovery");
            discover::discover(args.into_config()?).await
        }
        Commands::Watch(args) => {
            print::header("starting background discovery");
            watch::watch(args.into_config()?).await
        }
        Commands::Interfaces => {
            interfaces::interfaces(&Config::default());
            Ok(())
        }
    }
}
