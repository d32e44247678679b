use colored::*;
use netsweep_common::config::Config;
use netsweep_common::models::RegistryEvent;
use netsweep_core::discovery::DiscoveryService;
use tracing::info;

use crate::terminal::{colors, format, print};

pub async fn watch(cfg: Config) -> anyhow::Result<()> {
    let (service, mut registry) = DiscoveryService::with_system_defaults(cfg);
    service.start_background_discovery();
    info!("Watching for devices, press Ctrl-C to stop");

    loop {
        tokio::select! {
            event = registry.recv() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    service.stop_background_discovery();
    service.stop_scan();
    print::end_of_program();
    Ok(())
}

fn print_event(event: &RegistryEvent) {
    match event {
        RegistryEvent::Discovered(record) => {
            print::print_status(format!("{} {}", "discovered".color(colors::ACCENT).bold(), record.label));
            print::as_tree_one_level(&format::record_to_details(record));
        }
        RegistryEvent::Removed(key) => {
            print::print_status(format!("{} {}", "removed".color(colors::REMOVED).bold(), key));
        }
    }
}
