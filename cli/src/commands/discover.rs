use std::time::Duration;

use colored::*;
use netsweep_common::config::Config;
use netsweep_common::models::DiscoveryRecord;
use netsweep_core::coordinator::ScanSummary;
use netsweep_core::discovery::DiscoveryService;
use tracing::warn;

use crate::nprint;
use crate::terminal::{colors, format, print, progress};

pub async fn discover(cfg: Config) -> anyhow::Result<()> {
    let (service, _registry) = DiscoveryService::with_system_defaults(cfg);

    let mut handle = service.start_scan();
    let (_, expected) = handle.progress();
    let pb = progress::start(expected as u64);

    let mut present = 0;
    let mut interrupted = false;
    loop {
        tokio::select! {
            verdict = handle.next_verdict() => match verdict {
                Some(verdict) => {
                    if verdict.present {
                        present += 1;
                    }
                    progress::report(&pb, handle.progress().0, present);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                warn!("Interrupted, stopping scan");
                interrupted = true;
                service.stop_scan();
            }
        }
    }

    let summary = handle.wait().await;
    service.settled().await;
    progress::finish();

    discovery_ends(&service.sink().records(), &summary);
    Ok(())
}

fn discovery_ends(records: &[DiscoveryRecord], summary: &ScanSummary) {
    if records.is_empty() {
        print::header("nothing discovered");
        print::no_results();
        print_summary(0, summary);
        return;
    }

    print::header("network discovery");
    for (idx, record) in records.iter().enumerate() {
        print::tree_head(idx, &record.label);
        print::as_tree_one_level(&format::record_to_details(record));
        if idx + 1 != records.len() {
            nprint!();
        }
    }
    print_summary(records.len(), summary);
}

fn print_summary(records: usize, summary: &ScanSummary) {
    let found: ColoredString = format!("{records} records").bold().green();
    let hosts: ColoredString = format!("{}/{} hosts", summary.present, summary.expected).bold();
    let total_time: ColoredString = format_elapsed(summary.elapsed).bold().yellow();
    let output = format!("Discovery complete: {found} from {hosts} in {total_time}").color(colors::TEXT_DEFAULT);

    print::fat_separator();
    print::centerln(&output.to_string());
    if summary.cut_short() {
        let missed = summary.expected - summary.completed;
        warn!(missed, "Scan ended before every host was probed");
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.2}s", elapsed.as_secs_f64())
}
