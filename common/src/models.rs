//! Plain data flowing through a discovery scan.

mod probe;
mod record;
mod session;
mod verdict;

pub use probe::{Evidence, ProbeKind, ProbeOutcome};
pub use record::{DiscoveryKey, DiscoveryRecord, RegistryEvent};
pub use session::{ScanSession, ScanState};
pub use verdict::HostVerdict;
