//! Hardware vendor lookup for link-layer addresses.

use std::sync::OnceLock;

use mac_oui::Oui;
use pnet::util::MacAddr;
use tracing::{debug, warn};

static OUI_DB: OnceLock<Option<Oui>> = OnceLock::new();

fn oui_db() -> Option<&'static Oui> {
    OUI_DB
        .get_or_init(|| match Oui::default() {
            Ok(db) => Some(db),
            Err(e) => {
                warn!("Vendor database unavailable: {e}");
                None
            }
        })
        .as_ref()
}

/// Parses the vendor database ahead of the first lookup.
pub fn preload() {
    if oui_db().is_some() {
        debug!("Vendor database loaded");
    }
}

/// Company registered for the MAC's OUI prefix, if known.
pub fn lookup(mac: MacAddr) -> Option<String> {
    let db = oui_db()?;
    match db.lookup_by_mac(&mac.to_string()) {
        Ok(Some(entry)) => Some(entry.company_name.clone()),
        _ => None,
    }
}
