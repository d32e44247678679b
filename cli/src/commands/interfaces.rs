use netsweep_common::config::Config;
use netsweep_core::enumerator::{AddressSpaceEnumerator, SystemInterfaces};

use crate::nprint;
use crate::terminal::{format, print};

pub fn interfaces(cfg: &Config) {
    let enumerator = AddressSpaceEnumerator::new(Box::new(SystemInterfaces), cfg);
    let interfaces = enumerator.snapshot();

    print::header("local interfaces");
    for (idx, interface) in interfaces.iter().enumerate() {
        print::tree_head(idx, &interface.name);
        print::as_tree_one_level(&format::interface_to_details(interface));
        if idx + 1 != interfaces.len() {
            nprint!();
        }
    }

    let scannable: Vec<_> = interfaces.iter().filter(|i| i.is_scannable()).collect();
    print::fat_separator();
    print::aligned_line("Scannable interfaces", 20, scannable.len());
    print::aligned_line("Total targets", 20, enumerator.enumerate().len());
}
