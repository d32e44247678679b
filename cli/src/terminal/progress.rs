use std::io;
use std::sync::{Mutex, PoisonError};

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

/// The bar currently on screen, if any. Log output is routed above it.
static ACTIVE: Mutex<Option<ProgressBar>> = Mutex::new(None);

pub fn start(len: u64) -> ProgressBar {
    let style = ProgressStyle::with_template("{spinner:.blue} [{bar:32.green/bright_black}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸━")
        .tick_strings(&["▁▁▁▁▁", "▁▂▂▂▁", "▁▄▂▄▁", "▂▄▆▄▂", "▄▆█▆▄", "▂▄▆▄▂", "▁▄▂▄▁", "▁▂▂▂▁"]);

    let pb = ProgressBar::new(len);
    pb.set_style(style);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    *ACTIVE.lock().unwrap_or_else(PoisonError::into_inner) = Some(pb.clone());
    pb
}

pub fn report(pb: &ProgressBar, completed: usize, present: usize) {
    pb.set_position(completed as u64);
    pb.set_message(format!("{} hosts answering", present.to_string().green().bold()));
}

pub fn finish() {
    if let Some(pb) = ACTIVE.lock().unwrap_or_else(PoisonError::into_inner).take() {
        pb.finish_and_clear();
    }
}

/// Writes through the active progress bar so lines never tear it.
#[derive(Default)]
pub struct ProgressWriter;

impl io::Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let active = ACTIVE.lock().unwrap_or_else(PoisonError::into_inner);
        match active.as_ref() {
            Some(pb) => {
                let msg = String::from_utf8_lossy(buf);
                pb.println(msg.trim_end());
            }
            None => io::Write::write_all(&mut io::stderr(), buf)?,
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut io::stderr())
    }
}
