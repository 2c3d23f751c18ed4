//! Progress reporting: a byte-based bar over the input, advanced per scanned range.

use indicatif::{ProgressBar, ProgressStyle};

pub fn make_progress_bar_labeled(total_bytes: u64, label: Option<&str>) -> ProgressBar {
    let pb = ProgressBar::new(total_bytes);
    if let Ok(style) = ProgressStyle::with_template(
        "{spinner:.green} {msg} {bytes:>10}/{total_bytes:<10} [{bar:.cyan/blue}] {percent:>3}%  \
         {bytes_per_sec}  elapsed: {elapsed_precise}  eta: {eta_precise}",
    ) {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb.set_message(label.unwrap_or("Scanning").to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Optional bar shared by all workers. A hidden scope costs one branch per range.
#[derive(Clone, Default)]
pub struct ProgressScope {
    pb: Option<ProgressBar>,
}

impl ProgressScope {
    pub fn bytes(enabled: bool, total_bytes: u64, label: Option<&str>) -> Self {
        let pb = enabled.then(|| make_progress_bar_labeled(total_bytes, label));
        Self { pb }
    }

    #[inline]
    pub fn inc_bytes(&self, delta: u64) {
        if let Some(pb) = &self.pb {
            pb.inc(delta);
        }
    }

    pub fn finish(&self, msg: impl Into<String>) {
        if let Some(pb) = &self.pb {
            pb.finish_with_message(msg.into());
        }
    }

    pub fn abandon(&self, msg: impl Into<String>) {
        if let Some(pb) = &self.pb {
            pb.abandon_with_message(msg.into());
        }
    }
}
