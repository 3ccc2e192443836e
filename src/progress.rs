//! Progress UI (spinner) for harvest runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use harvester_core::FetchStats;
use indicatif::{ProgressBar, ProgressStyle};

/// Spawns the spinner when requested.
///
/// Returns `(handle, stop)`; the caller sets `stop` and awaits the handle.
/// When `use_spinner` is false the handle is `None` and `stop` is already set.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    stats: Arc<FetchStats>,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = tokio::spawn(spin(stats, Arc::clone(&stop)));
    (Some(handle), stop)
}

async fn spin(stats: Arc<FetchStats>, stop: Arc<AtomicBool>) {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));

    while !stop.load(Ordering::SeqCst) {
        spinner.set_message(status_line(&stats));
        tokio::time::sleep(Duration::from_millis(120)).await;
    }

    spinner.finish_and_clear();
}

fn status_line(stats: &FetchStats) -> String {
    let done = stats.total();
    if done == 0 {
        return "Discovering documents...".to_string();
    }
    format!(
        "[{done} done] {} new, {} unchanged, {} failed",
        stats.downloaded(),
        stats.unchanged() + stats.not_modified(),
        stats.failed()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_progress_ui_when_disabled_returns_none_and_stop_set() {
        let (handle, stop) = spawn_progress_ui(false, Arc::new(FetchStats::new()));
        assert!(handle.is_none());
        assert!(stop.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn spawn_progress_ui_stops_on_signal() {
        let (handle, stop) = spawn_progress_ui(true, Arc::new(FetchStats::new()));
        assert!(!stop.load(Ordering::SeqCst));

        stop.store(true, Ordering::SeqCst);
        handle.unwrap().await.unwrap();
    }

    #[test]
    fn status_line_before_any_download() {
        assert_eq!(status_line(&FetchStats::new()), "Discovering documents...");
    }
}
