//! Terminal progress bar fed by a transfer's progress stream.

use indicatif::{HumanBytes, ProgressBar, ProgressState, ProgressStyle};
use numerapi_transfer::{ProgressStream, TransferControl};
use std::fmt::Write;
use tokio::task::JoinHandle;

/// A progress bar drawing snapshots from one transfer.
///
/// The bar clears itself once the transfer drops its control.
pub struct TransferBar {
    task: Option<JoinHandle<()>>,
}

impl TransferBar {
    /// Subscribe to `control` and draw a bar labelled `label` on stderr.
    ///
    /// With `visible = false` nothing is subscribed or drawn.
    pub fn attach(control: &mut TransferControl, label: &str, visible: bool) -> Self {
        if !visible {
            return Self { task: None };
        }
        let stream = control.report_progress();
        let bar = ProgressBar::new_spinner()
            .with_style(spinner_style())
            .with_message(label.to_string());
        Self {
            task: Some(tokio::spawn(drive(bar, stream))),
        }
    }

    /// Wait until the final snapshot has been drawn.
    pub async fn finish(self) {
        if let Some(task) = self.task {
            let _ = task.await;
        }
    }
}

async fn drive(bar: ProgressBar, mut stream: ProgressStream) {
    let mut sized = false;
    while let Some(snapshot) = stream.recv().await {
        if let Some(total) = snapshot.total_bytes {
            if !sized {
                bar.set_style(bar_style());
                sized = true;
            }
            bar.set_length(total);
        }
        bar.set_position(snapshot.bytes_transferred);
    }
    bar.finish_and_clear();
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {msg} {bytes} ({bytes_per_sec})")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{msg} {bar:28.cyan/blue} {human_bytes:>9} / {human_total:>9} ({percent:>3}%) @ {binary_bytes_per_sec} ETA {eta}",
    )
    .map(|style| {
        style
            .with_key("human_bytes", |state: &ProgressState, w: &mut dyn Write| {
                let _ = write!(w, "{}", HumanBytes(state.pos()));
            })
            .with_key("human_total", |state: &ProgressState, w: &mut dyn Write| {
                let _ = write!(w, "{}", HumanBytes(state.len().unwrap_or(0)));
            })
            .progress_chars("█▓░")
    })
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn styles_parse() {
        // with_template failures fall back silently; make sure the real ones parse
        assert!(ProgressStyle::with_template("{spinner:.green} {msg} {bytes} ({bytes_per_sec})").is_ok());
        let _ = bar_style();
    }

    #[tokio::test]
    async fn hidden_bar_does_not_subscribe() {
        let mut control = TransferControl::new();
        let bar = TransferBar::attach(&mut control, "x", false);
        assert!(bar.task.is_none());
        bar.finish().await;
    }

    #[tokio::test]
    async fn bar_finishes_when_control_drops() {
        let mut control = TransferControl::new();
        let bar = TransferBar::attach(&mut control, "live.parquet", true);
        drop(control);
        bar.finish().await;
    }
}
