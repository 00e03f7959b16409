use bolt_dl::Progress;
use indicatif::{HumanBytes, ProgressBar, ProgressState, ProgressStyle};

pub fn create_progress_bar(prefix: &str) -> ProgressBar {
    let progress_bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template(
        "{prefix} [{wide_bar:.green/white}] {bytes_per_sec:14} {computed_bytes:22}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .with_key("computed_bytes", format_bytes)
    .progress_chars("━━");
    progress_bar.set_style(style);
    progress_bar.set_prefix(prefix.to_string());
    progress_bar
}

fn format_bytes(state: &ProgressState, w: &mut dyn std::fmt::Write) {
    let _ = write!(
        w,
        "{}/{}",
        HumanBytes(state.pos()),
        HumanBytes(state.len().unwrap_or(state.pos()))
    );
}

pub fn handle_progress(progress: Progress, progress_bar: &ProgressBar) {
    match progress {
        Progress::Starting {
            total,
        } => {
            progress_bar.set_length(total);
        }
        Progress::Chunk {
            current, ..
        } => {
            progress_bar.set_position(current);
        }
        Progress::Complete {
            ..
        } => progress_bar.finish(),
    }
}
