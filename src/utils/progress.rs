use indicatif::{ProgressBar, ProgressStyle};

/// Bar for one dataset split, e.g. "Processing train images [=====>    ] 70/100".
///
/// Hidden when `enabled` is false so tests and JSON-logged runs stay clean.
pub fn split_progress(label: &str, len: u64, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{prefix:.bold} [{bar:30.cyan/dim}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.set_prefix(format!("Processing {} images", label));
    pb
}

/// Spinner for a single long step such as the Overpass query or raster burn.
pub fn step_spinner(message: &str, enabled: bool) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    pb
}
