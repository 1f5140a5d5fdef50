/// Renders the playback position of `frame_index` as `H:MM:SS[.ffffff]`.
///
/// Microseconds are appended only when non-zero, so whole seconds render
/// as `0:00:01`. Positions of a day or more get a `N day(s), ` prefix and
/// hours wrap at 24. A non-positive or non-finite `fps` yields `0:00:00`.
pub fn format_timestamp(frame_index: usize, fps: f64) -> String {
    if !(fps.is_finite() && fps > 0.0) {
        return "0:00:00".to_string();
    }

    let total_micros = (frame_index as f64 / fps * 1_000_000.0).round() as u64;
    let micros = total_micros % 1_000_000;
    let total_secs = total_micros / 1_000_000;
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    let mut out = match days {
        0 => String::new(),
        1 => "1 day, ".to_string(),
        n => format!("{n} days, "),
    };
    out.push_str(&format!("{hours}:{minutes:02}:{seconds:02}"));
    if micros != 0 {
        out.push_str(&format!(".{micros:06}"));
    }
    out
}
