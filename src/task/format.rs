//! Human-readable sizes and durations for upload lists and history

const SIZE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut exponent = 0;
    let mut unit = 1u64;
    while exponent < SIZE_UNITS.len() - 1 && bytes >= unit * 1024 {
        unit *= 1024;
        exponent += 1;
    }
    let value = bytes as f64 / unit as f64;

    let mut text = format!("{:.2}", value);
    if text.contains('.') {
        text = text.trim_end_matches('0').trim_end_matches('.').to_string();
    }
    format!("{} {}", text, SIZE_UNITS[exponent])
}

pub fn format_duration(ms: i64) -> String {
    let seconds = ms.max(0) / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds % 60)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_bytes() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1048576), "1 MB");
        assert_eq!(format_file_size(1073741824), "1 GB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(2621440), "2.5 MB");
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(5000), "5s");
        assert_eq!(format_duration(90000), "1m 30s");
        assert_eq!(format_duration(60000), "1m 0s");
        assert_eq!(format_duration(5400000), "1h 30m");
    }
}
