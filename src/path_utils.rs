use std::path::Path;
use std::path::PathBuf;

use crate::config::UNKNOWN_STATION;
use crate::song::Track;

/// Make a client-provided name usable as a single path component.
/// Separators become dashes, characters that are awkward on common
/// filesystems are dropped and surrounding whitespace is trimmed.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter_map(|c| match c {
            '/' | '\\' | ':' => Some('-'),
            '*' | '?' | '"' | '<' | '>' | '|' => None,
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.chars().all(|c| c == '.') {
        "Unknown".into()
    } else {
        cleaned.into()
    }
}

pub fn station_dir(save_dir: &Path, station: Option<&str>) -> PathBuf {
    save_dir.join(station.unwrap_or(UNKNOWN_STATION))
}

/// `<save-dir>/<station>/<title - artist>.<extension>`
pub fn track_file(save_dir: &Path, station: Option<&str>, track: &Track, extension: &str) -> PathBuf {
    station_dir(save_dir, station).join(format!(
        "{}.{}",
        sanitize_file_name(&track.file_stem()),
        extension
    ))
}
