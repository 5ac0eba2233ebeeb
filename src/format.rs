//! Reconciles what the probe says a container is with what the file's first
//! bytes say, and translates detected names into names the muxer accepts.

/// Bytes read from the head of a file for content sniffing.
pub const SNIFF_LEN: usize = 4100;

/// Content sniff wins when the probe lists it, otherwise the probe's first
/// candidate is used.
pub fn determine_output_format(candidates: &[String], sniffed: Option<&str>) -> Option<String> {
    if let Some(ext) = sniffed {
        if candidates.iter().any(|c| c == ext) {
            return Some(ext.to_string());
        }
    }
    candidates.first().cloned()
}

/// Detected format names and muxer names are not the same vocabulary
/// (see `ffmpeg -formats`). Writing `ipod` produces the same file as `m4a`.
pub fn map_format(format: &str) -> String {
    match format {
        "m4a" | "aac" => "ipod".to_string(),
        other => other.to_string(),
    }
}

/// Splits the probe's comma-joined `format_name`, dropping empty tokens.
pub fn split_format_names(format_name: &str) -> Vec<String> {
    format_name
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Best-effort extension guess from magic bytes.
pub fn sniff_extension(head: &[u8]) -> Option<&'static str> {
    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        let brand = &head[8..12];
        return Some(match brand {
            b"qt  " => "mov",
            b"M4A " | b"M4B " => "m4a",
            _ if brand.starts_with(b"3g") => "3gp",
            _ => "mp4",
        });
    }
    if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        let scan = &head[..head.len().min(64)];
        let is_webm = scan.windows(4).any(|w| w == b"webm");
        return Some(if is_webm { "webm" } else { "mkv" });
    }
    if head.len() >= 12 && head.starts_with(b"RIFF") {
        return match &head[8..12] {
            b"AVI " => Some("avi"),
            b"WAVE" => Some("wav"),
            _ => None,
        };
    }
    if head.starts_with(b"FLV") {
        return Some("flv");
    }
    if head.starts_with(&[0x00, 0x00, 0x01, 0xBA]) {
        return Some("mpg");
    }
    if head.len() > 188 && head[0] == 0x47 && head[188] == 0x47 {
        return Some("mts");
    }
    if head.starts_with(b"OggS") {
        return Some("ogg");
    }
    if head.starts_with(b"fLaC") {
        return Some("flac");
    }
    if head.starts_with(&[0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11]) {
        return Some("wmv");
    }
    if head.starts_with(b"ID3") {
        return Some("mp3");
    }
    if head.len() >= 2 && head[0] == 0xFF {
        return match head[1] {
            0xF1 | 0xF9 => Some("aac"),
            0xFB | 0xF3 | 0xF2 => Some("mp3"),
            _ => None,
        };
    }
    None
}
