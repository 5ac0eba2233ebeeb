/// Renders `HH:MM:SS.mmm`; with `file_name_friendly` the colons become dots
/// so the result can be embedded in output file names. Milliseconds are
/// truncated, not rounded.
pub fn format_duration(seconds: f64, file_name_friendly: bool) -> String {
    let seconds = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        0.0
    };
    // The nudge absorbs binary error such as 1.001 * 1000 = 1000.999..
    let total_ms = (seconds * 1000.0 + 1e-6).floor() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let secs = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;
    let delim = if file_name_friendly { '.' } else { ':' };
    format!("{hours:02}{delim}{minutes:02}{delim}{secs:02}.{millis:03}")
}

/// Parses `[-]HH:MM:SS[.frac]`, `MM:SS[.frac]` or plain seconds.
pub fn parse_duration(raw: &str) -> Result<f64, String> {
    let trimmed = raw.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let parts: Vec<&str> = body.split(':').collect();
    if body.is_empty() || parts.len() > 3 {
        return Err(format!("`{raw}` is not a duration (expected HH:MM:SS.mmm or seconds)"));
    }

    let (last, leading) = parts.split_last().ok_or_else(|| format!("`{raw}` is empty"))?;
    let secs: f64 = last
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| format!("`{last}` is not a valid seconds field in `{raw}`"))?;

    let mut total = 0.0;
    for field in leading {
        let value: u64 = field
            .parse()
            .map_err(|_| format!("`{field}` is not a valid field in `{raw}`"))?;
        total = total * 60.0 + value as f64;
    }
    let total = total * 60.0 + secs;
    Ok(if negative { -total } else { total })
}
