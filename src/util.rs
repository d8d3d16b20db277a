/// Expands a leading `~` in a path to the user's home directory.
/// Also normalizes path separators for the current OS.
pub fn expand_tilde(path: &str) -> String {
    let result = if path.starts_with("~/") || path == "~" {
        if let Some(home) = dirs::home_dir() {
            let rest = path.get(2..).unwrap_or("");
            home.join(rest).to_string_lossy().to_string()
        } else {
            path.to_string()
        }
    } else {
        path.to_string()
    };
    // Normalize separators for the current OS
    if cfg!(windows) {
        result.replace('/', "\\")
    } else {
        result
    }
}

/// Parses a computed CSS length such as `"34px"`, `"0"` or `" 12.5px "` into pixels.
///
/// Safe-area custom properties come back from `getComputedStyle` as raw strings,
/// and are empty when the browser doesn't support `env(safe-area-inset-*)`.
/// Anything that isn't a finite, non-negative number yields 0.
pub fn parse_css_px(raw: &str) -> f64 {
    let trimmed = raw.trim();
    let number = trimmed.strip_suffix("px").unwrap_or(trimmed).trim();
    match number.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => v,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_css_px() {
        assert_eq!(parse_css_px("34px"), 34.0);
        assert_eq!(parse_css_px(" 12.5px "), 12.5);
        assert_eq!(parse_css_px("0"), 0.0);
        assert_eq!(parse_css_px(""), 0.0);
        assert_eq!(parse_css_px("env(safe-area-inset-top)"), 0.0);
        assert_eq!(parse_css_px("-4px"), 0.0);
        assert_eq!(parse_css_px("NaNpx"), 0.0);
    }

    #[test]
    fn test_expand_tilde_leaves_plain_paths() {
        assert_eq!(expand_tilde("relative/file.html"), if cfg!(windows) {
            "relative\\file.html".to_string()
        } else {
            "relative/file.html".to_string()
        });
    }
}
