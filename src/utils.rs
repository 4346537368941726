//! Common utility functions

/// Split a listing path into (directory, name), keeping the directory's
/// trailing slash so that `directory + name` reconstructs the path.
/// Examples:
///   "usr/local/bin" -> ("usr/local/", "bin")
///   "b/" -> ("", "b")
///   "file" -> ("", "file")
pub fn split_entry_path(path: &str) -> (&str, &str) {
    let path = path.trim_end_matches('/');
    match path.rfind('/') {
        Some(pos) => (&path[..=pos], &path[pos + 1..]),
        None => ("", path),
    }
}

/// Strip the `./` and `/` prefixes tar writers put in front of member names.
/// The layer root itself comes back as `""`.
///   "./etc/hosts" -> "etc/hosts"
///   "/usr/" -> "usr/"
///   "./" -> ""
pub fn strip_root_prefix(path: &str) -> &str {
    let mut path = path;
    loop {
        if let Some(rest) = path.strip_prefix("./") {
            path = rest;
        } else if let Some(rest) = path.strip_prefix('/') {
            path = rest;
        } else if path == "." {
            return "";
        } else {
            return path;
        }
    }
}

/// Normalize a directory argument to the form stored in `FileEntry::directory`:
/// no leading slash, a trailing slash unless it is the root (`""`).
pub fn normalize_dir(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Format a byte count with one decimal, e.g. `1536` -> `"1.5 KB"`.
pub fn human_readable_size(size: u64) -> String {
    let mut size = size as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{:.1} {}", size, unit);
        }
        size /= 1024.0;
    }
    format!("{:.1} TB", size)
}

/// Read back a size in the `human_readable_size` form, e.g. `"1.5 KB"` -> `1536`.
pub fn parse_human_size(text: &str) -> Option<u64> {
    let text = text.trim();
    let split = text.find(|c: char| !(c.is_ascii_digit() || c == '.'))?;
    let (number, unit) = text.split_at(split);
    let number: f64 = number.parse().ok()?;

    let exponent = match unit.trim().to_ascii_uppercase().as_str() {
        "B" => 0,
        "KB" => 1,
        "MB" => 2,
        "GB" => 3,
        "TB" => 4,
        _ => return None,
    };
    Some((number * 1024f64.powi(exponent)).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_entry_path() {
        assert_eq!(split_entry_path("usr/local/bin"), ("usr/local/", "bin"));
        assert_eq!(split_entry_path("b/c"), ("b/", "c"));
        assert_eq!(split_entry_path("b/"), ("", "b"));
        assert_eq!(split_entry_path("file"), ("", "file"));
        assert_eq!(split_entry_path("etc/ssl/"), ("etc/", "ssl"));
    }

    #[test]
    fn test_strip_root_prefix() {
        assert_eq!(strip_root_prefix("./etc/hosts"), "etc/hosts");
        assert_eq!(strip_root_prefix("/etc/hosts"), "etc/hosts");
        assert_eq!(strip_root_prefix(".//./usr/"), "usr/");
        assert_eq!(strip_root_prefix(".bashrc"), ".bashrc");
        assert_eq!(strip_root_prefix("./.wh..wh..opq"), ".wh..wh..opq");
        assert_eq!(strip_root_prefix("/"), "");
        assert_eq!(strip_root_prefix("./"), "");
        assert_eq!(strip_root_prefix("."), "");
    }

    #[test]
    fn test_parse_human_size() {
        assert_eq!(parse_human_size("1.0 KB"), Some(1024));
        assert_eq!(parse_human_size("1.5 KB"), Some(1536));
        assert_eq!(parse_human_size("10.0 B"), Some(10));
        assert_eq!(parse_human_size("3.0MB"), Some(3 * 1024 * 1024));
        assert_eq!(parse_human_size("2 gb"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_human_size("1.0 XB"), None);
        assert_eq!(parse_human_size("KB"), None);
        assert_eq!(parse_human_size("-1 KB"), None);
    }

    #[test]
    fn test_normalize_dir() {
        assert_eq!(normalize_dir(""), "");
        assert_eq!(normalize_dir("/"), "");
        assert_eq!(normalize_dir("usr"), "usr/");
        assert_eq!(normalize_dir("/usr/local/"), "usr/local/");
    }

    #[test]
    fn test_human_readable_size() {
        assert_eq!(human_readable_size(0), "0.0 B");
        assert_eq!(human_readable_size(1536), "1.5 KB");
        assert_eq!(human_readable_size(3 * 1024 * 1024), "3.0 MB");
        assert_eq!(human_readable_size(5 * 1024 * 1024 * 1024 * 1024), "5.0 TB");
    }
}
