//! Filename slugification, grounded in `original_source`'s use of
//! `python-slugify` in `_get_download_file_path`.

/// Lowercases, collapses runs of non-alphanumeric characters to a single
/// hyphen, and strips leading/trailing hyphens.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_hyphen = false;
    for ch in input.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            out.push('-');
            last_was_hyphen = true;
        }
    }
    out.trim_matches('-').to_string()
}
