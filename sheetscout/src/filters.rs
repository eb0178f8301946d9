/// File discovery filters.
///
/// Free functions decide which walked paths become scan targets. Extension checks are
/// case-insensitive everywhere, so `REPORT.XLSX` and `report.xlsx` are treated alike.
/// Legacy binary `.xls` workbooks are not recognized unless the extension list names
/// them explicitly.
use glob::Pattern;
use std::path::Path;

/// Prefix Office uses for the owner file it creates next to an open workbook
const LOCK_FILE_PREFIX: &str = "~$";

/// Checks if a file has one of the recognized (lowercase) extensions
pub fn has_recognized_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// Checks if a file is an Office owner/lock file such as `~$Budget.xlsx`
pub fn is_lock_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(LOCK_FILE_PREFIX))
}

/// Checks if a file should be ignored based on ignore patterns
pub fn should_ignore(path: &Path, ignore_patterns: &[Pattern]) -> bool {
    if ignore_patterns.is_empty() {
        return false;
    }
    let normalized_path = path.to_string_lossy().replace('\\', "/");
    ignore_patterns.iter().any(|p| p.matches(&normalized_path))
}

/// Determines if a walked file becomes a scan target
pub fn should_include_file(
    path: &Path,
    extensions: &[String],
    ignore_patterns: &[Pattern],
    skip_lock_files: bool,
) -> bool {
    has_recognized_extension(path, extensions)
        && !(skip_lock_files && is_lock_file(path))
        && !should_ignore(path, ignore_patterns)
}
