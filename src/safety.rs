//! Guard against overwriting an input table with the merged output.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// File name fragment every merged output must carry
pub const OUTPUT_PATTERN: &str = "merged";

/// Resolve `path` to the file it names on disk.
///
/// An existing file is canonicalized directly. An output that does not exist
/// yet resolves through its parent directory, so `./data/x.csv`,
/// `data/x.csv` and `data/sub/../x.csv` all land on the same path.
pub fn resolve_path(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return path
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", path.display()));
    }

    let name = path
        .file_name()
        .with_context(|| format!("Output '{}' has no file name", path.display()))?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let parent = parent
        .canonicalize()
        .with_context(|| format!("Output directory {} does not exist", parent.display()))?;
    Ok(parent.join(name))
}

/// Validates that an output path is safe to overwrite.
///
/// The output file name must contain `required_pattern`, and the output must
/// not resolve to the same file as any source. Sources that do not exist
/// cannot be clobbered and are skipped.
pub fn validate_output_path(
    output: &Path,
    required_pattern: &str,
    source_paths: &[&Path],
) -> Result<()> {
    let output_name = output.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if !output_name.contains(required_pattern) {
        bail!(
            "Safety check failed: output file '{}' must contain '{}' in the name",
            output.display(),
            required_pattern
        );
    }

    let resolved = resolve_path(output)?;
    for source in source_paths.iter().filter(|s| s.exists()) {
        if resolve_path(source)? == resolved {
            bail!(
                "Safety check failed: output '{}' is the same file as source '{}'",
                output.display(),
                source.display()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "goodbooks-merge-safety-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("sub")).unwrap();
        dir
    }

    #[test]
    fn test_valid_output_next_to_sources() {
        let dir = scratch_dir("valid");
        let source = dir.join("books.csv");
        std::fs::write(&source, "book_id\n1\n").unwrap();
        let output = dir.join("merged_books.csv");
        assert!(validate_output_path(&output, OUTPUT_PATTERN, &[&source]).is_ok());
    }

    #[test]
    fn test_missing_pattern() {
        let dir = scratch_dir("pattern");
        let result = validate_output_path(&dir.join("output.csv"), OUTPUT_PATTERN, &[]);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("must contain 'merged'"));
    }

    #[test]
    fn test_output_equals_source() {
        let dir = scratch_dir("equal");
        let path = dir.join("merged_input.csv");
        std::fs::write(&path, "book_id\n1\n").unwrap();
        let result = validate_output_path(&path, OUTPUT_PATTERN, &[&path]);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("is the same file as source"));
    }

    #[test]
    fn test_differently_spelled_source_is_caught() {
        let dir = scratch_dir("spelling");
        let source = dir.join("merged_input.csv");
        std::fs::write(&source, "book_id\n1\n").unwrap();

        let dotted = dir.join(".").join("merged_input.csv");
        let via_parent = dir.join("sub").join("..").join("merged_input.csv");
        for output in [dotted, via_parent] {
            let result = validate_output_path(&output, OUTPUT_PATTERN, &[&source]);
            assert!(result.is_err(), "{} passed the check", output.display());
        }
    }

    #[test]
    fn test_resolve_path_for_new_file() {
        let dir = scratch_dir("resolve");
        let a = resolve_path(&dir.join(".").join("merged.csv")).unwrap();
        let b = resolve_path(&dir.join("sub").join("..").join("merged.csv")).unwrap();
        assert_eq!(a, b);
        assert!(resolve_path(&dir.join("nope").join("merged.csv")).is_err());
    }

    #[test]
    fn test_resolve_relative_paths_against_cwd() {
        let cwd = std::env::current_dir().unwrap().canonicalize().unwrap();
        let bare = resolve_path(Path::new("merged_not_written.csv")).unwrap();
        let dotted = resolve_path(Path::new("./merged_not_written.csv")).unwrap();
        assert_eq!(bare, cwd.join("merged_not_written.csv"));
        assert_eq!(bare, dotted);
    }
}
