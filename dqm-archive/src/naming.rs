//! File-naming rules for `Archiver::open`.

use std::path::{Path, PathBuf};

/// Builds the final on-disk name for `open(name, overwrite, run_number)`:
/// a run number is inserted as `_I<n>` before the extension, then, unless
/// `overwrite` is set, the smallest `_<n>` suffix that avoids an existing
/// file is appended.
pub fn resolve(name: &str, run_number: Option<i64>, overwrite: bool) -> PathBuf {
    let path = Path::new(name);
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut stem = stem;
    if let Some(run) = run_number {
        if run >= 0 {
            stem = format!("{stem}_I{run}");
        }
    }

    let build = |stem: &str| -> PathBuf {
        let file_name = match &ext {
            Some(e) => format!("{stem}.{e}"),
            None => stem.to_string(),
        };
        match dir {
            Some(d) => d.join(file_name),
            None => PathBuf::from(file_name),
        }
    };

    let mut candidate = build(&stem);
    if !overwrite {
        let mut n = 1u64;
        while candidate.exists() {
            candidate = build(&format!("{stem}_{n}"));
            n += 1;
        }
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn run_number_is_inserted_before_extension() {
        let resolved = resolve("run.root", Some(7), true);
        assert_eq!(resolved, PathBuf::from("run_I7.root"));
    }

    #[test]
    fn negative_run_number_is_not_inserted() {
        let resolved = resolve("run.root", Some(-1), true);
        assert_eq!(resolved, PathBuf::from("run.root"));
    }

    #[test]
    fn overwrite_false_appends_smallest_unique_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("a.root");
        File::create(&existing).unwrap();

        let resolved = resolve(existing.to_str().unwrap(), None, false);
        assert_eq!(resolved, dir.path().join("a_1.root"));
    }

    #[test]
    fn overwrite_true_reuses_existing_name() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("a.root");
        File::create(&existing).unwrap();

        let resolved = resolve(existing.to_str().unwrap(), None, true);
        assert_eq!(resolved, existing);
    }

    #[test]
    fn uniqueness_suffix_skips_over_multiple_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("a.root")).unwrap();
        File::create(dir.path().join("a_1.root")).unwrap();

        let resolved = resolve(dir.path().join("a.root").to_str().unwrap(), None, false);
        assert_eq!(resolved, dir.path().join("a_2.root"));
    }
}
