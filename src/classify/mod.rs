//! The classifier (C5): decides PACK / LOOSE / SKIP / FAIL for every file
//! in the generated tree, and computes its canonical output path.

use crate::digest::{digest_file, files_equal};
use crate::index::{path_segments, PathIndex};
use crate::oracle::GameDirectorySet;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("failed to walk generated tree {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build a {threads}-thread worker pool: {source}")]
    WorkerPool {
        threads: usize,
        #[source]
        source: rayon::ThreadPoolBuildError,
    },
}

/// Verdict for a single generated file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pack,
    Loose,
    Skip,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    HashFailure,
    CopyFailure,
    LooseEmissionFailure,
    Collision,
}

#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub path: PathBuf,
    pub kind: FailureKind,
    pub message: String,
}

/// The outcome of classifying one generated-relative path.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub generated_relative: PathBuf,
    pub verdict: Verdict,
    /// Canonical output path, present for PACK and the logical LOOSE case
    /// (even when emission failed — see `failure`).
    pub canonical_path: Option<PathBuf>,
    pub size: u64,
    pub failure: Option<FailureRecord>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Counts {
    pub pack: usize,
    pub loose: usize,
    pub skip: usize,
    pub fail: usize,
}

#[derive(Debug, Default)]
pub struct ClassifyReport {
    pub outcomes: Vec<Outcome>,
    pub counts: Counts,
}

/// Extension -> inferred top-level directory, for Case C normalization.
fn infer_directory_from_extension(filename: &str) -> Option<&'static str> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())?;

    Some(match ext.as_str() {
        "nif" | "tri" | "hkx" | "obj" | "bto" | "btr" => "meshes",
        "dds" | "tga" | "png" | "bmp" | "jpg" | "jpeg" | "tiff" => "textures",
        "wav" | "xwm" | "fuz" | "ogg" | "mp3" | "flac" => "sounds",
        "pex" => "scripts",
        "psc" => return None, // handled specially below (scripts/source)
        "swf" | "gfx" => "interface",
        _ => return None,
    })
}

/// Compute `p*` from `p` per the normalization rules (Case A/B/C).
pub fn normalize_path(relative: &[String], dir_set: &GameDirectorySet) -> PathBuf {
    if relative.is_empty() {
        return PathBuf::new();
    }

    let first_lower = relative[0].to_ascii_lowercase();
    if dir_set.contains(&first_lower) {
        return case_a(relative, dir_set);
    }

    if let Some(data_index) = relative.iter().position(|s| s.eq_ignore_ascii_case("data")) {
        let rest = &relative[data_index + 1..];
        if !rest.is_empty() {
            return normalize_path(rest, dir_set);
        }
    }

    case_c(relative)
}

fn case_a(relative: &[String], dir_set: &GameDirectorySet) -> PathBuf {
    let first_lower = relative[0].to_ascii_lowercase();
    let actual_first = dir_set.actual_casing(&first_lower);
    let mut out = PathBuf::from(actual_first);
    for seg in &relative[1..] {
        out.push(seg);
    }
    out
}

fn case_c(relative: &[String]) -> PathBuf {
    let filename = relative.last().cloned().unwrap_or_default();
    let lower_filename = filename.to_ascii_lowercase();

    if lower_filename.ends_with(".psc") {
        let mut out = PathBuf::from("scripts");
        out.push("source");
        out.push(&filename);
        return out;
    }

    if let Some(inferred) = infer_directory_from_extension(&filename) {
        let mut out = PathBuf::from(inferred);
        out.push("custom");
        out.push(&filename);
        return out;
    }

    // No structure can be inferred: leave the path unchanged.
    let mut out = PathBuf::new();
    for seg in relative {
        out.push(seg);
    }
    out
}

/// C5: classify every file under `generated_root`, using a dedicated
/// `threads`-sized worker pool per spec.md §6's `threads` configuration
/// key rather than rayon's process-global default pool (which a caller
/// running multiple jobs, or a test suite, cannot safely reconfigure per
/// call).
///
/// `cancel`, if set, causes in-flight workers to finish their current file
/// and stop picking up new ones.
pub fn classify_all(
    generated_root: &Path,
    index: &PathIndex,
    dir_set: &GameDirectorySet,
    pack_root: &Path,
    loose_root: &Path,
    threads: usize,
    cancel: &AtomicBool,
) -> Result<ClassifyReport, ClassifyError> {
    let files = collect_files(generated_root)?;
    let claimed: Mutex<HashSet<PathBuf>> = Mutex::new(HashSet::new());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|source| ClassifyError::WorkerPool { threads, source })?;

    let outcomes: Vec<Outcome> = pool.install(|| {
        files
            .par_iter()
            .map(|relative| {
                if cancel.load(Ordering::Relaxed) {
                    return Outcome {
                        generated_relative: relative.clone(),
                        verdict: Verdict::Fail,
                        canonical_path: None,
                        size: 0,
                        failure: Some(FailureRecord {
                            path: relative.clone(),
                            kind: FailureKind::Collision, // reused as a generic "not processed" tag
                            message: "cancelled before processing".to_string(),
                        }),
                    };
                }
                classify_one(generated_root, relative, index, dir_set, pack_root, loose_root, &claimed)
            })
            .collect()
    });

    let mut counts = Counts::default();
    for outcome in &outcomes {
        match outcome.verdict {
            Verdict::Pack => counts.pack += 1,
            Verdict::Loose => counts.loose += 1,
            Verdict::Skip => counts.skip += 1,
            Verdict::Fail => counts.fail += 1,
        }
    }

    Ok(ClassifyReport { outcomes, counts })
}

fn collect_files(generated_root: &Path) -> Result<Vec<PathBuf>, ClassifyError> {
    let mut out = Vec::new();
    for entry in WalkDir::new(generated_root) {
        let entry = entry.map_err(|e| ClassifyError::Walk {
            path: generated_root.to_path_buf(),
            source: e.into_io_error().unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::Other, "walk failure")
            }),
        })?;
        if entry.file_type().is_file() {
            if let Ok(relative) = entry.path().strip_prefix(generated_root) {
                out.push(relative.to_path_buf());
            }
        }
    }
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn classify_one(
    generated_root: &Path,
    relative: &Path,
    index: &PathIndex,
    dir_set: &GameDirectorySet,
    pack_root: &Path,
    loose_root: &Path,
    claimed: &Mutex<HashSet<PathBuf>>,
) -> Outcome {
    let source = generated_root.join(relative);
    let size = std::fs::metadata(&source).map(|m| m.len()).unwrap_or(0);
    let segments = path_segments(relative);
    let canonical = normalize_path(&segments, dir_set);

    if !claim_path(claimed, &canonical) {
        return Outcome {
            generated_relative: relative.to_path_buf(),
            verdict: Verdict::Fail,
            canonical_path: Some(canonical),
            size,
            failure: Some(FailureRecord {
                path: relative.to_path_buf(),
                kind: FailureKind::Collision,
                message: "two generated paths normalized to the same output path".to_string(),
            }),
        };
    }

    match index.lookup(&segments) {
        None => {
            let dest = pack_root.join(&canonical);
            match copy_into(&source, &dest) {
                Ok(()) => Outcome {
                    generated_relative: relative.to_path_buf(),
                    verdict: Verdict::Pack,
                    canonical_path: Some(canonical),
                    size,
                    failure: None,
                },
                Err(message) => Outcome {
                    generated_relative: relative.to_path_buf(),
                    verdict: Verdict::Fail,
                    canonical_path: Some(canonical),
                    size,
                    failure: Some(FailureRecord {
                        path: relative.to_path_buf(),
                        kind: FailureKind::CopyFailure,
                        message,
                    }),
                },
            }
        }
        Some(reference_path) => match files_equal(&source, &reference_path) {
            Ok(true) => Outcome {
                generated_relative: relative.to_path_buf(),
                verdict: Verdict::Skip,
                canonical_path: None,
                size,
                failure: None,
            },
            Ok(false) => {
                let dest = loose_root.join(&canonical);
                match copy_into(&source, &dest) {
                    Ok(()) => Outcome {
                        generated_relative: relative.to_path_buf(),
                        verdict: Verdict::Loose,
                        canonical_path: Some(canonical),
                        size,
                        failure: None,
                    },
                    Err(message) => Outcome {
                        generated_relative: relative.to_path_buf(),
                        // The override decision stands even though emission failed.
                        verdict: Verdict::Loose,
                        canonical_path: Some(canonical),
                        size,
                        failure: Some(FailureRecord {
                            path: relative.to_path_buf(),
                            kind: FailureKind::LooseEmissionFailure,
                            message,
                        }),
                    },
                }
            }
            Err(err) => Outcome {
                generated_relative: relative.to_path_buf(),
                verdict: Verdict::Fail,
                canonical_path: Some(canonical),
                size,
                failure: Some(FailureRecord {
                    path: relative.to_path_buf(),
                    kind: FailureKind::HashFailure,
                    message: err.to_string(),
                }),
            },
        },
    }
}

fn claim_path(claimed: &Mutex<HashSet<PathBuf>>, canonical: &Path) -> bool {
    let mut guard = claimed.lock().expect("collision set poisoned");
    guard.insert(canonical.to_path_buf())
}

fn copy_into(source: &Path, dest: &Path) -> Result<(), String> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    std::fs::copy(source, dest).map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{enumerate, GameVariant};
    use std::fs;

    fn seg(s: &str) -> Vec<String> {
        s.split('/').map(str::to_string).collect()
    }

    #[test]
    fn case_a_normalizes_top_level_casing_only() {
        let dir_set = enumerate(GameVariant::SkyrimSe, None);
        let p = normalize_path(&seg("MESHES/Armor/Custom.NIF"), &dir_set);
        assert_eq!(p, PathBuf::from("meshes/Armor/Custom.NIF"));
    }

    #[test]
    fn case_b_strips_embedded_data_prefix() {
        let dir_set = enumerate(GameVariant::SkyrimSe, None);
        let p = normalize_path(&seg("MyModData/Data/meshes/thing.nif"), &dir_set);
        assert_eq!(p, PathBuf::from("meshes/thing.nif"));
    }

    #[test]
    fn case_c_infers_directory_from_extension() {
        let dir_set = enumerate(GameVariant::SkyrimSe, None);
        let p = normalize_path(&seg("RandomStuff/body.nif"), &dir_set);
        assert_eq!(p, PathBuf::from("meshes/custom/body.nif"));
    }

    #[test]
    fn case_c_leaves_unrecognized_extension_unchanged() {
        let dir_set = enumerate(GameVariant::SkyrimSe, None);
        let p = normalize_path(&seg("MyModData/config.json"), &dir_set);
        assert_eq!(p, PathBuf::from("MyModData/config.json"));
    }

    #[test]
    fn normalization_is_deterministic() {
        let dir_set = enumerate(GameVariant::SkyrimSe, None);
        let a = normalize_path(&seg("meshes/x.nif"), &dir_set);
        let b = normalize_path(&seg("meshes/x.nif"), &dir_set);
        assert_eq!(a, b);
    }

    #[test]
    fn scenario_a_identical_file_is_skipped() {
        let reference = tempfile::tempdir().unwrap();
        fs::create_dir_all(reference.path().join("Meshes")).unwrap();
        fs::write(reference.path().join("Meshes/a.nif"), b"X").unwrap();

        let generated = tempfile::tempdir().unwrap();
        fs::create_dir_all(generated.path().join("meshes")).unwrap();
        fs::write(generated.path().join("meshes/a.nif"), b"X").unwrap();

        let index = PathIndex::build(reference.path()).unwrap();
        let dir_set = enumerate(GameVariant::SkyrimSe, Some(reference.path()));
        let pack_root = tempfile::tempdir().unwrap();
        let loose_root = tempfile::tempdir().unwrap();
        let cancel = AtomicBool::new(false);

        let report = classify_all(
            generated.path(),
            &index,
            &dir_set,
            pack_root.path(),
            loose_root.path(),
            4,
            &cancel,
        )
        .unwrap();

        assert_eq!(report.counts.skip, 1);
        assert_eq!(report.counts.pack, 0);
        assert_eq!(report.counts.loose, 0);
        assert_eq!(report.counts.fail, 0);
    }

    #[test]
    fn scenario_b_override_writes_loose_with_reference_casing() {
        let reference = tempfile::tempdir().unwrap();
        fs::create_dir_all(reference.path().join("Meshes")).unwrap();
        fs::write(reference.path().join("Meshes/a.nif"), b"X").unwrap();

        let generated = tempfile::tempdir().unwrap();
        fs::create_dir_all(generated.path().join("MESHES")).unwrap();
        fs::write(generated.path().join("MESHES/A.NIF"), b"Y").unwrap();

        let index = PathIndex::build(reference.path()).unwrap();
        let dir_set = enumerate(GameVariant::SkyrimSe, Some(reference.path()));
        let pack_root = tempfile::tempdir().unwrap();
        let loose_root = tempfile::tempdir().unwrap();
        let cancel = AtomicBool::new(false);

        let report = classify_all(
            generated.path(),
            &index,
            &dir_set,
            pack_root.path(),
            loose_root.path(),
            4,
            &cancel,
        )
        .unwrap();

        assert_eq!(report.counts.loose, 1);
        let written = loose_root.path().join("Meshes/A.NIF");
        assert!(written.exists());
        assert_eq!(fs::read(written).unwrap(), b"Y");
    }

    #[test]
    fn scenario_c_new_file_in_existing_directory_is_packed() {
        let reference = tempfile::tempdir().unwrap();
        fs::create_dir_all(reference.path().join("Meshes")).unwrap();
        fs::write(reference.path().join("Meshes/a.nif"), b"X").unwrap();

        let generated = tempfile::tempdir().unwrap();
        fs::create_dir_all(generated.path().join("meshes")).unwrap();
        fs::write(generated.path().join("meshes/b.nif"), b"Z").unwrap();

        let index = PathIndex::build(reference.path()).unwrap();
        let dir_set = enumerate(GameVariant::SkyrimSe, Some(reference.path()));
        let pack_root = tempfile::tempdir().unwrap();
        let loose_root = tempfile::tempdir().unwrap();
        let cancel = AtomicBool::new(false);

        let report = classify_all(
            generated.path(),
            &index,
            &dir_set,
            pack_root.path(),
            loose_root.path(),
            4,
            &cancel,
        )
        .unwrap();

        assert_eq!(report.counts.pack, 1);
        assert!(pack_root.path().join("Meshes/b.nif").exists());
    }

    #[test]
    fn partition_law_counts_sum_to_file_total() {
        let reference = tempfile::tempdir().unwrap();
        fs::create_dir_all(reference.path().join("Meshes")).unwrap();
        fs::write(reference.path().join("Meshes/a.nif"), b"X").unwrap();

        let generated = tempfile::tempdir().unwrap();
        fs::create_dir_all(generated.path().join("meshes")).unwrap();
        fs::write(generated.path().join("meshes/a.nif"), b"X").unwrap(); // skip
        fs::write(generated.path().join("meshes/b.nif"), b"Z").unwrap(); // pack
        fs::create_dir_all(generated.path().join("MyModData")).unwrap();
        fs::write(generated.path().join("MyModData/config.json"), b"{}").unwrap(); // pack

        let index = PathIndex::build(reference.path()).unwrap();
        let dir_set = enumerate(GameVariant::SkyrimSe, Some(reference.path()));
        let pack_root = tempfile::tempdir().unwrap();
        let loose_root = tempfile::tempdir().unwrap();
        let cancel = AtomicBool::new(false);

        let report = classify_all(
            generated.path(),
            &index,
            &dir_set,
            pack_root.path(),
            loose_root.path(),
            4,
            &cancel,
        )
        .unwrap();

        let total = report.counts.pack + report.counts.loose + report.counts.skip + report.counts.fail;
        assert_eq!(total, 3);
    }

    #[test]
    fn single_threaded_pool_produces_the_same_result_as_a_wide_pool() {
        let reference = tempfile::tempdir().unwrap();
        fs::create_dir_all(reference.path().join("Meshes")).unwrap();
        fs::write(reference.path().join("Meshes/a.nif"), b"X").unwrap();

        let generated = tempfile::tempdir().unwrap();
        fs::create_dir_all(generated.path().join("meshes")).unwrap();
        fs::write(generated.path().join("meshes/a.nif"), b"X").unwrap();
        fs::write(generated.path().join("meshes/b.nif"), b"Z").unwrap();

        let index = PathIndex::build(reference.path()).unwrap();
        let dir_set = enumerate(GameVariant::SkyrimSe, Some(reference.path()));
        let pack_root = tempfile::tempdir().unwrap();
        let loose_root = tempfile::tempdir().unwrap();
        let cancel = AtomicBool::new(false);

        let report = classify_all(
            generated.path(),
            &index,
            &dir_set,
            pack_root.path(),
            loose_root.path(),
            1,
            &cancel,
        )
        .unwrap();

        assert_eq!(report.counts.skip, 1);
        assert_eq!(report.counts.pack, 1);
    }

    #[test]
    fn scenario_f_hash_failure_fails_only_the_affected_file() {
        let reference = tempfile::tempdir().unwrap();
        fs::create_dir_all(reference.path().join("Meshes")).unwrap();
        fs::write(reference.path().join("Meshes/a.nif"), b"X").unwrap();
        fs::write(reference.path().join("Meshes/b.nif"), b"Y").unwrap();

        let generated = tempfile::tempdir().unwrap();
        fs::create_dir_all(generated.path().join("meshes")).unwrap();
        fs::write(generated.path().join("meshes/a.nif"), b"X").unwrap();
        fs::write(generated.path().join("meshes/b.nif"), b"changed").unwrap();

        let index = PathIndex::build(reference.path()).unwrap();
        // Simulate the reference copy becoming unreadable between indexing
        // and classification by removing it from disk.
        fs::remove_file(reference.path().join("Meshes/b.nif")).unwrap();

        let dir_set = enumerate(GameVariant::SkyrimSe, Some(reference.path()));
        let pack_root = tempfile::tempdir().unwrap();
        let loose_root = tempfile::tempdir().unwrap();
        let cancel = AtomicBool::new(false);

        let report = classify_all(
            generated.path(),
            &index,
            &dir_set,
            pack_root.path(),
            loose_root.path(),
            4,
            &cancel,
        )
        .unwrap();

        assert_eq!(report.counts.skip, 1);
        assert_eq!(report.counts.fail, 1);
        let failed = report
            .outcomes
            .iter()
            .find(|o| o.generated_relative.ends_with("b.nif"))
            .unwrap();
        assert_eq!(failed.verdict, Verdict::Fail);
        assert_eq!(failed.failure.as_ref().unwrap().kind, FailureKind::HashFailure);
    }
}
