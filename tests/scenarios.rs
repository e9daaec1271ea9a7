//! End-to-end scenario coverage for the classify/package pipeline.

use std::fs;
use std::sync::atomic::AtomicBool;

use bsaforge::progress::NullProgressSink;
use bsaforge::{run_job, GameVariant, JobConfig};

fn touch(path: &std::path::Path, contents: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn base_config(
    reference: &std::path::Path,
    generated: &std::path::Path,
    output: &std::path::Path,
) -> JobConfig {
    JobConfig::new(
        reference.to_path_buf(),
        generated.to_path_buf(),
        output.to_path_buf(),
        GameVariant::SkyrimSe,
        "ScenarioMod".to_string(),
    )
}

#[test]
fn scenario_a_identical_file_is_skipped() {
    let reference = tempfile::tempdir().unwrap();
    touch(&reference.path().join("Meshes/a.nif"), b"SAME");

    let generated = tempfile::tempdir().unwrap();
    touch(&generated.path().join("meshes/a.nif"), b"SAME");

    let out_dir = tempfile::tempdir().unwrap();
    let output = out_dir.path().join("pkg.zip");
    let config = base_config(reference.path(), generated.path(), &output);

    let cancel = AtomicBool::new(false);
    let report = run_job(&config, &cancel, &NullProgressSink).unwrap();

    assert_eq!(report.counts.skip, 1);
    assert_eq!(report.counts.pack, 0);
    assert_eq!(report.counts.loose, 0);
    assert_eq!(report.counts.fail, 0);
}

#[test]
fn scenario_b_override_with_case_difference_goes_loose() {
    let reference = tempfile::tempdir().unwrap();
    touch(&reference.path().join("Meshes/Armor/Boots.nif"), b"ORIGINAL");

    let generated = tempfile::tempdir().unwrap();
    touch(&generated.path().join("MESHES/ARMOR/BOOTS.NIF"), b"PATCHED");

    let out_dir = tempfile::tempdir().unwrap();
    let output = out_dir.path().join("pkg.zip");
    let config = base_config(reference.path(), generated.path(), &output);

    let cancel = AtomicBool::new(false);
    let report = run_job(&config, &cancel, &NullProgressSink).unwrap();

    assert_eq!(report.counts.loose, 1);
    assert_eq!(report.counts.pack, 0);
    assert_eq!(report.counts.skip, 0);
}

#[test]
fn scenario_c_new_file_in_existing_directory_is_packed() {
    let reference = tempfile::tempdir().unwrap();
    touch(&reference.path().join("Meshes/a.nif"), b"X");

    let generated = tempfile::tempdir().unwrap();
    touch(&generated.path().join("meshes/a.nif"), b"X");
    touch(&generated.path().join("meshes/new_one.nif"), b"NEW");

    let out_dir = tempfile::tempdir().unwrap();
    let output = out_dir.path().join("pkg.zip");
    let config = base_config(reference.path(), generated.path(), &output);

    let cancel = AtomicBool::new(false);
    let report = run_job(&config, &cancel, &NullProgressSink).unwrap();

    assert_eq!(report.counts.pack, 1);
    assert_eq!(report.chunks.len(), 1);
}

#[test]
fn scenario_d_new_top_level_directory_is_packed_via_case_c() {
    let reference = tempfile::tempdir().unwrap();
    touch(&reference.path().join("Meshes/a.nif"), b"X");

    let generated = tempfile::tempdir().unwrap();
    touch(&generated.path().join("meshes/a.nif"), b"X");
    // A mod-organizer-style top-level directory with no reference counterpart.
    touch(&generated.path().join("MyModPayload/extra.nif"), b"EXTRA");

    let out_dir = tempfile::tempdir().unwrap();
    let output = out_dir.path().join("pkg.zip");
    let config = base_config(reference.path(), generated.path(), &output);

    let cancel = AtomicBool::new(false);
    let report = run_job(&config, &cancel, &NullProgressSink).unwrap();

    assert_eq!(report.counts.pack, 1);
    let packed = report
        .outcomes
        .iter()
        .find(|o| o.generated_relative.ends_with("extra.nif"))
        .unwrap();
    assert_eq!(
        packed.canonical_path.as_deref(),
        Some(std::path::Path::new("meshes/custom/extra.nif"))
    );
}

#[test]
fn scenario_e_three_files_chunk_into_two_archives() {
    let reference = tempfile::tempdir().unwrap();
    touch(&reference.path().join("Meshes/placeholder.nif"), b"R");

    let generated = tempfile::tempdir().unwrap();
    const GIB: usize = 1024 * 1024 * 1024;
    touch(&generated.path().join("meshes/a.nif"), &vec![1u8; (1.5 * GIB as f64) as usize]);
    touch(&generated.path().join("meshes/b.nif"), &vec![2u8; (1.5 * GIB as f64) as usize]);
    touch(
        &generated.path().join("meshes/c.nif"),
        &vec![3u8; (0.4 * GIB as f64) as usize],
    );

    let out_dir = tempfile::tempdir().unwrap();
    let output = out_dir.path().join("pkg.zip");
    let mut config = base_config(reference.path(), generated.path(), &output);
    config.chunk_budget_bytes = 2 * GIB as u64;

    let cancel = AtomicBool::new(false);
    let report = run_job(&config, &cancel, &NullProgressSink).unwrap();

    assert_eq!(report.counts.pack, 3);
    assert_eq!(report.chunks.len(), 2);
    assert_eq!(report.chunks[0].name, "ScenarioMod.bsa");
    assert_eq!(report.chunks[1].name, "ScenarioMod0.bsa");
    assert_eq!(report.chunks[0].file_count, 1);
    assert_eq!(report.chunks[1].file_count, 2);
}

#[test]
fn scenario_f_colliding_canonical_paths_fail_the_second_file_only() {
    // Two generated-relative paths that normalize to the same output path
    // (Case A folds casing, so these collide after normalization) must
    // leave exactly one FAIL and not abort the rest of the job.
    let reference = tempfile::tempdir().unwrap();
    touch(&reference.path().join("Meshes/placeholder.nif"), b"R");

    let generated = tempfile::tempdir().unwrap();
    touch(&generated.path().join("meshes/dup.nif"), b"A");
    touch(&generated.path().join("MESHES/DUP.NIF"), b"B");
    touch(&generated.path().join("meshes/unique.nif"), b"C");

    let out_dir = tempfile::tempdir().unwrap();
    let output = out_dir.path().join("pkg.zip");
    let config = base_config(reference.path(), generated.path(), &output);

    let cancel = AtomicBool::new(false);
    let report = run_job(&config, &cancel, &NullProgressSink).unwrap();

    assert_eq!(report.counts.fail, 1);
    assert_eq!(report.counts.pack, 2);
}

#[test]
fn keep_scratch_retains_the_workspace_on_disk() {
    let reference = tempfile::tempdir().unwrap();
    touch(&reference.path().join("Meshes/a.nif"), b"X");

    let generated = tempfile::tempdir().unwrap();
    touch(&generated.path().join("meshes/a.nif"), b"X");

    let out_dir = tempfile::tempdir().unwrap();
    let output = out_dir.path().join("pkg.zip");
    let mut config = base_config(reference.path(), generated.path(), &output);
    config.keep_scratch = true;

    let cancel = AtomicBool::new(false);
    let report = run_job(&config, &cancel, &NullProgressSink).unwrap();

    let kept = report.scratch_kept_at.expect("scratch should be retained");
    assert!(kept.exists());
    fs::remove_dir_all(kept).ok();
}
