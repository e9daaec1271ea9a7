//! Archive planner (C6): groups PACK files into size-budgeted chunks with
//! deterministic names.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("file {path} ({size} bytes) exceeds the chunk budget ({budget} bytes) by itself")]
    OversizedFile {
        path: PathBuf,
        size: u64,
        budget: u64,
    },
}

/// One file destined for an archive chunk.
#[derive(Debug, Clone)]
pub struct PackFile {
    pub relative_path: PathBuf,
    pub size: u64,
}

/// One planned archive chunk.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub name: String,
    pub files: Vec<PathBuf>,
    pub total_size: u64,
}

#[derive(Debug, Default)]
pub struct ArchivePlan {
    pub chunks: Vec<Chunk>,
}

/// C6: plan chunks over `files` using next-fit bin packing against
/// `chunk_budget_bytes`, naming them `{mod_name}.{ext}`,
/// `{mod_name}0.{ext}`, `{mod_name}1.{ext}`, ...
///
/// Only the current (most recently opened) chunk is ever considered: a
/// file that would overflow it closes that chunk and opens a new one.
/// Earlier, already-closed chunks are never reconsidered.
///
/// A single file larger than the budget is placed alone in its own chunk
/// and logged as a warning rather than rejected.
pub fn plan_chunks(
    files: &[PackFile],
    chunk_budget_bytes: u64,
    mod_name: &str,
    archive_extension: &str,
) -> ArchivePlan {
    let mut ordered: Vec<&PackFile> = files.iter().collect();
    ordered.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    let mut bins: Vec<(u64, Vec<PathBuf>)> = Vec::new();

    for file in ordered {
        if file.size > chunk_budget_bytes {
            tracing::warn!(
                path = %file.relative_path.display(),
                size = file.size,
                budget = chunk_budget_bytes,
                "file exceeds chunk budget on its own; placing it in an oversized chunk"
            );
            bins.push((file.size, vec![file.relative_path.clone()]));
            continue;
        }

        let fits_current_chunk = bins
            .last()
            .is_some_and(|(used, _)| used + file.size <= chunk_budget_bytes);

        if fits_current_chunk {
            let (used, contents) = bins.last_mut().expect("checked above");
            *used += file.size;
            contents.push(file.relative_path.clone());
        } else {
            bins.push((file.size, vec![file.relative_path.clone()]));
        }
    }

    let chunks = bins
        .into_iter()
        .enumerate()
        .map(|(index, (total_size, files))| Chunk {
            name: chunk_name(mod_name, archive_extension, index),
            files,
            total_size,
        })
        .collect();

    ArchivePlan { chunks }
}

fn chunk_name(mod_name: &str, extension: &str, index: usize) -> String {
    if index == 0 {
        format!("{mod_name}.{extension}")
    } else {
        format!("{mod_name}{}.{extension}", index - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, size: u64) -> PackFile {
        PackFile {
            relative_path: PathBuf::from(path),
            size,
        }
    }

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn scenario_e_three_files_pack_into_two_chunks() {
        let files = vec![
            file("meshes/a.nif", (1.5 * GIB as f64) as u64),
            file("meshes/b.nif", (1.5 * GIB as f64) as u64),
            file("meshes/c.nif", (400.0 / 1024.0 * GIB as f64) as u64),
        ];
        let plan = plan_chunks(&files, 2 * GIB, "MyMod", "bsa");

        assert_eq!(plan.chunks.len(), 2);
        assert_eq!(plan.chunks[0].name, "MyMod.bsa");
        assert_eq!(plan.chunks[1].name, "MyMod0.bsa");
        assert_eq!(plan.chunks[0].files, vec![PathBuf::from("meshes/a.nif")]);
        assert_eq!(
            plan.chunks[1].files,
            vec![PathBuf::from("meshes/b.nif"), PathBuf::from("meshes/c.nif")]
        );
    }

    #[test]
    fn chunk_naming_is_sequential_and_deterministic() {
        let files: Vec<PackFile> = (0..5)
            .map(|i| file(&format!("textures/t{i}.dds"), GIB))
            .collect();
        let plan = plan_chunks(&files, GIB, "Armor", "ba2");

        let names: Vec<&str> = plan.chunks.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Armor.ba2", "Armor0.ba2", "Armor1.ba2", "Armor2.ba2", "Armor3.ba2"]);
    }

    #[test]
    fn chunk_budget_law_never_exceeded_when_files_fit() {
        let files = vec![file("a", GIB / 2), file("b", GIB / 2), file("c", GIB / 2)];
        let plan = plan_chunks(&files, GIB, "Mod", "bsa");
        for chunk in &plan.chunks {
            assert!(chunk.total_size <= GIB);
        }
    }

    #[test]
    fn oversized_file_gets_its_own_chunk_rather_than_failing() {
        let files = vec![file("huge.nif", 3 * GIB)];
        let plan = plan_chunks(&files, 2 * GIB, "Mod", "bsa");
        assert_eq!(plan.chunks.len(), 1);
        assert_eq!(plan.chunks[0].total_size, 3 * GIB);
    }

    #[test]
    fn all_files_are_assigned_to_exactly_one_chunk() {
        let files: Vec<PackFile> = (0..7).map(|i| file(&format!("f{i}"), GIB / 3)).collect();
        let plan = plan_chunks(&files, GIB, "Mod", "bsa");
        let total: usize = plan.chunks.iter().map(|c| c.files.len()).sum();
        assert_eq!(total, 7);
    }
}
