use runner_core::error::RunnerError;
use runner_core::platform::ArchiveFormat;
use std::fs::File;
use std::path::Path;
use walkdir::WalkDir;

/// One file or directory inside an extracted log tree, with its path
/// relative to the logs root so a viewer can resolve it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub relative_path: String,
    pub is_dir: bool,
}

/// Extract a downloaded archive into `dest`, dispatching on its suffix.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<(), RunnerError> {
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let format = ArchiveFormat::from_path(name).ok_or_else(|| {
        RunnerError::Transfer(format!("unsupported archive: {}", archive.display()))
    })?;

    std::fs::create_dir_all(dest)?;
    let file = File::open(archive)?;
    match format {
        ArchiveFormat::TarGz => {
            let decoder = flate2::read::GzDecoder::new(file);
            let mut tar = tar::Archive::new(decoder);
            tar.unpack(dest)?;
        }
        ArchiveFormat::Tar => {
            let mut tar = tar::Archive::new(file);
            tar.unpack(dest)?;
        }
        ArchiveFormat::Zip => {
            let mut zip = zip::ZipArchive::new(file)
                .map_err(|e| RunnerError::Transfer(format!("read zip: {}", e)))?;
            zip.extract(dest)
                .map_err(|e| RunnerError::Transfer(format!("extract zip: {}", e)))?;
        }
    }
    Ok(())
}

/// Recursively enumerate an extracted tree, root excluded, directories
/// before their contents, paths slash-separated relative to `root`.
pub fn list_tree(root: &Path) -> Result<Vec<TreeEntry>, RunnerError> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            RunnerError::Transfer(format!("walk '{}': {}", root.display(), e))
        })?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        entries.push(TreeEntry {
            relative_path: relative,
            is_dir: entry.file_type().is_dir(),
        });
    }
    Ok(entries)
}
