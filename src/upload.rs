use anyhow::{Context, Result};
use log::{info, warn};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// A file received from the UI
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Name as supplied by the client
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        UploadedFile {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Write each upload to `dir` under its own name and return the paths in order.
///
/// Existing files with the same name are overwritten. Names are used as given.
pub fn save_uploaded_files<P: AsRef<Path>>(files: &[UploadedFile], dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut saved_paths = Vec::with_capacity(files.len());

    for file in files {
        if has_path_components(&file.name) {
            warn!("Upload name contains path components: {}", file.name);
        }

        let path = dir.join(&file.name);
        fs::write(&path, &file.bytes)
            .with_context(|| format!("Failed to save upload {}", path.display()))?;
        info!("Saved upload {} ({} bytes)", path.display(), file.bytes.len());

        saved_paths.push(path);
    }

    Ok(saved_paths)
}

fn has_path_components(name: &str) -> bool {
    let mut components = Path::new(name).components();
    !matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saves_in_order_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.pdf"), b"old").unwrap();

        let files = vec![
            UploadedFile::new("b.pdf", b"second".to_vec()),
            UploadedFile::new("a.pdf", b"first".to_vec()),
        ];
        let paths = save_uploaded_files(&files, dir.path()).unwrap();

        assert_eq!(paths, vec![dir.path().join("b.pdf"), dir.path().join("a.pdf")]);
        assert_eq!(fs::read(dir.path().join("a.pdf")).unwrap(), b"first");
        assert_eq!(fs::read(dir.path().join("b.pdf")).unwrap(), b"second");
    }

    #[test]
    fn test_no_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(save_uploaded_files(&[], dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_has_path_components() {
        assert!(!has_path_components("report.pdf"));
        assert!(has_path_components("../report.pdf"));
        assert!(has_path_components("nested/report.pdf"));
        assert!(has_path_components("/etc/report.pdf"));
    }
}
