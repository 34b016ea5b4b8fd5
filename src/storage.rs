use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub source_dir: PathBuf,
    pub duckdb_path: PathBuf,
}

impl StoragePaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir: PathBuf = data_dir.into();
        Self {
            source_dir: data_dir.join("source"),
            duckdb_path: data_dir.join("kompas.duckdb"),
        }
    }

    /// Extracted gazetteer (`nazwa;rodzaj;gmina;powiat;wojewodztwo`).
    pub fn gazetteer_csv(&self) -> PathBuf {
        self.source_dir.join("gazetteer.csv")
    }

    pub fn gazetteer_zip(&self) -> PathBuf {
        self.source_dir.join("gazetteer.zip")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.source_dir)
    }
}

pub fn file_present_nonempty(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(m) => m.is_file() && m.len() > 0,
        Err(_) => false,
    }
}
