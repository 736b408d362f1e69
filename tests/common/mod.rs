#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

/// Header row of the commercial pipeline sheet.
pub const PIPELINE_HEADER: &str = "Company,Date,Sector,Seniot,Junior team,Source,Source Name,Type,\"Size, RUB mn\",Status,Next connection,Comments";

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// A two-row pipeline upload; only the first row names a source contact.
    pub fn pipeline_csv(&self, name: &str) -> PathBuf {
        let contents = format!(
            "{PIPELINE_HEADER}\n\
             Acme,2024-03-01,Retail,Ivan,Olga,Referral,Jane Roe,Equity,\"1,500\",New,2024-04-01,warm\n\
             Globex,2024-03-02,Energy,Petr,Anna,Conference,,Debt,700,Active,,\n"
        );
        self.write(name, &contents)
    }
}
