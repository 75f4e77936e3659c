//! Where launchpad keeps its state on disk
//!
//! ```text
//! <base>/settings.json
//! <base>/records/<project>.json     record documents
//! <base>/records/<project>.progress append-only progress streams
//! <base>/templates/<type>/<framework>.yaml[.hbs]
//! <base>/work/                      rendered templates, SAM build output
//! ```

use std::path::PathBuf;

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

const DEFAULT_BASE: &str = ".launchpad";

#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    pub fn records_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("records"))
    }

    pub fn templates_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("templates"))
    }

    pub fn work_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("work"))
    }

    /// Create the writable directories. Templates are provided by the user.
    pub async fn setup(&self) -> Result<(), DeployError> {
        for dir in [self.records_dir(), self.work_dir()] {
            dir.create().await?;
        }
        Ok(())
    }
}

impl Default for StorageLayout {
    /// `~/.launchpad`, or `./.launchpad` when no home directory is set
    fn default() -> Self {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(home.join(DEFAULT_BASE))
    }
}
