use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::fs;

use crate::catalog::{is_http_url, CatalogSource};

pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl CatalogSource for DirectorySource {
    async fn fetch(&self, location: &str) -> Result<Option<Vec<u8>>> {
        if is_http_url(location) {
            return Err(anyhow!(
                "pack {location} is a URL but the catalog is a local directory"
            ));
        }
        let path = self.root.join(location);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}
