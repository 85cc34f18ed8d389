use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::fs;

pub fn beside_executable<P: AsRef<Path>>(relative_path: P) -> anyhow::Result<PathBuf> {
    let exe_path = std::env::current_exe()?;
    Ok(exe_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Could not find binary directory"))?
        .join(relative_path))
}

/// JSON snapshots kept in one directory, written atomically.
pub struct AsyncStorageManager {
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    /// Uses `dir` as-is, creating it when needed.
    pub async fn new<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let base_dir = dir.as_ref().to_path_buf();
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir).await?;
        }
        Ok(Self { base_dir })
    }

    /// Opens `dir` for reading only if it is already there.
    pub fn existing<P: AsRef<Path>>(dir: P) -> Option<Self> {
        let base_dir = dir.as_ref().to_path_buf();
        base_dir.is_dir().then_some(Self { base_dir })
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", name))
    }

    /// Writes `<name>.json` through a `.tmp` sibling and a rename, so readers
    /// never observe a half-written snapshot.
    pub async fn save<T: Serialize>(&self, name: &str, data: &T) -> anyhow::Result<()> {
        let final_path = self.path_of(name);
        let tmp_path = self.base_dir.join(format!("{}.json.tmp", name));

        let json_bytes = serde_json::to_vec_pretty(data)?;
        fs::write(&tmp_path, json_bytes).await?;
        fs::rename(tmp_path, final_path).await?;
        Ok(())
    }

    pub async fn load<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let content = fs::read(self.path_of(name)).await?;
        Ok(serde_json::from_slice(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Snapshot {
        symbols: Vec<String>,
        total: f64,
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = std::env::temp_dir()
            .join(format!("portfolio-advisor-storage-{}", std::process::id()));
        let storage = AsyncStorageManager::new(&dir).await.unwrap();
        let snapshot = Snapshot {
            symbols: vec!["AAPL".into(), "MSFT".into()],
            total: 1234.5,
        };

        storage.save("results", &snapshot).await.unwrap();
        let loaded: Snapshot = storage.load("results").await.unwrap();

        assert_eq!(loaded, snapshot);
        assert!(!dir.join("results.json.tmp").exists());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn existing_never_creates_the_directory() {
        let dir = std::env::temp_dir()
            .join(format!("portfolio-advisor-absent-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        assert!(AsyncStorageManager::existing(&dir).is_none());
        assert!(!dir.exists());

        std::fs::create_dir_all(&dir).unwrap();
        let storage = AsyncStorageManager::existing(&dir).unwrap();
        assert_eq!(storage.path_of("results"), dir.join("results.json"));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn missing_snapshot_is_an_error() {
        let dir = std::env::temp_dir()
            .join(format!("portfolio-advisor-empty-{}", std::process::id()));
        let storage = AsyncStorageManager::new(&dir).await.unwrap();
        assert!(storage.load::<Snapshot>("absent").await.is_err());
        let _ = std::fs::remove_dir_all(dir);
    }
}
