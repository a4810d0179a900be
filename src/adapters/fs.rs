use super::memory::verified_decode;
use crate::domain::{ChainNode, ContentAddress};
use crate::error::{FlowError, FlowResult};
use crate::ports::objects::ObjectStore;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Object store on the local filesystem: `<root>/<ab>/<cdef...>`.
#[derive(Clone, Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub async fn open(root: impl AsRef<Path>) -> FlowResult<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| unavailable(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, address: &ContentAddress) -> PathBuf {
        let hex = address.to_hex();
        self.root.join(&hex[0..2]).join(&hex[2..])
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, node: &ChainNode) -> FlowResult<ContentAddress> {
        let encoded = node.encode()?;
        let address = ContentAddress::of(&encoded);
        let path = self.object_path(&address);

        // Same address, same bytes: nothing to do.
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(address);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| unavailable(parent, e))?;
        }

        // Write aside then rename so readers never see a partial object.
        let temp_path = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&temp_path, &encoded)
            .await
            .map_err(|e| unavailable(&temp_path, e))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|e| unavailable(&path, e))?;

        debug!("Stored object {} ({} bytes)", address, encoded.len());
        Ok(address)
    }

    async fn get(&self, address: &ContentAddress) -> FlowResult<Option<ChainNode>> {
        let path = self.object_path(address);
        match tokio::fs::read(&path).await {
            Ok(encoded) => Ok(Some(verified_decode(address, &encoded)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(unavailable(&path, e)),
        }
    }
}

fn unavailable(path: &Path, err: std::io::Error) -> FlowError {
    FlowError::ResourceUnavailable(format!("{}: {}", path.display(), err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chain::{compress, ChainLink, LinkName};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_fs_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::open(dir.path().join("objects")).await.unwrap();

        let first = ChainNode::new(compress(b"block one").unwrap(), None);
        let first_address = store.put(&first).await.unwrap();

        let second = ChainNode::new(
            compress(b"block two").unwrap(),
            Some(ChainLink {
                target: first_address,
                name: LinkName {
                    total: 2,
                    previous: 1,
                },
                size: first.data.len() as u64,
            }),
        );
        let second_address = store.put(&second).await.unwrap();

        let hex = second_address.to_hex();
        assert!(store.root().join(&hex[0..2]).join(&hex[2..]).exists());

        let fetched = store.get(&second_address).await.unwrap().unwrap();
        assert_eq!(fetched, second);
        assert_eq!(fetched.link().unwrap().unwrap().target, first_address);
    }

    #[tokio::test]
    async fn test_fs_store_missing_object() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).await.unwrap();
        let missing = ContentAddress::of(b"missing");
        assert!(store.get(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fs_store_detects_corruption() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::open(dir.path()).await.unwrap();
        let node = ChainNode::new(compress(b"payload").unwrap(), None);
        let address = store.put(&node).await.unwrap();

        let hex = address.to_hex();
        let path = dir.path().join(&hex[0..2]).join(&hex[2..]);
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        assert!(store.get(&address).await.unwrap_err().is_integrity());
    }
}
