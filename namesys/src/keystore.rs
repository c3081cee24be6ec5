//! Named signing keys besides the node identity.
use std::{
    collections::BTreeMap,
    fs,
    io::{ErrorKind, Write},
    path::PathBuf,
};

use anyhow::{bail, Context, Result};
use libp2p_identity::Keypair;
use parking_lot::Mutex;

pub trait Keystore: Send + Sync {
    /// Names of all stored keys, sorted.
    fn list(&self) -> Result<Vec<String>>;
    fn get(&self, name: &str) -> Result<Keypair>;
    /// Store a new key. Fails if `name` is taken.
    fn put(&self, name: &str, key: &Keypair) -> Result<()>;
}

pub fn validate_key_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("key name must not be empty");
    }
    if name.contains('/') {
        bail!("key name {name:?} must not contain '/'");
    }
    if name.starts_with('.') {
        bail!("key name {name:?} must not start with '.'");
    }
    Ok(())
}

#[derive(Default)]
pub struct MemoryKeystore {
    keys: Mutex<BTreeMap<String, Keypair>>,
}

impl MemoryKeystore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Keystore for MemoryKeystore {
    fn list(&self) -> Result<Vec<String>> {
        Ok(self.keys.lock().keys().cloned().collect())
    }

    fn get(&self, name: &str) -> Result<Keypair> {
        validate_key_name(name)?;
        self.keys
            .lock()
            .get(name)
            .cloned()
            .with_context(|| format!("no key named {name:?}"))
    }

    fn put(&self, name: &str, key: &Keypair) -> Result<()> {
        validate_key_name(name)?;
        let mut keys = self.keys.lock();
        if keys.contains_key(name) {
            bail!("key {name:?} already exists");
        }
        keys.insert(name.to_string(), key.clone());
        Ok(())
    }
}

/// One protobuf-encoded keypair file per key in a directory.
pub struct FsKeystore {
    dir: PathBuf,
}

impl FsKeystore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create keystore {}", dir.display()))?;
        Ok(Self { dir })
    }
}

impl Keystore for FsKeystore {
    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if validate_key_name(name).is_ok() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn get(&self, name: &str) -> Result<Keypair> {
        validate_key_name(name)?;
        let path = self.dir.join(name);
        let bytes =
            fs::read(&path).with_context(|| format!("failed to read key {}", path.display()))?;
        Keypair::from_protobuf_encoding(&bytes)
            .with_context(|| format!("key file {} is corrupt", path.display()))
    }

    fn put(&self, name: &str, key: &Keypair) -> Result<()> {
        validate_key_name(name)?;
        let bytes = key.to_protobuf_encoding()?;
        let path = self.dir.join(name);

        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                bail!("key {name:?} already exists")
            }
            Err(err) => return Err(err.into()),
        };
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(())
    }
}
