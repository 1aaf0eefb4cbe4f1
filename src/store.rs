use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use fs2::FileExt;

use crate::config::data_dir;
use crate::error::Error;
use crate::model::fetch_params::FetchParams;
use crate::model::work_item::WorkItem;
use crate::providers::{ItemStream, Provider};

/// On-disk document: provider name to its ordered item sequence.
pub type Collections = BTreeMap<String, Vec<WorkItem>>;

const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Exclusive advisory lock on the store's sibling `.lock` file.
///
/// Held for the lifetime of the value; the OS releases the `flock` when the
/// value drops or the process dies, so no stale-lock cleanup is needed.
struct StoreLock {
    _file: File,
}

impl StoreLock {
    fn acquire(lock_path: &Path, timeout: Duration) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?;

        let start = Instant::now();
        let poll_interval = Duration::from_millis(10);

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(StoreLock { _file: file }),
                Err(_) if start.elapsed() >= timeout => return Err(Error::LockTimeout),
                Err(_) => std::thread::sleep(poll_interval),
            }
        }
    }
}

/// Write data atomically via temp-file-then-rename. `rename()` within one
/// filesystem is atomic, so readers see either the old document or the new
/// one, never a partial write.
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> Result<(), Error> {
    let tmp = path.with_extension("tmp");
    let mut file = File::create(&tmp)?;
    file.write_all(data)?;
    file.sync_data()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// How a merge ended: how many items were persisted, and the fetch error
/// that cut the stream short, if any.
#[derive(Debug)]
pub struct MergeOutcome {
    pub count: usize,
    pub error: Option<anyhow::Error>,
}

/// Durable per-provider collections of work items, merged on sync.
pub struct DataStore {
    path: PathBuf,
    lock_timeout: Duration,
}

impl DataStore {
    pub fn new() -> Self {
        Self::at(data_dir().join("whatdidido.json"))
    }

    /// Store rooted at an explicit file path. Tests inject temp dirs here.
    pub fn at(path: PathBuf) -> Self {
        Self {
            path,
            lock_timeout: LOCK_TIMEOUT,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    fn lock_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "whatdidido.json".to_string());
        self.path.with_file_name(format!("{name}.lock"))
    }

    /// Read the current document. A missing file is an empty store; an
    /// unparseable file is a hard error, never silently reset.
    fn read_collections(&self) -> Result<Collections, Error> {
        if !self.path.exists() {
            return Ok(Collections::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents).map_err(|source| Error::CorruptStore {
            path: self.path.clone(),
            source,
        })
    }

    fn write_collections(&self, collections: &Collections) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(collections)
            .context("Failed to serialize work item collections")?;
        atomic_write(&self.path, json.as_bytes())?;
        Ok(())
    }

    /// Consume the provider's item stream and merge it into that provider's
    /// collection, upserting by `id`: a re-fetched id replaces the stored
    /// item in place, new ids append at the end.
    ///
    /// The whole read-merge-write cycle runs under the advisory lock. If the
    /// stream fails mid-way, items yielded before the failure are still
    /// persisted; the outcome then carries both the persisted count and the
    /// fetch error. `Err` is reserved for lock, read, and write failures.
    pub async fn save_provider_data(
        &self,
        provider: &dyn Provider,
        params: &FetchParams,
    ) -> Result<MergeOutcome> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let _lock = StoreLock::acquire(&self.lock_path(), self.lock_timeout)?;

        let mut collections = self.read_collections()?;
        let mut items = collections.remove(provider.name()).unwrap_or_default();
        let mut index: HashMap<String, usize> = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.id.clone(), i))
            .collect();

        let mut count = 0;
        let mut stream_err = None;
        let mut stream = ItemStream::new(provider, params);
        while let Some(result) = stream.next().await {
            match result {
                Ok(item) => {
                    match index.get(&item.id) {
                        Some(&pos) => items[pos] = item,
                        None => {
                            index.insert(item.id.clone(), items.len());
                            items.push(item);
                        }
                    }
                    count += 1;
                }
                Err(e) => {
                    stream_err = Some(e);
                    break;
                }
            }
        }

        collections.insert(provider.name().to_string(), items);
        self.write_collections(&collections)?;

        Ok(MergeOutcome {
            count,
            error: stream_err.map(|e| {
                e.context(format!(
                    "fetch from {} failed after {count} item(s)",
                    provider.name()
                ))
            }),
        })
    }

    /// All synced data, grouped by provider. A store that has never been
    /// synced reads back as an empty mapping.
    pub fn get_all_data(&self) -> Result<Collections, Error> {
        self.read_collections()
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}
