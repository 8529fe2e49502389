//! Instance records persisted in a single JSON file.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use sm_core::{CoreError, CoreResult, Storage};
use sm_model::{InstanceIdent, InstanceInfo};
use tracing::{debug, trace};

use crate::{
    error::{ExecError, ExecResult},
    fsutil,
};

/// Keeps the desired instances in memory and rewrites the file on every change.
///
/// `add_instance` replaces an existing record with the same ident.
pub struct JsonStorage {
    path: PathBuf,
    records: Mutex<BTreeMap<InstanceIdent, InstanceInfo>>,
}

impl JsonStorage {
    /// Opens the store at `path`, loading existing records. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> ExecResult<Self> {
        let path = path.into();
        let records = match fs::read(&path) {
            Ok(data) => {
                let list: Vec<InstanceInfo> = serde_json::from_slice(&data)?;
                list.into_iter().map(|i| (i.ident.clone(), i)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        debug!(path = %path.display(), records = records.len(), "instance storage opened");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn records(&self) -> MutexGuard<'_, BTreeMap<InstanceIdent, InstanceInfo>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self, records: &BTreeMap<InstanceIdent, InstanceInfo>) -> CoreResult<()> {
        let list: Vec<&InstanceInfo> = records.values().collect();
        let data = serde_json::to_vec_pretty(&list).map_err(|e| ExecError::from(e).into_core(CoreError::Storage))?;
        fsutil::write_atomic(&self.path, &data).map_err(|e| CoreError::Storage(e.to_string()))?;
        trace!(path = %self.path.display(), records = list.len(), "instance storage flushed");
        Ok(())
    }
}

impl Storage for JsonStorage {
    fn add_instance(&self, instance: &InstanceInfo) -> CoreResult<()> {
        let mut records = self.records();
        let previous = records.insert(instance.ident.clone(), instance.clone());

        if let Err(e) = self.flush(&records) {
            match previous {
                Some(previous) => records.insert(instance.ident.clone(), previous),
                None => records.remove(&instance.ident),
            };
            return Err(e);
        }
        Ok(())
    }

    fn update_instance(&self, instance: &InstanceInfo) -> CoreResult<()> {
        let mut records = self.records();
        let Some(stored) = records.get_mut(&instance.ident) else {
            return Err(CoreError::NotFound(format!("instance {}", instance.ident)));
        };
        let previous = std::mem::replace(stored, instance.clone());

        if let Err(e) = self.flush(&records) {
            records.insert(instance.ident.clone(), previous);
            return Err(e);
        }
        Ok(())
    }

    fn remove_instance(&self, ident: &InstanceIdent) -> CoreResult<()> {
        let mut records = self.records();
        let Some(previous) = records.remove(ident) else {
            return Err(CoreError::NotFound(format!("instance {ident}")));
        };

        if let Err(e) = self.flush(&records) {
            records.insert(ident.clone(), previous);
            return Err(e);
        }
        Ok(())
    }

    fn get_all_instances(&self) -> CoreResult<Vec<InstanceInfo>> {
        Ok(self.records().values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(n: u64) -> InstanceInfo {
        InstanceInfo::new(InstanceIdent::new("svc", "subject", n))
    }

    #[test]
    fn records_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("db/instances.json");

        let storage = JsonStorage::open(&path).unwrap();
        storage.add_instance(&info(0)).unwrap();
        storage.add_instance(&info(1)).unwrap();
        storage.update_instance(&info(1).with_priority(7)).unwrap();
        storage.remove_instance(&info(0).ident).unwrap();
        drop(storage);

        let storage = JsonStorage::open(&path).unwrap();
        assert_eq!(storage.get_all_instances().unwrap(), vec![info(1).with_priority(7)]);
    }

    #[test]
    fn add_replaces_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = JsonStorage::open(tmp.path().join("instances.json")).unwrap();

        storage.add_instance(&info(0)).unwrap();
        storage.add_instance(&info(0).with_uid(5000)).unwrap();

        let all = storage.get_all_instances().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].uid, 5000);
    }

    #[test]
    fn missing_records_are_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = JsonStorage::open(tmp.path().join("instances.json")).unwrap();

        assert!(matches!(storage.update_instance(&info(0)), Err(CoreError::NotFound(_))));
        assert!(matches!(storage.remove_instance(&info(0).ident), Err(CoreError::NotFound(_))));
    }

    #[test]
    fn corrupt_file_fails_to_open() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("instances.json");
        fs::write(&path, "{").unwrap();

        assert!(matches!(JsonStorage::open(&path), Err(ExecError::Json(_))));
    }
}
