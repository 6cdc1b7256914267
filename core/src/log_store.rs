//! Durable write-ahead log for raft hard state and entries, segmented
//! per node id. Grounded on the teacher's `core/src/log_store.rs`,
//! generalized from a fixed `sled::open("raft_log")` path to a
//! `DataDir`-scoped one and tagged with the owning node's decimal id
//! so a restart can detect a mismatched WAL (spec.md 4.3, fatal).

use std::fmt::Debug;
use std::io;
use std::ops::Bound;
use std::ops::RangeBounds;
use std::path::Path;

use openraft::storage::LogFlushed;
use openraft::Entry;
use openraft::ErrorSubject;
use openraft::ErrorVerb;
use openraft::LogId;
use openraft::LogState;
use openraft::RaftLogId;
use openraft::StorageError;
use openraft::StorageIOError;
use openraft::Vote;
use sled::IVec;

use crate::{NodeId, TypeConfig};

/// Segmented, sled-backed raft log. `log` holds entries keyed by
/// big-endian index; `log_state` holds hard state (`vote`,
/// `committed`, `last_purged_log_id`) and the node-id tag used to
/// detect a WAL opened by the wrong node.
#[derive(Clone, Debug)]
pub struct LogStore {
    log: sled::Db,
    log_state: sled::Db,
}

impl LogStore {
    /// Opens (or creates) the WAL for `node_id` under
    /// `<data_dir>/wal/<node_id>`. On an existing WAL, verifies the
    /// stored node-id tag matches; mismatch is fatal (spec.md 4.3).
    pub fn open(data_dir: &Path, node_id: NodeId) -> anyhow::Result<Self> {
        let dir = data_dir.join("wal").join(node_id.to_string());
        std::fs::create_dir_all(&dir)?;

        let log = sled::open(dir.join("entries"))?;
        let log_state = sled::open(dir.join("state"))?;

        match log_state.get(b"node_id")? {
            Some(tag) => {
                let tagged: NodeId = std::str::from_utf8(&tag)?.parse()?;
                if tagged != node_id {
                    anyhow::bail!(
                        "WAL metadata is for node {tagged}, cannot be opened as node {node_id}"
                    );
                }
            }
            None => {
                log_state.insert(b"node_id", node_id.to_string().as_bytes())?;
            }
        }

        Ok(Self { log, log_state })
    }

    /// True if a WAL directory already exists for `node_id` — the
    /// new-cluster-vs-restart branch of spec.md 4.3's construction
    /// rule.
    pub fn exists(data_dir: &Path, node_id: NodeId) -> bool {
        data_dir.join("wal").join(node_id.to_string()).join("entries").exists()
    }

    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug>(
        &mut self,
        range: RB,
    ) -> Result<Vec<Entry<TypeConfig>>, StorageError<NodeId>>
    where
        Entry<TypeConfig>: Clone,
    {
        let start = match range.start_bound() {
            Bound::Included(&s) => Bound::Included(s.to_be_bytes()),
            Bound::Excluded(&s) => Bound::Excluded(s.to_be_bytes()),
            Bound::Unbounded => Bound::Unbounded,
        };
        let end = match range.end_bound() {
            Bound::Included(&s) => Bound::Included(s.to_be_bytes()),
            Bound::Excluded(&s) => Bound::Excluded(s.to_be_bytes()),
            Bound::Unbounded => Bound::Unbounded,
        };

        self.log
            .range((start, end))
            .values()
            .map(|res| {
                let v = res.map_err(|e| StorageError::IO { source: StorageIOError::read_logs(&e) })?;
                serde_json::from_slice(&v).map_err(|e| StorageError::IO { source: StorageIOError::read_logs(&e) })
            })
            .collect()
    }

    async fn get_log_state(&mut self) -> Result<LogState<TypeConfig>, StorageError<NodeId>> {
        let last = self
            .log
            .iter()
            .values()
            .next_back()
            .transpose()
            .map_err(|e| StorageError::IO { source: StorageIOError::read_logs(&e) })?
            .map(|val| {
                serde_json::from_slice::<Entry<TypeConfig>>(&val)
                    .map(|entry| entry.get_log_id().clone())
                    .map_err(|e| StorageError::IO { source: StorageIOError::read_logs(&e) })
            })
            .transpose()?;

        let last_purged_log_id = self
            .log_state
            .get(b"last_purged_log_id")
            .map_err(|e| StorageIOError::read(&e))?
            .map(|bytes| serde_json::from_slice(&bytes).map_err(|e| StorageIOError::read(&e)))
            .transpose()?;

        let last_log_id = match last {
            None => last_purged_log_id.clone(),
            Some(x) => Some(x),
        };

        Ok(LogState { last_purged_log_id, last_log_id })
    }

    async fn save_committed(
        &mut self,
        committed: Option<LogId<NodeId>>,
    ) -> Result<(), StorageError<NodeId>> {
        self.log_state
            .insert(
                b"committed",
                serde_json::to_vec(&committed).map_err(|e| StorageIOError::write_logs(&e))?,
            )
            .map_err(|e| StorageError::IO {
                source: StorageIOError::new(
                    ErrorSubject::Store,
                    ErrorVerb::Write,
                    &io::Error::other(e),
                ),
            })?;
        Ok(())
    }

    async fn read_committed(&mut self) -> Result<Option<LogId<NodeId>>, StorageError<NodeId>> {
        let committed = self.log_state.get(b"committed").map_err(|e| StorageIOError::read(&e))?;
        committed
            .map(|bytes| serde_json::from_slice(&bytes).map_err(|e| StorageIOError::read(&e)))
            .transpose()
    }

    async fn save_vote(&mut self, vote: &Vote<NodeId>) -> Result<(), StorageError<NodeId>> {
        self.log_state
            .insert(b"vote", serde_json::to_vec(vote).map_err(|e| StorageIOError::write_logs(&e))?)
            .map_err(|e| StorageError::IO {
                source: StorageIOError::new(
                    ErrorSubject::Store,
                    ErrorVerb::Write,
                    &io::Error::other(e),
                ),
            })?;
        Ok(())
    }

    async fn read_vote(&mut self) -> Result<Option<Vote<NodeId>>, StorageError<NodeId>> {
        let vote = self.log_state.get(b"vote").map_err(|e| StorageIOError::read(&e))?;
        vote.map(|bytes| serde_json::from_slice(&bytes).map_err(|e| StorageIOError::read(&e)))
            .transpose()
    }

    async fn append<I>(
        &mut self,
        entries: I,
        callback: LogFlushed<TypeConfig>,
    ) -> Result<(), StorageError<NodeId>>
    where
        I: IntoIterator<Item = Entry<TypeConfig>>,
    {
        for entry in entries {
            let bytes = serde_json::to_vec(&entry).map_err(|e| StorageIOError::write_logs(&e))?;
            self.log
                .insert(u64::to_be_bytes(entry.get_log_id().index), bytes)
                .map_err(|e| StorageError::IO {
                    source: StorageIOError::new(
                        ErrorSubject::Store,
                        ErrorVerb::Write,
                        &io::Error::other(e),
                    ),
                })?;
        }
        // sled persists on insert; flushing here keeps durability
        // before transmit even under default sync config.
        self.log.flush_async().await.map_err(|e| StorageError::IO {
            source: StorageIOError::new(ErrorSubject::Store, ErrorVerb::Write, &io::Error::other(e)),
        })?;
        callback.log_io_completed(Ok(()));
        Ok(())
    }

    async fn truncate(&mut self, log_id: LogId<NodeId>) -> Result<(), StorageError<NodeId>> {
        let keys: Vec<IVec> = self
            .log
            .range(u64::to_be_bytes(log_id.index)..u64::to_be_bytes(u64::MAX))
            .keys()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::IO {
                source: StorageIOError::new(ErrorSubject::Store, ErrorVerb::Read, &io::Error::other(e)),
            })?;

        for key in keys {
            self.log.remove(&key).map_err(|e| StorageError::IO {
                source: StorageIOError::new(ErrorSubject::Store, ErrorVerb::Write, &io::Error::other(e)),
            })?;
        }
        Ok(())
    }

    async fn purge(&mut self, log_id: LogId<NodeId>) -> Result<(), StorageError<NodeId>> {
        self.log_state
            .insert(
                b"last_purged_log_id",
                serde_json::to_vec(&log_id).map_err(|e| StorageIOError::write_logs(&e))?,
            )
            .map_err(|e| StorageError::IO {
                source: StorageIOError::new(ErrorSubject::Store, ErrorVerb::Write, &io::Error::other(e)),
            })?;

        let keys: Vec<IVec> = self
            .log
            .range(u64::to_be_bytes(0)..=u64::to_be_bytes(log_id.index))
            .keys()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::IO {
                source: StorageIOError::new(ErrorSubject::Store, ErrorVerb::Read, &io::Error::other(e)),
            })?;

        for key in keys {
            self.log.remove(&key).map_err(|e| StorageError::IO {
                source: StorageIOError::new(ErrorSubject::Store, ErrorVerb::Write, &io::Error::other(e)),
            })?;
        }
        Ok(())
    }
}

mod impl_log_store {
    use std::fmt::Debug;
    use std::ops::RangeBounds;

    use openraft::storage::LogFlushed;
    use openraft::storage::RaftLogStorage;
    use openraft::Entry;
    use openraft::LogId;
    use openraft::LogState;
    use openraft::RaftLogReader;
    use openraft::StorageError;
    use openraft::Vote;

    use crate::log_store::LogStore;
    use crate::NodeId;
    use crate::TypeConfig;

    impl RaftLogReader<TypeConfig> for LogStore {
        async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug>(
            &mut self,
            range: RB,
        ) -> Result<Vec<Entry<TypeConfig>>, StorageError<NodeId>> {
            self.try_get_log_entries(range).await
        }
    }

    impl RaftLogStorage<TypeConfig> for LogStore {
        type LogReader = Self;

        async fn get_log_state(&mut self) -> Result<LogState<TypeConfig>, StorageError<NodeId>> {
            self.get_log_state().await
        }

        async fn save_committed(
            &mut self,
            committed: Option<LogId<NodeId>>,
        ) -> Result<(), StorageError<NodeId>> {
            self.save_committed(committed).await
        }

        async fn read_committed(&mut self) -> Result<Option<LogId<NodeId>>, StorageError<NodeId>> {
            self.read_committed().await
        }

        async fn save_vote(&mut self, vote: &Vote<NodeId>) -> Result<(), StorageError<NodeId>> {
            self.save_vote(vote).await
        }

        async fn read_vote(&mut self) -> Result<Option<Vote<NodeId>>, StorageError<NodeId>> {
            self.read_vote().await
        }

        async fn append<I>(
            &mut self,
            entries: I,
            callback: LogFlushed<TypeConfig>,
        ) -> Result<(), StorageError<NodeId>>
        where
            I: IntoIterator<Item = Entry<TypeConfig>>,
        {
            self.append(entries, callback).await
        }

        async fn truncate(&mut self, log_id: LogId<NodeId>) -> Result<(), StorageError<NodeId>> {
            self.truncate(log_id).await
        }

        async fn purge(&mut self, log_id: LogId<NodeId>) -> Result<(), StorageError<NodeId>> {
            self.purge(log_id).await
        }

        async fn get_log_reader(&mut self) -> Self::LogReader {
            self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_node_id_is_rejected_on_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let _store = LogStore::open(dir.path(), 1).unwrap();
        assert!(LogStore::open(dir.path(), 2).is_err());
    }

    #[test]
    fn fresh_directory_has_no_existing_wal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!LogStore::exists(dir.path(), 1));
        let _store = LogStore::open(dir.path(), 1).unwrap();
        assert!(LogStore::exists(dir.path(), 1));
    }
}
