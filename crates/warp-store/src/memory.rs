// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Deterministic in-memory object store.
//!
//! [`MemoryStore`] is the reference [`ObjectStore`] implementation, used by
//! every integration test and by hosts that want an ephemeral graph. Objects
//! are hashed over git-shaped headers (`blob <len>\0…`, `tree\0…`,
//! `commit\0…`) with SHA-256, so identical content always yields identical
//! ids. Commit dates come from an optional [`ClockPort`]; the default is a
//! fixed epoch date, keeping commit ids reproducible across runs.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::clock::ClockPort;
use crate::{CommitInfo, ObjectStore, Oid, StoreError, TreeEntry};

#[derive(Clone, Debug)]
enum Object {
    Blob(Vec<u8>),
    Tree(BTreeMap<String, Oid>),
    Commit(CommitRecord),
}

impl Object {
    fn kind(&self) -> &'static str {
        match self {
            Self::Blob(_) => "blob",
            Self::Tree(_) => "tree",
            Self::Commit(_) => "commit",
        }
    }
}

#[derive(Clone, Debug)]
struct CommitRecord {
    tree: Oid,
    parents: Vec<Oid>,
    message: String,
    author: String,
    date: String,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<Oid, Object>,
    refs: BTreeMap<String, Oid>,
}

/// In-memory content-addressed store with named pointers.
///
/// Interior-mutable behind a mutex so one store can be shared by several
/// graph handles (the local side and the "peer" side of a sync test, for
/// instance). All mutation is point-wise and short-lived; no lock is held
/// across an await.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    clock: Option<Arc<dyn ClockPort>>,
    author: String,
}

impl MemoryStore {
    /// Creates an empty store with fully deterministic commit metadata.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock: None,
            author: "warp".to_owned(),
        }
    }

    /// Creates an empty store that stamps commits from `clock`.
    pub fn with_clock(clock: Arc<dyn ClockPort>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            clock: Some(clock),
            author: "warp".to_owned(),
        }
    }

    /// Number of objects currently stored.
    pub fn object_count(&self) -> usize {
        self.inner.lock().objects.len()
    }

    fn commit_date(&self) -> String {
        self.clock.as_ref().map_or_else(
            || "1970-01-01T00:00:00Z".to_owned(),
            |clock| clock.now_iso8601(),
        )
    }

    fn insert(inner: &mut Inner, preimage: &[u8], object: Object) -> Oid {
        let oid = Oid::from_hex_unchecked(hex::encode(Sha256::digest(preimage)));
        inner.objects.entry(oid.clone()).or_insert(object);
        oid
    }

    fn validate_ref_name(name: &str) -> Result<(), StoreError> {
        if name.is_empty() || name.contains('\0') || name.contains("..") {
            return Err(StoreError::InvalidRefName {
                name: name.to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn get_object<'a>(inner: &'a Inner, oid: &Oid) -> Result<&'a Object, StoreError> {
    inner
        .objects
        .get(oid)
        .ok_or_else(|| StoreError::ObjectMissing { oid: oid.clone() })
}

fn commit_preimage(record: &CommitRecord) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"commit\0");
    out.extend_from_slice(format!("tree {}\n", record.tree).as_bytes());
    for parent in &record.parents {
        out.extend_from_slice(format!("parent {parent}\n").as_bytes());
    }
    out.extend_from_slice(format!("author {} {}\n\n", record.author, record.date).as_bytes());
    out.extend_from_slice(record.message.as_bytes());
    out
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn read_ref(&self, name: &str) -> Result<Option<Oid>, StoreError> {
        Self::validate_ref_name(name)?;
        Ok(self.inner.lock().refs.get(name).cloned())
    }

    async fn list_refs(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock();
        // BTreeMap iteration is already bytewise-sorted.
        Ok(inner
            .refs
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn update_ref(&self, name: &str, new: &Oid) -> Result<(), StoreError> {
        Self::validate_ref_name(name)?;
        self.inner.lock().refs.insert(name.to_owned(), new.clone());
        Ok(())
    }

    async fn compare_and_swap_ref(
        &self,
        name: &str,
        new: &Oid,
        expected: Option<&Oid>,
    ) -> Result<(), StoreError> {
        Self::validate_ref_name(name)?;
        let mut inner = self.inner.lock();
        let actual = inner.refs.get(name).cloned();
        if actual.as_ref() != expected {
            return Err(StoreError::RefConflict {
                name: name.to_owned(),
                expected: expected.cloned(),
                actual,
            });
        }
        inner.refs.insert(name.to_owned(), new.clone());
        Ok(())
    }

    async fn delete_ref(&self, name: &str) -> Result<(), StoreError> {
        Self::validate_ref_name(name)?;
        self.inner.lock().refs.remove(name);
        Ok(())
    }

    async fn read_blob(&self, oid: &Oid) -> Result<Vec<u8>, StoreError> {
        let inner = self.inner.lock();
        match get_object(&inner, oid)? {
            Object::Blob(bytes) => Ok(bytes.clone()),
            other => Err(StoreError::WrongKind {
                oid: oid.clone(),
                expected: "blob",
                actual: other.kind(),
            }),
        }
    }

    async fn write_blob(&self, bytes: &[u8]) -> Result<Oid, StoreError> {
        let mut preimage = format!("blob {}\0", bytes.len()).into_bytes();
        preimage.extend_from_slice(bytes);
        let mut inner = self.inner.lock();
        Ok(Self::insert(
            &mut inner,
            &preimage,
            Object::Blob(bytes.to_vec()),
        ))
    }

    async fn write_tree(&self, entries: &[TreeEntry]) -> Result<Oid, StoreError> {
        let mut sorted: BTreeMap<String, Oid> = BTreeMap::new();
        for entry in entries {
            sorted.insert(entry.path.clone(), entry.oid.clone());
        }
        let mut preimage = b"tree\0".to_vec();
        for (path, oid) in &sorted {
            preimage.extend_from_slice(format!("100644 blob {oid}\t{path}\n").as_bytes());
        }
        let mut inner = self.inner.lock();
        Ok(Self::insert(&mut inner, &preimage, Object::Tree(sorted)))
    }

    async fn read_tree_oids(&self, tree: &Oid) -> Result<BTreeMap<String, Oid>, StoreError> {
        let inner = self.inner.lock();
        match get_object(&inner, tree)? {
            Object::Tree(entries) => Ok(entries.clone()),
            other => Err(StoreError::WrongKind {
                oid: tree.clone(),
                expected: "tree",
                actual: other.kind(),
            }),
        }
    }

    async fn get_commit_tree(&self, commit: &Oid) -> Result<Oid, StoreError> {
        let inner = self.inner.lock();
        match get_object(&inner, commit)? {
            Object::Commit(record) => Ok(record.tree.clone()),
            other => Err(StoreError::WrongKind {
                oid: commit.clone(),
                expected: "commit",
                actual: other.kind(),
            }),
        }
    }

    async fn commit_node_with_tree(
        &self,
        tree: &Oid,
        parents: &[Oid],
        message: &str,
    ) -> Result<Oid, StoreError> {
        let record = CommitRecord {
            tree: tree.clone(),
            parents: parents.to_vec(),
            message: message.to_owned(),
            author: self.author.clone(),
            date: self.commit_date(),
        };
        let preimage = commit_preimage(&record);
        let mut inner = self.inner.lock();
        if !inner.objects.contains_key(tree) {
            return Err(StoreError::ObjectMissing { oid: tree.clone() });
        }
        for parent in parents {
            if !inner.objects.contains_key(parent) {
                return Err(StoreError::ObjectMissing {
                    oid: parent.clone(),
                });
            }
        }
        Ok(Self::insert(&mut inner, &preimage, Object::Commit(record)))
    }

    async fn node_exists(&self, oid: &Oid) -> Result<bool, StoreError> {
        Ok(self.inner.lock().objects.contains_key(oid))
    }

    async fn is_ancestor(&self, ancestor: &Oid, descendant: &Oid) -> Result<bool, StoreError> {
        let inner = self.inner.lock();
        let mut queue: VecDeque<Oid> = VecDeque::new();
        let mut seen: HashSet<Oid> = HashSet::new();
        queue.push_back(descendant.clone());
        while let Some(current) = queue.pop_front() {
            if &current == ancestor {
                return Ok(true);
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Object::Commit(record) = get_object(&inner, &current)? {
                for parent in &record.parents {
                    queue.push_back(parent.clone());
                }
            }
        }
        Ok(false)
    }

    async fn get_node_info(&self, oid: &Oid) -> Result<CommitInfo, StoreError> {
        let inner = self.inner.lock();
        match get_object(&inner, oid)? {
            Object::Commit(record) => Ok(CommitInfo {
                sha: oid.clone(),
                message: record.message.clone(),
                author: record.author.clone(),
                date: record.date.clone(),
                parents: record.parents.clone(),
            }),
            other => Err(StoreError::WrongKind {
                oid: oid.clone(),
                expected: "commit",
                actual: other.kind(),
            }),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
