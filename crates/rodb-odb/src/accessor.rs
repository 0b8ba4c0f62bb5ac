use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use rodb_hash::ObjectId;
use rodb_loose::LooseStore;
use rodb_object::ObjectType;
use rodb_pack::index::PackIndex;
use rodb_pack::pack::PackFile;
use rodb_pack::DEFAULT_MAX_DELTA_DEPTH;
use rodb_stream::{HandleCache, DEFAULT_SPILL_THRESHOLD};
use rodb_utils::{BufferPool, CancelToken, Cancelled, Fs, Scope, ScopeError, StdFs};

use crate::resolve::{self, ResolveCtx};
use crate::{object_stream, ObjectStream, OdbError};

/// Tunables for an [`Accessor`].
#[derive(Debug, Clone)]
pub struct AccessorOptions {
    /// Delta chains longer than this are invalid data.
    pub max_delta_depth: usize,
    /// Bound on cached open pack handles; `None` means `2 × CPU`.
    pub handle_cache_size: Option<usize>,
    /// Memoized bases larger than this spill to a temp file.
    pub spill_threshold: usize,
}

impl Default for AccessorOptions {
    fn default() -> Self {
        Self {
            max_delta_depth: DEFAULT_MAX_DELTA_DEPTH,
            handle_cache_size: None,
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
        }
    }
}

/// Read-only object accessor over a repository's object store.
///
/// Construction enumerates `objects/pack/*.idx` and loads every index; the
/// indexes live until the accessor is closed or dropped. Lookups probe the
/// packs in file-name order, then the loose store. Safe to share across
/// threads; concurrent lookups serialize only inside the shared pack-file
/// views and the handle cache.
pub struct Accessor {
    packs: RwLock<Vec<PackFile>>,
    loose: LooseStore,
    cache: Arc<HandleCache>,
    pool: Arc<BufferPool>,
    fs: Arc<dyn Fs>,
    options: AccessorOptions,
    token: CancelToken,
    closed: AtomicBool,
}

impl Accessor {
    /// Open with the production filesystem. Pack indexes are memory-mapped.
    pub fn open(admin_dir: impl AsRef<Path>) -> Result<Self, OdbError> {
        let scope = Scope::new(CancelToken::new());
        Self::build(
            admin_dir.as_ref(),
            Arc::new(StdFs),
            &scope,
            AccessorOptions::default(),
            true,
        )
    }

    /// Open against an explicit filesystem, scope, and options. Pack
    /// indexes are read through `fs`.
    pub fn open_with(
        admin_dir: impl AsRef<Path>,
        fs: Arc<dyn Fs>,
        scope: &Arc<Scope>,
        options: AccessorOptions,
    ) -> Result<Self, OdbError> {
        Self::build(admin_dir.as_ref(), fs, scope, options, false)
    }

    fn build(
        admin_dir: &Path,
        fs: Arc<dyn Fs>,
        scope: &Arc<Scope>,
        options: AccessorOptions,
        mmap_indexes: bool,
    ) -> Result<Self, OdbError> {
        let objects_dir = admin_dir.join("objects");
        let pack_dir = objects_dir.join("pack");
        let token = scope.cancel_token().clone();

        let cache = match options.handle_cache_size {
            Some(capacity) => HandleCache::new(Arc::clone(&fs), capacity),
            None => HandleCache::with_default_capacity(Arc::clone(&fs)),
        };
        let pool = BufferPool::new();

        let idx_paths: Vec<PathBuf> = if fs.is_dir(&pack_dir) {
            fs.list_files(&pack_dir, "idx")?
        } else {
            Vec::new()
        };

        // Load every index (and open its pack) through the scope.
        let tasks: Vec<_> = idx_paths
            .into_iter()
            .map(|idx_path| {
                let fs = Arc::clone(&fs);
                let cache = Arc::clone(&cache);
                move || -> Result<PackFile, OdbError> {
                    let index = if mmap_indexes {
                        PackIndex::open(&idx_path)?
                    } else {
                        PackIndex::from_bytes(fs.read(&idx_path)?, idx_path.clone())?
                    };
                    let pack_path = idx_path.with_extension("pack");
                    Ok(PackFile::with_index(&pack_path, index, &cache)?)
                }
            })
            .collect();
        let packs = scope.run(tasks).map_err(|e| match e {
            ScopeError::Task(err) => err,
            ScopeError::Cancelled => OdbError::Cancelled(Cancelled),
        })?;
        tracing::debug!(
            dir = %admin_dir.display(),
            packs = packs.len(),
            "object accessor opened"
        );

        let loose = LooseStore::new(objects_dir, Arc::clone(&fs), Arc::clone(&pool));
        Ok(Self {
            packs: RwLock::new(packs),
            loose,
            cache,
            pool,
            fs,
            options,
            token,
            closed: AtomicBool::new(false),
        })
    }

    /// Locate an object and open a stream of its reconstructed payload.
    ///
    /// Absent objects are `Ok(None)`; corruption anywhere along the path
    /// is an error.
    pub fn open_object(&self, oid: &ObjectId) -> Result<Option<ObjectStream>, OdbError> {
        self.ensure_open()?;
        self.token.check()?;

        let packs = self.packs.read().unwrap();
        for (pack_idx, pack) in packs.iter().enumerate() {
            self.token.check()?;
            if let Some(offset) = pack.lookup(oid) {
                let mut ctx = ResolveCtx::new(self.options.max_delta_depth, self.token.clone());
                let (kind, size, reader) =
                    resolve::open_entry(self, &packs, pack_idx, offset, &mut ctx)?;
                return Ok(Some(object_stream(kind, size, reader)));
            }
        }
        drop(packs);

        match self.loose.open(oid)? {
            Some((kind, size, reader)) => Ok(Some(object_stream(kind, size, reader))),
            None => Ok(None),
        }
    }

    /// The object's `(type, size)` without reconstructing its payload.
    ///
    /// Delta chains are still walked (the concrete type lives at the
    /// bottom), but only entry and delta headers are decoded.
    pub fn read_header(&self, oid: &ObjectId) -> Result<Option<(ObjectType, u64)>, OdbError> {
        self.ensure_open()?;
        self.token.check()?;

        let packs = self.packs.read().unwrap();
        for (pack_idx, pack) in packs.iter().enumerate() {
            if let Some(offset) = pack.lookup(oid) {
                let mut ctx = ResolveCtx::new(self.options.max_delta_depth, self.token.clone());
                let info = resolve::entry_info(self, &packs, pack_idx, offset, &mut ctx)?;
                return Ok(Some(info));
            }
        }
        drop(packs);

        Ok(self.loose.read_header(oid)?)
    }

    /// Materialize an object's payload.
    pub fn read(&self, oid: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, OdbError> {
        match self.open_object(oid)? {
            Some(obj) => {
                let kind = obj.kind();
                Ok(Some((kind, obj.read_to_vec()?)))
            }
            None => Ok(None),
        }
    }

    /// Whether any store knows this OID. Index lookups only; nothing is
    /// decompressed.
    pub fn contains(&self, oid: &ObjectId) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let packs = self.packs.read().unwrap();
        packs.iter().any(|p| p.contains(oid)) || self.loose.contains(oid)
    }

    /// Every OID recorded in the loaded pack indexes, ascending and
    /// deduplicated. Loose objects are not enumerated.
    pub fn indexed_oids(&self) -> Result<Vec<ObjectId>, OdbError> {
        self.ensure_open()?;
        let packs = self.packs.read().unwrap();
        let mut oids: Vec<ObjectId> = packs
            .iter()
            .flat_map(|p| p.index().iter().map(|(oid, _)| oid))
            .collect();
        oids.sort();
        oids.dedup();
        Ok(oids)
    }

    /// Number of loaded packs.
    pub fn pack_count(&self) -> usize {
        self.packs.read().unwrap().len()
    }

    /// The cancellation token lookups observe.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.token
    }

    /// Release the indexes and every cached pack handle. Further calls
    /// fail with [`OdbError::Closed`]; streams already handed out keep
    /// working and release their handles as they drop.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // close() also runs from Drop, so survive a poisoned lock.
        if let Ok(mut packs) = self.packs.write() {
            packs.clear();
        }
        self.cache.clear();
        tracing::debug!("object accessor closed");
    }

    fn ensure_open(&self) -> Result<(), OdbError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(OdbError::Closed);
        }
        Ok(())
    }

    pub(crate) fn loose(&self) -> &LooseStore {
        &self.loose
    }

    pub(crate) fn fs(&self) -> Arc<dyn Fs> {
        Arc::clone(&self.fs)
    }

    pub(crate) fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub(crate) fn spill_threshold(&self) -> usize {
        self.options.spill_threshold
    }
}

impl Drop for Accessor {
    fn drop(&mut self) {
        self.close();
    }
}
