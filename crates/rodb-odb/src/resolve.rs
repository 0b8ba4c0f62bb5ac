//! Delta chain resolution.
//!
//! REF_DELTA bases may live in any pack or the loose store, so chain
//! walking belongs here rather than inside a single pack: the visited-set
//! that detects cycles has to span packs.

use std::collections::{HashMap, HashSet};
use std::io::Read;

use rodb_hash::ObjectId;
use rodb_object::ObjectType;
use rodb_pack::delta::DeltaStream;
use rodb_pack::pack::PackFile;
use rodb_pack::varint::read_size_varint;
use rodb_pack::{EntryKind, PackError};
use rodb_stream::{ByteStream, MemoStream, SharedFile};
use rodb_utils::CancelToken;

use crate::accessor::Accessor;
use crate::OdbError;

/// Per-lookup chain state: visited entries, depth, and the shared pack
/// views every entry stream of the chain borrows from.
pub(crate) struct ResolveCtx {
    visited: HashSet<(usize, u64)>,
    depth: usize,
    max_depth: usize,
    token: CancelToken,
    /// One borrowed handle per pack touched by this lookup.
    shared: HashMap<usize, SharedFile>,
}

impl ResolveCtx {
    pub(crate) fn new(max_depth: usize, token: CancelToken) -> Self {
        Self {
            visited: HashSet::new(),
            depth: 0,
            max_depth,
            token,
            shared: HashMap::new(),
        }
    }

    /// The shared view of `packs[pack_idx]`, borrowing a handle on first
    /// use. All cursors of one lookup go through the same handle.
    fn shared_for(&mut self, packs: &[PackFile], pack_idx: usize) -> Result<SharedFile, PackError> {
        if let Some(shared) = self.shared.get(&pack_idx) {
            return Ok(shared.clone());
        }
        let shared = packs[pack_idx].shared()?;
        self.shared.insert(pack_idx, shared.clone());
        Ok(shared)
    }

    /// Record a delta entry on the current chain; fails on a repeat visit
    /// or when the chain grows past the configured bound.
    fn enter_delta(&mut self, pack_idx: usize, offset: u64) -> Result<(), PackError> {
        self.token.check()?;
        if !self.visited.insert((pack_idx, offset)) {
            return Err(PackError::DeltaCycle { offset });
        }
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(PackError::DeltaChainTooDeep {
                offset,
                max_depth: self.max_depth,
            });
        }
        Ok(())
    }
}

/// Open the entry at `offset` of `packs[pack_idx]`, resolving any delta
/// chain into `(concrete type, result size, payload stream)`.
pub(crate) fn open_entry(
    acc: &Accessor,
    packs: &[PackFile],
    pack_idx: usize,
    offset: u64,
    ctx: &mut ResolveCtx,
) -> Result<(ObjectType, u64, ByteStream), OdbError> {
    let shared = ctx.shared_for(packs, pack_idx)?;
    let (header, payload) = packs[pack_idx].entry_at_shared(&shared, offset)?;
    match header.kind {
        EntryKind::OfsDelta { base_offset } => {
            ctx.enter_delta(pack_idx, offset)?;
            let base = open_entry(acc, packs, pack_idx, base_offset, ctx)?;
            apply_delta(acc, payload, base, ctx)
        }
        EntryKind::RefDelta { base } => {
            ctx.enter_delta(pack_idx, offset)?;
            let base = find_base(acc, packs, &base, ctx)?;
            apply_delta(acc, payload, base, ctx)
        }
        kind => {
            let ty = kind.object_type().expect("delta kinds matched above");
            Ok((ty, header.size, Box::new(payload)))
        }
    }
}

/// Compose a delta payload with its resolved base.
fn apply_delta(
    acc: &Accessor,
    delta_payload: impl Read + Send + 'static,
    base: (ObjectType, u64, ByteStream),
    ctx: &ResolveCtx,
) -> Result<(ObjectType, u64, ByteStream), OdbError> {
    let (base_type, base_size, base_stream) = base;
    let memo = MemoStream::new(
        base_stream,
        base_size,
        acc.fs(),
        acc.pool(),
        acc.spill_threshold(),
        ctx.token.clone(),
    );
    let delta = DeltaStream::new(delta_payload, memo, ctx.token.clone())?;
    tracing::trace!(depth = ctx.depth, result_size = delta.result_size(), "delta level resolved");
    Ok((base_type, delta.result_size(), Box::new(delta)))
}

/// Locate a REF_DELTA base anywhere: every pack's index first, then the
/// loose store.
fn find_base(
    acc: &Accessor,
    packs: &[PackFile],
    oid: &ObjectId,
    ctx: &mut ResolveCtx,
) -> Result<(ObjectType, u64, ByteStream), OdbError> {
    for (idx, pack) in packs.iter().enumerate() {
        if let Some(offset) = pack.lookup(oid) {
            return open_entry(acc, packs, idx, offset, ctx);
        }
    }
    match acc.loose().open(oid)? {
        Some(found) => Ok(found),
        None => Err(PackError::MissingBase(*oid).into()),
    }
}

/// Resolve only `(concrete type, result size)` for the entry at `offset`,
/// reading delta headers but no payload bytes.
pub(crate) fn entry_info(
    acc: &Accessor,
    packs: &[PackFile],
    pack_idx: usize,
    offset: u64,
    ctx: &mut ResolveCtx,
) -> Result<(ObjectType, u64), OdbError> {
    let shared = ctx.shared_for(packs, pack_idx)?;
    let (header, mut payload) = packs[pack_idx].entry_at_shared(&shared, offset)?;
    match header.kind {
        EntryKind::OfsDelta { base_offset } => {
            ctx.enter_delta(pack_idx, offset)?;
            let (ty, _) = entry_info(acc, packs, pack_idx, base_offset, ctx)?;
            Ok((ty, delta_result_size(&mut payload)?))
        }
        EntryKind::RefDelta { base } => {
            ctx.enter_delta(pack_idx, offset)?;
            let (ty, _) = base_info(acc, packs, &base, ctx)?;
            Ok((ty, delta_result_size(&mut payload)?))
        }
        kind => Ok((kind.object_type().expect("delta kinds matched above"), header.size)),
    }
}

fn base_info(
    acc: &Accessor,
    packs: &[PackFile],
    oid: &ObjectId,
    ctx: &mut ResolveCtx,
) -> Result<(ObjectType, u64), OdbError> {
    for (idx, pack) in packs.iter().enumerate() {
        if let Some(offset) = pack.lookup(oid) {
            return entry_info(acc, packs, idx, offset, ctx);
        }
    }
    match acc.loose().read_header(oid)? {
        Some(found) => Ok(found),
        None => Err(PackError::MissingBase(*oid).into()),
    }
}

/// The result size is the second varint of the delta stream's header.
fn delta_result_size(payload: &mut impl Read) -> Result<u64, PackError> {
    let _base_size = read_size_varint(payload)?;
    read_size_varint(payload)
}
