//! Dependency oracle.
//!
//! Records ground-truth producer/consumer edges from committed memory instructions,
//! and replays previously recorded edges to name the stores an instance must wait
//! for. It operates in one of several modes:
//! 1. **Trace:** Every committed store marks its bytes in a forwarding cache; every
//!    committed load looks its bytes up and records one edge per distinct producer.
//!    A full per-access trace is written alongside.
//! 2. **Refine:** Loads all earlier mini-trace shards, answers `check_inst` from them,
//!    and writes an edge for each violation the tracker confirms, keyed on the
//!    identity the violator had when it was predicted.
//! 3. **Barrier:** As `Refine`, but confirmed violators are written as barriers.
//! 4. **Disabled / Run:** Pass-through.
//!
//! Output is buffered and written to LZ4-compressed shards once a buffer reaches the
//! flush threshold, and on [`DependencyOracle::close`]. Write failures are logged and
//! the affected records dropped; recording never stops the host.

/// Mini-trace and full-trace line formats.
pub mod record;

/// Compressed shard reading and writing.
pub mod shard;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use self::record::{FullRecord, MiniRecord, REFINEMENT_HEADER, TRACE_HEADER};
use self::shard::ShardWriter;
use crate::common::error::{MemDepError, Result, TraceParseError};
use crate::common::{DynInst, InstClass, SeqNum, TraceUid};
use crate::config::{OracleConfig, OracleMode};
use crate::core::pipeline::{ConfirmedViolation, InstanceTracker};
use crate::stats::MemDepStats;

/// Dependency trace recorder and replayer.
#[derive(Debug)]
pub struct DependencyOracle {
    mode: OracleMode,
    trace_dir: PathBuf,
    flush_threshold: usize,

    /// Consumer to producers, loaded from earlier shards.
    dependencies: HashMap<TraceUid, Vec<TraceUid>>,
    /// Instances that wait on every older in-flight store.
    barriers: HashSet<TraceUid>,
    loaded_shards: usize,
    loaded_edges: usize,

    /// Byte address to the last committed writer.
    forwarding: HashMap<u64, TraceUid>,

    mini_buffer: Vec<MiniRecord>,
    full_buffer: Vec<FullRecord>,
    mini_sink: Option<ShardWriter>,
    full_sink: Option<ShardWriter>,
    closed: bool,
}

impl DependencyOracle {
    /// Creates an oracle for `config.mode`.
    ///
    /// Replaying modes load every `mini_trace_<n>` shard in `config.trace_dir` and
    /// open the next free index for output. `Trace` mode starts a fresh
    /// `mini_trace_0` and `full_trace`, and deletes refinement shards left over from
    /// an earlier trace in the same directory.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing shard cannot be read or holds a malformed
    /// line. Failing to open an output shard is only logged.
    pub fn new(config: &OracleConfig) -> Result<Self> {
        let mut oracle = Self {
            mode: config.mode,
            trace_dir: config.trace_dir.clone(),
            flush_threshold: config.flush_threshold,
            dependencies: HashMap::new(),
            barriers: HashSet::new(),
            loaded_shards: 0,
            loaded_edges: 0,
            forwarding: HashMap::new(),
            mini_buffer: Vec::new(),
            full_buffer: Vec::new(),
            mini_sink: None,
            full_sink: None,
            closed: false,
        };

        match config.mode {
            OracleMode::Disabled => {
                tracing::info!("dependency oracle disabled");
                return Ok(oracle);
            }
            OracleMode::Run => {
                tracing::info!("dependency oracle mode Run is reserved; running disabled");
                return Ok(oracle);
            }
            OracleMode::Trace | OracleMode::Refine | OracleMode::Barrier => {}
        }

        if config.mode.replays() {
            let dir = oracle.trace_dir.clone();
            let _ = oracle.load_mini_trace(&dir)?;
        }

        if let Err(e) = std::fs::create_dir_all(&oracle.trace_dir) {
            tracing::warn!(dir = %oracle.trace_dir.display(), error = %e, "cannot create trace directory");
        }

        let (index, header) = if config.mode == OracleMode::Trace {
            match shard::remove_shards_from(&oracle.trace_dir, 1) {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "removed stale refinement shards"),
                Err(e) => tracing::warn!(error = %e, "cannot remove stale refinement shards"),
            }
            (0, TRACE_HEADER)
        } else {
            (oracle.loaded_shards, REFINEMENT_HEADER)
        };
        let mini_path = shard::mini_trace_path(&oracle.trace_dir, index);
        oracle.mini_sink = Self::open_sink(&mini_path, header);
        if config.mode == OracleMode::Trace {
            oracle.full_sink = Self::open_sink(&shard::full_trace_path(&oracle.trace_dir), "");
        }

        tracing::info!(
            mode = ?config.mode,
            output = %mini_path.display(),
            loaded_shards = oracle.loaded_shards,
            "dependency oracle ready"
        );
        Ok(oracle)
    }

    /// Opens a sink, writing `header` as its first line when non-empty.
    fn open_sink(path: &Path, header: &str) -> Option<ShardWriter> {
        let result = ShardWriter::create(path).and_then(|mut w| {
            if !header.is_empty() {
                w.write_line(header)?;
            }
            Ok(w)
        });
        match result {
            Ok(w) => Some(w),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot open trace shard");
                None
            }
        }
    }

    /// Loads `mini_trace_0`, `mini_trace_1`, ... from `dir` until one is missing or
    /// empty, and returns how many were loaded by this call.
    ///
    /// # Errors
    ///
    /// Returns [`MemDepError::Io`] if a shard exists but cannot be read, and
    /// [`MemDepError::Parse`] on the first malformed line.
    pub fn load_mini_trace(&mut self, dir: &Path) -> Result<usize> {
        let mut loaded = 0;
        loop {
            let path = shard::mini_trace_path(dir, self.loaded_shards);
            let text = shard::read_shard(&path).map_err(|e| MemDepError::io(&path, e))?;
            let Some(text) = text.filter(|t| !t.is_empty()) else {
                tracing::info!(next = %path.display(), "no further trace shard");
                return Ok(loaded);
            };

            for (i, line) in text.lines().enumerate() {
                let record = MiniRecord::parse(line).map_err(|reason| TraceParseError {
                    path: path.clone(),
                    line: i + 1,
                    reason,
                })?;
                match record {
                    Some(MiniRecord::Dependency { consumer, producer }) => {
                        let producers = self.dependencies.entry(consumer).or_default();
                        if !producers.contains(&producer) {
                            producers.push(producer);
                            self.loaded_edges += 1;
                        }
                    }
                    Some(MiniRecord::Barrier(consumer)) => {
                        let _ = self.barriers.insert(consumer);
                    }
                    None => {}
                }
            }
            tracing::info!(path = %path.display(), edges = self.loaded_edges, "loaded trace shard");
            self.loaded_shards += 1;
            loaded += 1;
        }
    }

    /// Sequence numbers of the in-flight stores `inst` must wait for according to the
    /// loaded trace, ascending and without duplicates.
    ///
    /// A recorded producer that is in flight but younger than `inst` is logged and
    /// counted, never returned.
    pub fn check_inst(
        &self,
        inst: &DynInst,
        window: &InstanceTracker,
        stats: &mut MemDepStats,
    ) -> Vec<SeqNum> {
        if !self.mode.replays() || !inst.is_memory() {
            return Vec::new();
        }
        let uid = inst.uid();
        let mut out = Vec::new();

        for producer in self.dependencies_of(uid) {
            for entry in window.in_flight() {
                if entry.uid() != *producer || !entry.writes_memory() {
                    continue;
                }
                if entry.seq_num < inst.seq_num {
                    out.push(entry.seq_num);
                } else {
                    tracing::warn!(%uid, producer = %producer, "dependence requested on newer instruction");
                    stats.oracle_newer_producer += 1;
                }
            }
        }

        if self.barriers.contains(&uid) {
            out.extend(
                window
                    .in_flight()
                    .filter(|e| e.writes_memory() && e.seq_num < inst.seq_num)
                    .map(|e| e.seq_num),
            );
        }

        out.sort_unstable();
        out.dedup();
        out
    }

    /// Observes a committed instruction.
    ///
    /// `confirmed` is the violation the tracker confirmed on this commit, if any.
    pub fn record_committed(
        &mut self,
        inst: &DynInst,
        confirmed: Option<&ConfirmedViolation>,
        stats: &mut MemDepStats,
    ) {
        if self.closed {
            return;
        }
        match self.mode {
            OracleMode::Disabled | OracleMode::Run => return,
            OracleMode::Trace => {
                if inst.class == InstClass::CondBranch {
                    self.full_buffer.push(FullRecord::branch(
                        inst.uid(),
                        inst.seq_num,
                        inst.eff_seq_num,
                        inst.eff_addr,
                        inst.pred_taken,
                        inst.mispredicted,
                    ));
                } else if inst.is_memory() {
                    self.push_to_buffers(inst, stats);
                }
            }
            OracleMode::Refine | OracleMode::Barrier => {
                if let Some(confirmed) = confirmed {
                    self.record_refinement(confirmed, stats);
                }
            }
        }
        self.check_flush(stats);
    }

    fn record_refinement(&mut self, confirmed: &ConfirmedViolation, stats: &mut MemDepStats) {
        let signature = &confirmed.signature;
        let consumer = signature.uid_at_prediction();
        if self.mode == OracleMode::Barrier {
            tracing::debug!(%consumer, "oracle barrier");
            self.mini_buffer.push(MiniRecord::Barrier(consumer));
            stats.oracle_barriers += 1;
            return;
        }
        let Some(producer) = signature.producer else {
            tracing::warn!(%consumer, "confirmed violation without a known producer; not refined");
            return;
        };
        tracing::debug!(
            %consumer,
            detected_as = %signature.violator,
            producer = %producer.uid,
            "oracle refine"
        );
        self.mini_buffer.push(MiniRecord::Dependency {
            consumer,
            producer: producer.uid,
        });
        stats.oracle_refinements += 1;
    }

    /// Records a committed memory access in `Trace` mode.
    pub fn push_to_buffers(&mut self, inst: &DynInst, stats: &mut MemDepStats) {
        let uid = inst.uid();
        let mut record = FullRecord {
            is_load: inst.is_load(),
            has_dep: false,
            uid,
            seq_num: inst.seq_num,
            eff_seq_num: inst.eff_seq_num,
            addr: inst.eff_addr,
            size: inst.eff_size,
            dep: TraceUid::NONE,
        };

        if inst.writes_memory() {
            for byte in inst.footprint() {
                let _ = self.forwarding.insert(byte, uid);
            }
        } else {
            let producers: BTreeSet<TraceUid> = inst
                .footprint()
                .filter_map(|byte| self.forwarding.get(&byte).copied())
                .collect();
            for producer in &producers {
                tracing::debug!(consumer = %uid, seq_num = inst.seq_num, %producer, "trace dependence");
                self.mini_buffer.push(MiniRecord::Dependency {
                    consumer: uid,
                    producer: *producer,
                });
            }
            stats.oracle_edges_recorded += producers.len() as u64;
            if let Some(first) = producers.first() {
                record.has_dep = true;
                record.dep = *first;
            }
        }
        self.full_buffer.push(record);
    }

    /// Flushes both buffers once either reaches the flush threshold.
    pub fn check_flush(&mut self, stats: &mut MemDepStats) {
        if self.full_buffer.len() >= self.flush_threshold
            || self.mini_buffer.len() >= self.flush_threshold
        {
            let dropped = self.flush_full_buffer() + self.flush_mini_buffer();
            stats.oracle_dropped_writes += dropped as u64;
        }
    }

    /// Writes the buffered mini-trace records and returns how many were dropped.
    pub fn flush_mini_buffer(&mut self) -> usize {
        let records = std::mem::take(&mut self.mini_buffer);
        let mut block = String::new();
        for rec in &records {
            // Writing into a String cannot fail.
            let _ = writeln!(block, "{rec}");
        }
        Self::write_or_drop(&mut self.mini_sink, &block, records.len())
    }

    /// Writes the buffered full-trace records and returns how many were dropped.
    pub fn flush_full_buffer(&mut self) -> usize {
        let records = std::mem::take(&mut self.full_buffer);
        let mut block = String::new();
        for rec in &records {
            let _ = writeln!(block, "{rec}");
        }
        Self::write_or_drop(&mut self.full_sink, &block, records.len())
    }

    fn write_or_drop(sink: &mut Option<ShardWriter>, block: &str, count: usize) -> usize {
        if count == 0 {
            return 0;
        }
        let Some(writer) = sink else {
            tracing::warn!(records = count, "trace shard unavailable; records dropped");
            return count;
        };
        match writer.write_block(block) {
            Ok(()) => 0,
            Err(e) => {
                tracing::warn!(path = %writer.path().display(), error = %e, "trace write failed; shard closed");
                *sink = None;
                count
            }
        }
    }

    /// Flushes both buffers and closes both shards. Only the first call does anything.
    ///
    /// Returns the number of records dropped.
    pub fn close(&mut self) -> usize {
        if self.closed {
            return 0;
        }
        self.closed = true;
        let dropped = self.flush_full_buffer() + self.flush_mini_buffer();
        for writer in [self.mini_sink.take(), self.full_sink.take()].into_iter().flatten() {
            let path = writer.path().to_path_buf();
            match writer.finish() {
                Ok(()) => tracing::debug!(path = %path.display(), "trace shard closed"),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "trace shard close failed"),
            }
        }
        dropped
    }

    /// Operating mode.
    pub const fn mode(&self) -> OracleMode {
        self.mode
    }

    /// Trace directory.
    pub fn trace_dir(&self) -> &Path {
        &self.trace_dir
    }

    /// Shards loaded so far; also the index of this run's output shard when replaying.
    pub const fn loaded_shards(&self) -> usize {
        self.loaded_shards
    }

    /// Distinct dependency edges loaded.
    pub const fn loaded_edges(&self) -> usize {
        self.loaded_edges
    }

    /// Recorded producers of `consumer`.
    pub fn dependencies_of(&self, consumer: TraceUid) -> &[TraceUid] {
        self.dependencies
            .get(&consumer)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// All loaded dependency edges, in no particular order.
    pub fn dependency_edges(&self) -> impl Iterator<Item = (TraceUid, TraceUid)> + '_ {
        self.dependencies
            .iter()
            .flat_map(|(c, ps)| ps.iter().map(move |p| (*c, *p)))
    }

    /// Returns true if `uid` is a loaded barrier.
    pub fn is_barrier(&self, uid: TraceUid) -> bool {
        self.barriers.contains(&uid)
    }

    /// Buffered mini-trace records.
    pub fn buffered_mini(&self) -> usize {
        self.mini_buffer.len()
    }

    /// Buffered full-trace records.
    pub fn buffered_full(&self) -> usize {
        self.full_buffer.len()
    }

    /// Returns true once `close` has run.
    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for DependencyOracle {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
