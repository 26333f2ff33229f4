//! Memory dependence statistics collection and reporting.
//!
//! This module tracks the counters the memory dependence unit decides to bump. It provides:
//! 1. **Window traffic:** Memory instructions dispatched, squashed, and committed.
//! 2. **Prediction:** Store-set predictions made and predictor wipes.
//! 3. **Violations:** Confirmed violations, load/store split, false vs. cold mispredictions,
//!    and the squash-to-commit distance histogram.
//! 4. **Oracle:** Trace edges recorded, refinements, barriers, and dropped writes.

use std::fmt;

/// Number of power-of-two buckets in a [`Histogram`].
const HISTOGRAM_BUCKETS: usize = 16;

/// Power-of-two bucketed histogram.
///
/// Bucket 0 holds the value 0, bucket `i > 0` holds values in `[2^(i-1), 2^i)`, and the
/// last bucket absorbs everything larger.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Histogram {
    buckets: [u64; HISTOGRAM_BUCKETS],
    samples: u64,
    sum: u64,
    max: u64,
}

impl Histogram {
    /// Records one sample.
    pub fn record(&mut self, value: u64) {
        let bucket = (u64::BITS - value.leading_zeros()) as usize;
        self.buckets[bucket.min(HISTOGRAM_BUCKETS - 1)] += 1;
        self.samples += 1;
        self.sum = self.sum.saturating_add(value);
        self.max = self.max.max(value);
    }

    /// Number of samples recorded.
    pub const fn samples(&self) -> u64 {
        self.samples
    }

    /// Largest sample recorded.
    pub const fn max(&self) -> u64 {
        self.max
    }

    /// Mean of all samples, or 0 when empty.
    pub fn mean(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.sum as f64 / self.samples as f64
        }
    }

    /// Count in bucket `i`.
    pub fn bucket(&self, i: usize) -> u64 {
        self.buckets.get(i).copied().unwrap_or(0)
    }

    /// Inclusive lower bound of bucket `i`.
    pub const fn bucket_floor(i: usize) -> u64 {
        if i == 0 { 0 } else { 1 << (i - 1) }
    }
}

impl fmt::Display for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, count) in self.buckets.iter().enumerate().filter(|(_, c)| **c > 0) {
            let lo = Self::bucket_floor(i);
            if i == HISTOGRAM_BUCKETS - 1 {
                writeln!(f, "    [{lo:>6}, inf)    {count}")?;
            } else if i == 0 {
                writeln!(f, "    [{lo:>6}]         {count}")?;
            } else {
                writeln!(f, "    [{lo:>6}, {:>6})  {count}", 1u64 << i)?;
            }
        }
        Ok(())
    }
}

/// Memory dependence statistics.
#[derive(Clone, Debug, Default)]
pub struct MemDepStats {
    /// Memory instructions accepted into the in-flight window.
    pub mem_dispatched: u64,
    /// Memory instructions squashed out of the window.
    pub mem_squashed: u64,
    /// Loads committed.
    pub loads_committed: u64,
    /// Stores committed.
    pub stores_committed: u64,
    /// Atomics committed.
    pub atomics_committed: u64,
    /// All instructions committed (memory or not).
    pub uops_committed: u64,

    /// Dispatched memory instructions for which the store-set predictor named a producer.
    pub store_set_predictions: u64,
    /// Dispatched memory instructions for which the oracle named at least one producer.
    pub oracle_predictions: u64,
    /// Store-set table wipes triggered by the clear period.
    pub predictor_clears: u64,

    /// Confirmed memory-order violations.
    pub violations: u64,
    /// Confirmed violations whose violator was a load.
    pub violations_by_load: u64,
    /// Confirmed violations whose violator was a store or atomic.
    pub violations_by_store: u64,
    /// Violations where a dependency had been predicted, but not the right one.
    pub mispredictions_false: u64,
    /// Violations where no dependency had been predicted.
    pub mispredictions_cold: u64,
    /// Instructions retired between the arming squash and the confirming commit.
    pub squash_to_commit: Histogram,

    /// Mini-trace edges recorded in `Trace` mode.
    pub oracle_edges_recorded: u64,
    /// Refinement edges written in `Refine` mode.
    pub oracle_refinements: u64,
    /// Barrier records written in `Barrier` mode.
    pub oracle_barriers: u64,
    /// Replayed dependencies that resolved to a younger instruction.
    pub oracle_newer_producer: u64,
    /// Trace writes skipped because the shard was unavailable.
    pub oracle_dropped_writes: u64,
}

/// Section names for selective stats output.
///
/// Pass an empty slice to `print_sections` to print all sections.
pub const STATS_SECTIONS: &[&str] = &["window", "predictor", "violations", "oracle"];

impl MemDepStats {
    /// Prints only the requested statistics sections to stdout.
    ///
    /// Each element of `sections` should be one of [`STATS_SECTIONS`].
    pub fn print_sections(&self, sections: &[String]) {
        print!("{}", self.render(sections));
    }

    /// Prints all statistics sections.
    pub fn print(&self) {
        self.print_sections(&[]);
    }

    /// Renders the requested sections to a string.
    pub fn render(&self, sections: &[String]) -> String {
        use std::fmt::Write;

        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);
        let mut out = String::new();

        // Writing into a String cannot fail.
        if want("window") {
            let _ = writeln!(out, "WINDOW");
            let _ = writeln!(out, "  mem_dispatched           {}", self.mem_dispatched);
            let _ = writeln!(out, "  mem_squashed             {}", self.mem_squashed);
            let _ = writeln!(out, "  loads_committed          {}", self.loads_committed);
            let _ = writeln!(out, "  stores_committed         {}", self.stores_committed);
            let _ = writeln!(out, "  atomics_committed        {}", self.atomics_committed);
            let _ = writeln!(out, "  uops_committed           {}", self.uops_committed);
        }
        if want("predictor") {
            let _ = writeln!(out, "PREDICTOR");
            let _ = writeln!(out, "  store_set_predictions    {}", self.store_set_predictions);
            let _ = writeln!(out, "  oracle_predictions       {}", self.oracle_predictions);
            let _ = writeln!(out, "  clears                   {}", self.predictor_clears);
        }
        if want("violations") {
            let _ = writeln!(out, "VIOLATIONS");
            let _ = writeln!(out, "  total                    {}", self.violations);
            let _ = writeln!(out, "  by_load                  {}", self.violations_by_load);
            let _ = writeln!(out, "  by_store                 {}", self.violations_by_store);
            let _ = writeln!(out, "  mispredict_false         {}", self.mispredictions_false);
            let _ = writeln!(out, "  mispredict_cold          {}", self.mispredictions_cold);
            let _ = writeln!(
                out,
                "  squash_to_commit         mean={:.2} max={}",
                self.squash_to_commit.mean(),
                self.squash_to_commit.max()
            );
            let _ = write!(out, "{}", self.squash_to_commit);
        }
        if want("oracle") {
            let _ = writeln!(out, "ORACLE");
            let _ = writeln!(out, "  edges_recorded           {}", self.oracle_edges_recorded);
            let _ = writeln!(out, "  refinements              {}", self.oracle_refinements);
            let _ = writeln!(out, "  barriers                 {}", self.oracle_barriers);
            let _ = writeln!(out, "  newer_producer           {}", self.oracle_newer_producer);
            let _ = writeln!(out, "  dropped_writes           {}", self.oracle_dropped_writes);
        }
        out
    }
}
