//! Three-tape polyphase merge
//!
//! Distributes the initial sorted runs across two tapes in Fibonacci
//! proportion (padding with virtual dummy runs), then repeatedly merges
//! pairs from the two input tapes onto the empty one until a single run
//! remains. Only two readers are ever open at once, which keeps
//! file-descriptor pressure flat and reads sequential regardless of how
//! many runs arrive.
//!
//! A tape is bookkeeping only: a FIFO of run paths plus a dummy count.
//! Dummy runs model already-exhausted inputs, so merging one with a real
//! run passes the real run through without touching the disk.

use crate::error::{IoContext, SortResult};
use crate::line_io::{LineReader, LineWriter};
use crate::line_key::{self, LineKey};
use crate::merge::MergeStrategy;
use crate::temp_store::TempStore;
use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// One tape slot: a run file on disk or a virtual empty run
enum Run {
    Real(PathBuf),
    Dummy,
}

/// FIFO queue of run paths plus a count of dummy runs
struct Tape {
    runs: VecDeque<PathBuf>,
    dummies: usize,
}

impl Tape {
    fn new() -> Self {
        Self {
            runs: VecDeque::new(),
            dummies: 0,
        }
    }

    fn count(&self) -> usize {
        self.runs.len() + self.dummies
    }

    fn push(&mut self, run: Run) {
        match run {
            Run::Real(path) => self.runs.push_back(path),
            Run::Dummy => self.dummies += 1,
        }
    }

    /// Dummies are consumed first; they model inputs that emptied early.
    fn pop(&mut self) -> Run {
        if self.dummies > 0 {
            self.dummies -= 1;
            Run::Dummy
        } else {
            Run::Real(
                self.runs
                    .pop_front()
                    .expect("tape count promised a run"),
            )
        }
    }
}

/// Polyphase merge strategy over three tapes
pub struct PolyphaseMerge {
    read_buf_bytes: usize,
    write_buf_bytes: usize,
}

impl PolyphaseMerge {
    pub fn new(read_buf_bytes: usize, write_buf_bytes: usize) -> Self {
        Self {
            read_buf_bytes,
            write_buf_bytes,
        }
    }

    /// Place runs on the two input tapes in Fibonacci proportion.
    ///
    /// With `(F_k, F_{k-1})` the smallest Fibonacci pair where `F_k >= n`,
    /// the first tape takes `F_{k-1}` real runs and the second the rest
    /// plus `F_k - n` dummies.
    fn distribute(inputs: &[PathBuf]) -> (Tape, Tape) {
        let n = inputs.len();
        let (mut prev, mut curr) = (1usize, 1usize);
        while curr < n {
            let next = prev + curr;
            prev = curr;
            curr = next;
        }

        let split = prev.min(n);
        let mut first = Tape::new();
        let mut second = Tape::new();
        for path in &inputs[..split] {
            first.push(Run::Real(path.clone()));
        }
        for path in &inputs[split..] {
            second.push(Run::Real(path.clone()));
        }
        for _ in 0..curr - n {
            second.push(Run::Dummy);
        }
        (first, second)
    }

    fn merge_pair(
        &self,
        x: Run,
        y: Run,
        initial: &HashSet<PathBuf>,
        store: &TempStore,
    ) -> SortResult<Run> {
        match (x, y) {
            (Run::Dummy, Run::Dummy) => Ok(Run::Dummy),
            (Run::Real(path), Run::Dummy) | (Run::Dummy, Run::Real(path)) => Ok(Run::Real(path)),
            (Run::Real(a), Run::Real(b)) => {
                let merged = self.merge_two(&a, &b, store)?;
                // Consumed runs are gone; original inputs stay with the caller
                if !initial.contains(&a) {
                    store.delete_best_effort(&a);
                }
                if !initial.contains(&b) {
                    store.delete_best_effort(&b);
                }
                Ok(Run::Real(merged))
            }
        }
    }

    /// Two-way streaming merge with one buffered reader per input.
    fn merge_two(&self, a: &Path, b: &Path, store: &TempStore) -> SortResult<PathBuf> {
        let output = store.new_merge_path();
        let mut reader_a = LineReader::open(a, self.read_buf_bytes).temp_context(a)?;
        let mut reader_b = LineReader::open(b, self.read_buf_bytes).temp_context(b)?;
        let mut writer = LineWriter::create(&output, self.write_buf_bytes).temp_context(&output)?;

        let mut line_a = Vec::new();
        let mut line_b = Vec::new();
        let mut have_a = reader_a.read_line(&mut line_a).temp_context(a)?;
        let mut have_b = reader_b.read_line(&mut line_b).temp_context(b)?;
        let mut key_a = LineKey::parse(&line_a);
        let mut key_b = LineKey::parse(&line_b);

        while have_a && have_b {
            let take_a =
                line_key::compare(&line_a, &key_a, &line_b, &key_b) != Ordering::Greater;
            if take_a {
                writer.write_line(&line_a).temp_context(&output)?;
                have_a = reader_a.read_line(&mut line_a).temp_context(a)?;
                key_a = LineKey::parse(&line_a);
            } else {
                writer.write_line(&line_b).temp_context(&output)?;
                have_b = reader_b.read_line(&mut line_b).temp_context(b)?;
                key_b = LineKey::parse(&line_b);
            }
        }
        while have_a {
            writer.write_line(&line_a).temp_context(&output)?;
            have_a = reader_a.read_line(&mut line_a).temp_context(a)?;
        }
        while have_b {
            writer.write_line(&line_b).temp_context(&output)?;
            have_b = reader_b.read_line(&mut line_b).temp_context(b)?;
        }

        writer.finish().temp_context(&output)?;
        Ok(output)
    }

    /// The final survivor may be an untouched caller input; the published
    /// run must be store-owned, so copy it out in that case.
    fn claim(
        &self,
        run: Run,
        initial: &HashSet<PathBuf>,
        store: &TempStore,
    ) -> SortResult<PathBuf> {
        match run {
            Run::Real(path) if !initial.contains(&path) => Ok(path),
            Run::Real(path) => {
                let output = store.new_merge_path();
                std::fs::copy(&path, &output).temp_context(&output)?;
                Ok(output)
            }
            Run::Dummy => {
                // No real input at all: the merged result is empty
                let output = store.new_merge_path();
                std::fs::File::create(&output).temp_context(&output)?;
                Ok(output)
            }
        }
    }
}

impl MergeStrategy for PolyphaseMerge {
    fn merge(&self, inputs: &[PathBuf], store: &TempStore) -> SortResult<PathBuf> {
        let initial: HashSet<PathBuf> = inputs.iter().cloned().collect();

        let (first, second) = Self::distribute(inputs);
        let mut tapes = [first, second, Tape::new()];
        let (mut a, mut b, mut out) = (0usize, 1usize, 2usize);

        let mut total = tapes[a].count() + tapes[b].count();
        while total > 1 {
            let pairs = tapes[a].count().min(tapes[b].count());
            for _ in 0..pairs {
                let x = tapes[a].pop();
                let y = tapes[b].pop();
                let merged = self.merge_pair(x, y, &initial, store)?;
                tapes[out].push(merged);
            }
            total -= pairs;

            // The emptied input tape becomes the next output
            let emptied = if tapes[a].count() == 0 { a } else { b };
            if emptied == a {
                a = out;
            } else {
                b = out;
            }
            out = emptied;
        }

        let survivor = [a, b, out]
            .into_iter()
            .find(|&t| tapes[t].count() == 1)
            .map(|t| tapes[t].pop())
            .unwrap_or(Run::Dummy);
        self.claim(survivor, &initial, store)
    }
}
