//! Pipeline choreography: splitter → run sorters → mergers
//!
//! One splitter thread feeds unsorted chunk paths into a bounded channel;
//! a pool of run-sorter workers turns them into sorted runs on a second
//! bounded channel; a pool of merger workers folds sorted runs together in
//! fanout-sized batches. The bounds give backpressure end to end: the
//! splitter stalls when sorting falls behind, sorters stall when merging
//! falls behind, and peak memory stays at chunk size times worker count.
//!
//! Every worker checks the shared cancellation token at each channel
//! interaction. The first real fault lands in an error slot, flips the
//! token, and the remaining workers drain out; in-flight file writes are
//! always completed so the temp directory never holds torn files.

use crate::chunk_sort;
use crate::config::{MergeKind, SortConfig};
use crate::error::{IoContext, SortError, SortResult};
use crate::line_io::LineWriter;
use crate::merge::{KWayMerge, MergeStrategy};
use crate::polyphase::PolyphaseMerge;
use crate::run_sorter::RunSorter;
use crate::splitter::Splitter;
use crate::temp_store::TempStore;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use memmap2::Mmap;
use parking_lot::Mutex;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// How long a blocked channel operation waits between cancellation checks
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Cooperative cancellation flag shared by every worker
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What one pipeline run did, for logging and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortSummary {
    /// Runs cut from the input by the splitter
    pub runs_split: u64,
    /// Runs sorted in memory (equals `runs_split` on the external path)
    pub runs_sorted: u64,
    /// Merge invocations, counting the final cross-worker union
    pub merge_passes: u64,
    /// True when the input fit a single chunk and skipped the run files
    pub in_memory: bool,
}

#[derive(Default)]
struct Counters {
    runs_split: AtomicU64,
    runs_sorted: AtomicU64,
    merge_passes: AtomicU64,
}

impl Counters {
    fn summary(&self) -> SortSummary {
        SortSummary {
            runs_split: self.runs_split.load(Ordering::Relaxed),
            runs_sorted: self.runs_sorted.load(Ordering::Relaxed),
            merge_passes: self.merge_passes.load(Ordering::Relaxed),
            in_memory: false,
        }
    }
}

/// Holds the first fault observed by any worker and cancels the rest
struct ErrorSlot {
    first: Mutex<Option<SortError>>,
    cancel: CancelToken,
}

impl ErrorSlot {
    fn new(cancel: CancelToken) -> Self {
        Self {
            first: Mutex::new(None),
            cancel,
        }
    }

    fn report(&self, err: SortError) {
        let mut slot = self.first.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
        self.cancel.cancel();
    }

    fn take(&self) -> Option<SortError> {
        self.first.lock().take()
    }
}

/// Blocking send that stays responsive to cancellation
fn send_checked<T>(tx: &Sender<T>, mut value: T, cancel: &CancelToken) -> SortResult<()> {
    loop {
        if cancel.is_cancelled() {
            return Err(SortError::Cancelled);
        }
        match tx.send_timeout(value, CANCEL_POLL) {
            Ok(()) => return Ok(()),
            Err(SendTimeoutError::Timeout(v)) => value = v,
            Err(SendTimeoutError::Disconnected(_)) => return Err(SortError::Cancelled),
        }
    }
}

/// Blocking receive that stays responsive to cancellation; `None` means the
/// channel is closed and drained
fn recv_checked<T>(rx: &Receiver<T>, cancel: &CancelToken) -> SortResult<Option<T>> {
    loop {
        if cancel.is_cancelled() {
            return Err(SortError::Cancelled);
        }
        match rx.recv_timeout(CANCEL_POLL) {
            Ok(value) => return Ok(Some(value)),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Ok(None),
        }
    }
}

/// External-sort pipeline over one input file
pub struct Pipeline {
    config: SortConfig,
    cancel: CancelToken,
}

impl Pipeline {
    pub fn new(config: SortConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Token for cancelling this pipeline from another thread
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn strategy(&self) -> Arc<dyn MergeStrategy> {
        let read_buf = self.config.read_buf_bytes;
        let write_buf = self.config.write_buf_bytes;
        match self.config.merge_kind {
            MergeKind::Polyphase => Arc::new(PolyphaseMerge::new(read_buf, write_buf)),
            MergeKind::KWay => Arc::new(KWayMerge::new(
                self.config.merge_fanout,
                read_buf,
                write_buf,
            )),
        }
    }

    /// Sort `input` into `output`. On success the temp directory is gone;
    /// on cancellation it is kept only when the config asks for it.
    pub fn run(&self, input: &Path, output: &Path) -> SortResult<SortSummary> {
        self.config.validate()?;
        let store = Arc::new(TempStore::create(self.config.temp_dir.as_deref())?);

        let result = self.run_inner(input, output, &store);
        if self.config.keep_temp_on_cancel {
            if let Err(err) = &result {
                if err.is_cancelled() {
                    store.persist();
                }
            }
        }
        result
    }

    /// Publish a finished temp file at the destination; on failure the
    /// temp directory is retained so the sorted data is not lost.
    fn publish(&self, store: &TempStore, result: PathBuf, output: &Path) -> SortResult<()> {
        store.move_atomic(&result, output, true).map_err(|source| {
            store.persist();
            SortError::OutputNotWritable {
                path: output.to_path_buf(),
                retained: result.clone(),
                source,
            }
        })
    }

    /// Inputs that fit one chunk skip the run-file machinery entirely.
    fn sort_in_memory(
        &self,
        input: &Path,
        output: &Path,
        store: &TempStore,
    ) -> SortResult<SortSummary> {
        let sorted = store.new_sorted_path();

        let file = File::open(input).input_context(input)?;
        let len = file.metadata().input_context(input)?.len();
        if len == 0 {
            File::create(&sorted).temp_context(&sorted)?;
        } else {
            let mmap = unsafe { Mmap::map(&file) }.input_context(input)?;
            let mut entries = chunk_sort::parse_buffer(&mmap);
            chunk_sort::sort(&mmap, &mut entries);

            let mut writer =
                LineWriter::create(&sorted, self.config.write_buf_bytes).temp_context(&sorted)?;
            for entry in &entries {
                writer.write_line(entry.line(&mmap)).temp_context(&sorted)?;
            }
            writer.finish().temp_context(&sorted)?;
        }

        self.publish(store, sorted, output)?;
        Ok(SortSummary {
            runs_split: 0,
            runs_sorted: 1,
            merge_passes: 0,
            in_memory: true,
        })
    }

    fn run_inner(
        &self,
        input: &Path,
        output: &Path,
        store: &Arc<TempStore>,
    ) -> SortResult<SortSummary> {
        if self.cancel.is_cancelled() {
            return Err(SortError::Cancelled);
        }

        let input_size = std::fs::metadata(input).input_context(input)?.len();
        if input_size <= self.config.chunk_bytes as u64 {
            return self.sort_in_memory(input, output, store);
        }

        let errors = Arc::new(ErrorSlot::new(self.cancel.clone()));
        let counters = Arc::new(Counters::default());
        let strategy = self.strategy();
        let workers = self.config.max_concurrency;
        let fanout = self.config.merge_fanout;
        let capacity = self.config.channel_capacity();

        let (unsorted_tx, unsorted_rx) = bounded::<PathBuf>(capacity);
        let (sorted_tx, sorted_rx) = bounded::<PathBuf>(capacity);

        let mut finals: Vec<PathBuf> = Vec::new();

        thread::scope(|scope| {
            // Splitter: single producer; dropping the sender closes the channel
            {
                let splitter = Splitter::new(
                    self.config.chunk_bytes,
                    self.config.read_buf_bytes,
                    self.config.write_buf_bytes,
                );
                let store = Arc::clone(store);
                let errors = Arc::clone(&errors);
                let counters = Arc::clone(&counters);
                let cancel = self.cancel.clone();
                let input = input.to_path_buf();
                scope.spawn(move || {
                    let tx = unsorted_tx;
                    match splitter.split(&input, store) {
                        Ok(runs) => {
                            for run in runs {
                                match run {
                                    Ok(path) => {
                                        counters.runs_split.fetch_add(1, Ordering::Relaxed);
                                        if send_checked(&tx, path, &cancel).is_err() {
                                            break;
                                        }
                                    }
                                    Err(err) => {
                                        errors.report(err);
                                        break;
                                    }
                                }
                            }
                        }
                        Err(err) => errors.report(err),
                    }
                });
            }

            // Run sorters: the sorted channel closes when the last clone of
            // sorted_tx is dropped, i.e. when every sorter has exited
            for _ in 0..workers {
                let rx = unsorted_rx.clone();
                let tx = sorted_tx.clone();
                let store = Arc::clone(store);
                let errors = Arc::clone(&errors);
                let counters = Arc::clone(&counters);
                let cancel = self.cancel.clone();
                let sorter = RunSorter::new(self.config.write_buf_bytes);
                scope.spawn(move || loop {
                    match recv_checked(&rx, &cancel) {
                        Ok(Some(path)) => match sorter.sort_run(&path, &store) {
                            Ok(sorted) => {
                                counters.runs_sorted.fetch_add(1, Ordering::Relaxed);
                                if send_checked(&tx, sorted, &cancel).is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                errors.report(err);
                                break;
                            }
                        },
                        Ok(None) => break,
                        Err(_) => break,
                    }
                });
            }
            drop(unsorted_rx);
            drop(sorted_tx);

            // Mergers: fold fanout-sized batches as runs arrive, then reduce
            // the remainder once the channel closes
            let mut handles = Vec::with_capacity(workers);
            for _ in 0..workers {
                let rx = sorted_rx.clone();
                let store = Arc::clone(store);
                let errors = Arc::clone(&errors);
                let counters = Arc::clone(&counters);
                let cancel = self.cancel.clone();
                let strategy = Arc::clone(&strategy);
                handles.push(scope.spawn(move || -> Option<PathBuf> {
                    let mut batch: Vec<PathBuf> = Vec::with_capacity(fanout);
                    loop {
                        match recv_checked(&rx, &cancel) {
                            Ok(Some(path)) => {
                                batch.push(path);
                                if batch.len() >= fanout {
                                    counters.merge_passes.fetch_add(1, Ordering::Relaxed);
                                    match strategy.merge(&batch, &store) {
                                        Ok(merged) => {
                                            for consumed in &batch {
                                                store.delete_best_effort(consumed);
                                            }
                                            batch.clear();
                                            batch.push(merged);
                                        }
                                        Err(err) => {
                                            errors.report(err);
                                            return None;
                                        }
                                    }
                                }
                            }
                            Ok(None) => break,
                            Err(_) => return None,
                        }
                    }

                    match batch.len() {
                        0 => None,
                        1 => batch.pop(),
                        _ => {
                            counters.merge_passes.fetch_add(1, Ordering::Relaxed);
                            match strategy.merge(&batch, &store) {
                                Ok(merged) => {
                                    for consumed in &batch {
                                        store.delete_best_effort(consumed);
                                    }
                                    Some(merged)
                                }
                                Err(err) => {
                                    errors.report(err);
                                    None
                                }
                            }
                        }
                    }
                }));
            }
            drop(sorted_rx);

            for handle in handles {
                let worker_final = handle.join().expect("merger worker panicked");
                if let Some(path) = worker_final {
                    finals.push(path);
                }
            }
        });

        if let Some(err) = errors.take() {
            return Err(err);
        }
        if self.cancel.is_cancelled() {
            return Err(SortError::Cancelled);
        }

        // At most one run per merger remains; unify and publish
        let result = match finals.len() {
            0 => {
                // Nothing survived splitting (e.g. all-blank input): the
                // published output is empty
                let empty = store.new_merge_path();
                File::create(&empty).temp_context(&empty)?;
                empty
            }
            1 => finals.remove(0),
            _ => {
                counters.merge_passes.fetch_add(1, Ordering::Relaxed);
                let merged = strategy.merge(&finals, store)?;
                for path in &finals {
                    store.delete_best_effort(path);
                }
                merged
            }
        };

        self.publish(store, result, output)?;
        Ok(counters.summary())
    }
}
