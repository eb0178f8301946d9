use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use ignore::WalkBuilder;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::task::{SearchTask, TaskEvent};
use crate::cancellation::CancellationToken;
use crate::config::{FailurePolicy, ScanRequest};
use crate::errors::{SearchError, SearchResult};
use crate::filters::should_include_file;
use crate::metrics::ScanStats;
use crate::reader::WorkbookSource;
use crate::results::{ProgressUpdate, ScanOutcome};
use crate::sink::EventSink;

/// Walks the root directory and returns every recognized workbook, sorted by path.
///
/// Enumeration is eager so the progress denominator is known before the first
/// task is scheduled.
pub fn discover_targets(request: &ScanRequest) -> Vec<PathBuf> {
    let mut builder = WalkBuilder::new(&request.root_path);
    builder.standard_filters(false).follow_links(false);

    let mut targets: Vec<PathBuf> = builder
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter(|entry| {
            should_include_file(
                entry.path(),
                &request.extensions,
                &request.ignore_patterns,
                request.skip_lock_files,
            )
        })
        .map(|entry| entry.into_path())
        .collect();

    targets.sort();
    targets
}

/// Counters of one run, touched only by the coordinator loop
struct RunState {
    total_files: usize,
    completed_files: usize,
    match_count: usize,
    /// Held back until the drain is over so it reaches the sink last
    aborted: Option<SearchError>,
    stats: ScanStats,
}

impl RunState {
    fn new(total_files: usize) -> Self {
        Self {
            total_files,
            completed_files: 0,
            match_count: 0,
            aborted: None,
            stats: ScanStats::new(total_files),
        }
    }

    fn next_index(&mut self) -> usize {
        let index = self.match_count;
        self.match_count += 1;
        index
    }

    fn advance(&mut self, current_file: PathBuf) -> ProgressUpdate {
        self.completed_files += 1;
        ProgressUpdate {
            completed_files: self.completed_files,
            total_files: self.total_files,
            current_file,
        }
    }
}

/// Everything the coordinator thread needs for one run
struct Run {
    request: ScanRequest,
    source: Arc<dyn WorkbookSource>,
    sink: Arc<dyn EventSink>,
    token: CancellationToken,
}

impl Run {
    fn execute(self, pool: ThreadPool) {
        let started = Instant::now();
        info!(
            "Starting {:?} scan under {}",
            self.request.matcher.mode(),
            self.request.root_path.display()
        );

        let targets = discover_targets(&self.request);
        info!("Found {} workbooks to search", targets.len());
        let mut state = RunState::new(targets.len());

        let (tx, rx) = unbounded::<TaskEvent>();
        for path in targets {
            let task = SearchTask::new(
                path,
                self.request.matcher.clone(),
                self.request.row_context,
                Arc::clone(&self.source),
                self.token.clone(),
            );
            let tx = tx.clone();
            pool.spawn(move || {
                task.run(|event| {
                    // The receiver only goes away once the run is over
                    let _ = tx.send(event);
                })
            });
        }
        drop(tx);

        // Drain until every task has dropped its sender so no work outlives the run
        for event in rx.iter() {
            if self.token.is_cancelled() {
                continue;
            }
            self.handle(event, &mut state);
        }

        state.stats.elapsed = started.elapsed();
        state.stats.log_stats();

        if let Some(error) = state.aborted.take() {
            info!("Scan aborted after {} matches", state.match_count);
            self.sink.on_stats(state.stats);
            self.sink.on_error(error);
        } else if self.token.is_cancelled() {
            debug!("Scan cancelled after {} matches", state.match_count);
        } else {
            info!(
                "Scan complete. Found {} matches in {} files",
                state.match_count, state.total_files
            );
            self.sink.on_stats(state.stats);
            self.sink.on_completed(state.match_count);
        }
    }

    fn handle(&self, event: TaskEvent, state: &mut RunState) {
        match event {
            TaskEvent::Match(record) => {
                let index = state.next_index();
                self.sink.on_match(index, record);
            }
            TaskEvent::Finished {
                path,
                outcome,
                stats,
            } => {
                state.stats.record_file(&stats, outcome.is_success());
                match outcome {
                    ScanOutcome::Success => {
                        let progress = state.advance(path);
                        self.sink.on_progress(progress);
                    }
                    ScanOutcome::Failure(message) => match self.request.failure_policy {
                        FailurePolicy::FailFast => {
                            warn!("Aborting scan, {} failed: {}", path.display(), message);
                            self.token.cancel();
                            state.aborted = Some(SearchError::run_aborted(path, message));
                        }
                        FailurePolicy::Continue => {
                            warn!("Skipping {}: {}", path.display(), message);
                            self.sink
                                .on_error(SearchError::file_access(path.clone(), message));
                            let progress = state.advance(path);
                            self.sink.on_progress(progress);
                        }
                    },
                }
            }
        }
    }
}

struct ActiveScan {
    token: CancellationToken,
    handle: JoinHandle<()>,
    /// Disconnects once the coordinator thread exits
    done: Receiver<()>,
}

impl ActiveScan {
    fn stop(self) {
        self.token.cancel();
        if self.handle.join().is_err() {
            warn!("Scan coordinator panicked");
        }
    }
}

/// Runs scans in the background and streams their events to one sink.
///
/// At most one run is active. Starting a new run cancels the previous one and waits
/// for its coordinator to drain, so the sink never sees events of two runs
/// interleaved. Sink callbacks run on the coordinator thread and must not call back
/// into the scanner.
pub struct Scanner {
    source: Arc<dyn WorkbookSource>,
    sink: Arc<dyn EventSink>,
    active: Mutex<Option<ActiveScan>>,
}

impl Scanner {
    pub fn new(source: Arc<dyn WorkbookSource>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            source,
            sink,
            active: Mutex::new(None),
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveScan>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cancels any run in flight, then starts `request` in the background.
    ///
    /// Returns once the new run is scheduled. Fails only if the worker pool or the
    /// coordinator thread cannot be created, in which case no run is active.
    pub fn start_scan(&self, request: ScanRequest) -> SearchResult<()> {
        self.cancel();

        let pool = ThreadPoolBuilder::new()
            .num_threads(request.concurrency.get())
            .thread_name(|i| format!("sheetscout-worker-{}", i))
            .build()
            .map_err(|e| SearchError::ThreadPool(e.to_string()))?;

        let token = CancellationToken::new();
        let run = Run {
            request,
            source: Arc::clone(&self.source),
            sink: Arc::clone(&self.sink),
            token: token.clone(),
        };

        let mut active = self.lock_active();
        // A concurrent start_scan may have slipped in between cancel and here
        if let Some(previous) = active.take() {
            previous.stop();
        }

        let (done_tx, done) = bounded::<()>(0);
        let handle = thread::Builder::new()
            .name("sheetscout-coordinator".to_string())
            .spawn(move || {
                let _done: Sender<()> = done_tx;
                run.execute(pool)
            })?;

        *active = Some(ActiveScan {
            token,
            handle,
            done,
        });
        Ok(())
    }

    /// Cancels the active run, if any, and waits for it to drain.
    ///
    /// Tasks that have not started are skipped, running tasks stop at their next
    /// sheet or row, and nothing more reaches the sink for that run.
    pub fn cancel(&self) {
        let previous = self.lock_active().take();
        if let Some(scan) = previous {
            scan.stop();
        }
    }

    /// Blocks until the active run has delivered its terminal event.
    ///
    /// The join handle stays with the scanner, so the run remains cancellable from
    /// another thread while this waits, and that cancel still drains the run.
    pub fn wait(&self) {
        let done = self.lock_active().as_ref().map(|scan| scan.done.clone());
        if let Some(done) = done {
            // Only ever disconnects, never receives
            let _ = done.recv();
        }
    }

    /// Returns true while a run is still delivering events
    pub fn is_running(&self) -> bool {
        self.lock_active().as_ref().is_some_and(|scan| {
            !matches!(scan.done.try_recv(), Err(TryRecvError::Disconnected))
        })
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::reader::{MemorySource, MemoryWorkbook};
    use crate::results::MatchRecord;
    use crate::sink::{CollectingSink, ScanEvent};
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Logs every call as `kind file`, optionally stalling inside `on_error`
    #[derive(Default)]
    struct LogSink {
        log: Mutex<Vec<String>>,
        error_delay: Option<Duration>,
    }

    impl LogSink {
        fn push(&self, entry: String) {
            self.log.lock().unwrap().push(entry);
        }

        fn entries(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    fn file_name(path: &std::path::Path) -> String {
        path.file_name().unwrap().to_string_lossy().into_owned()
    }

    impl EventSink for LogSink {
        fn on_match(&self, _index: usize, record: MatchRecord) {
            self.push(format!("match {}", file_name(&record.file_path)));
        }

        fn on_progress(&self, progress: ProgressUpdate) {
            self.push(format!("progress {}", file_name(&progress.current_file)));
        }

        fn on_error(&self, error: SearchError) {
            if let Some(delay) = self.error_delay {
                thread::sleep(delay);
            }
            let name = error.path().map(file_name).unwrap_or_default();
            self.push(format!("error {}", name));
        }

        fn on_completed(&self, total_matches: usize) {
            self.push(format!("completed {}", total_matches));
        }

        fn on_stats(&self, _stats: ScanStats) {
            self.push("stats".to_string());
        }
    }

    fn touch(dir: &std::path::Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn test_discover_targets() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "b.xlsx");
        touch(dir.path(), "a.XLSM");
        touch(dir.path(), "legacy.xls");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "~$b.xlsx");
        touch(dir.path(), ".hidden/c.xlsx");
        touch(dir.path(), "nested/deeper/d.xlsx");
        touch(dir.path(), "archive/e.xlsx");

        let mut config = ScanConfig::new("x", dir.path());
        config.ignore_patterns = vec!["**/archive/**".to_string()];
        let request = ScanRequest::new(&config).unwrap();

        let names: Vec<String> = discover_targets(&request)
            .iter()
            .map(|p| {
                p.strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        assert_eq!(
            names,
            vec![".hidden/c.xlsx", "a.XLSM", "b.xlsx", "nested/deeper/d.xlsx"]
        );
    }

    #[test]
    fn test_scanner_runs_to_completion() {
        let dir = tempdir().unwrap();
        let path = touch(dir.path(), "A.xlsx");
        let source = MemorySource::new().with_workbook(
            path,
            MemoryWorkbook::new().sheet("Sheet1", vec![vec!["foo", "bar"]]),
        );
        let sink = Arc::new(CollectingSink::new());
        let scanner = Scanner::new(Arc::new(source), sink.clone());

        let request = ScanRequest::new(&ScanConfig::new("foo", dir.path())).unwrap();
        scanner.start_scan(request).unwrap();
        scanner.wait();
        assert!(!scanner.is_running());

        let events = sink.take_events();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], ScanEvent::Match { index: 0, .. }));
        assert!(matches!(events[1], ScanEvent::Progress(_)));
        assert!(matches!(events[2], ScanEvent::Completed { total_matches: 1 }));
    }

    #[test]
    fn test_cancel_stops_delivery() {
        let dir = tempdir().unwrap();
        let mut source = MemorySource::new().with_open_latency(Duration::from_millis(20));
        for i in 0..40 {
            let path = touch(dir.path(), &format!("book_{:02}.xlsx", i));
            source.insert(path, MemoryWorkbook::new().sheet("S", vec![vec!["foo"]]));
        }
        let sink = Arc::new(CollectingSink::new());
        let scanner = Scanner::new(Arc::new(source), sink.clone());

        let mut config = ScanConfig::new("foo", dir.path());
        config.concurrency = std::num::NonZeroUsize::new(2).unwrap();
        scanner.start_scan(ScanRequest::new(&config).unwrap()).unwrap();
        thread::sleep(Duration::from_millis(50));
        scanner.cancel();
        assert!(!scanner.is_running());

        let delivered = sink.len();
        let events = sink.take_events();
        assert!(delivered < 80, "cancelled run delivered {} events", delivered);
        assert!(events.iter().all(|e| !e.is_terminal()));

        // nothing arrives after cancel returns
        thread::sleep(Duration::from_millis(100));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_cancel_without_run_is_noop() {
        let scanner = Scanner::new(
            Arc::new(MemorySource::new()),
            Arc::new(CollectingSink::new()),
        );
        scanner.cancel();
        scanner.wait();
        assert!(!scanner.is_running());
    }

    #[test]
    fn test_restart_while_waiting_drains_previous_run() {
        let old_dir = tempdir().unwrap();
        let new_dir = tempdir().unwrap();
        touch(old_dir.path(), "old.xlsx");
        let fresh = touch(new_dir.path(), "new.xlsx");
        let source = MemorySource::new()
            .with_workbook(fresh, MemoryWorkbook::new().sheet("S", vec![vec!["foo"]]));

        let sink = Arc::new(LogSink {
            error_delay: Some(Duration::from_millis(300)),
            ..LogSink::default()
        });
        let scanner = Scanner::new(Arc::new(source), sink.clone());

        let mut old_config = ScanConfig::new("foo", old_dir.path());
        old_config.failure_policy = FailurePolicy::Continue;
        scanner.start_scan(ScanRequest::new(&old_config).unwrap()).unwrap();

        thread::scope(|s| {
            s.spawn(|| scanner.wait());
            thread::sleep(Duration::from_millis(100));
            let request = ScanRequest::new(&ScanConfig::new("foo", new_dir.path())).unwrap();
            scanner.start_scan(request).unwrap();
        });
        scanner.wait();

        let log = sink.entries();
        let last_old = log.iter().rposition(|e| e.ends_with("old.xlsx"));
        let first_new = log.iter().position(|e| e.ends_with("new.xlsx")).unwrap();
        if let Some(last_old) = last_old {
            assert!(last_old < first_new, "runs interleaved: {:?}", log);
        }
        assert_eq!(log.last().map(String::as_str), Some("completed 1"));
        assert_eq!(log.iter().filter(|e| e.starts_with("completed")).count(), 1);
    }

    #[test]
    fn test_stats_precede_terminal_event() {
        let dir = tempdir().unwrap();
        let good = touch(dir.path(), "a.xlsx");
        touch(dir.path(), "b.xlsx");
        let source = MemorySource::new()
            .with_workbook(good, MemoryWorkbook::new().sheet("S", vec![vec!["foo"]]));
        let source: Arc<dyn WorkbookSource> = Arc::new(source);

        let sink = Arc::new(LogSink::default());
        let scanner = Scanner::new(Arc::clone(&source), sink.clone());
        scanner
            .start_scan(ScanRequest::new(&ScanConfig::new("foo", dir.path())).unwrap())
            .unwrap();
        scanner.wait();
        let log = sink.entries();
        assert_eq!(&log[log.len() - 2..], ["stats", "error b.xlsx"]);

        let sink = Arc::new(LogSink::default());
        let scanner = Scanner::new(source, sink.clone());
        let mut config = ScanConfig::new("foo", dir.path());
        config.failure_policy = FailurePolicy::Continue;
        scanner.start_scan(ScanRequest::new(&config).unwrap()).unwrap();
        scanner.wait();
        let log = sink.entries();
        assert_eq!(&log[log.len() - 2..], ["stats", "completed 1"]);
    }
}
