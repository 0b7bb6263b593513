//! Page-level OCR fan-out.
//!
//! Each worker runs on the blocking thread pool, pulls whole pages off a
//! shared queue and keeps one recognizer per language for its lifetime.
//! Pages come back in completion order; the caller gets them keyed by page.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use customs_grid_core::group::{Group, GroupPlan};
use customs_grid_core::progress::{reorder_pages, ProgressTracker};
use image::RgbImage;
use pdf::Rect;

use super::engine::{recognize_cell, RecognizerFactory, TextRecognizer};
use crate::prelude::*;

/// Upper bound on concurrent workers.
pub const MAX_WORKERS: usize = 8;

/// Everything a worker needs for one page.  Owned outright, nothing is
/// shared with the coordinator.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// 0-based page index.
    pub page: usize,
    pub lang: String,
    pub image: RgbImage,
    /// Pixels per page point.
    pub scale: f32,
    /// Cell rectangles of the table, row by row.
    pub cells: Vec<Vec<Option<Rect>>>,
    pub plans: Vec<GroupPlan>,
    pub threshold: u8,
}

/// Receives the completed-page percentage after every page.
pub trait ProgressObserver: Send + Sync {
    fn report(&self, percent: u8);
}

impl ProgressObserver for indicatif::ProgressBar {
    fn report(&self, percent: u8) {
        self.set_position(u64::from(percent));
    }
}

pub struct WorkerPool {
    workers: usize,
    factory: Arc<dyn RecognizerFactory>,
}

impl WorkerPool {
    /// `requested` is clamped to `1..=MAX_WORKERS`.
    pub fn new(requested: usize, factory: Arc<dyn RecognizerFactory>) -> Self {
        Self {
            workers: requested.clamp(1, MAX_WORKERS),
            factory,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Recognize every group of every page.  Pages whose groups come back
    /// empty are left out of the result.
    pub async fn run(
        &self,
        items: Vec<WorkItem>,
        observer: Option<&dyn ProgressObserver>,
    ) -> Result<BTreeMap<usize, Vec<Group>>> {
        let total = items.len();
        if total == 0 {
            return Ok(BTreeMap::new());
        }

        let (job_tx, job_rx) = async_channel::bounded::<WorkItem>(total);
        let (result_tx, result_rx) = async_channel::bounded::<(usize, Vec<Group>)>(total);

        for item in items {
            job_tx
                .send(item)
                .await
                .map_err(|e| Error::Worker(e.to_string()))?;
        }
        job_tx.close();

        let workers = self.workers.min(total);
        log::info!("recognizing {} pages with {} workers", total, workers);

        let handles: Vec<_> = (0..workers)
            .map(|id| {
                let jobs = job_rx.clone();
                let results = result_tx.clone();
                let factory = Arc::clone(&self.factory);
                tokio::task::spawn_blocking(move || worker_loop(id, jobs, results, factory))
            })
            .collect();
        drop(result_tx);

        let mut tracker = ProgressTracker::new(total);
        let mut completed = Vec::with_capacity(total);
        while let Ok((page, groups)) = result_rx.recv().await {
            log::debug!("page {}: {} groups recognized", page + 1, groups.len());
            let percent = tracker.complete_one();
            if let Some(observer) = observer {
                observer.report(percent);
            }
            completed.push((page, groups));
        }

        for handle in handles {
            handle.await.map_err(|e| Error::Worker(e.to_string()))?;
        }

        if !tracker.is_done() {
            return Err(eyre!(Error::Worker(f!(
                "{} of {} pages finished",
                tracker.completed(),
                total
            ))));
        }

        Ok(reorder_pages(
            completed.into_iter().filter(|(_, groups)| !groups.is_empty()),
        ))
    }
}

fn worker_loop(
    id: usize,
    jobs: async_channel::Receiver<WorkItem>,
    results: async_channel::Sender<(usize, Vec<Group>)>,
    factory: Arc<dyn RecognizerFactory>,
) {
    let mut engines: HashMap<String, Box<dyn TextRecognizer>> = HashMap::new();

    while let Ok(item) = jobs.recv_blocking() {
        log::info!("worker {}: page {}", id, item.page + 1);

        if !engines.contains_key(&item.lang) {
            log::info!("worker {}: loading OCR model for '{}'", id, item.lang);
            match factory.create(&item.lang) {
                Ok(engine) => {
                    engines.insert(item.lang.clone(), engine);
                }
                Err(e) => log::error!("worker {}: page {}: {}", id, item.page + 1, e),
            }
        }

        let groups = match engines.get_mut(&item.lang) {
            Some(engine) => process_page(engine.as_mut(), &item),
            None => Vec::new(),
        };

        if results.send_blocking((item.page, groups)).is_err() {
            break;
        }
    }
}

/// Recognize the cells of every planned group on one page, sequentially.
/// Absent cells are skipped, so rows line up with `original_rows`.
pub fn process_page(engine: &mut dyn TextRecognizer, item: &WorkItem) -> Vec<Group> {
    let mut groups = Vec::with_capacity(item.plans.len());

    for plan in &item.plans {
        let mut rows = Vec::with_capacity(plan.row_count);
        for row in item.cells.get(plan.rows()).unwrap_or_default() {
            let mut texts = Vec::with_capacity(row.len());
            for rect in row.iter().flatten() {
                texts.push(recognize_cell(
                    engine,
                    &item.image,
                    rect,
                    item.scale,
                    item.threshold,
                ));
            }
            rows.push(texts);
        }
        groups.push(plan.clone().into_group(rows));
    }

    groups
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use image::Rgb;

    use super::super::engine::OcrError;
    use super::*;

    /// Reads each cell as the width of its crop, so results are easy to
    /// predict.  Fails on crops `fail_width` pixels wide, panics on crops
    /// `panic_width` pixels wide and sleeps `delay` before every crop.
    struct Fixture {
        fail_width: Option<u32>,
        panic_width: Option<u32>,
        delay: Duration,
    }

    impl TextRecognizer for Fixture {
        fn recognize(&mut self, image: &RgbImage) -> Result<Vec<String>, OcrError> {
            std::thread::sleep(self.delay);
            if Some(image.width()) == self.fail_width {
                return Err(OcrError::Recognition("bad crop".into()));
            }
            if Some(image.width()) == self.panic_width {
                panic!("recognizer crashed on a {}px crop", image.width());
            }
            Ok(vec![f!("w{}", image.width())])
        }
    }

    struct FixtureFactory {
        created: AtomicUsize,
        fail_width: Option<u32>,
        panic_width: Option<u32>,
        delays: HashMap<String, Duration>,
    }

    impl FixtureFactory {
        fn new(fail_width: Option<u32>) -> Self {
            Self {
                created: AtomicUsize::new(0),
                fail_width,
                panic_width: None,
                delays: HashMap::new(),
            }
        }
    }

    impl RecognizerFactory for FixtureFactory {
        fn create(&self, lang: &str) -> std::result::Result<Box<dyn TextRecognizer>, OcrError> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Fixture {
                fail_width: self.fail_width,
                panic_width: self.panic_width,
                delay: self.delays.get(lang).copied().unwrap_or_default(),
            }))
        }
    }

    struct Recorder(Mutex<Vec<u8>>);

    impl ProgressObserver for Recorder {
        fn report(&self, percent: u8) {
            self.0.lock().unwrap().push(percent);
        }
    }

    /// Two rows of two cells, widths 10 and 20, plus an absent cell.
    fn item(page: usize, lang: &str) -> WorkItem {
        let row = vec![
            Some(Rect::new(0.0, 0.0, 10.0, 10.0)),
            None,
            Some(Rect::new(10.0, 0.0, 30.0, 10.0)),
        ];
        WorkItem {
            page,
            lang: lang.to_string(),
            image: RgbImage::from_pixel(50, 50, Rgb([0, 0, 0])),
            scale: 1.0,
            cells: vec![row.clone(), row],
            plans: vec![GroupPlan {
                group_idx: 1,
                start_row: 0,
                row_count: 2,
                original_rows: vec![vec!["1\nA".into(), "B".into()], vec![]],
            }],
            threshold: 10,
        }
    }

    fn expected_group() -> Group {
        Group {
            group_idx: 1,
            rows: vec![
                vec!["w10".to_string(), "w20".to_string()],
                vec!["w10".to_string(), "w20".to_string()],
            ],
            original_rows: vec![vec!["1\nA".into(), "B".into()], vec![]],
        }
    }

    #[test]
    fn test_workers_are_clamped() {
        let factory = Arc::new(FixtureFactory::new(None));
        assert_eq!(WorkerPool::new(0, factory.clone()).workers(), 1);
        assert_eq!(WorkerPool::new(4, factory.clone()).workers(), 4);
        assert_eq!(WorkerPool::new(64, factory).workers(), MAX_WORKERS);
    }

    #[test]
    fn test_process_page_skips_absent_cells() {
        let mut engine = Fixture {
            fail_width: None,
            panic_width: None,
            delay: Duration::ZERO,
        };
        assert_eq!(process_page(&mut engine, &item(0, "en")), vec![expected_group()]);
    }

    #[test]
    fn test_failing_cell_reads_as_empty() {
        let mut engine = Fixture {
            fail_width: Some(20),
            panic_width: None,
            delay: Duration::ZERO,
        };
        let groups = process_page(&mut engine, &item(0, "en"));
        assert_eq!(groups[0].rows[0], vec!["w10".to_string(), String::new()]);
        assert_eq!(groups[0].rows[1], vec!["w10".to_string(), String::new()]);
    }

    #[tokio::test]
    async fn test_empty_workload() {
        let pool = WorkerPool::new(2, Arc::new(FixtureFactory::new(None)));
        assert!(pool.run(vec![], None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_order_completion_is_reordered() {
        // Page 0 is slow, so it finishes after pages 1 and 2.
        let mut factory = FixtureFactory::new(None);
        factory
            .delays
            .insert("slow".to_string(), Duration::from_millis(50));
        let pool = WorkerPool::new(3, Arc::new(factory));

        let items = vec![item(0, "slow"), item(1, "en"), item(2, "en")];
        let parallel = pool.run(items, None).await.unwrap();

        let sequential_pool = WorkerPool::new(1, Arc::new(FixtureFactory::new(None)));
        let items = vec![item(0, "en"), item(1, "en"), item(2, "en")];
        let sequential = sequential_pool.run(items, None).await.unwrap();

        assert_eq!(parallel, sequential);
        assert_eq!(parallel.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(parallel[&0], vec![expected_group()]);
    }

    #[tokio::test]
    async fn test_one_engine_per_language_per_worker() {
        let factory = Arc::new(FixtureFactory::new(None));
        let pool = WorkerPool::new(1, factory.clone());
        let items = vec![item(0, "en"), item(1, "th"), item(2, "en"), item(3, "th")];
        let result = pool.run(items, None).await.unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let pool = WorkerPool::new(2, Arc::new(FixtureFactory::new(None)));
        let recorder = Recorder(Mutex::new(vec![]));
        let items = (0..4).map(|p| item(p, "en")).collect();
        pool.run(items, Some(&recorder)).await.unwrap();

        let seen = recorder.0.into_inner().unwrap();
        assert_eq!(seen, vec![25, 50, 75, 100]);
    }

    #[tokio::test]
    async fn test_cell_failure_does_not_stop_the_pool() {
        let pool = WorkerPool::new(2, Arc::new(FixtureFactory::new(Some(20))));
        let items = (0..3).map(|p| item(p, "en")).collect();
        let result = pool.run(items, None).await.unwrap();
        assert_eq!(result.len(), 3);
        for groups in result.values() {
            assert_eq!(groups[0].rows[0], vec!["w10".to_string(), String::new()]);
        }
    }

    #[tokio::test]
    async fn test_recognizer_panic_does_not_stop_the_pool() {
        let mut factory = FixtureFactory::new(None);
        factory.panic_width = Some(20);
        let pool = WorkerPool::new(2, Arc::new(factory));
        let items = (0..3).map(|p| item(p, "en")).collect();
        let result = pool.run(items, None).await.unwrap();

        assert_eq!(result.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
        for groups in result.values() {
            assert_eq!(groups[0].rows[0], vec!["w10".to_string(), String::new()]);
            assert_eq!(groups[0].rows[1], vec!["w10".to_string(), String::new()]);
        }
    }

    #[tokio::test]
    async fn test_pages_without_groups_are_omitted() {
        let pool = WorkerPool::new(1, Arc::new(FixtureFactory::new(None)));
        let mut empty = item(1, "en");
        empty.plans.clear();
        let result = pool.run(vec![item(0, "en"), empty], None).await.unwrap();
        assert_eq!(result.keys().copied().collect::<Vec<_>>(), vec![0]);
    }
}
