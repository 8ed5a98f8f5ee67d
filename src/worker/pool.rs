use std::sync::Arc;
use tokio::sync::{Mutex, Notify, mpsc};
use tracing::{debug, error, info};
use crate::core::{
    BatchProgress, ConversionJob, ConversionRequest, ConversionResult, ConverterConfig, JobEvent,
    JobId, JobTicket, SourceFile,
};
use crate::processing::{ConversionPipeline, create_archive};
use crate::utils::{ConverterError, ConverterResult};
use crate::worker::BatchScheduler;
use crate::worker::error::WorkerResult;

/// Runs admitted jobs on the blocking thread pool and keeps the scheduler fed.
///
/// Cloning is cheap; all clones share one batch.
#[derive(Clone)]
pub struct WorkerPool {
    scheduler: Arc<Mutex<BatchScheduler>>,
    pipeline: ConversionPipeline,
    events: mpsc::UnboundedSender<JobEvent>,
    idle: Arc<Notify>,
}

impl WorkerPool {
    /// Creates a pool and the receiving end of its event stream.
    ///
    /// Events are dropped silently once the receiver is gone.
    pub fn new(
        config: &ConverterConfig,
        pipeline: ConversionPipeline,
    ) -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        debug!("Creating worker pool with {} slots", config.max_concurrent);
        let pool = Self {
            scheduler: Arc::new(Mutex::new(BatchScheduler::new(config.max_concurrent))),
            pipeline,
            events,
            idle: Arc::new(Notify::new()),
        };
        (pool, receiver)
    }

    /// Queues `files` with a shared request and starts as many as fit.
    pub async fn enqueue(&self, files: Vec<SourceFile>, request: ConversionRequest) -> Vec<JobId> {
        let mut scheduler = self.scheduler.lock().await;
        let (ids, tickets) = scheduler.enqueue(files, Arc::new(request));

        for id in &ids {
            if let Some(job) = scheduler.job(*id) {
                self.emit(JobEvent::Queued {
                    job_id: job.id,
                    file_name: job.file_name().to_string(),
                    retry_of: None,
                });
            }
        }
        info!("{}", scheduler.stats().status_line());

        for ticket in tickets {
            self.spawn_job(ticket);
        }
        ids
    }

    /// Re-queues a failed job ahead of everything still pending.
    pub async fn retry(&self, id: JobId) -> WorkerResult<JobId> {
        let mut scheduler = self.scheduler.lock().await;
        let (retry_id, tickets) = scheduler.retry(id)?;

        if let Some(job) = scheduler.job(retry_id) {
            self.emit(JobEvent::Queued {
                job_id: retry_id,
                file_name: job.file_name().to_string(),
                retry_of: Some(id),
            });
        }
        for ticket in tickets {
            self.spawn_job(ticket);
        }
        Ok(retry_id)
    }

    /// Resolves once nothing is pending or running.
    pub async fn wait_idle(&self) {
        loop {
            // Registered before the check so a notification in between is not lost.
            let notified = self.idle.notified();
            if self.scheduler.lock().await.is_idle() {
                return;
            }
            notified.await;
        }
    }

    pub async fn snapshot(&self) -> BatchProgress {
        self.scheduler.lock().await.stats()
    }

    /// Copies of every job record, pending first and finished last.
    pub async fn jobs(&self) -> Vec<ConversionJob> {
        self.scheduler.lock().await.jobs().cloned().collect()
    }

    pub async fn job(&self, id: JobId) -> Option<ConversionJob> {
        self.scheduler.lock().await.job(id).cloned()
    }

    /// ZIP of every succeeded output. Job records are left as they are on failure.
    pub async fn archive_results(&self) -> ConverterResult<Vec<u8>> {
        let scheduler = self.scheduler.lock().await;
        create_archive(&scheduler.completed_outputs())
    }

    fn emit(&self, event: JobEvent) {
        // A closed receiver only means nobody is listening
        let _ = self.events.send(event);
    }

    fn spawn_job(&self, ticket: JobTicket) {
        let pool = self.clone();
        tokio::spawn(async move {
            let id = ticket.id;
            let file_name = ticket.source.name.clone();
            let outcome = pool.execute(ticket).await;

            let event = match &outcome {
                Ok(result) => JobEvent::Succeeded {
                    job_id: id,
                    result: result.clone(),
                },
                Err(error) => JobEvent::Failed {
                    job_id: id,
                    file_name,
                    error: error.clone(),
                },
            };

            let mut scheduler = pool.scheduler.lock().await;
            match scheduler.on_job_finished(id, outcome) {
                Ok(next) => {
                    pool.emit(event);
                    debug!("{}", scheduler.stats().status_line());
                    for ticket in next {
                        pool.spawn_job(ticket);
                    }
                }
                Err(e) => error!("Dropping outcome of job {}: {}", id, e),
            }

            if scheduler.is_idle() {
                info!("{}", scheduler.stats().status_line());
                pool.idle.notify_waiters();
            }
        });
    }

    /// Runs the conversion on the blocking pool, forwarding progress as it arrives.
    async fn execute(&self, ticket: JobTicket) -> ConverterResult<ConversionResult> {
        let JobTicket { id, source, request } = ticket;
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let pipeline = self.pipeline.clone();

        let handle = tokio::task::spawn_blocking(move || {
            pipeline.convert(&source, &request, &mut |state, progress| {
                let _ = progress_tx.send((state, progress));
            })
        });

        while let Some((state, progress)) = progress_rx.recv().await {
            let accepted = self.scheduler.lock().await.record_progress(id, state, progress);
            if accepted {
                self.emit(JobEvent::Progress {
                    job_id: id,
                    state,
                    progress,
                });
            }
        }

        handle.await.unwrap_or_else(|e| {
            error!("Conversion task for job {} did not complete: {}", id, e);
            Err(ConverterError::io(format!("Conversion task did not complete: {e}")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FormatOptions, JobState, ResizeSettings};
    use crate::processing::{Decoder, EncodeParams, Encoder};
    use crate::utils::{EncodeError, OutputFormat};
    use image::DynamicImage;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// Decodes `ok*` payloads to a 4x4 image; anything in `fail_once` fails its first decode.
    #[derive(Default)]
    struct FakeCodec {
        running: AtomicUsize,
        peak: AtomicUsize,
        fail_once: StdMutex<Vec<Vec<u8>>>,
    }

    impl Decoder for FakeCodec {
        fn decode(&self, bytes: &[u8]) -> ConverterResult<DynamicImage> {
            let mut fail_once = self.fail_once.lock().unwrap();
            if let Some(pos) = fail_once.iter().position(|b| b == bytes) {
                fail_once.remove(pos);
                return Err(ConverterError::decode("flaky source"));
            }
            if !bytes.starts_with(b"ok") {
                return Err(ConverterError::decode("not an image"));
            }
            Ok(DynamicImage::new_rgba8(4, 4))
        }
    }

    impl Encoder for FakeCodec {
        fn supports(&self, _format: OutputFormat) -> bool {
            true
        }

        fn encode(&self, _pixels: &DynamicImage, format: OutputFormat, _params: &EncodeParams) -> Result<Vec<u8>, EncodeError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(format.as_str().as_bytes().to_vec())
        }
    }

    fn pool(max_concurrent: usize, codec: Arc<FakeCodec>) -> (WorkerPool, mpsc::UnboundedReceiver<JobEvent>) {
        let config = ConverterConfig { max_concurrent, ..ConverterConfig::default() };
        WorkerPool::new(&config, ConversionPipeline::new(codec.clone(), codec))
    }

    fn request() -> ConversionRequest {
        ConversionRequest {
            format: OutputFormat::Png,
            quality: 0.9,
            lossless: false,
            target_bytes: None,
            resize: ResizeSettings::default(),
            format_options: FormatOptions::Png { compression_level: 6 },
            preserve_metadata: false,
        }
    }

    fn file(name: &str, bytes: &[u8]) -> SourceFile {
        SourceFile::new(name, "image/jpeg", bytes.to_vec())
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<JobEvent>) -> Vec<JobEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn bounded_batch_runs_to_completion() {
        let codec = Arc::new(FakeCodec::default());
        let (pool, mut rx) = pool(3, codec.clone());

        let files = (0..7).map(|i| file(&format!("img{i}.jpg"), b"ok")).collect();
        let ids = pool.enqueue(files, request()).await;
        pool.wait_idle().await;

        assert!(codec.peak.load(Ordering::SeqCst) <= 3);
        let stats = pool.snapshot().await;
        assert_eq!((stats.queued, stats.processing, stats.completed, stats.succeeded), (0, 0, 7, 7));

        let mut per_job: HashMap<JobId, Vec<JobEvent>> = HashMap::new();
        for event in drain(&mut rx) {
            per_job.entry(event.job_id()).or_default().push(event);
        }
        assert_eq!(per_job.len(), 7);
        for id in &ids {
            let events = &per_job[id];
            assert!(matches!(events.first(), Some(JobEvent::Queued { .. })));
            assert!(matches!(events.last(), Some(JobEvent::Succeeded { .. })));
            assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

            let progress: Vec<u8> = events
                .iter()
                .filter_map(|e| match e {
                    JobEvent::Progress { progress, .. } => Some(*progress),
                    _ => None,
                })
                .collect();
            assert!(progress.windows(2).all(|w| w[0] <= w[1]));
            assert_eq!(progress.last(), Some(&100));
        }
    }

    #[tokio::test]
    async fn progress_reaches_100_before_success() {
        let (pool, mut rx) = pool(1, Arc::new(FakeCodec::default()));
        let ids = pool.enqueue(vec![file("single.jpg", b"ok")], request()).await;
        pool.wait_idle().await;

        let events = drain(&mut rx);
        let [.., before, last] = events.as_slice() else {
            panic!("expected at least two events, got {events:?}");
        };
        assert!(matches!(last, JobEvent::Succeeded { job_id, .. } if *job_id == ids[0]));
        assert!(matches!(before, JobEvent::Progress { progress: 100, .. }));
        assert_eq!(pool.job(ids[0]).await.unwrap().progress, 100);
    }

    #[tokio::test]
    async fn one_failure_does_not_stall_the_batch() {
        let (pool, mut rx) = pool(1, Arc::new(FakeCodec::default()));
        let ids = pool
            .enqueue(vec![file("a.jpg", b"ok"), file("b.jpg", b"junk"), file("c.jpg", b"ok")], request())
            .await;
        pool.wait_idle().await;

        let failed = pool.job(ids[1]).await.unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.error, Some(ConverterError::decode("not an image")));
        assert_eq!(pool.job(ids[2]).await.unwrap().state, JobState::Succeeded);

        let failures: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, JobEvent::Failed { .. }))
            .collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].job_id(), ids[1]);
    }

    #[tokio::test]
    async fn manual_retry_succeeds() {
        let codec = Arc::new(FakeCodec::default());
        codec.fail_once.lock().unwrap().push(b"ok-flaky".to_vec());
        let (pool, mut rx) = pool(2, codec);

        let ids = pool.enqueue(vec![file("flaky.jpg", b"ok-flaky")], request()).await;
        pool.wait_idle().await;
        assert_eq!(pool.job(ids[0]).await.unwrap().state, JobState::Failed);

        let retry_id = pool.retry(ids[0]).await.unwrap();
        pool.wait_idle().await;

        let retried = pool.job(retry_id).await.unwrap();
        assert_eq!(retried.state, JobState::Succeeded);
        assert_eq!(retried.retry_of, Some(ids[0]));
        assert_eq!(pool.job(ids[0]).await.unwrap().state, JobState::Failed);

        let queued_retry = drain(&mut rx).into_iter().any(|e| {
            matches!(e, JobEvent::Queued { job_id, retry_of: Some(of), .. } if job_id == retry_id && of == ids[0])
        });
        assert!(queued_retry);
    }

    #[tokio::test]
    async fn archive_holds_succeeded_outputs() {
        let (pool, _rx) = pool(2, Arc::new(FakeCodec::default()));

        assert!(matches!(pool.archive_results().await, Err(ConverterError::Archive(_))));

        pool.enqueue(vec![file("a.jpg", b"ok"), file("b.jpg", b"bad")], request()).await;
        pool.wait_idle().await;

        let archive = pool.archive_results().await.unwrap();
        let mut zip = zip::ZipArchive::new(std::io::Cursor::new(archive)).unwrap();
        assert_eq!(zip.len(), 1);
        assert_eq!(zip.by_index(0).unwrap().name(), "a-png.png");
    }

    #[tokio::test]
    async fn idle_pool_returns_immediately() {
        let (pool, _rx) = pool(1, Arc::new(FakeCodec::default()));
        pool.wait_idle().await;
        assert_eq!(pool.snapshot().await, BatchProgress::default());
        assert!(pool.jobs().await.is_empty());
    }
}
