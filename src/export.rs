//! Export orchestration.
//!
//! [`ExportService`] owns the single export slot. Entering an export
//! atomically checks-and-installs the task; a [`SlotGuard`] clears it again
//! on every exit path. Pages of an all-pages export are processed strictly in
//! order because navigation mutates the one rendered route.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::canvas::Bitmap;
use crate::capture::{CaptureEngine, CaptureOptions};
use crate::config::{ExportConfig, PdfConfig};
use crate::document::{DocumentAssembler, PdfDocument};
use crate::filename::generate_filename;
use crate::host::{DownloadSink, Navigator, PageHost, PageSource};
use crate::locator::ContentLocator;
use crate::readiness::{wait_for_ready, ReadinessOptions};
use crate::types::{
    ExportEvent, ExportEventKind, ExportMode, ExportOptions, ExportProgress, ExportResult,
    ExportStatus, ExportTask, PageCapture, PageDescriptor,
};
use crate::{DexError, Result};

/// Invoked before each page of an all-pages export. Panics are caught and
/// logged; they never abort the export.
pub type ProgressCallback = Arc<dyn Fn(&ExportProgress) + Send + Sync>;

const EVENT_CAPACITY: usize = 64;

#[derive(Default)]
struct ExportSlot {
    task: Option<ExportTask>,
    cancel: Option<CancellationToken>,
    progress: Option<ProgressCallback>,
}

impl ExportSlot {
    fn owned_by(&self, task_id: &str) -> bool {
        self.task.as_ref().is_some_and(|t| t.id == task_id)
    }

    fn clear(&mut self) {
        self.task = None;
        self.cancel = None;
        self.progress = None;
    }
}

/// Releases the export slot on drop, unless another task has taken it since.
struct SlotGuard<'a> {
    slot: &'a Mutex<ExportSlot>,
    task_id: String,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.owned_by(&self.task_id) {
            slot.clear();
        }
    }
}

/// One captured page waiting to be placed.
struct CapturedPage {
    bitmap: Bitmap,
    reference_aspect: Option<f64>,
}

pub struct ExportService {
    host: Arc<dyn PageHost>,
    pages: Arc<dyn PageSource>,
    sink: Arc<dyn DownloadSink>,
    navigator: RwLock<Option<Arc<dyn Navigator>>>,
    config: ExportConfig,
    locator: ContentLocator,
    slot: Mutex<ExportSlot>,
    events: broadcast::Sender<ExportEvent>,
}

impl ExportService {
    pub fn new(
        host: Arc<dyn PageHost>,
        pages: Arc<dyn PageSource>,
        sink: Arc<dyn DownloadSink>,
        config: ExportConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            host,
            pages,
            sink,
            navigator: RwLock::new(None),
            config,
            locator: ContentLocator::default(),
            slot: Mutex::new(ExportSlot::default()),
            events,
        }
    }

    pub fn with_navigator(self, navigator: Arc<dyn Navigator>) -> Self {
        self.set_navigator(navigator);
        self
    }

    pub fn with_locator(mut self, locator: ContentLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn set_navigator(&self, navigator: Arc<dyn Navigator>) {
        let mut slot = self.navigator.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(navigator);
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExportEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the in-flight task, if any.
    pub fn current_task(&self) -> Option<ExportTask> {
        self.lock_slot().task.clone()
    }

    pub fn is_exporting(&self) -> bool {
        self.lock_slot().task.is_some()
    }

    /// Cancels the in-flight export. The task is marked cancelled and the
    /// slot released immediately; a capture already running finishes, but
    /// nothing further is navigated, finalized or delivered.
    pub fn cancel_export(&self) -> bool {
        let cancelled = {
            let mut slot = self.lock_slot();
            let Some(mut task) = slot.task.take() else {
                return false;
            };
            task.transition(ExportStatus::Cancelled, None);
            if let Some(token) = slot.cancel.take() {
                token.cancel();
            }
            slot.clear();
            task
        };

        tracing::info!(task_id = %cancelled.id, "export cancelled");
        self.emit(ExportEvent::new(ExportEventKind::Cancel, &cancelled.id));
        true
    }

    /// Captures the current page into a one-page document and delivers it.
    pub async fn export_current_page(&self, options: ExportOptions) -> Result<ExportResult> {
        let filename = generate_filename(options.filename.as_deref(), &self.config.file);
        let task = ExportTask::new(ExportMode::Single, filename.clone());
        let task_id = task.id.clone();
        let (_guard, cancel) = self.acquire(task, None)?;

        self.begin(&task_id);
        let started = Instant::now();
        let outcome = self
            .run_single(&task_id, &filename, &options, &cancel, started)
            .await;
        self.settle(&task_id, outcome)
    }

    /// Exports every page from the page source, in page-number order.
    ///
    /// A failing page is logged and skipped. The export only fails when no
    /// page could be captured, or before the loop on a precondition.
    pub async fn export_all_pages(
        &self,
        options: ExportOptions,
        on_progress: Option<ProgressCallback>,
    ) -> Result<ExportResult> {
        let navigator = self
            .navigator()
            .ok_or_else(|| DexError::precondition("no navigator configured for all-pages export"))?;

        let filename = generate_filename(options.filename.as_deref(), &self.config.file);
        let task = ExportTask::new(ExportMode::All, filename.clone());
        let task_id = task.id.clone();
        let (_guard, cancel) = self.acquire(task, on_progress)?;

        // Snapshot: later page-list changes must not affect this export.
        let pages = self.pages.pages();
        self.begin(&task_id);
        let started = Instant::now();
        let outcome = self
            .run_all(
                &task_id,
                &filename,
                &options,
                navigator.as_ref(),
                &pages,
                &cancel,
                started,
            )
            .await;
        self.settle(&task_id, outcome)
    }

    async fn run_single(
        &self,
        task_id: &str,
        filename: &str,
        options: &ExportOptions,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<ExportResult> {
        ensure_active(cancel)?;
        let engine = self.engine();
        let assembler = self.assembler(options);

        let captured = self.capture_current(&engine).await?;
        let mut document = assembler.create_document(captured.reference_aspect);
        assembler.add_page(&mut document, &captured.bitmap, 0)?;
        self.update_task(task_id, |task| task.set_completed_pages(1));

        self.deliver(task_id, filename, &assembler, document, 1, cancel, started)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_all(
        &self,
        task_id: &str,
        filename: &str,
        options: &ExportOptions,
        navigator: &dyn Navigator,
        pages: &[PageDescriptor],
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<ExportResult> {
        if pages.is_empty() {
            return Err(DexError::precondition("no exportable pages"));
        }

        let total = pages.len();
        self.update_task(task_id, |task| task.set_total_pages(total));
        let engine = self.engine();
        let assembler = self.assembler(options);

        let mut document: Option<PdfDocument> = None;
        let mut captures: Vec<PageCapture> = Vec::with_capacity(total);

        for (index, page) in pages.iter().enumerate() {
            ensure_active(cancel)?;
            self.report_progress(task_id, ExportProgress::new(index, total, &page.title, &page.path));

            match self.capture_page(navigator, &engine, page).await {
                Ok(captured) => {
                    let doc = document
                        .get_or_insert_with(|| assembler.create_document(captured.reference_aspect));
                    let order = captures.len();
                    match assembler.add_page(doc, &captured.bitmap, order) {
                        Ok(()) => captures.push(PageCapture {
                            id: format!("capture-{}", Uuid::new_v4().simple()),
                            task_id: task_id.to_string(),
                            page_title: page.title.clone(),
                            page_route: page.path.clone(),
                            order,
                            captured_at: Utc::now(),
                            width: captured.bitmap.width(),
                            height: captured.bitmap.height(),
                        }),
                        Err(err) => {
                            tracing::warn!(path = %page.path, error = %err, "failed to place page; skipping");
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(path = %page.path, title = %page.title, error = %err, "page export failed; skipping");
                }
            }

            self.update_task(task_id, |task| task.set_completed_pages(index + 1));
        }

        let Some(document) = document.filter(|_| !captures.is_empty()) else {
            return Err(DexError::precondition("no pages captured successfully"));
        };

        tracing::info!(
            captured = captures.len(),
            total,
            "all pages processed"
        );
        self.deliver(
            task_id,
            filename,
            &assembler,
            document,
            captures.len(),
            cancel,
            started,
        )
        .await
    }

    async fn capture_page(
        &self,
        navigator: &dyn Navigator,
        engine: &CaptureEngine,
        page: &PageDescriptor,
    ) -> Result<CapturedPage> {
        navigator.navigate(&page.path).await?;
        let readiness = &self.config.readiness;
        sleep(readiness.post_navigation_delay).await;
        wait_for_ready(
            self.host.as_ref(),
            &ReadinessOptions {
                timeout: readiness.page_ready_timeout,
                poll_interval: readiness.poll_interval,
                settle_delay: readiness.settle_delay,
            },
        )
        .await;
        self.capture_current(engine).await
    }

    async fn capture_current(&self, engine: &CaptureEngine) -> Result<CapturedPage> {
        let host = self.host.as_ref();
        let element = self.locator.locate(host).await?;
        let content_aspect = host.describe(element).await?.bounding_box.aspect_ratio();
        let bitmap = engine.capture_element(host, element).await?;
        let window = match content_aspect {
            Some(_) => None,
            None => self.window_size().await,
        };
        Ok(CapturedPage {
            reference_aspect: reference_aspect(content_aspect, window, &bitmap),
            bitmap,
        })
    }

    async fn window_size(&self) -> Option<(u32, u32)> {
        match self.host.viewport_size().await {
            Ok(size) => Some(size),
            Err(err) => {
                tracing::debug!(error = %err, "viewport size unavailable");
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn deliver(
        &self,
        task_id: &str,
        filename: &str,
        assembler: &DocumentAssembler,
        document: PdfDocument,
        page_count: usize,
        cancel: &CancellationToken,
        started: Instant,
    ) -> Result<ExportResult> {
        ensure_active(cancel)?;
        let bytes = assembler.finalize(document)?;
        ensure_active(cancel)?;
        let delivered = self.sink.deliver(filename, bytes).await?;

        Ok(ExportResult {
            success: true,
            task_id: task_id.to_string(),
            filename: filename.to_string(),
            page_count,
            duration_ms: started.elapsed().as_millis() as u64,
            file_size: Some(delivered.size),
            location: delivered.location,
        })
    }

    fn engine(&self) -> CaptureEngine {
        CaptureEngine::new(CaptureOptions::from(&self.config.capture))
    }

    fn assembler(&self, options: &ExportOptions) -> DocumentAssembler {
        let pdf = PdfConfig {
            format: options.format.unwrap_or(self.config.pdf.format),
            orientation: options.orientation.unwrap_or(self.config.pdf.orientation),
            margin: self.config.pdf.margin,
        };
        DocumentAssembler::new(
            pdf,
            options.quality.unwrap_or(self.config.capture.quality),
            self.config.file.compression,
        )
    }

    fn navigator(&self) -> Option<Arc<dyn Navigator>> {
        self.navigator
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn lock_slot(&self) -> MutexGuard<'_, ExportSlot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Installs `task` in the empty slot, or fails with `Busy` leaving the
    /// in-flight task untouched.
    fn acquire(
        &self,
        task: ExportTask,
        progress: Option<ProgressCallback>,
    ) -> Result<(SlotGuard<'_>, CancellationToken)> {
        let mut slot = self.lock_slot();
        if slot.task.is_some() {
            return Err(DexError::Busy);
        }
        let token = CancellationToken::new();
        let task_id = task.id.clone();
        slot.task = Some(task);
        slot.cancel = Some(token.clone());
        slot.progress = progress;
        Ok((
            SlotGuard {
                slot: &self.slot,
                task_id,
            },
            token,
        ))
    }

    fn update_task(&self, task_id: &str, f: impl FnOnce(&mut ExportTask)) -> bool {
        let mut slot = self.lock_slot();
        match slot.task.as_mut() {
            Some(task) if task.id == task_id => {
                f(task);
                true
            }
            _ => false,
        }
    }

    fn begin(&self, task_id: &str) {
        self.update_task(task_id, |task| {
            task.transition(ExportStatus::InProgress, None);
        });
        tracing::info!(task_id, "export started");
        self.emit(ExportEvent::new(ExportEventKind::Start, task_id));
    }

    fn report_progress(&self, task_id: &str, progress: ExportProgress) {
        let callback = {
            let slot = self.lock_slot();
            if !slot.owned_by(task_id) {
                return;
            }
            slot.progress.clone()
        };

        tracing::debug!(
            current = progress.current,
            total = progress.total,
            percentage = progress.percentage,
            page = %progress.current_page_route,
            "export progress"
        );
        let mut event = ExportEvent::new(ExportEventKind::Progress, task_id);
        event.progress = Some(progress.clone());
        self.emit(event);

        if let Some(callback) = callback {
            if catch_unwind(AssertUnwindSafe(|| callback(&progress))).is_err() {
                tracing::warn!(current = progress.current, "progress callback panicked; continuing");
            }
        }
    }

    fn settle(&self, task_id: &str, outcome: Result<ExportResult>) -> Result<ExportResult> {
        match &outcome {
            Ok(result) => {
                self.update_task(task_id, |task| {
                    task.transition(ExportStatus::Completed, None);
                });
                tracing::info!(
                    task_id,
                    pages = result.page_count,
                    duration_ms = result.duration_ms,
                    "export completed"
                );
                let mut event = ExportEvent::new(ExportEventKind::Complete, task_id);
                event.result = Some(result.clone());
                self.emit(event);
            }
            Err(DexError::Cancelled) => {
                self.update_task(task_id, |task| {
                    task.transition(ExportStatus::Cancelled, None);
                });
            }
            Err(err) => {
                self.update_task(task_id, |task| {
                    task.transition(ExportStatus::Failed, Some(err.to_string()));
                });
                tracing::error!(task_id, error = %err, "export failed");
                let mut event = ExportEvent::new(ExportEventKind::Error, task_id);
                event.error = Some(err.to_string());
                self.emit(event);
            }
        }
        outcome
    }

    fn emit(&self, event: ExportEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Content box first, then the window, then the captured bitmap itself.
fn reference_aspect(content: Option<f64>, window: Option<(u32, u32)>, bitmap: &Bitmap) -> Option<f64> {
    content
        .or_else(|| {
            window
                .filter(|(w, h)| *w > 0 && *h > 0)
                .map(|(w, h)| f64::from(w) / f64::from(h))
        })
        .or(Some(bitmap.aspect_ratio()))
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(DexError::Cancelled)
    } else {
        Ok(())
    }
}
