//! Best-effort readiness waiting.
//!
//! Both waits here are soft: on timeout they log a warning and return, so a
//! slow page is still captured instead of failing the export.

use futures::future::join_all;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};

use crate::host::{ImageLoad, PageHost};
use crate::types::ElementRef;

pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_millis(15_000);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(300);
pub const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_millis(5_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub settle_delay: Duration,
}

impl Default for ReadinessOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_READY_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

impl ReadinessOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// How a readiness wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

/// Polls until the document is complete and the app root has rendered
/// children, then waits `settle_delay`. Never fails.
///
/// A host error while polling counts as ready: the capture that follows will
/// surface a broken host far more precisely than a readiness probe can.
pub async fn wait_for_ready(host: &dyn PageHost, options: &ReadinessOptions) -> Readiness {
    let started = Instant::now();
    loop {
        let ready = match host.document_state().await {
            Ok(state) => state.is_ready(),
            Err(err) => {
                tracing::debug!(error = %err, "document state probe failed; assuming ready");
                true
            }
        };

        if ready {
            sleep(options.settle_delay).await;
            return Readiness::Ready;
        }

        if started.elapsed() >= options.timeout {
            tracing::warn!(
                timeout_ms = options.timeout.as_millis() as u64,
                "page did not report ready in time; continuing anyway"
            );
            return Readiness::TimedOut;
        }

        sleep(options.poll_interval).await;
    }
}

/// Waits for every `<img>` under `container` to load or fail, each bounded
/// by `per_image_timeout`. Failures and timeouts are logged and swallowed.
pub async fn wait_for_images_loaded(
    host: &dyn PageHost,
    container: ElementRef,
    per_image_timeout: Duration,
) {
    let images = match host.images(container).await {
        Ok(images) => images,
        Err(err) => {
            tracing::warn!(error = %err, "could not list images; skipping image wait");
            return;
        }
    };

    let pending = images
        .into_iter()
        .filter(|img| !img.is_loaded())
        .filter(|img| !img.src.is_empty())
        .map(|img| async move {
            match timeout(per_image_timeout, host.wait_for_image(container, img.index)).await {
                Ok(Ok(ImageLoad::Loaded)) => {}
                Ok(Ok(ImageLoad::Failed)) => {
                    tracing::warn!(src = %img.src, "image failed to load");
                }
                Ok(Err(err)) => {
                    tracing::warn!(src = %img.src, error = %err, "image wait failed");
                }
                Err(_) => {
                    tracing::warn!(
                        src = %img.src,
                        timeout_ms = per_image_timeout.as_millis() as u64,
                        "image load timed out"
                    );
                }
            }
        });

    join_all(pending).await;
}
