//! Async pipelines behind the clip workflow and the background runner that
//! drives them for the desktop UI.
//!
//! Each pipeline reports through an [`EventSink`]; it never touches the
//! [`ClipWorkflow`](crate::workflow::ClipWorkflow) directly.

use crate::client::{ClipRequest, RasterClient};
use crate::error::{ClipError, Result};
use crate::workflow::{Enrichment, JobId, JobUpdate, WorkflowEvent};
use futures::future::{self, AbortHandle, Abortable, Either};
use futures::StreamExt;
use std::future::Future;
use std::sync::mpsc;
use std::thread;
use tracing::{debug, info, warn};

/// Destination for workflow events.
pub trait EventSink: Clone + Send + Sync + 'static {
    fn emit(&self, event: WorkflowEvent);
}

impl EventSink for mpsc::Sender<WorkflowEvent> {
    fn emit(&self, event: WorkflowEvent) {
        // receiver gone means the window closed
        let _ = self.send(event);
    }
}

impl EventSink for tokio::sync::mpsc::UnboundedSender<WorkflowEvent> {
    fn emit(&self, event: WorkflowEvent) {
        let _ = self.send(event);
    }
}

/// Probes the raster, then loads statistics, metadata and info concurrently.
///
/// Every result is emitted as its own event. A failed probe ends the
/// pipeline; any other failure is logged and leaves the rest running.
pub async fn fetch_metadata<S: EventSink>(client: &RasterClient, raster_url: &str, sink: &S) {
    let emit = |update| {
        sink.emit(WorkflowEvent::Enrichment {
            raster_url: raster_url.to_string(),
            update,
        })
    };

    if let Err(err) = client.probe(raster_url).await {
        warn!(raster_url, error = %err, "probe failed");
        emit(Enrichment::ProbeFailed(err));
        return;
    }

    let statistics = async {
        let result = client.statistics(raster_url).await;
        if let Err(err) = &result {
            warn!(raster_url, error = %err, "statistics request failed");
        }
        emit(Enrichment::Statistics(result));
    };

    let metadata = async {
        let result = client.metadata(raster_url).await;
        if let Err(err) = &result {
            warn!(raster_url, error = %err, "metadata request failed");
        }
        emit(Enrichment::Metadata(result));
    };

    let info = async {
        let result = client.info(raster_url).await;
        let epsg = match &result {
            Ok(info) => info.epsg,
            Err(err) => {
                warn!(raster_url, error = %err, "info request failed");
                None
            }
        };
        emit(Enrichment::Info(result));
        if let Some(code) = epsg {
            lookup_epsg(client, raster_url, code, sink).await;
        }
    };

    futures::join!(statistics, metadata, info);
    debug!(raster_url, "metadata pipeline finished");
}

/// Looks up the name and units of `code` for the active raster.
pub async fn lookup_epsg<S: EventSink>(client: &RasterClient, raster_url: &str, code: u32, sink: &S) {
    let result = client.epsg_info(code).await;
    sink.emit(WorkflowEvent::Enrichment {
        raster_url: raster_url.to_string(),
        update: Enrichment::EpsgInfo { code, result },
    });
}

/// Submits a clip and follows its progress until the submission resolves.
///
/// The POST goes out first. The status stream is opened after the configured
/// delay and dropped, closing its connection, as soon as the POST returns.
pub async fn run_clip_job<S: EventSink>(
    client: &RasterClient,
    job: JobId,
    request: ClipRequest,
    sink: &S,
) {
    info!(job, cog_url = %request.cog_url, "clip job started");

    let submit = Box::pin(client.submit_clip(&request));
    let follow = Box::pin(follow_progress(client, job, sink));

    let outcome = match future::select(submit, follow).await {
        Either::Left((outcome, follow)) => {
            drop(follow);
            outcome
        }
        Either::Right(((), submit)) => submit.await,
    };

    let update = match outcome {
        Ok(response) => JobUpdate::Completed(response),
        Err(err) => JobUpdate::Failed(err),
    };
    sink.emit(WorkflowEvent::Job { job, update });
}

async fn follow_progress<S: EventSink>(client: &RasterClient, job: JobId, sink: &S) {
    let emit = |update| sink.emit(WorkflowEvent::Job { job, update });

    tokio::time::sleep(client.config().status_delay).await;

    let mut stream = match client.status_stream().await {
        Ok(stream) => stream,
        Err(err) => {
            emit(JobUpdate::StreamEnded(Some(err)));
            return;
        }
    };
    emit(JobUpdate::StreamOpened);

    while let Some(item) = stream.next().await {
        match item {
            Ok(record) => emit(JobUpdate::Progress(record)),
            Err(err @ ClipError::MalformedResponse { .. }) => {
                warn!(job, error = %err, "skipping undecodable status record");
            }
            Err(err) => {
                emit(JobUpdate::StreamEnded(Some(err)));
                return;
            }
        }
    }

    emit(JobUpdate::StreamEnded(Some(ClipError::interrupted(
        "status stream closed before the clip finished",
    ))));
}

/// Runs pipelines on background threads, one current-thread runtime each.
///
/// Used by the desktop UI, whose event loop cannot block on async work.
pub struct JobRunner<S: EventSink> {
    client: RasterClient,
    sink: S,
    metadata: Option<AbortHandle>,
    job: Option<(JobId, AbortHandle)>,
}

impl<S: EventSink> JobRunner<S> {
    pub fn new(client: RasterClient, sink: S) -> Self {
        Self {
            client,
            sink,
            metadata: None,
            job: None,
        }
    }

    pub fn client(&self) -> &RasterClient {
        &self.client
    }

    /// Loads metadata for `raster_url`, abandoning any earlier load.
    pub fn fetch_metadata(&mut self, raster_url: String) -> Result<()> {
        if let Some(previous) = self.metadata.take() {
            previous.abort();
        }
        let client = self.client.clone();
        let sink = self.sink.clone();
        let handle = spawn("cogclip-metadata", async move {
            fetch_metadata(&client, &raster_url, &sink).await;
        })?;
        self.metadata = Some(handle);
        Ok(())
    }

    pub fn lookup_epsg(&self, raster_url: String, code: u32) -> Result<()> {
        let client = self.client.clone();
        let sink = self.sink.clone();
        spawn("cogclip-epsg", async move {
            lookup_epsg(&client, &raster_url, code, &sink).await;
        })?;
        Ok(())
    }

    /// Starts `job`. A job still running is aborted first.
    pub fn start_job(&mut self, job: JobId, request: ClipRequest) -> Result<()> {
        if let Some(previous) = self.job.as_ref().map(|(id, _)| *id) {
            self.abort(previous);
        }
        let client = self.client.clone();
        let sink = self.sink.clone();
        let handle = spawn("cogclip-job", async move {
            run_clip_job(&client, job, request, &sink).await;
        })?;
        self.job = Some((job, handle));
        Ok(())
    }

    /// Aborts `job` if it is the running one. Dropping its future closes the
    /// status stream.
    pub fn abort(&mut self, job: JobId) -> bool {
        match self.job.take() {
            Some((running, handle)) if running == job => {
                debug!(job, "aborting clip job");
                handle.abort();
                true
            }
            other => {
                self.job = other;
                false
            }
        }
    }
}

impl<S: EventSink> Drop for JobRunner<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.metadata.take() {
            handle.abort();
        }
        if let Some((_, handle)) = self.job.take() {
            handle.abort();
        }
    }
}

fn spawn<F>(name: &str, task: F) -> Result<AbortHandle>
where
    F: Future<Output = ()> + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let (handle, registration) = AbortHandle::new_pair();
    let task = Abortable::new(task, registration);

    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            if runtime.block_on(task).is_err() {
                debug!("background task aborted");
            }
        })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn unreachable_raster_stops_after_the_probe() {
        // nothing listens on port 9 of the loopback interface
        let config = Config::builder()
            .with_titiler_url("http://127.0.0.1:9")
            .with_service_url("http://127.0.0.1:9")
            .build()
            .unwrap();
        let client = RasterClient::new(&config).unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<WorkflowEvent>();

        fetch_metadata(&client, "http://127.0.0.1:9/a.tif", &tx).await;
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            WorkflowEvent::Enrichment {
                update: Enrichment::ProbeFailed(ClipError::NetworkUnreachable { .. }),
                ..
            }
        ));
    }

    #[test]
    fn abort_ignores_other_jobs() {
        let config = Config::default();
        let client = RasterClient::new(&config).unwrap();
        let (tx, _rx) = mpsc::channel::<WorkflowEvent>();
        let mut runner = JobRunner::new(client, tx);
        let (handle, _registration) = AbortHandle::new_pair();
        runner.job = Some((3, handle));

        assert!(!runner.abort(2));
        assert!(runner.job.is_some());
        assert!(runner.abort(3));
        assert!(runner.job.is_none());
    }
}
