use super::archive;
use super::TaskApi;
use crate::error::PipelineError;
use crate::model::{RunEvent, TaskSnapshot, TaskStatus};
use futures::{stream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

const ARCHIVE_NAME: &str = "all.zip";
const PARTIAL_ARCHIVE_NAME: &str = ".all.zip.part";

#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits {
    /// Applies to status, console and control requests; transfers are uncapped.
    pub request_timeout: Duration,
    pub parallel_uploads: usize,
    pub upload_batch_size: usize,
}

/// Client for one NodeODM host.
#[derive(Clone)]
pub(crate) struct NodeClient {
    http: reqwest::Client,
    base: Url,
    limits: Limits,
    events: Option<UnboundedSender<RunEvent>>,
}

#[derive(Debug, Serialize)]
struct OptionEntry<'a> {
    name: &'a str,
    value: &'a Value,
}

#[derive(Debug, Deserialize)]
struct UuidResponse {
    uuid: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SuccessResponse {
    success: Option<bool>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusField {
    code: i64,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskInfoResponse {
    uuid: Option<String>,
    status: Option<StatusField>,
    progress: Option<f64>,
    processing_time: Option<i64>,
    images_count: Option<u64>,
    error: Option<String>,
}

/// Serialize options as NodeODM's `[{"name": .., "value": ..}]` list.
pub(crate) fn options_json(options: &BTreeMap<String, Value>) -> String {
    let entries: Vec<OptionEntry<'_>> = options
        .iter()
        .map(|(name, value)| OptionEntry { name, value })
        .collect();
    serde_json::to_string(&entries).unwrap_or_else(|_| "[]".into())
}

impl NodeClient {
    pub fn new(
        http: reqwest::Client,
        base: Url,
        limits: Limits,
        events: Option<UnboundedSender<RunEvent>>,
    ) -> Self {
        Self {
            http,
            base,
            limits,
            events,
        }
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(path);
        url
    }

    fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    async fn image_part(path: &Path) -> Result<Part, PipelineError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| PipelineError::Submission(format!("read {}: {e}", path.display())))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.jpg".into());
        Part::bytes(data)
            .file_name(name)
            .mime_str("image/jpeg")
            .map_err(|e| PipelineError::Submission(e.to_string()))
    }

    async fn post_for_uuid(&self, url: Url, form: Form) -> Result<String, PipelineError> {
        let resp = self
            .http
            .post(url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| PipelineError::Submission(format!("POST {url}: {e}")))?;
        let status = resp.status();
        let body: UuidResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::Submission(format!("POST {url}: HTTP {status}: {e}")))?;
        match (status.is_success(), body.uuid, body.error) {
            (_, _, Some(err)) => Err(PipelineError::Submission(err)),
            (true, Some(uuid), None) if !uuid.is_empty() => Ok(uuid),
            _ => Err(PipelineError::Submission(format!(
                "POST {url}: HTTP {status} without task id"
            ))),
        }
    }

    async fn create_single(
        &self,
        name: &str,
        images: &[PathBuf],
        options: &str,
    ) -> Result<String, PipelineError> {
        let mut form = Form::new()
            .text("name", name.to_owned())
            .text("options", options.to_owned());
        for path in images {
            form = form.part("images", Self::image_part(path).await?);
        }
        let uuid = self.post_for_uuid(self.endpoint("/task/new"), form).await?;
        self.emit(RunEvent::UploadProgress {
            sent: images.len(),
            total: images.len(),
        });
        Ok(uuid)
    }

    async fn upload_batch(&self, uuid: &str, batch: &[PathBuf]) -> Result<usize, PipelineError> {
        let mut form = Form::new();
        for path in batch {
            form = form.part("images", Self::image_part(path).await?);
        }
        let url = self.endpoint(&format!("/task/new/upload/{uuid}"));
        let resp = self
            .http
            .post(url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| PipelineError::Submission(format!("POST {url}: {e}")))?;
        let status = resp.status();
        let body: SuccessResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::Submission(format!("POST {url}: HTTP {status}: {e}")))?;
        if let Some(err) = body.error {
            return Err(PipelineError::Submission(err));
        }
        if !status.is_success() || body.success != Some(true) {
            return Err(PipelineError::Submission(format!(
                "POST {url}: upload rejected (HTTP {status})"
            )));
        }
        Ok(batch.len())
    }

    async fn create_chunked(
        &self,
        name: &str,
        images: &[PathBuf],
        options: &str,
    ) -> Result<String, PipelineError> {
        let form = Form::new()
            .text("name", name.to_owned())
            .text("options", options.to_owned());
        let uuid = self
            .post_for_uuid(self.endpoint("/task/new/init"), form)
            .await?;
        debug!(task = %uuid, "task initialised, uploading images");

        match self.upload_and_commit(&uuid, images).await {
            Ok(committed) => Ok(committed),
            Err(e) => {
                // A half-uploaded task must not linger on the backend.
                if let Err(remove_err) = self.remove_task(&uuid).await {
                    warn!(task = %uuid, error = %remove_err, "failed to remove incomplete task");
                }
                Err(e)
            }
        }
    }

    async fn upload_and_commit(&self, uuid: &str, images: &[PathBuf]) -> Result<String, PipelineError> {
        let total = images.len();
        let mut sent = 0usize;
        let mut uploads = stream::iter(images.chunks(self.limits.upload_batch_size))
            .map(|batch| self.upload_batch(uuid, batch))
            .buffer_unordered(self.limits.parallel_uploads);
        while let Some(result) = uploads.next().await {
            sent += result?;
            self.emit(RunEvent::UploadProgress { sent, total });
        }
        drop(uploads);

        let form = Form::new();
        self.post_for_uuid(self.endpoint(&format!("/task/new/commit/{uuid}")), form)
            .await
    }

    /// Best-effort removal of a task on the backend.
    pub async fn remove_task(&self, uuid: &str) -> Result<(), PipelineError> {
        let url = self.endpoint("/task/remove");
        let resp = self
            .http
            .post(url.clone())
            .timeout(self.limits.request_timeout)
            .form(&[("uuid", uuid)])
            .send()
            .await
            .map_err(|e| PipelineError::Submission(format!("POST {url}: {e}")))?;
        let body: SuccessResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::Submission(format!("POST {url}: {e}")))?;
        match (body.success, body.error) {
            (_, Some(err)) => Err(PipelineError::Submission(err)),
            (Some(true), None) => Ok(()),
            _ => Err(PipelineError::Submission(format!("POST {url}: removal not confirmed"))),
        }
    }

    async fn fetch_archive(&self, task_id: &str, part: &Path) -> Result<(), String> {
        let url = self.endpoint(&format!("/task/{task_id}/download/{ARCHIVE_NAME}"));
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| format!("GET {url}: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("GET {url}: HTTP {}", resp.status()));
        }
        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| format!("create {}: {e}", part.display()))?;
        let mut body = resp.bytes_stream();
        let mut received = 0u64;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| format!("transfer interrupted after {received} bytes: {e}"))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| format!("write {}: {e}", part.display()))?;
            received += chunk.len() as u64;
        }
        file.flush()
            .await
            .map_err(|e| format!("write {}: {e}", part.display()))?;
        debug!(task = %task_id, bytes = received, "archive downloaded");
        Ok(())
    }
}

impl TaskApi for NodeClient {
    async fn create_task(
        &self,
        name: &str,
        images: &[PathBuf],
        options: &BTreeMap<String, Value>,
    ) -> Result<String, PipelineError> {
        if images.is_empty() {
            return Err(PipelineError::Submission("no images to upload".into()));
        }
        let options = options_json(options);
        info!(
            host = %self.base,
            images = images.len(),
            options = %options,
            "submitting task"
        );
        let uuid = if images.len() <= self.limits.upload_batch_size {
            self.create_single(name, images, &options).await?
        } else {
            self.create_chunked(name, images, &options).await?
        };
        info!(task = %uuid, "task created");
        Ok(uuid)
    }

    async fn poll_status(&self, task_id: &str) -> Result<TaskSnapshot, PipelineError> {
        let url = self.endpoint(&format!("/task/{task_id}/info"));
        let poll_err = |reason: String, transient: bool| PipelineError::Poll {
            task_id: task_id.to_string(),
            reason,
            transient,
        };
        let resp = self
            .http
            .get(url.clone())
            .timeout(self.limits.request_timeout)
            .send()
            .await
            .map_err(|e| poll_err(format!("GET {url}: {e}"), true))?;
        let status = resp.status();
        if status.is_server_error() {
            return Err(poll_err(format!("GET {url}: HTTP {status}"), true));
        }
        let info: TaskInfoResponse = resp
            .json()
            .await
            .map_err(|e| poll_err(format!("GET {url}: HTTP {status}: {e}"), status.is_success()))?;
        if let Some(err) = info.error {
            // Typically an unknown task after a backend restart without persistent storage.
            return Err(poll_err(format!("backend says: {err}"), false));
        }
        let field = info
            .status
            .ok_or_else(|| poll_err("response has no status".into(), false))?;
        let task_status = TaskStatus::from_code(field.code)
            .ok_or_else(|| poll_err(format!("unknown status code {}", field.code), false))?;
        Ok(TaskSnapshot {
            task_id: info.uuid.unwrap_or_else(|| task_id.to_string()),
            status: task_status,
            progress: info.progress.unwrap_or(0.0).clamp(0.0, 100.0),
            processing_time_ms: info.processing_time.unwrap_or(0).max(0) as u64,
            images_count: info.images_count.unwrap_or(0),
            last_error: field.error_message.filter(|m| !m.is_empty()),
        })
    }

    async fn download_outputs(
        &self,
        task_id: &str,
        dest: &Path,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let download_err = |reason: String| PipelineError::Download {
            task_id: task_id.to_string(),
            reason,
        };
        let snapshot = self
            .poll_status(task_id)
            .await
            .map_err(|e| download_err(format!("status check failed: {e}")))?;
        if snapshot.status != TaskStatus::Completed {
            return Err(download_err(format!(
                "task is {}, not completed",
                snapshot.status
            )));
        }

        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|e| download_err(format!("create {}: {e}", dest.display())))?;
        let part = dest.join(PARTIAL_ARCHIVE_NAME);
        let archive_path = dest.join(ARCHIVE_NAME);
        // Leftovers from an interrupted attempt are discarded, never resumed.
        for stale in [&part, &archive_path] {
            if stale.exists() {
                tokio::fs::remove_file(stale)
                    .await
                    .map_err(|e| download_err(format!("remove {}: {e}", stale.display())))?;
            }
        }

        info!(task = %task_id, dest = %dest.display(), "downloading outputs");
        if let Err(reason) = self.fetch_archive(task_id, &part).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(download_err(reason));
        }
        tokio::fs::rename(&part, &archive_path)
            .await
            .map_err(|e| download_err(format!("finalise archive: {e}")))?;

        let zip_path = archive_path.clone();
        let out_dir = dest.to_path_buf();
        let files = tokio::task::spawn_blocking(move || archive::extract_zip(&zip_path, &out_dir))
            .await
            .map_err(|e| download_err(format!("extraction task failed: {e}")))?
            .map_err(|e| download_err(format!("invalid archive: {e}")))?;
        tokio::fs::remove_file(&archive_path)
            .await
            .map_err(|e| download_err(format!("remove {}: {e}", archive_path.display())))?;
        info!(task = %task_id, files = files.len(), "outputs extracted");
        Ok(files)
    }

    async fn console_output(&self, task_id: &str) -> Result<Vec<String>, PipelineError> {
        let url = self.endpoint(&format!("/task/{task_id}/output"));
        let poll_err = |reason: String| PipelineError::Poll {
            task_id: task_id.to_string(),
            reason,
            transient: false,
        };
        let resp = self
            .http
            .get(url.clone())
            .timeout(self.limits.request_timeout)
            .send()
            .await
            .map_err(|e| poll_err(format!("GET {url}: {e}")))?;
        resp.json::<Vec<String>>()
            .await
            .map_err(|e| poll_err(format!("GET {url}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::super::archive::build_zip;
    use super::super::stub::{StubResponse, StubServer};
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn limits(batch: usize) -> Limits {
        Limits {
            request_timeout: Duration::from_secs(5),
            parallel_uploads: 2,
            upload_batch_size: batch,
        }
    }

    fn client(base: &str, batch: usize) -> NodeClient {
        NodeClient::new(
            reqwest::Client::new(),
            Url::parse(base).unwrap(),
            limits(batch),
            None,
        )
    }

    fn client_with_events(base: &str, batch: usize) -> (NodeClient, UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = NodeClient::new(
            reqwest::Client::new(),
            Url::parse(base).unwrap(),
            limits(batch),
            Some(tx),
        );
        (client, rx)
    }

    fn upload_progress(rx: &mut UnboundedReceiver<RunEvent>) -> Vec<(usize, usize)> {
        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let RunEvent::UploadProgress { sent, total } = event {
                seen.push((sent, total));
            }
        }
        seen
    }

    fn frames(dir: &Path, n: usize) -> Vec<PathBuf> {
        (1..=n)
            .map(|i| {
                let p = dir.join(format!("frame_{i:06}.jpg"));
                std::fs::write(&p, format!("jpeg-{i}")).unwrap();
                p
            })
            .collect()
    }

    const COMPLETED: &str =
        r#"{"uuid":"t-1","status":{"code":40},"progress":100,"processingTime":5400,"imagesCount":10}"#;

    #[test]
    fn options_are_sent_as_name_value_list() {
        let mut opts = BTreeMap::new();
        opts.insert("dsm".to_string(), serde_json::json!(true));
        opts.insert("min-num-features".to_string(), serde_json::json!(8000));
        assert_eq!(
            options_json(&opts),
            r#"[{"name":"dsm","value":true},{"name":"min-num-features","value":8000}]"#
        );
        assert_eq!(options_json(&BTreeMap::new()), "[]");
    }

    #[tokio::test]
    async fn small_frame_sets_go_in_one_request() {
        let tmp = tempfile::tempdir().unwrap();
        let images = frames(tmp.path(), 3);
        let server = StubServer::start(|_| StubResponse::json(200, r#"{"uuid":"t-1"}"#)).await;
        let mut opts = BTreeMap::new();
        opts.insert("fast-orthophoto".to_string(), serde_json::json!(true));

        let (client, mut events) = client_with_events(&server.base, 10);
        let uuid = client.create_task("run_a", &images, &opts).await.unwrap();
        assert_eq!(uuid, "t-1");
        assert_eq!(upload_progress(&mut events), vec![(3, 3)]);

        let reqs = server.requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].method, "POST");
        assert_eq!(reqs[0].path, "/task/new");
        let body = reqs[0].body_text();
        assert_eq!(body.matches("name=\"images\"").count(), 3);
        assert!(body.contains("frame_000002.jpg"));
        assert!(body.contains(r#"[{"name":"fast-orthophoto","value":true}]"#));
        assert!(body.contains("run_a"));
    }

    #[tokio::test]
    async fn backend_error_body_is_a_submission_error() {
        let tmp = tempfile::tempdir().unwrap();
        let images = frames(tmp.path(), 1);
        let server =
            StubServer::start(|_| StubResponse::json(200, r#"{"error":"Not enough images"}"#)).await;
        let err = client(&server.base, 10)
            .create_task("run_a", &images, &BTreeMap::new())
            .await
            .unwrap_err();
        match err {
            PipelineError::Submission(msg) => assert_eq!(msg, "Not enough images"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn large_frame_sets_use_chunked_upload() {
        let tmp = tempfile::tempdir().unwrap();
        let images = frames(tmp.path(), 5);
        let server = StubServer::start(|req| match req.path.as_str() {
            "/task/new/init" => StubResponse::json(200, r#"{"uuid":"t-9"}"#),
            "/task/new/upload/t-9" => StubResponse::json(200, r#"{"success":true}"#),
            "/task/new/commit/t-9" => StubResponse::json(200, r#"{"uuid":"t-9"}"#),
            _ => StubResponse::json(404, r#"{"error":"unexpected"}"#),
        })
        .await;

        let (client, mut events) = client_with_events(&server.base, 2);
        let uuid = client
            .create_task("run_b", &images, &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(uuid, "t-9");

        // One event per batch, cumulative, whatever order the batches land in.
        let progress = upload_progress(&mut events);
        assert_eq!(progress.len(), 3);
        assert!(progress.iter().all(|&(_, total)| total == 5));
        assert!(progress.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(progress.last(), Some(&(5, 5)));

        let paths = server.paths();
        assert_eq!(paths.first().map(String::as_str), Some("/task/new/init"));
        assert_eq!(paths.last().map(String::as_str), Some("/task/new/commit/t-9"));
        let uploads: Vec<_> = server
            .requests()
            .into_iter()
            .filter(|r| r.path == "/task/new/upload/t-9")
            .collect();
        assert_eq!(uploads.len(), 3);
        let uploaded: usize = uploads
            .iter()
            .map(|r| r.body_text().matches("name=\"images\"").count())
            .sum();
        assert_eq!(uploaded, 5);
    }

    #[tokio::test]
    async fn failed_chunk_removes_the_half_created_task() {
        let tmp = tempfile::tempdir().unwrap();
        let images = frames(tmp.path(), 4);
        let uploads = Arc::new(AtomicUsize::new(0));
        let seen = uploads.clone();
        let server = StubServer::start(move |req| match req.path.as_str() {
            "/task/new/init" => StubResponse::json(200, r#"{"uuid":"t-5"}"#),
            "/task/new/upload/t-5" => {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    StubResponse::json(200, r#"{"success":true}"#)
                } else {
                    StubResponse::json(500, r#"{"error":"disk full"}"#)
                }
            }
            "/task/remove" => StubResponse::json(200, r#"{"success":true}"#),
            _ => StubResponse::json(404, r#"{"error":"unexpected"}"#),
        })
        .await;

        let err = client(&server.base, 2)
            .create_task("run_c", &images, &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Submission(_)));

        let reqs = server.requests();
        assert!(!reqs.iter().any(|r| r.path.starts_with("/task/new/commit")));
        let remove = reqs.iter().find(|r| r.path == "/task/remove").unwrap();
        assert_eq!(remove.body_text(), "uuid=t-5");
    }

    #[tokio::test]
    async fn status_snapshot_is_mapped() {
        let server = StubServer::start(|req| {
            assert_eq!(req.path, "/task/t-1/info");
            StubResponse::json(
                200,
                r#"{"uuid":"t-1","status":{"code":20},"progress":42.5,"processingTime":-1,"imagesCount":10}"#,
            )
        })
        .await;
        let snap = client(&server.base, 10).poll_status("t-1").await.unwrap();
        assert_eq!(snap.status, TaskStatus::Running);
        assert_eq!(snap.progress, 42.5);
        assert_eq!(snap.processing_time_ms, 0);
        assert_eq!(snap.images_count, 10);
        assert_eq!(snap.last_error, None);
    }

    #[tokio::test]
    async fn failed_status_carries_error_message() {
        let server = StubServer::start(|_| {
            StubResponse::json(
                200,
                r#"{"uuid":"t-1","status":{"code":30,"errorMessage":"Not enough images"},"progress":12}"#,
            )
        })
        .await;
        let snap = client(&server.base, 10).poll_status("t-1").await.unwrap();
        assert_eq!(snap.status, TaskStatus::Failed);
        assert_eq!(snap.last_error.as_deref(), Some("Not enough images"));
    }

    #[tokio::test]
    async fn unknown_task_is_not_transient() {
        let server =
            StubServer::start(|_| StubResponse::json(200, r#"{"error":"t-1 not found"}"#)).await;
        let err = client(&server.base, 10).poll_status("t-1").await.unwrap_err();
        assert!(matches!(err, PipelineError::Poll { transient: false, .. }));
    }

    #[tokio::test]
    async fn network_faults_are_transient() {
        let base = StubServer::unreachable_base().await;
        let err = client(&base, 10).poll_status("t-1").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn download_extracts_archive_and_is_repeatable() {
        let tmp = tempfile::tempdir().unwrap();
        let zip = build_zip(&[
            ("odm_orthophoto/odm_orthophoto.tif", b"ortho-bytes"),
            ("odm_report/report.pdf", b"%PDF"),
        ]);
        let server = StubServer::start(move |req| match req.path.as_str() {
            "/task/t-1/info" => StubResponse::json(200, COMPLETED),
            "/task/t-1/download/all.zip" => StubResponse::bytes(zip.clone()),
            _ => StubResponse::json(404, r#"{"error":"unexpected"}"#),
        })
        .await;
        let dest = tmp.path().join("odm");
        let c = client(&server.base, 10);

        let first = c.download_outputs("t-1", &dest).await.unwrap();
        assert_eq!(first.len(), 2);
        let ortho = dest.join("odm_orthophoto/odm_orthophoto.tif");
        assert_eq!(std::fs::read(&ortho).unwrap(), b"ortho-bytes");
        assert!(!dest.join(ARCHIVE_NAME).exists());

        // A leftover partial from an interrupted attempt must not leak into the result.
        std::fs::write(dest.join(PARTIAL_ARCHIVE_NAME), b"garbage").unwrap();
        let second = c.download_outputs("t-1", &dest).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read(&ortho).unwrap(), b"ortho-bytes");
        assert!(!dest.join(PARTIAL_ARCHIVE_NAME).exists());
    }

    #[tokio::test]
    async fn download_requires_completed_status() {
        let tmp = tempfile::tempdir().unwrap();
        let server = StubServer::start(|_| {
            StubResponse::json(200, r#"{"uuid":"t-1","status":{"code":20},"progress":50}"#)
        })
        .await;
        let err = client(&server.base, 10)
            .download_outputs("t-1", tmp.path())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Download { .. }));
        assert_eq!(server.paths(), vec!["/task/t-1/info"]);
    }

    #[tokio::test]
    async fn interrupted_download_leaves_no_partial_file() {
        let tmp = tempfile::tempdir().unwrap();
        let server = StubServer::start(|req| match req.path.as_str() {
            "/task/t-1/info" => StubResponse::json(200, COMPLETED),
            _ => StubResponse::truncated(vec![0u8; 100], 10_000),
        })
        .await;
        let dest = tmp.path().join("odm");
        let err = client(&server.base, 10)
            .download_outputs("t-1", &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Download { .. }));
        assert!(!dest.join(PARTIAL_ARCHIVE_NAME).exists());
        assert!(!dest.join(ARCHIVE_NAME).exists());
    }

    #[tokio::test]
    async fn console_output_is_a_list_of_lines() {
        let server =
            StubServer::start(|_| StubResponse::json(200, r#"["[INFO] start","[INFO] done"]"#))
                .await;
        let lines = client(&server.base, 10).console_output("t-1").await.unwrap();
        assert_eq!(lines, vec!["[INFO] start", "[INFO] done"]);
    }
}
