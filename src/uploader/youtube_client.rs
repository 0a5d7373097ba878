use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, LOCATION, RANGE};
use reqwest::{redirect, Client};
use serde_json::{json, Value};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio::time::Duration;

use super::resumable::{ChunkError, ChunkOutcome, ChunkedRequest};
use crate::errors::{AppError, AppResult};

const VIDEO_UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";
const THUMBNAIL_URL: &str = "https://www.googleapis.com/upload/youtube/v3/thumbnails/set";
const PLAYLIST_ITEMS_URL: &str = "https://www.googleapis.com/youtube/v3/playlistItems";

/// Snippet and status fields sent when a resumable session is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy_status: String,
}

impl VideoMetadata {
    pub fn to_resource(&self) -> Value {
        let mut snippet = json!({
            "title": self.title,
            "description": self.description,
            "categoryId": self.category_id,
        });
        if !self.tags.is_empty() {
            snippet["tags"] = json!(self.tags);
        }

        json!({
            "snippet": snippet,
            "status": {
                "privacyStatus": self.privacy_status,
                "selfDeclaredMadeForKids": false,
            },
        })
    }
}

/// Thin YouTube Data API client authorized with an OAuth bearer token.
pub struct YouTubeClient {
    client: Client,
    access_token: String,
    chunk_size: u64,
}

impl YouTubeClient {
    pub fn new(access_token: String, chunk_size: u64) -> AppResult<Self> {
        // 308 is the resumable "continue" status, never a redirect to follow
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            access_token,
            chunk_size: chunk_size.max(256 * 1024),
        })
    }

    pub async fn video_upload(
        &self,
        file_path: &Path,
        metadata: &VideoMetadata,
    ) -> AppResult<VideoUploadRequest> {
        let file = File::open(file_path).await?;
        let total_bytes = file.metadata().await?.len();
        if total_bytes == 0 {
            return Err(AppError::validation("video_file", "Video file is empty"));
        }

        Ok(VideoUploadRequest {
            client: self.client.clone(),
            access_token: self.access_token.clone(),
            file,
            file_name: file_path.display().to_string(),
            mime_type: video_mime_type(file_path),
            resource: metadata.to_resource(),
            total_bytes,
            chunk_size: self.chunk_size,
            offset: 0,
            session_uri: None,
            resume_pending: false,
        })
    }

    pub async fn set_thumbnail(&self, video_id: &str, thumbnail: &Path) -> AppResult<()> {
        let bytes = tokio::fs::read(thumbnail).await?;
        let content_type = match thumbnail
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .as_deref()
        {
            Some("png") => "image/png",
            _ => "image/jpeg",
        };

        let response = self
            .client
            .post(THUMBNAIL_URL)
            .query(&[("videoId", video_id)])
            .bearer_auth(&self.access_token)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        check_response(response).await?;
        log::info!("Thumbnail set for video {}", video_id);
        Ok(())
    }

    pub async fn add_to_playlist(&self, video_id: &str, playlist_id: &str) -> AppResult<()> {
        let body = json!({
            "snippet": {
                "playlistId": playlist_id,
                "resourceId": {
                    "kind": "youtube#video",
                    "videoId": video_id,
                },
            },
        });

        let response = self
            .client
            .post(PLAYLIST_ITEMS_URL)
            .query(&[("part", "snippet")])
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        check_response(response).await?;
        log::info!("Video {} added to playlist {}", video_id, playlist_id);
        Ok(())
    }
}

async fn check_response(response: reqwest::Response) -> AppResult<Value> {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    if !status.is_success() {
        return Err(AppError::UploadRejected {
            status: status.as_u16(),
            body: text,
        });
    }

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

fn video_mime_type(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        _ => "video/mp4",
    }
}

/// Parse the `Range: bytes=0-N` header of a 308 reply into the next offset.
pub fn next_offset_from_range(header: &str) -> Option<u64> {
    let range = Regex::new(r"bytes=(\d+)-(\d+)").ok()?;
    let captures = range.captures(header)?;
    captures.get(2)?.as_str().parse::<u64>().ok().map(|end| end + 1)
}

/// Next offset confirmed by a 308 reply; no `Range` header means nothing
/// was stored yet.
fn confirmed_offset(response: &reqwest::Response) -> u64 {
    response
        .headers()
        .get(RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(next_offset_from_range)
        .unwrap_or(0)
}

/// One resumable video upload. The session is opened lazily by the first
/// chunk so that session-open failures go through the same retry path.
/// After a failed chunk the server is asked how many bytes it holds before
/// anything is resent.
pub struct VideoUploadRequest {
    client: Client,
    access_token: String,
    file: File,
    file_name: String,
    mime_type: &'static str,
    resource: Value,
    total_bytes: u64,
    chunk_size: u64,
    offset: u64,
    session_uri: Option<String>,
    resume_pending: bool,
}

impl VideoUploadRequest {
    async fn open_session(&self) -> Result<String, ChunkError> {
        let response = self
            .client
            .post(VIDEO_UPLOAD_URL)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(&self.access_token)
            .header("X-Upload-Content-Length", self.total_bytes)
            .header("X-Upload-Content-Type", self.mime_type)
            .json(&self.resource)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChunkError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ChunkError::Fatal("Upload session has no Location header".to_string())
            })?;

        log::debug!("Opened resumable session for {}", self.file_name);
        Ok(location)
    }

    async fn send_chunk(&mut self, session_uri: &str) -> Result<ChunkOutcome, ChunkError> {
        let end = (self.offset + self.chunk_size).min(self.total_bytes);
        let length = (end - self.offset) as usize;

        let mut buffer = vec![0u8; length];
        self.file.seek(SeekFrom::Start(self.offset)).await?;
        self.file.read_exact(&mut buffer).await?;

        let response = self
            .client
            .put(session_uri)
            .bearer_auth(&self.access_token)
            .header(CONTENT_LENGTH, length)
            .header(
                CONTENT_RANGE,
                format!("bytes {}-{}/{}", self.offset, end - 1, self.total_bytes),
            )
            .body(buffer)
            .send()
            .await?;

        let status = response.status().as_u16();
        match status {
            308 => {
                self.offset = confirmed_offset(&response);
                Ok(ChunkOutcome::Progress {
                    bytes_sent: self.offset,
                    total_bytes: self.total_bytes,
                })
            }
            200 | 201 => {
                let body: Value = response.json().await?;
                Ok(ChunkOutcome::Complete(body))
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(ChunkError::Http { status, body })
            }
        }
    }

    /// Empty `PUT` with `Content-Range: bytes */<total>`. Returns the
    /// finished resource when the server already has every byte, otherwise
    /// moves `offset` to what it confirms.
    async fn query_status(
        &mut self,
        session_uri: &str,
    ) -> Result<Option<ChunkOutcome>, ChunkError> {
        let response = self
            .client
            .put(session_uri)
            .bearer_auth(&self.access_token)
            .header(CONTENT_LENGTH, 0)
            .header(CONTENT_RANGE, format!("bytes */{}", self.total_bytes))
            .send()
            .await?;

        let status = response.status().as_u16();
        match status {
            308 => {
                self.offset = confirmed_offset(&response);
                log::info!(
                    "Server holds {}/{} bytes of {}, resuming",
                    self.offset,
                    self.total_bytes,
                    self.file_name
                );
                Ok(None)
            }
            200 | 201 => {
                let body: Value = response.json().await?;
                Ok(Some(ChunkOutcome::Complete(body)))
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(ChunkError::Http { status, body })
            }
        }
    }

    async fn advance(&mut self) -> Result<ChunkOutcome, ChunkError> {
        let session_uri = match &self.session_uri {
            Some(uri) => uri.clone(),
            None => {
                let uri = self.open_session().await?;
                self.session_uri = Some(uri.clone());
                uri
            }
        };

        if self.resume_pending {
            if let Some(outcome) = self.query_status(&session_uri).await? {
                return Ok(outcome);
            }
            self.resume_pending = false;
        }

        self.send_chunk(&session_uri).await
    }
}

#[async_trait]
impl ChunkedRequest for VideoUploadRequest {
    fn describe(&self) -> String {
        self.file_name.clone()
    }

    async fn next_chunk(&mut self) -> Result<ChunkOutcome, ChunkError> {
        let result = self.advance().await;
        if result.is_err() && self.session_uri.is_some() {
            self.resume_pending = true;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::retry::tests::RecordingSleeper;
    use crate::uploader::{ResumableUploader, RetryConfig};
    use std::sync::{Arc, Mutex};
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    #[derive(Debug)]
    struct SeenRequest {
        content_range: Option<String>,
        body_len: usize,
    }

    async fn read_request(stream: &mut TcpStream) -> SeenRequest {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        let header_end = loop {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before headers");
            data.extend_from_slice(&buf[..n]);
            if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&data[..header_end]).to_string();
        let header = |name: &str| {
            head.lines().find_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.trim()
                    .eq_ignore_ascii_case(name)
                    .then(|| value.trim().to_string())
            })
        };
        let body_len: usize = header("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        while data.len() < header_end + body_len {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before body");
            data.extend_from_slice(&buf[..n]);
        }

        SeenRequest {
            content_range: header("content-range"),
            body_len,
        }
    }

    /// Answers one connection per scripted reply and records what was sent.
    async fn fake_session(replies: Vec<String>) -> (String, Arc<Mutex<Vec<SeenRequest>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/upload/session", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();

        tokio::spawn(async move {
            for reply in replies {
                let (mut stream, _) = listener.accept().await.unwrap();
                let request = read_request(&mut stream).await;
                log.lock().unwrap().push(request);
                stream.write_all(reply.as_bytes()).await.unwrap();
                let _ = stream.shutdown().await;
            }
        });

        (url, seen)
    }

    fn resume_incomplete(range: &str) -> String {
        format!(
            "HTTP/1.1 308 Resume Incomplete\r\nRange: {}\r\n\
             Content-Length: 0\r\nConnection: close\r\n\r\n",
            range
        )
    }

    fn status_only(status: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            status
        )
    }

    fn finished(status: &str, id: &str) -> String {
        let body = format!(r#"{{"id":"{}","kind":"youtube#video"}}"#, id);
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        )
    }

    /// Ten-byte upload sent in four-byte chunks over an already opened session.
    async fn open_request(dir: &tempfile::TempDir, session_uri: String) -> VideoUploadRequest {
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"0123456789").unwrap();

        VideoUploadRequest {
            client: Client::builder()
                .redirect(redirect::Policy::none())
                .build()
                .unwrap(),
            access_token: "token".to_string(),
            file: File::open(&path).await.unwrap(),
            file_name: "clip.mp4".to_string(),
            mime_type: "video/mp4",
            resource: Value::Null,
            total_bytes: 10,
            chunk_size: 4,
            offset: 0,
            session_uri: Some(session_uri),
            resume_pending: false,
        }
    }

    fn ranges(seen: &Mutex<Vec<SeenRequest>>) -> Vec<String> {
        seen.lock()
            .unwrap()
            .iter()
            .map(|r| r.content_range.clone().unwrap_or_default())
            .collect()
    }

    #[tokio::test]
    async fn test_failed_chunk_resumes_from_server_offset() {
        let dir = tempfile::tempdir().unwrap();
        let (url, seen) = fake_session(vec![
            resume_incomplete("bytes=0-3"),
            status_only("503 Service Unavailable"),
            // The server kept two bytes of the failed chunk
            resume_incomplete("bytes=0-5"),
            finished("200 OK", "abc123"),
        ])
        .await;
        let mut request = open_request(&dir, url).await;
        let sleeper = Arc::new(RecordingSleeper::default());

        let id = ResumableUploader::new(RetryConfig::default(), sleeper.clone())
            .upload(&mut request)
            .await
            .unwrap();

        assert_eq!(id, "abc123");
        assert_eq!(sleeper.count(), 1);
        assert_eq!(
            ranges(&seen),
            vec!["bytes 0-3/10", "bytes 4-7/10", "bytes */10", "bytes 6-9/10"]
        );
        let body_lens: Vec<usize> = seen.lock().unwrap().iter().map(|r| r.body_len).collect();
        assert_eq!(body_lens, vec![4, 4, 0, 4]);
    }

    #[tokio::test]
    async fn test_status_query_can_finish_the_upload() {
        let dir = tempfile::tempdir().unwrap();
        let (url, seen) = fake_session(vec![
            status_only("500 Internal Server Error"),
            finished("201 Created", "done42"),
        ])
        .await;
        let mut request = open_request(&dir, url).await;

        assert!(request.next_chunk().await.is_err());
        assert!(request.resume_pending);

        let outcome = request.next_chunk().await.unwrap();
        assert!(matches!(&outcome, ChunkOutcome::Complete(body) if body["id"] == "done42"));
        assert_eq!(ranges(&seen), vec!["bytes 0-3/10", "bytes */10"]);
    }

    #[tokio::test]
    async fn test_status_query_without_range_restarts_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let (url, seen) = fake_session(vec![
            resume_incomplete("bytes=0-3"),
            status_only("502 Bad Gateway"),
            status_only("308 Resume Incomplete"),
            resume_incomplete("bytes=0-3"),
        ])
        .await;
        let mut request = open_request(&dir, url).await;

        request.next_chunk().await.unwrap();
        assert!(request.next_chunk().await.is_err());
        let outcome = request.next_chunk().await.unwrap();

        assert_eq!(
            outcome,
            ChunkOutcome::Progress {
                bytes_sent: 4,
                total_bytes: 10
            }
        );
        assert!(!request.resume_pending);
        assert_eq!(
            ranges(&seen),
            vec!["bytes 0-3/10", "bytes 4-7/10", "bytes */10", "bytes 0-3/10"]
        );
    }

    #[test]
    fn test_range_header_parsing() {
        assert_eq!(next_offset_from_range("bytes=0-262143"), Some(262144));
        assert_eq!(next_offset_from_range("bytes=0-0"), Some(1));
        assert_eq!(next_offset_from_range("garbage"), None);
    }

    #[test]
    fn test_metadata_resource_shape() {
        let metadata = VideoMetadata {
            title: "The Last Call #Shorts".to_string(),
            description: "desc".to_string(),
            tags: vec!["#sms".to_string(), "#story".to_string()],
            category_id: "22".to_string(),
            privacy_status: "public".to_string(),
        };

        let resource = metadata.to_resource();
        assert_eq!(resource["snippet"]["categoryId"], "22");
        assert_eq!(resource["snippet"]["tags"][1], "#story");
        assert_eq!(resource["status"]["privacyStatus"], "public");
    }

    #[test]
    fn test_metadata_without_tags_omits_field() {
        let metadata = VideoMetadata {
            title: "t".to_string(),
            description: String::new(),
            tags: Vec::new(),
            category_id: "22".to_string(),
            privacy_status: "private".to_string(),
        };
        assert!(metadata.to_resource()["snippet"].get("tags").is_none());
    }

    #[test]
    fn test_video_mime_types() {
        assert_eq!(video_mime_type(Path::new("a.MOV")), "video/quicktime");
        assert_eq!(video_mime_type(Path::new("a.avi")), "video/x-msvideo");
        assert_eq!(video_mime_type(Path::new("a.mp4")), "video/mp4");
    }

    #[tokio::test]
    async fn test_empty_video_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.mp4");
        std::fs::write(&path, b"").unwrap();

        let client = YouTubeClient::new("token".to_string(), 1024).unwrap();
        let metadata = VideoMetadata {
            title: "t".to_string(),
            description: String::new(),
            tags: Vec::new(),
            category_id: "22".to_string(),
            privacy_status: "public".to_string(),
        };

        assert!(matches!(
            client.video_upload(&path, &metadata).await,
            Err(AppError::Validation { .. })
        ));
    }
}
