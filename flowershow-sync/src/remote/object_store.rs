//! Object storage worker reachable over plain HTTP.
//!
//! Flat keyspace, no branches and no pull requests, so only [`ContentStore`]
//! is implemented. `branch` arguments are ignored. Identifiers are SHA-256
//! blob hashes computed locally and stored alongside each object.
//!
//! | Capability    | Request                                               |
//! |---------------|-------------------------------------------------------|
//! | listing       | `GET  <url>/?cursor=<c>` → `{objects, truncated, cursor}` |
//! | checksum      | `HEAD <url>/<path>` → `X-Content-SHA256`              |
//! | content       | `GET  <url>/<path>`                                   |
//! | write         | `PUT  <url>/<path>` + `X-Content-SHA256`              |
//! | delete        | `DELETE <url>/<path>`                                 |

use async_trait::async_trait;
use serde::Deserialize;

use flowershow_core::{BackendConfig, ConfigError, HashAlgo, PublishConfig, RemoteState};

use crate::error::PublishError;
use crate::remote::http::{encode_path, HttpClient, HttpRequest};
use crate::remote::{ContentStore, DeleteFile, PutFile};

const CHECKSUM_HEADER: &str = "X-Content-SHA256";
/// Upper bound on listing pages; a worker that keeps returning cursors past
/// this is treated as truncated.
const MAX_PAGES: usize = 1000;

#[derive(Debug, Deserialize)]
struct ListingPage {
    #[serde(default)]
    objects: Vec<ListedObject>,
    #[serde(default)]
    truncated: bool,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    key: String,
    #[serde(default)]
    checksums: Checksums,
}

#[derive(Debug, Default, Deserialize)]
struct Checksums {
    sha256: Option<String>,
}

/// Object storage backend.
pub struct ObjectStore {
    http: HttpClient,
    base_url: String,
}

impl ObjectStore {
    /// Build from a validated config; fails if the backend is not `object_store`.
    pub fn new(config: &PublishConfig) -> Result<Self, PublishError> {
        let BackendConfig::ObjectStore { url } = &config.backend else {
            return Err(PublishError::ConfigInvalid(ConfigError::Invalid {
                field: "backend",
                reason: "expected kind `object_store`".to_string(),
            }));
        };
        config.validate()?;
        let mut headers = vec![(
            "User-Agent",
            format!("flowershow-sync/{}", env!("CARGO_PKG_VERSION")),
        )];
        if !config.token.is_empty() {
            headers.push(("Authorization", format!("Bearer {}", config.token)));
        }
        Ok(Self {
            http: HttpClient::new(config.request_timeout(), headers),
            base_url: url.trim_end_matches('/').to_string(),
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, encode_path(path))
    }

    fn listing_url(&self, cursor: Option<&str>) -> String {
        match cursor {
            Some(c) => format!("{}/?cursor={}", self.base_url, urlencoding::encode(c)),
            None => format!("{}/", self.base_url),
        }
    }
}

#[async_trait]
impl ContentStore for ObjectStore {
    fn backend(&self) -> &'static str {
        "object_store"
    }

    fn hash_algo(&self) -> HashAlgo {
        HashAlgo::Sha256
    }

    async fn read_tree(&self, _branch: &str) -> Result<RemoteState, PublishError> {
        let mut state = RemoteState::new(HashAlgo::Sha256);
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let url = self.listing_url(cursor.as_deref());
            let request = HttpRequest::new("list objects", &self.base_url, "GET", url)
                .header("Cache-Control", "no-cache");
            let reply = self.http.send(request).await?;
            let page: ListingPage = serde_json::from_slice(&reply.body)
                .map_err(|e| reply.decode_error(e.to_string()))?;
            match apply_page(&mut state, page) {
                Some(next) => cursor = Some(next),
                None => return Ok(state),
            }
        }
        tracing::warn!("object listing exceeded {MAX_PAGES} pages; treating it as truncated");
        state.truncated = true;
        Ok(state)
    }

    async fn file_sha(&self, path: &str, _branch: &str) -> Result<Option<String>, PublishError> {
        let request = HttpRequest::new("head object", path, "HEAD", self.object_url(path))
            .capture(CHECKSUM_HEADER);
        match self.http.send(request).await {
            Ok(reply) => Ok(reply.header),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn read_file(&self, path: &str, _branch: &str) -> Result<Option<Vec<u8>>, PublishError> {
        let request = HttpRequest::new("get object", path, "GET", self.object_url(path))
            .header("Cache-Control", "no-cache");
        match self.http.send(request).await {
            Ok(reply) => Ok(Some(reply.body)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn put_file(&self, request: &PutFile<'_>) -> Result<(), PublishError> {
        let http = HttpRequest::new("put object", request.path, "PUT", self.object_url(request.path))
            .header(CHECKSUM_HEADER, request.content_hash)
            .header("Content-Type", "application/octet-stream")
            .bytes(request.content.to_vec());
        self.http.send(http).await?;
        Ok(())
    }

    async fn delete_file(&self, request: &DeleteFile<'_>) -> Result<(), PublishError> {
        let http = HttpRequest::new("delete object", request.path, "DELETE", self.object_url(request.path));
        match self.http.send(http).await {
            Ok(_) => Ok(()),
            // Already gone.
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Merge one listing page into `state`; returns the next cursor, if any.
fn apply_page(state: &mut RemoteState, page: ListingPage) -> Option<String> {
    for object in page.objects {
        match object.checksums.sha256 {
            Some(sha) => state.insert(&object.key, sha.to_ascii_lowercase()),
            None => tracing::warn!("object `{}` listed without a checksum; skipped", object.key),
        }
    }
    match (page.truncated, page.cursor) {
        (true, Some(cursor)) if !cursor.is_empty() => Some(cursor),
        (true, _) => {
            tracing::warn!("object listing truncated without a cursor");
            state.truncated = true;
            None
        }
        (false, _) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(json: &str) -> ListingPage {
        serde_json::from_str(json).expect("page")
    }

    #[test]
    fn page_entries_are_inserted() {
        let mut state = RemoteState::new(HashAlgo::Sha256);
        let next = apply_page(
            &mut state,
            page(r#"{"objects":[{"key":"notes/a.md","checksums":{"sha256":"ABC"}}],"truncated":false}"#),
        );
        assert!(next.is_none());
        assert_eq!(state.get("notes/a.md").map(|e| e.hash.as_str()), Some("abc"));
        assert!(!state.truncated);
    }

    #[test]
    fn cursor_is_followed_when_truncated() {
        let mut state = RemoteState::new(HashAlgo::Sha256);
        let next = apply_page(&mut state, page(r#"{"objects":[],"truncated":true,"cursor":"c1"}"#));
        assert_eq!(next.as_deref(), Some("c1"));
        assert!(!state.truncated);
    }

    #[test]
    fn truncation_without_cursor_is_flagged() {
        let mut state = RemoteState::new(HashAlgo::Sha256);
        let next = apply_page(&mut state, page(r#"{"objects":[],"truncated":true}"#));
        assert!(next.is_none());
        assert!(state.truncated);
    }

    #[test]
    fn objects_without_checksum_are_skipped() {
        let mut state = RemoteState::new(HashAlgo::Sha256);
        apply_page(&mut state, page(r#"{"objects":[{"key":"x.png"}]}"#));
        assert!(state.is_empty());
    }

    #[test]
    fn urls_are_built_from_base() {
        let cfg = PublishConfig {
            backend: BackendConfig::ObjectStore {
                url: "https://r2.example.com/".to_string(),
            },
            ..Default::default()
        };
        let store = ObjectStore::new(&cfg).expect("store");
        assert_eq!(store.object_url("notes/my note.md"), "https://r2.example.com/notes/my%20note.md");
        assert_eq!(store.listing_url(None), "https://r2.example.com/");
        assert_eq!(store.listing_url(Some("a b")), "https://r2.example.com/?cursor=a%20b");
        assert_eq!(store.hash_algo(), HashAlgo::Sha256);
    }

    #[test]
    fn github_config_is_rejected() {
        assert!(ObjectStore::new(&PublishConfig::default()).is_err());
    }
}
