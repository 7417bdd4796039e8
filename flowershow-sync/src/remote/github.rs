//! Git-hosting REST + GraphQL backend.
//!
//! | Capability            | Endpoint                                            |
//! |-----------------------|-----------------------------------------------------|
//! | branch head           | `GET  /repos/{o}/{r}/git/ref/heads/{branch}`        |
//! | create branch         | `POST /repos/{o}/{r}/git/refs`                      |
//! | recursive tree        | `GET  /repos/{o}/{r}/git/trees/{branch}?recursive=1`|
//! | blob id / content     | `GET  /repos/{o}/{r}/contents/{path}?ref={branch}`  |
//! | large blob content    | `GET  /repos/{o}/{r}/git/blobs/{sha}`               |
//! | create / update file  | `PUT  /repos/{o}/{r}/contents/{path}`               |
//! | delete file           | `DELETE /repos/{o}/{r}/contents/{path}`             |
//! | open pull request     | `POST /repos/{o}/{r}/pulls`                         |
//! | find pull request     | `GET  /repos/{o}/{r}/pulls?head={o}:{branch}`       |
//! | merge                 | `PUT  /repos/{o}/{r}/pulls/{n}/merge`               |
//! | merge state           | `GET  /repos/{o}/{r}/pulls/{n}/merge` (204 / 404)   |
//! | deferred auto-merge   | GraphQL `enablePullRequestAutoMerge`                |

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};

use flowershow_core::{BackendConfig, ConfigError, HashAlgo, PublishConfig, RemoteState};

use crate::error::PublishError;
use crate::remote::http::{encode_path, HttpClient, HttpRequest};
use crate::remote::{
    ContentStore, DeleteFile, PullRequestDraft, PullRequestRef, PutFile, ReviewRepository,
};

const API_VERSION: &str = "2022-11-28";

const AUTO_MERGE_MUTATION: &str = "mutation($id: ID!, $title: String) { \
    enablePullRequestAutoMerge(input: { pullRequestId: $id, mergeMethod: MERGE, commitHeadline: $title }) \
    { pullRequest { number } } }";

/// Repository on a Git-hosting API.
pub struct GithubRepository {
    http: HttpClient,
    api_url: String,
    owner: String,
    repo: String,
    algo: HashAlgo,
}

impl GithubRepository {
    /// Build from a validated config; fails if the backend is not `github`.
    pub fn new(config: &PublishConfig) -> Result<Self, PublishError> {
        let BackendConfig::Github { api_url } = &config.backend else {
            return Err(PublishError::ConfigInvalid(ConfigError::Invalid {
                field: "backend",
                reason: "expected kind `github`".to_string(),
            }));
        };
        config.validate()?;
        let headers = vec![
            ("Authorization", format!("Bearer {}", config.token)),
            ("Accept", "application/vnd.github+json".to_string()),
            ("X-GitHub-Api-Version", API_VERSION.to_string()),
            (
                "User-Agent",
                format!("flowershow-sync/{}", env!("CARGO_PKG_VERSION")),
            ),
        ];
        Ok(Self {
            http: HttpClient::new(config.request_timeout(), headers),
            api_url: api_url.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            algo: HashAlgo::Sha1,
        })
    }

    /// Override the identifier algorithm reported before a tree is read.
    pub fn with_hash_algo(mut self, algo: HashAlgo) -> Self {
        self.algo = algo;
        self
    }

    fn repo_url(&self, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_url,
            urlencoding::encode(&self.owner),
            urlencoding::encode(&self.repo),
            suffix
        )
    }

    fn graphql_url(&self) -> String {
        graphql_url(&self.api_url)
    }

    async fn contents(&self, path: &str, branch: &str) -> Result<Option<Value>, PublishError> {
        let url = self.repo_url(&format!(
            "contents/{}?ref={}",
            encode_path(path),
            urlencoding::encode(branch)
        ));
        let request = HttpRequest::new("get file", path, "GET", url)
            .header("Cache-Control", "no-cache");
        let reply = match self.http.send(request).await {
            Ok(reply) => reply,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        let value = reply.json()?;
        if value.is_array() {
            return Err(reply.decode_error("path is a directory, not a file"));
        }
        Ok(Some(value))
    }

    async fn blob_content(&self, path: &str, sha: &str) -> Result<Vec<u8>, PublishError> {
        let url = self.repo_url(&format!("git/blobs/{sha}"));
        let reply = self
            .http
            .send(HttpRequest::new("get blob", path, "GET", url))
            .await?;
        let value = reply.json()?;
        let encoded = value
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| reply.decode_error("blob without content"))?;
        decode_base64(encoded).map_err(|e| reply.decode_error(e))
    }
}

#[async_trait]
impl ContentStore for GithubRepository {
    fn backend(&self) -> &'static str {
        "github"
    }

    fn hash_algo(&self) -> HashAlgo {
        self.algo
    }

    async fn read_tree(&self, branch: &str) -> Result<RemoteState, PublishError> {
        // The cache-busting parameter forces a fresh listing past any CDN cache.
        let url = self.repo_url(&format!(
            "git/trees/{}?recursive=1&nocache={}",
            encode_path(branch),
            cache_buster()
        ));
        let request = HttpRequest::new("read tree", branch, "GET", url)
            .header("Cache-Control", "no-cache");
        let reply = match self.http.send(request).await {
            Ok(reply) => reply,
            // 409: the repository has no commits yet.
            Err(PublishError::RemoteRejected { status: 409, .. }) => {
                return Ok(RemoteState::new(self.algo))
            }
            Err(err) => return Err(err),
        };
        let value = reply.json()?;
        parse_tree(&value, self.algo).map_err(|reason| reply.decode_error(reason))
    }

    async fn file_sha(&self, path: &str, branch: &str) -> Result<Option<String>, PublishError> {
        let Some(value) = self.contents(path, branch).await? else {
            return Ok(None);
        };
        Ok(value.get("sha").and_then(Value::as_str).map(str::to_string))
    }

    async fn read_file(&self, path: &str, branch: &str) -> Result<Option<Vec<u8>>, PublishError> {
        let Some(value) = self.contents(path, branch).await? else {
            return Ok(None);
        };
        let encoding = value.get("encoding").and_then(Value::as_str).unwrap_or("");
        let content = value.get("content").and_then(Value::as_str).unwrap_or("");
        if encoding == "base64" {
            return decode_base64(content).map(Some).map_err(|reason| {
                PublishError::Decode {
                    operation: "get file",
                    target: path.to_string(),
                    reason,
                }
            });
        }
        // Files over the contents API size limit come back without content.
        let sha = value
            .get("sha")
            .and_then(Value::as_str)
            .ok_or_else(|| PublishError::Decode {
                operation: "get file",
                target: path.to_string(),
                reason: "file without sha".to_string(),
            })?;
        self.blob_content(path, sha).await.map(Some)
    }

    async fn put_file(&self, request: &PutFile<'_>) -> Result<(), PublishError> {
        let mut body = json!({
            "message": request.message,
            "content": STANDARD.encode(request.content),
            "branch": request.branch,
            "committer": {
                "name": request.committer.name,
                "email": request.committer.email,
            },
        });
        if let Some(sha) = request.sha {
            body["sha"] = Value::String(sha.to_string());
        }
        let url = self.repo_url(&format!("contents/{}", encode_path(request.path)));
        self.http
            .send(HttpRequest::new("put file", request.path, "PUT", url).json(body))
            .await?;
        Ok(())
    }

    async fn delete_file(&self, request: &DeleteFile<'_>) -> Result<(), PublishError> {
        let body = json!({
            "message": request.message,
            "sha": request.sha,
            "branch": request.branch,
            "committer": {
                "name": request.committer.name,
                "email": request.committer.email,
            },
        });
        let url = self.repo_url(&format!("contents/{}", encode_path(request.path)));
        self.http
            .send(HttpRequest::new("delete file", request.path, "DELETE", url).json(body))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ReviewRepository for GithubRepository {
    async fn branch_head(&self, branch: &str) -> Result<Option<String>, PublishError> {
        let url = self.repo_url(&format!("git/ref/heads/{}", encode_path(branch)));
        let request = HttpRequest::new("get branch", branch, "GET", url)
            .header("Cache-Control", "no-cache");
        let reply = match self.http.send(request).await {
            Ok(reply) => reply,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        let value = reply.json()?;
        value
            .pointer("/object/sha")
            .and_then(Value::as_str)
            .map(|sha| Some(sha.to_string()))
            .ok_or_else(|| reply.decode_error("ref without object.sha"))
    }

    async fn create_branch(&self, name: &str, from_sha: &str) -> Result<(), PublishError> {
        let body = json!({ "ref": format!("refs/heads/{name}"), "sha": from_sha });
        self.http
            .send(HttpRequest::new("create branch", name, "POST", self.repo_url("git/refs")).json(body))
            .await?;
        Ok(())
    }

    async fn open_pull_request(
        &self,
        draft: &PullRequestDraft,
    ) -> Result<PullRequestRef, PublishError> {
        let body = json!({
            "title": draft.title,
            "body": draft.body,
            "head": draft.head,
            "base": draft.base,
        });
        let reply = self
            .http
            .send(
                HttpRequest::new("open pull request", &draft.head, "POST", self.repo_url("pulls"))
                    .json(body),
            )
            .await?;
        let value = reply.json()?;
        parse_pull_request(&value).ok_or_else(|| reply.decode_error("pull request without number"))
    }

    async fn find_open_pull_request(
        &self,
        head: &str,
        base: &str,
    ) -> Result<Option<PullRequestRef>, PublishError> {
        let url = self.repo_url(&format!(
            "pulls?state=open&head={}&base={}",
            urlencoding::encode(&format!("{}:{head}", self.owner)),
            urlencoding::encode(base)
        ));
        let request = HttpRequest::new("find pull request", head, "GET", url)
            .header("Cache-Control", "no-cache");
        let reply = self.http.send(request).await?;
        let value = reply.json()?;
        let pulls = value
            .as_array()
            .ok_or_else(|| reply.decode_error("pull request listing is not an array"))?;
        Ok(pulls.iter().find_map(parse_pull_request))
    }

    async fn is_merged(&self, pr: &PullRequestRef) -> Result<bool, PublishError> {
        let url = self.repo_url(&format!("pulls/{}/merge", pr.number));
        let request = HttpRequest::new("get merge state", format!("#{}", pr.number), "GET", url)
            .header("Cache-Control", "no-cache");
        match self.http.send(request).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn merge_pull_request(
        &self,
        pr: &PullRequestRef,
        commit_title: &str,
    ) -> Result<(), PublishError> {
        let body = json!({ "commit_title": commit_title, "merge_method": "merge" });
        let url = self.repo_url(&format!("pulls/{}/merge", pr.number));
        let reply = self
            .http
            .send(HttpRequest::new("merge pull request", format!("#{}", pr.number), "PUT", url).json(body))
            .await?;
        let value = reply.json()?;
        if value.get("merged").and_then(Value::as_bool) == Some(false) {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("not merged");
            return Err(PublishError::RemoteRejected {
                operation: "merge pull request",
                target: format!("#{}", pr.number),
                status: 200,
                message: message.to_string(),
            });
        }
        Ok(())
    }

    async fn enable_auto_merge(
        &self,
        pr: &PullRequestRef,
        commit_title: &str,
    ) -> Result<(), PublishError> {
        let body = json!({
            "query": AUTO_MERGE_MUTATION,
            "variables": { "id": pr.node_id, "title": commit_title },
        });
        let reply = self
            .http
            .send(
                HttpRequest::new("enable auto-merge", format!("#{}", pr.number), "POST", self.graphql_url())
                    .json(body),
            )
            .await?;
        let value = reply.json()?;
        if let Some(message) = graphql_error(&value) {
            return Err(PublishError::RemoteRejected {
                operation: "enable auto-merge",
                target: format!("#{}", pr.number),
                status: 200,
                message,
            });
        }
        Ok(())
    }
}

/// Blob entries of a recursive tree listing.
fn parse_tree(value: &Value, fallback: HashAlgo) -> Result<RemoteState, String> {
    let entries = value
        .get("tree")
        .and_then(Value::as_array)
        .ok_or_else(|| "tree listing without `tree` array".to_string())?;
    let algo = value
        .get("sha")
        .and_then(Value::as_str)
        .and_then(HashAlgo::detect)
        .unwrap_or(fallback);

    let mut state = RemoteState::new(algo);
    for entry in entries {
        if entry.get("type").and_then(Value::as_str) != Some("blob") {
            continue;
        }
        let (Some(path), Some(sha)) = (
            entry.get("path").and_then(Value::as_str),
            entry.get("sha").and_then(Value::as_str),
        ) else {
            continue;
        };
        state.insert(path, sha);
    }
    state.truncated = value
        .get("truncated")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Ok(state)
}

fn parse_pull_request(value: &Value) -> Option<PullRequestRef> {
    let text = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    Some(PullRequestRef {
        number: value.get("number").and_then(Value::as_u64)?,
        url: text("html_url"),
        node_id: text("node_id"),
    })
}

fn graphql_url(api_url: &str) -> String {
    match api_url.strip_suffix("/api/v3") {
        Some(host) => format!("{host}/api/graphql"),
        None => format!("{api_url}/graphql"),
    }
}

fn graphql_error(value: &Value) -> Option<String> {
    let errors = value.get("errors")?.as_array()?;
    let first = errors.first()?;
    Some(
        first
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("GraphQL error")
            .to_string(),
    )
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>, String> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).map_err(|e| format!("invalid base64 content: {e}"))
}

fn cache_buster() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PublishConfig {
        PublishConfig {
            owner: "ada".to_string(),
            repo: "garden".to_string(),
            token: "t".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn parse_tree_keeps_blobs_only() {
        let value = json!({
            "sha": "0123456789012345678901234567890123456789",
            "tree": [
                { "path": "notes", "type": "tree", "sha": "aaa" },
                { "path": "notes/a.md", "type": "blob", "sha": "bbb" },
                { "path": "img/cat.png", "type": "blob", "sha": "ccc" },
                { "path": "sub", "type": "commit", "sha": "ddd" }
            ],
            "truncated": false
        });
        let state = parse_tree(&value, HashAlgo::Sha256).expect("parse");
        assert_eq!(state.algo, HashAlgo::Sha1);
        assert_eq!(state.paths().collect::<Vec<_>>(), vec!["img/cat.png", "notes/a.md"]);
        assert!(!state.truncated);
    }

    #[test]
    fn parse_tree_flags_truncation() {
        let value = json!({ "sha": "x", "tree": [], "truncated": true });
        let state = parse_tree(&value, HashAlgo::Sha1).expect("parse");
        assert!(state.truncated);
        assert_eq!(state.algo, HashAlgo::Sha1);
    }

    #[test]
    fn parse_tree_rejects_missing_tree() {
        assert!(parse_tree(&json!({ "message": "oops" }), HashAlgo::Sha1).is_err());
    }

    #[test]
    fn pull_request_fields_are_read() {
        let value = json!({ "number": 7, "html_url": "https://x/pull/7", "node_id": "PR_7" });
        let pr = parse_pull_request(&value).expect("pull request");
        assert_eq!(pr.number, 7);
        assert_eq!(pr.url, "https://x/pull/7");
        assert_eq!(pr.node_id, "PR_7");
        assert_eq!(parse_pull_request(&json!({ "html_url": "x" })), None);
    }

    #[test]
    fn graphql_url_for_public_and_enterprise_hosts() {
        assert_eq!(graphql_url("https://api.github.com"), "https://api.github.com/graphql");
        assert_eq!(
            graphql_url("https://git.corp.example/api/v3"),
            "https://git.corp.example/api/graphql"
        );
    }

    #[test]
    fn graphql_errors_are_surfaced() {
        let value = json!({ "errors": [{ "message": "Pull request is in clean status" }] });
        assert_eq!(
            graphql_error(&value).as_deref(),
            Some("Pull request is in clean status")
        );
        assert!(graphql_error(&json!({ "data": {} })).is_none());
    }

    #[test]
    fn base64_with_line_breaks_decodes() {
        assert_eq!(decode_base64("aGVs\nbG8=\n").expect("decode"), b"hello");
    }

    #[test]
    fn repo_urls_are_built_from_config() {
        let repo = GithubRepository::new(&config()).expect("repo");
        assert_eq!(
            repo.repo_url("git/refs"),
            "https://api.github.com/repos/ada/garden/git/refs"
        );
        assert_eq!(repo.hash_algo(), HashAlgo::Sha1);
    }

    #[test]
    fn object_store_config_is_rejected() {
        let cfg = PublishConfig {
            backend: BackendConfig::ObjectStore {
                url: "https://r2.example.com".to_string(),
            },
            ..config()
        };
        assert!(matches!(
            GithubRepository::new(&cfg),
            Err(PublishError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn missing_token_is_rejected_before_any_call() {
        let cfg = PublishConfig {
            token: String::new(),
            ..config()
        };
        assert!(matches!(
            GithubRepository::new(&cfg),
            Err(PublishError::ConfigInvalid(_))
        ));
    }
}
