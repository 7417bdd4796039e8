//! Content-addressable blob identifiers.
//!
//! The digest covers a framed form of the content, not the raw bytes:
//!
//! ```text
//! "blob " <decimal byte length> NUL <raw bytes>
//! ```
//!
//! This is the git object framing, so a locally computed identifier equals
//! the one the remote repository reports for the same bytes and a diff never
//! needs to upload content to learn its hash. Text and binary files go
//! through the same path; text is UTF-8 encoded by [`FileRecord::text`].

use sha1::Sha1;
use sha2::{Digest, Sha256};

use flowershow_core::{FileRecord, HashAlgo};

/// Blob identifier of `bytes` under `algo`, as lowercase hex.
pub fn blob_hash(bytes: &[u8], algo: HashAlgo) -> String {
    match algo {
        HashAlgo::Sha1 => framed_digest::<Sha1>(bytes),
        HashAlgo::Sha256 => framed_digest::<Sha256>(bytes),
    }
}

/// Blob identifier of a vault file.
pub fn hash_file(file: &FileRecord, algo: HashAlgo) -> String {
    blob_hash(&file.content, algo)
}

/// `true` if `file` has exactly the content identified by `remote_hash`.
pub fn same_content(file: &FileRecord, remote_hash: &str, algo: HashAlgo) -> bool {
    hash_file(file, algo).eq_ignore_ascii_case(remote_hash)
}

fn framed_digest<D: Digest>(bytes: &[u8]) -> String {
    let mut hasher = D::new();
    hasher.update(format!("blob {}\0", bytes.len()).as_bytes());
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
