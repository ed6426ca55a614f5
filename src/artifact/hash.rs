// src/artifact/hash.rs

use std::fmt::Write;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use sha1::{Digest, Sha1};
use uuid::{Builder, Uuid};

/// Content id of a file: the first 16 bytes of its SHA-1, stamped as a
/// version 5 UUID.
pub fn file_uuid(path: &Path) -> Result<Uuid> {
    let mut hasher = Sha1::new();
    let mut file =
        File::open(path).with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("reading file for hashing: {:?}", path))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(uuid_from_digest(&hasher.finalize()))
}

/// Content id of an in-memory buffer, same scheme as [`file_uuid`].
pub fn bytes_uuid(data: &[u8]) -> Uuid {
    uuid_from_digest(&Sha1::digest(data))
}

/// Lowercase hex SHA-1 of a string, used where names must map to files
/// one-to-one.
pub fn name_digest(name: &str) -> String {
    hex(&Sha1::digest(name.as_bytes()))
}

fn hex(bytes: &[u8]) -> String {
    let mut acc = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(&mut acc, "{byte:02x}");
    }
    acc
}

fn uuid_from_digest(digest: &[u8]) -> Uuid {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Builder::from_sha1_bytes(bytes).into_uuid()
}

/// Directory buckets for an id in an on-disk store.
///
/// - fewer than 4 characters: `["000"]`
/// - 4 to 9 characters: left-pad with zeros, drop the last three digits and
///   split into 3-character groups
/// - longer (UUIDs, dashes removed): the first two 2-character groups
pub fn directory_hash_id(id: &str) -> Vec<String> {
    let s: String = id.chars().filter(|c| *c != '-').collect();
    let len = s.len();
    if len < 4 {
        return vec!["000".to_string()];
    }
    if len < 10 {
        // Always pads, even when already a multiple of three.
        let mut padded = "0".repeat(3 - len % 3);
        padded.push_str(&s);
        padded.truncate(padded.len() - 3);
        return padded
            .as_bytes()
            .chunks(3)
            .map(|c| String::from_utf8_lossy(c).into_owned())
            .collect();
    }
    vec![s[0..2].to_string(), s[2..4].to_string()]
}
