use md5::{Digest, Md5};

/// MD5 digest sent with the APOP command: hash of the greeting timestamp
/// concatenated with the shared secret.
pub fn apop_digest(timestamp: &str, password: &str) -> String {
    let hasher = Md5::new().chain(timestamp).chain(password);
    format!("{:x}", hasher.result())
}
