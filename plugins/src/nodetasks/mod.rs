//! Concrete units of desired host state.

mod fetch;
mod file;
mod load_image;
mod package;
mod service;

pub use fetch::FetchAssetTask;
pub use file::FileTask;
pub use load_image::LoadImageTask;
pub use package::PackageTask;
pub use service::ServiceTask;

use sha2::{Digest, Sha256};

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Short content fingerprint for reports.
pub(crate) fn fingerprint(data: &[u8]) -> String {
    let digest = sha256_hex(data);
    format!("sha256:{}", &digest[..12])
}

/// Single-quote `s` for POSIX sh.
pub(crate) fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

pub(crate) fn shell_join(argv: &[String]) -> String {
    argv.iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn format_mode(mode: u32) -> String {
    format!("{mode:04o}")
}
