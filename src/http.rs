//! Plain HTTP download, for files that are served directly rather than
//! through a swarm.

use crate::error::Result;

use std::fs::File;
use std::path::Path;

/// Streams the body of `url` into a new file at `output`.
///
/// Returns the number of bytes written.
pub fn http_download(url: &str, output: &Path) -> Result<u64> {
    info!("Fetching {}", url);

    let mut response = reqwest::blocking::get(url)?.error_for_status()?;
    let mut file = File::create(output)?;
    let written = response.copy_to(&mut file)?;

    debug!("Wrote {} bytes to {}", written, output.display());

    Ok(written)
}
