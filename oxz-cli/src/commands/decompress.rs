//! `oxz decompress`.

use super::{Container, detect_container};
use oxz_core::{OxzError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Decompress `file` based on its magic bytes (or extension for bare LZMA).
pub fn cmd_decompress(file: &Path, output: Option<&Path>) -> Result<()> {
    let data = fs::read(file)?;

    let container = detect_container(file, &data).ok_or_else(|| {
        OxzError::invalid_header(format!(
            "cannot determine the format of {}",
            file.display()
        ))
    })?;

    let decoded = match container {
        Container::Xz => oxz_xz::decompress(&data)?,
        Container::Lzip => oxz_lzma::lzip::decompress(&data)?,
        Container::LzmaAlone => oxz_lzma::decompress(&data[..])?,
    };

    let out_path = match output {
        Some(path) => path.to_path_buf(),
        None => default_output(file),
    };
    fs::write(&out_path, &decoded)?;

    println!(
        "{} -> {} ({} -> {} bytes)",
        file.display(),
        out_path.display(),
        data.len(),
        decoded.len()
    );
    Ok(())
}

/// Strip a known compressed extension, or append `.out` when there is none
/// to strip.
fn default_output(file: &Path) -> PathBuf {
    let known = ["xz", "lz", "lzma"];
    match file.extension().and_then(|e| e.to_str()) {
        Some(ext) if known.contains(&ext) => file.with_extension(""),
        _ => {
            let mut name = file.as_os_str().to_owned();
            name.push(".out");
            PathBuf::from(name)
        }
    }
}
