//! `oxz compress`.

use super::Container;
use clap::ValueEnum;
use oxz_core::Result;
use oxz_lzma::LzmaParams;
use oxz_xz::{CheckKind, XzWriteOptions};
use std::fs;
use std::path::{Path, PathBuf};

/// Output container choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    /// XZ container (default).
    Xz,
    /// LZIP member.
    Lzip,
    /// Bare LZMA-alone stream.
    Lzma,
}

impl FormatArg {
    fn container(self) -> Container {
        match self {
            FormatArg::Xz => Container::Xz,
            FormatArg::Lzip => Container::Lzip,
            FormatArg::Lzma => Container::LzmaAlone,
        }
    }
}

/// Block check choice for XZ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CheckArg {
    /// No integrity check.
    None,
    /// CRC-32.
    Crc32,
    /// CRC-64 (default).
    Crc64,
    /// SHA-256.
    Sha256,
}

impl CheckArg {
    fn kind(self) -> CheckKind {
        match self {
            CheckArg::None => CheckKind::None,
            CheckArg::Crc32 => CheckKind::Crc32,
            CheckArg::Crc64 => CheckKind::Crc64,
            CheckArg::Sha256 => CheckKind::Sha256,
        }
    }
}

/// Compress `file` into the chosen container.
pub fn cmd_compress(
    file: &Path,
    level: u8,
    format: FormatArg,
    check: CheckArg,
    output: Option<&Path>,
) -> Result<()> {
    let data = fs::read(file)?;
    let params = LzmaParams::from_level(level);
    let container = format.container();

    let encoded = match container {
        Container::Xz => oxz_xz::encode(
            &data,
            &XzWriteOptions {
                check: check.kind(),
                lzma: params,
                ..XzWriteOptions::default()
            },
        )?,
        Container::Lzip => oxz_lzma::lzip::compress(&data, &params)?,
        Container::LzmaAlone => oxz_lzma::compress(&data, &params)?,
    };

    let out_path = match output {
        Some(path) => path.to_path_buf(),
        None => default_output(file, container.extension()),
    };
    fs::write(&out_path, &encoded)?;

    println!(
        "{} -> {} ({} -> {} bytes)",
        file.display(),
        out_path.display(),
        data.len(),
        encoded.len()
    );
    Ok(())
}

fn default_output(file: &Path, extension: &str) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_appends_extension() {
        assert_eq!(
            default_output(Path::new("dir/data.tar"), "xz"),
            PathBuf::from("dir/data.tar.xz")
        );
    }
}
