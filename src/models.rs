//! Speech model download.
//!
//! Fetches the Silero VAD, Whisper small and Kokoro models from the
//! sherpa-onnx releases into the layout [`AppConfig`] expects. Files that are
//! already present are left alone.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bzip2::read::BzDecoder;
use reqwest::blocking::Client;
use tracing::{debug, info};

use crate::config::AppConfig;

const RELEASES: &str = "https://github.com/k2-fsa/sherpa-onnx/releases/download";

/// Whisper archive entries and the names they are stored under.
const WHISPER_FILES: [(&str, &str); 3] = [
    ("small-encoder.int8.onnx", "whisper-small-encoder.int8.onnx"),
    ("small-decoder.int8.onnx", "whisper-small-decoder.int8.onnx"),
    ("small-tokens.txt", "whisper-small-tokens.txt"),
];

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// Download `url` to `dest` through a `.part` file.
fn fetch(client: &Client, url: &str, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    info!("⬇️  Downloading {}", url);
    let mut response = client.get(url).send().and_then(|r| r.error_for_status()).with_context(|| format!("Failed to download {}", url))?;

    let part = part_path(dest);
    let mut file = File::create(&part).with_context(|| format!("Failed to create {}", part.display()))?;
    let bytes = response.copy_to(&mut file).with_context(|| format!("Download of {} interrupted", url))?;
    drop(file);
    fs::rename(&part, dest).with_context(|| format!("Failed to move {} into place", dest.display()))?;
    debug!("Saved {} bytes to {}", bytes, dest.display());
    Ok(())
}

/// Extract the entries of a `.tar.bz2` stream whose file name is listed in
/// `wanted`, renaming them into `dest_dir`. Returns how many were written.
fn unpack_selected(reader: impl Read, dest_dir: &Path, wanted: &[(&str, &str)]) -> Result<usize> {
    fs::create_dir_all(dest_dir).with_context(|| format!("Failed to create {}", dest_dir.display()))?;
    let mut archive = tar::Archive::new(BzDecoder::new(reader));
    let mut written = 0;
    for entry in archive.entries().context("Unreadable archive")? {
        let mut entry = entry.context("Corrupt archive entry")?;
        let path = entry.path()?.into_owned();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some((_, target)) = wanted.iter().find(|(source, _)| *source == name) {
            entry.unpack(dest_dir.join(target)).with_context(|| format!("Failed to extract {}", name))?;
            written += 1;
        }
    }
    Ok(written)
}

/// Extract a whole `.tar.bz2` stream under `dest_dir`.
fn unpack_all(reader: impl Read, dest_dir: &Path) -> Result<()> {
    fs::create_dir_all(dest_dir).with_context(|| format!("Failed to create {}", dest_dir.display()))?;
    tar::Archive::new(BzDecoder::new(reader))
        .unpack(dest_dir)
        .with_context(|| format!("Failed to extract into {}", dest_dir.display()))
}

/// Download an archive next to `dir`, hand it to `extract` and remove it.
fn with_archive(client: &Client, url: &str, dir: &Path, extract: impl FnOnce(BufReader<File>) -> Result<()>) -> Result<()> {
    let archive = dir.join(url.rsplit('/').next().unwrap_or("download.tar.bz2"));
    fetch(client, url, &archive)?;
    let file = File::open(&archive).with_context(|| format!("Failed to open {}", archive.display()))?;
    let result = extract(BufReader::new(file));
    fs::remove_file(&archive).with_context(|| format!("Failed to remove {}", archive.display()))?;
    result
}

/// Download every missing model. Blocking; run it off the async runtime.
///
/// # Errors
/// Returns an error if a download or extraction fails.
pub fn download_models(config: &AppConfig) -> Result<()> {
    let client = Client::builder().timeout(None).build().context("Failed to build HTTP client")?;
    let models_dir = config.models_dir();

    let vad = config.vad_model_path();
    if vad.exists() {
        info!("✅ VAD model present");
    } else {
        fetch(&client, &format!("{}/asr-models/silero_vad.onnx", RELEASES), &vad)?;
    }

    let whisper = [config.whisper_encoder_path(), config.whisper_decoder_path(), config.whisper_tokens_path()];
    if whisper.iter().all(|p| p.exists()) {
        info!("✅ Whisper model present");
    } else {
        let whisper_dir = models_dir.join("whisper");
        let url = format!("{}/asr-models/sherpa-onnx-whisper-small.tar.bz2", RELEASES);
        with_archive(&client, &url, &models_dir, |reader| {
            let written = unpack_selected(reader, &whisper_dir, &WHISPER_FILES)?;
            anyhow::ensure!(written == WHISPER_FILES.len(), "Whisper archive held {} of {} expected files", written, WHISPER_FILES.len());
            Ok(())
        })?;
    }

    if config.tts_model_path().exists() {
        info!("✅ Kokoro voice present");
    } else {
        let voice_dir = config.voice_dir();
        let url = format!("{}/tts-models/kokoro-multi-lang-v1_0.tar.bz2", RELEASES);
        with_archive(&client, &url, &voice_dir, |reader| unpack_all(reader, &voice_dir))?;
    }

    info!("✅ Models ready in {} and {}", models_dir.display(), config.voice_dir().display());
    Ok(())
}
