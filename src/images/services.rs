use std::path::{Path, PathBuf};

use anyhow::Context;
use bytes::Bytes;
use image::{imageops::FilterType, ImageFormat};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::AvatarStorage;

#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    #[error("unsupported image format")]
    Unsupported,
    #[error("cannot decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// Avatar that has been resized and handed to storage.
#[derive(Debug, Clone)]
pub struct StoredAvatar {
    pub filename: String,
    pub url: String,
}

fn ext_from_format(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("png"),
        ImageFormat::Jpeg => Some("jpg"),
        _ => None,
    }
}

/// Decodes the file at `path`, scales it to exactly `size`×`size` and writes it back in place.
pub fn resize_in_place(path: &Path, format: ImageFormat, size: u32) -> Result<(), AvatarError> {
    let img = image::open(path)?;
    let resized = img.resize_exact(size, size, FilterType::CatmullRom);
    resized
        .save_with_format(path, format)
        .with_context(|| format!("write resized avatar {}", path.display()))?;
    Ok(())
}

/// Writes the upload to `tmp_dir`, resizes it to a square thumbnail and moves it into storage.
/// The temp file is removed if any step fails.
pub async fn process_avatar(
    storage: &dyn AvatarStorage,
    tmp_dir: &Path,
    user_id: Uuid,
    data: Bytes,
    size: u32,
) -> Result<StoredAvatar, AvatarError> {
    let format = image::guess_format(&data).map_err(|_| AvatarError::Unsupported)?;
    let ext = ext_from_format(format).ok_or(AvatarError::Unsupported)?;
    let filename = format!("{}_{}.{}", user_id, Uuid::new_v4(), ext);
    let tmp_path = tmp_dir.join(&filename);

    tokio::fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write upload {}", tmp_path.display()))?;

    match resize_and_store(storage, tmp_path.clone(), format, &filename, size).await {
        Ok(url) => {
            debug!(%user_id, %filename, "avatar stored");
            Ok(StoredAvatar { filename, url })
        }
        Err(e) => {
            if let Err(rm) = tokio::fs::remove_file(&tmp_path).await {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!(error = %rm, path = %tmp_path.display(), "failed to remove temp upload");
                }
            }
            Err(e)
        }
    }
}

async fn resize_and_store(
    storage: &dyn AvatarStorage,
    tmp_path: PathBuf,
    format: ImageFormat,
    filename: &str,
    size: u32,
) -> Result<String, AvatarError> {
    let path = tmp_path.clone();
    tokio::task::spawn_blocking(move || resize_in_place(&path, format, size))
        .await
        .context("join resize task")??;

    Ok(storage.put_file(&tmp_path, filename).await?)
}
