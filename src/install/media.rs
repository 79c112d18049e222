// Media reconciler
//
// Runs after the modules were installed (modules may register media of their
// own). When the chosen backend is the database this is a no-op; otherwise
// every database-resident binary is streamed into the file backend and the
// database payload reference is cleared, then a track-detection pass keeps
// media-to-entity usage links consistent. Unlike the bulk-seed steps this
// stage performs targeted updates, so change tracking is re-enabled.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;

use crate::models::requests::MediaStorageKind;
use crate::models::state::{CancelToken, InstallationStateStore};
use crate::seed::locale::localize;
use crate::seed::pipeline::{MediaFile, SeedStore};

/// Media storage backend seam (`Save(mediaFile, binaryStream)`).
#[async_trait]
pub trait MediaStorage: Send + Sync {
    async fn save(&self, file: &MediaFile, data: Vec<u8>) -> Result<()>;
}

pub async fn reconcile_media(
    mode: MediaStorageKind,
    store: &dyn SeedStore,
    backend: &dyn MediaStorage,
    states: &InstallationStateStore,
    cancel: &CancelToken,
    language: &str,
) -> Result<()> {
    if mode == MediaStorageKind::Db {
        info!("[PHASE: media] [STEP: reconcile] Database storage selected; nothing to move");
        return Ok(());
    }

    cancel.ensure_not_cancelled()?;
    let message = localize("Progress.ReconcilingMedia", language);
    states.progress(|s| s.progress_message = message);

    store
        .set_bulk_mode(false)
        .await
        .context("Failed to re-enable change tracking for media reconciliation")?;

    let files = store
        .media_files_with_db_payload()
        .await
        .context("Failed to enumerate database-resident media")?;
    let moved = files.len();
    for mut file in files {
        let data = std::mem::take(&mut file.payload);
        backend
            .save(&file, data)
            .await
            .with_context(|| format!("Failed to move media file '{}'", file.name))?;
        store
            .clear_media_payload(file.id)
            .await
            .with_context(|| format!("Failed to clear database payload for '{}'", file.name))?;
    }

    for album in store.albums().await.context("Failed to enumerate albums")? {
        store
            .detect_album_tracks(&album)
            .await
            .with_context(|| format!("Track detection failed for album '{}'", album))?;
    }

    info!(
        "[PHASE: media] [STEP: reconcile] Media reconciliation finished (moved={})",
        moved
    );
    Ok(())
}
