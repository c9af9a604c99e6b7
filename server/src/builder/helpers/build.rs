use std::{
    io::{self, ErrorKind},
    os::unix::ffi::OsStrExt,
    path::Path,
};

use secondtry_models::BuildErrorKind;
use tokio::{io::AsyncWrite, sync::oneshot};
use tokio_tar::{EntryType, Header};
use tokio_util::io::ReaderStream;

use crate::{
    builder::{constants::IGNORE_FILENAME, context::ContextEntry},
    errors::BuildError,
};

/// Name GNU tar gives the extension entry that carries a long link target
const GNU_LONG_LINK_NAME: &[u8] = b"././@LongLink";

/// Outcome of the task writing the build context archive
pub struct ArchiveWriter(oneshot::Receiver<io::Result<()>>);

impl ArchiveWriter {
    /// Wait for the archive writer to finish. An archive that could not be written in
    /// full fails the build as [`BuildErrorKind::SourceCopy`]. A broken pipe only means
    /// the engine stopped reading, which the engine reports on its own.
    pub async fn finished(self) -> Result<(), BuildError> {
        match self.0.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
            Ok(Err(err)) => Err(BuildError::new(
                BuildErrorKind::SourceCopy,
                format!("failed to write build context: {err}"),
            )),
            Err(_) => Err(BuildError::new(
                BuildErrorKind::SourceCopy,
                "build context writer stopped unexpectedly",
            )),
        }
    }
}

/// Create the build context as a tar archive to send to the Docker instance. An ignore
/// file keeping the recipe out of the image, then the rendered recipe, are appended
/// after the context entries. They replace a top-level ignore file of the context. Returns a ReaderStream that can be passed
/// to the Docker build API, and a handle reporting whether the whole archive was written.
pub fn create_build_context(
    entries: Vec<ContextEntry>,
    recipe_file: String,
    recipe: String,
) -> (ReaderStream<tokio::io::DuplexStream>, ArchiveWriter) {
    let (tar_writer, tar_reader) = tokio::io::duplex(8192); // 8KB max buffer
    let (done_tx, done_rx) = oneshot::channel();
    tokio::spawn(async move {
        let mut tar = tokio_tar::Builder::new(tar_writer);
        let result: io::Result<()> = async {
            for entry in entries {
                if entry.path() == Path::new(IGNORE_FILENAME) {
                    tracing::debug!("Replacing {IGNORE_FILENAME} of the build context");
                    continue;
                }
                match entry {
                    ContextEntry::Dir { path, mode } => {
                        let mut header = Header::new_gnu();
                        header.set_entry_type(EntryType::Directory);
                        header.set_size(0);
                        header.set_mode(mode);
                        tar.append_data(&mut header, &path, tokio::io::empty())
                            .await?;
                    }
                    ContextEntry::File {
                        path,
                        mode,
                        content,
                    } => {
                        let mut header = Header::new_gnu();
                        header.set_size(content.len() as u64);
                        header.set_mode(mode);
                        tar.append_data(&mut header, &path, content.as_slice())
                            .await?;
                    }
                    ContextEntry::Symlink { path, target } => {
                        append_symlink(&mut tar, &path, &target).await?;
                    }
                }
            }
            let ignore = format!("{recipe_file}\n{IGNORE_FILENAME}\n");
            let mut header = Header::new_gnu();
            header.set_size(ignore.len() as u64);
            header.set_mode(0o644);
            tar.append_data(&mut header, IGNORE_FILENAME, ignore.as_bytes())
                .await?;

            let mut header = Header::new_gnu();
            header.set_size(recipe.len() as u64);
            header.set_mode(0o644);
            tar.append_data(&mut header, &recipe_file, recipe.as_bytes())
                .await?;
            tar.finish().await
        }
        .await;
        if let Err(err) = &result {
            tracing::warn!("Failed to write build context archive: {err}");
        }
        let _ = done_tx.send(result);
    });

    (ReaderStream::new(tar_reader), ArchiveWriter(done_rx))
}

/// Append a symlink entry. Targets too long for the header go in a GNU long link
/// entry written just before it.
async fn append_symlink<W: AsyncWrite + Unpin + Send + 'static>(
    tar: &mut tokio_tar::Builder<W>,
    path: &Path,
    target: &Path,
) -> io::Result<()> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Symlink);
    header.set_size(0);
    header.set_mode(0o777);
    if header.set_link_name(target).is_err() {
        let mut target = target.as_os_str().as_bytes().to_vec();
        target.push(0);
        let mut long_link = Header::new_gnu();
        if let Some(gnu) = long_link.as_gnu_mut() {
            gnu.name[..GNU_LONG_LINK_NAME.len()].copy_from_slice(GNU_LONG_LINK_NAME);
        }
        long_link.set_entry_type(EntryType::GNULongLink);
        long_link.set_mode(0o644);
        long_link.set_size(target.len() as u64);
        long_link.set_cksum();
        tar.append(&long_link, target.as_slice()).await?;
    }
    tar.append_data(&mut header, path, tokio::io::empty()).await
}
