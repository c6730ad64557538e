//! Destination paths for incoming blobs.

use std::path::{Component, Path, PathBuf};

use pylon_shared::filename::sanitize_filename;
use pylon_shared::types::BlobContext;

use crate::error::BlobError;

/// Verify that `target` stays within `base`. Lexical only: the
/// destination usually does not exist yet, and the adapter may not be a
/// real filesystem.
pub fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, BlobError> {
    let relative = target
        .strip_prefix(base)
        .map_err(|_| BlobError::InvalidPath(target.to_path_buf()))?;

    let mut resolved = base.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::CurDir => {}
            // ParentDir, RootDir, Prefix
            _ => return Err(BlobError::InvalidPath(target.to_path_buf())),
        }
    }
    if resolved == base {
        return Err(BlobError::InvalidPath(target.to_path_buf()));
    }
    Ok(resolved)
}

/// Directory a blob lands in: `uploads/<conversationId>` or `uploads`.
pub fn destination_dir(uploads_dir: &Path, context: &BlobContext) -> PathBuf {
    match context.conversation() {
        Some(conversation_id) => uploads_dir.join(sanitize_filename(conversation_id)),
        None => uploads_dir.to_path_buf(),
    }
}

/// Full save path for a blob, checked against the uploads directory.
pub fn save_path(
    uploads_dir: &Path,
    context: &BlobContext,
    filename: &str,
) -> Result<PathBuf, BlobError> {
    let target = destination_dir(uploads_dir, context).join(sanitize_filename(filename));
    ensure_within(uploads_dir, &target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_path_with_conversation() {
        let ctx = BlobContext::for_conversation("conv-42");
        let path = save_path(Path::new("/srv/uploads"), &ctx, "cat.png").unwrap();
        assert_eq!(path, PathBuf::from("/srv/uploads/conv-42/cat.png"));
    }

    #[test]
    fn test_save_path_without_conversation() {
        let path = save_path(Path::new("/srv/uploads"), &BlobContext::default(), "a.txt").unwrap();
        assert_eq!(path, PathBuf::from("/srv/uploads/a.txt"));

        let empty = BlobContext::for_conversation("");
        let path = save_path(Path::new("/srv/uploads"), &empty, "a.txt").unwrap();
        assert_eq!(path, PathBuf::from("/srv/uploads/a.txt"));
    }

    #[test]
    fn test_hostile_names_stay_inside() {
        let ctx = BlobContext::for_conversation("../../etc");
        let path = save_path(Path::new("/srv/uploads"), &ctx, "../passwd").unwrap();
        assert!(path.starts_with("/srv/uploads"));
        assert_eq!(path.components().count(), 5);
    }

    #[test]
    fn test_ensure_within_rejects_traversal() {
        let base = Path::new("/srv/uploads");
        assert!(ensure_within(base, Path::new("/srv/uploads/../x")).is_err());
        assert!(ensure_within(base, Path::new("/etc/passwd")).is_err());
        assert!(ensure_within(base, base).is_err());
    }
}
