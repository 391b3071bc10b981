//! Request validation run before any provider is contacted

use std::path::PathBuf;

use crate::error::{CrosspostError, Result};
use crate::types::ImageMimeType;

/// Maximum caption size in bytes (64KB)
pub const MAX_TEXT_LENGTH: usize = 64 * 1024;

/// Check a create-post request
///
/// A request needs text or at least one file. Every file must exist and
/// carry a supported image extension.
pub fn validate_post_request(text: &str, files: &[PathBuf]) -> Result<()> {
    if text.trim().is_empty() && files.is_empty() {
        return Err(CrosspostError::InvalidInput(
            "Nothing to post: provide text or at least one file".to_string(),
        ));
    }

    if text.len() > MAX_TEXT_LENGTH {
        return Err(CrosspostError::InvalidInput(format!(
            "Text too large: {} bytes (maximum: {} bytes)",
            text.len(),
            MAX_TEXT_LENGTH
        )));
    }

    for path in files {
        if !path.is_file() {
            return Err(CrosspostError::InvalidInput(format!(
                "File not found: {}",
                path.display()
            )));
        }
        if ImageMimeType::from_path(path).is_none() {
            return Err(CrosspostError::InvalidInput(format!(
                "Unsupported file type: {} (expected jpg, png, gif or webp)",
                path.display()
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn image(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"\xFF\xD8\xFF").unwrap();
        path
    }

    #[test]
    fn test_text_only_is_valid() {
        assert!(validate_post_request("Hello", &[]).is_ok());
    }

    #[test]
    fn test_files_only_is_valid() {
        let dir = TempDir::new().unwrap();
        assert!(validate_post_request("", &[image(&dir, "a.jpg")]).is_ok());
    }

    #[test]
    fn test_empty_request_rejected() {
        let err = validate_post_request("   \n", &[]).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("Nothing to post"));
    }

    #[test]
    fn test_oversized_text_rejected() {
        let text = "a".repeat(MAX_TEXT_LENGTH + 1);
        let err = validate_post_request(&text, &[]).unwrap_err();
        assert!(err.to_string().contains("Text too large"));
    }

    #[test]
    fn test_missing_file_rejected() {
        let err = validate_post_request("x", &[PathBuf::from("/nonexistent/a.jpg")]).unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let dir = TempDir::new().unwrap();
        let err = validate_post_request("x", &[dir.path().to_path_buf()]).unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let dir = TempDir::new().unwrap();
        let err = validate_post_request("x", &[image(&dir, "clip.mp4")]).unwrap_err();
        assert!(err.to_string().contains("Unsupported file type"));
    }

    #[test]
    fn test_uppercase_extension_accepted() {
        let dir = TempDir::new().unwrap();
        assert!(validate_post_request("x", &[image(&dir, "PHOTO.PNG")]).is_ok());
    }
}
