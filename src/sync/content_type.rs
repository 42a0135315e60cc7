//! Content-type resolution for uploads.

use std::path::Path;

/// Maps a file name to the MIME type sent with its upload.
///
/// The engine takes this as a trait object so consumers can override the
/// mapping (e.g. forcing `text/plain` for extensionless agent artifacts).
pub trait ContentTypeResolver: Send + Sync {
    fn resolve(&self, path: &Path) -> String;
}

/// Extension-based resolver; unknown extensions fall back to
/// `application/octet-stream`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuessContentType;

impl ContentTypeResolver for GuessContentType {
    fn resolve(&self, path: &Path) -> String {
        mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        let resolver = GuessContentType;
        assert_eq!(resolver.resolve(Path::new("index.html")), "text/html");
        assert_eq!(resolver.resolve(Path::new("data.json")), "application/json");
        assert_eq!(resolver.resolve(Path::new("photo.png")), "image/png");
    }

    #[test]
    fn test_unknown_extension_falls_back() {
        let resolver = GuessContentType;
        assert_eq!(
            resolver.resolve(Path::new("blob.xyzzy")),
            "application/octet-stream"
        );
        assert_eq!(
            resolver.resolve(Path::new("no_extension")),
            "application/octet-stream"
        );
    }
}
