use std::path::{Component, Path, PathBuf};

use crate::http::builder::Resource;

/// Served when the fallback page is not present under the root.
pub const NOT_FOUND_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Not found</title>
    <link rel="icon" type="image/x-icon" href="/favicon.ico">
</head>
<body>
    <h1>404 not found!</h1>
</body>
</html>
"#;

/// Maps request targets onto files below a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    not_found_page: String,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>, not_found_page: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            not_found_page: not_found_page.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Looks up a normalized target (see [`normalize_target`]).
    ///
    /// Asking for the fallback page itself, escaping the root, or naming
    /// anything that is not a readable file all produce
    /// [`Resource::Missing`].
    pub async fn open(&self, target: &str) -> Resource {
        if self.is_fallback(target) {
            return self.missing().await;
        }

        let Some(relative) = safe_relative(target) else {
            tracing::debug!(path = target, "Refusing target outside the root");
            return self.missing().await;
        };

        let mut path = self.root.join(relative);
        if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
            path.push("index.html");
        }

        match read_file(&path).await {
            Ok((bytes, modified)) => Resource::Found {
                bytes,
                media_type: media_type(&path),
                modified,
            },
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "File not served");
                self.missing().await
            }
        }
    }

    /// The fallback page body: the file under the root if present, otherwise
    /// the built-in page.
    pub async fn fallback_page(&self) -> Vec<u8> {
        match tokio::fs::read(self.root.join(&self.not_found_page)).await {
            Ok(page) => page,
            Err(_) => NOT_FOUND_PAGE.as_bytes().to_vec(),
        }
    }

    fn is_fallback(&self, target: &str) -> bool {
        target.rsplit('/').next() == Some(self.not_found_page.as_str())
    }

    async fn missing(&self) -> Resource {
        Resource::Missing {
            page: self.fallback_page().await,
        }
    }
}

/// Applies the static-file target rules: a trailing `/` gets `index.html`
/// appended, then leading `/` characters are stripped.
///
/// ```
/// # use lantern::files::normalize_target;
/// assert_eq!(normalize_target("/"), "index.html");
/// assert_eq!(normalize_target("/docs/"), "docs/index.html");
/// assert_eq!(normalize_target("/a b.txt"), "a b.txt");
/// ```
pub fn normalize_target(target: &str) -> String {
    let mut target = target.to_string();
    if target.ends_with('/') {
        target.push_str("index.html");
    }
    target.trim_start_matches('/').to_string()
}

/// Media type guessed from the file extension.
pub fn media_type(path: &Path) -> Option<String> {
    mime_guess::from_path(path).first().map(|mime| mime.to_string())
}

fn safe_relative(target: &str) -> Option<&Path> {
    let path = Path::new(target);
    let clean = path
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    (clean && !target.is_empty()).then_some(path)
}

async fn read_file(path: &Path) -> std::io::Result<(Vec<u8>, Option<std::time::SystemTime>)> {
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_file() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "not a regular file",
        ));
    }
    let bytes = tokio::fs::read(path).await?;
    Ok((bytes, metadata.modified().ok()))
}
