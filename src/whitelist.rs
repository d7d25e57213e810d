//! Static-asset extension whitelist.

use std::collections::BTreeSet;

use reqwest::Url;

/// Extensions eligible for opportunistic caching by default.
pub const DEFAULT_STATIC_EXTENSIONS: &[&str] = &[
    "css", "js", "html", "png", "jpg", "jpeg", "gif", "svg", "woff", "woff2",
];

/// The set of file extensions whose responses are stored on a cache miss.
///
/// Matching looks only at the last segment of the URL path, so query strings
/// and fragments never influence eligibility. Extensions compare exactly:
/// `Logo.PNG` does not match `png`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticAssetWhitelist {
    extensions: BTreeSet<String>,
}

impl Default for StaticAssetWhitelist {
    fn default() -> Self {
        Self::new(DEFAULT_STATIC_EXTENSIONS.iter().copied())
    }
}

impl StaticAssetWhitelist {
    /// Builds a whitelist from extensions, with or without a leading dot.
    /// Case is preserved.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_string())
            .filter(|e| !e.is_empty())
            .collect();
        Self { extensions }
    }

    /// Returns true if `ext` is whitelisted.
    #[must_use]
    pub fn contains(&self, ext: &str) -> bool {
        self.extensions.contains(ext)
    }

    /// Returns true if the URL's path ends in a whitelisted extension.
    #[must_use]
    pub fn matches(&self, url: &Url) -> bool {
        path_extension(url.path()).is_some_and(|ext| self.contains(ext))
    }

    /// Returns the number of whitelisted extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Returns true if nothing is whitelisted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

/// Extension of the final path segment, if it has one.
fn path_extension(path: &str) -> Option<&str> {
    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}
