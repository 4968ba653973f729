//! Resource resolution for module locations

use crate::{Error, Result};
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::trace;

/// Fetches the text of a module by location
pub trait ResourceResolver: Send + Sync {
    fn resolve(&self, location: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Reads modules from the local filesystem.
///
/// Locations may be plain paths or `file://` URIs.
#[derive(Debug, Clone, Default)]
pub struct FileResolver;

impl FileResolver {
    pub fn new() -> Self {
        Self
    }

    fn path(location: &str) -> PathBuf {
        PathBuf::from(location.strip_prefix("file://").unwrap_or(location))
    }
}

impl ResourceResolver for FileResolver {
    async fn resolve(&self, location: &str) -> Result<String> {
        let path = Self::path(location);
        trace!("Reading module from file: {:?}", path);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::resolve(location, e.to_string()))
    }
}

/// Serves modules from memory and records every request
#[derive(Debug, Default)]
pub struct MemoryResolver {
    resources: HashMap<String, String>,
    requests: Mutex<Vec<String>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, location: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(location, content);
        self
    }

    pub fn insert(&mut self, location: impl Into<String>, content: impl Into<String>) {
        self.resources.insert(location.into(), content.into());
    }

    /// Locations requested so far, in request order
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// How many times `location` was requested
    pub fn request_count(&self, location: &str) -> usize {
        self.requests().iter().filter(|r| r.as_str() == location).count()
    }
}

impl ResourceResolver for MemoryResolver {
    async fn resolve(&self, location: &str) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(location.to_string());
        }
        self.resources
            .get(location)
            .cloned()
            .ok_or_else(|| Error::resolve(location, "no such resource"))
    }
}

/// Resolve `href` against the location of the module that declared it.
///
/// Absolute paths and locations with a scheme are returned unchanged.
/// Relative ones are joined to the base's directory with `.` and `..`
/// segments collapsed.
pub fn resolve_relative(base: &str, href: &str) -> String {
    if href.starts_with('/') || scheme_len(href).is_some() {
        return href.to_string();
    }
    let (prefix, base_path) = split_authority(base);
    let dir = match base_path.rfind('/') {
        Some(i) => &base_path[..=i],
        None => "",
    };
    format!("{}{}", prefix, normalize(&format!("{}{}", dir, href)))
}

/// Length of a URI scheme including its colon; single letters are drive names
fn scheme_len(location: &str) -> Option<usize> {
    let colon = location.find(':')?;
    let scheme = &location[..colon];
    let valid = colon > 1
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(colon + 1)
}

fn split_authority(base: &str) -> (&str, &str) {
    if let Some(i) = base.find("://") {
        let rest = &base[i + 3..];
        let end = rest.find('/').map_or(base.len(), |j| i + 3 + j);
        return base.split_at(end);
    }
    match scheme_len(base) {
        Some(len) => base.split_at(len),
        None => ("", base),
    }
}

fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|last| *last != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    let joined = segments.join("/");
    if absolute { format!("/{}", joined) } else { joined }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_paths() {
        assert_eq!(resolve_relative("schemas/top.xml", "common.xml"), "schemas/common.xml");
        assert_eq!(resolve_relative("schemas/top.xml", "./common.xml"), "schemas/common.xml");
        assert_eq!(resolve_relative("schemas/sub/top.xml", "../common.xml"), "schemas/common.xml");
        assert_eq!(resolve_relative("top.xml", "../common.xml"), "../common.xml");
        assert_eq!(resolve_relative("/a/b/top.xml", "../../../c.xml"), "/c.xml");
        assert_eq!(resolve_relative("top.xml", "/abs/c.xml"), "/abs/c.xml");
    }

    #[test]
    fn test_resolve_relative_uris() {
        assert_eq!(
            resolve_relative("https://example.com/ms/top.xml", "../lib/common.xml"),
            "https://example.com/lib/common.xml"
        );
        assert_eq!(resolve_relative("mem:top.yaml", "bottom.yaml"), "mem:bottom.yaml");
        assert_eq!(
            resolve_relative("mem:top.yaml", "file:///tmp/x.yaml"),
            "file:///tmp/x.yaml"
        );
    }

    #[tokio::test]
    async fn test_memory_resolver_records_requests() {
        let resolver = MemoryResolver::new().with_resource("a", "content");
        assert_eq!(resolver.resolve("a").await.unwrap(), "content");
        assert!(matches!(resolver.resolve("b").await, Err(Error::Resolve { .. })));
        assert_eq!(resolver.requests(), vec!["a", "b"]);
        assert_eq!(resolver.request_count("a"), 1);
    }

    #[tokio::test]
    async fn test_file_resolver_missing() {
        let err = FileResolver::new()
            .resolve("file:///definitely/not/here.xml")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Resolve { .. }));
    }
}
