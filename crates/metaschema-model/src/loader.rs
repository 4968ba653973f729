//! Module loader with import resolution
//!
//! Loading follows import edges depth-first. A module reachable along several
//! import paths is built once and shared; an import path that returns to a
//! module still being loaded is a cycle and fails the load.

use crate::metaschema::Metaschema;
use crate::resolver::{ResourceResolver, resolve_relative};
use crate::source::{MetaschemaSource, SchemaFormat};
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, trace};

type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<Arc<Metaschema>>> + Send + 'a>>;

/// Loader settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Longest import chain followed before giving up
    pub max_import_depth: usize,
    /// Force a source format instead of detecting it per location
    pub format: Option<SchemaFormat>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_import_depth: 64,
            format: None,
        }
    }
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_import_depth(mut self, depth: usize) -> Self {
        self.max_import_depth = depth;
        self
    }

    pub fn with_format(mut self, format: SchemaFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// Modules finished by earlier loads, shared by later ones.
///
/// Only fully built modules are kept. The import path of a load in progress
/// belongs to that load, so dropping an unfinished load leaves the context
/// as it was before plus whatever imports completed.
#[derive(Debug, Default)]
pub struct LoadContext {
    loaded: HashMap<String, Arc<Metaschema>>,
}

impl LoadContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A module already built during this load
    pub fn get(&self, location: &str) -> Option<Arc<Metaschema>> {
        self.loaded.get(location).cloned()
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }
}

/// Modules on the import chain of one load, outermost first
#[derive(Debug, Default)]
struct ImportPath {
    seen: HashSet<String>,
    chain: Vec<String>,
}

impl ImportPath {
    fn contains(&self, location: &str) -> bool {
        self.seen.contains(location)
    }

    fn depth(&self) -> usize {
        self.chain.len()
    }

    fn cycle(&self, location: String) -> Error {
        let mut path = self.chain.clone();
        path.push(location);
        Error::ImportCycle { path }
    }

    fn enter(&mut self, location: &str) {
        self.seen.insert(location.to_string());
        self.chain.push(location.to_string());
    }

    fn leave(&mut self, location: &str) {
        self.chain.pop();
        self.seen.remove(location);
    }
}

/// Loads modules and their imports through a [`ResourceResolver`]
#[derive(Debug)]
pub struct MetaschemaLoader<R> {
    resolver: R,
    config: LoaderConfig,
}

impl<R: ResourceResolver> MetaschemaLoader<R> {
    pub fn new(resolver: R) -> Self {
        Self::with_config(resolver, LoaderConfig::default())
    }

    pub fn with_config(resolver: R, config: LoaderConfig) -> Self {
        Self { resolver, config }
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load the module at `location` and everything it imports
    pub async fn load(&self, location: &str) -> Result<Arc<Metaschema>> {
        let mut context = LoadContext::new();
        self.load_with_context(location, &mut context).await
    }

    /// Load reusing modules already built in `context`
    pub async fn load_with_context(
        &self,
        location: &str,
        context: &mut LoadContext,
    ) -> Result<Arc<Metaschema>> {
        info!("Loading metaschema: {}", location);
        let mut path = ImportPath::default();
        let metaschema = self
            .load_recursive(location.to_string(), context, &mut path)
            .await?;
        info!(
            "Loaded metaschema {} ({} modules in context)",
            location,
            context.loaded_count()
        );
        Ok(metaschema)
    }

    /// Load a module from text already in hand; its imports still go
    /// through the resolver, relative to `location`
    pub async fn load_str(&self, location: &str, content: &str) -> Result<Arc<Metaschema>> {
        let mut context = LoadContext::new();
        let mut path = ImportPath::default();
        let source = self.parse_source(location, content)?;
        path.enter(location);
        self.build(location, source, &mut context, &mut path).await
    }

    /// Parse module text in the configured or detected format
    pub fn parse_source(&self, location: &str, content: &str) -> Result<MetaschemaSource> {
        let format = self
            .config
            .format
            .unwrap_or_else(|| SchemaFormat::detect(location, content));
        MetaschemaSource::parse(location, content, format)
    }

    fn load_recursive<'a>(
        &'a self,
        location: String,
        context: &'a mut LoadContext,
        path: &'a mut ImportPath,
    ) -> LoadFuture<'a> {
        Box::pin(async move {
            if let Some(metaschema) = context.get(&location) {
                debug!("Reusing loaded metaschema: {}", location);
                return Ok(metaschema);
            }

            if path.contains(&location) {
                return Err(path.cycle(location));
            }

            if path.depth() >= self.config.max_import_depth {
                return Err(Error::ImportDepthExceeded {
                    location,
                    max_depth: self.config.max_import_depth,
                });
            }

            path.enter(&location);
            let result = self.fetch_and_build(&location, context, path).await;
            path.leave(&location);

            let metaschema = result?;
            context.loaded.insert(location, metaschema.clone());
            Ok(metaschema)
        })
    }

    async fn fetch_and_build(
        &self,
        location: &str,
        context: &mut LoadContext,
        path: &mut ImportPath,
    ) -> Result<Arc<Metaschema>> {
        trace!("Resolving metaschema: {}", location);
        let content = self.resolver.resolve(location).await?;
        let source = self.parse_source(location, &content)?;
        self.build(location, source, context, path).await
    }

    async fn build(
        &self,
        location: &str,
        source: MetaschemaSource,
        context: &mut LoadContext,
        path: &mut ImportPath,
    ) -> Result<Arc<Metaschema>> {
        let mut imports = Vec::with_capacity(source.imports.len());
        for href in &source.imports {
            let target = resolve_relative(location, href);
            debug!("{} imports {}", location, target);
            imports.push(self.load_recursive(target, context, path).await?);
        }
        Metaschema::from_source(location, source, imports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::MemoryResolver;

    #[tokio::test]
    async fn test_load_with_imports() {
        let resolver = MemoryResolver::new()
            .with_resource(
                "mem:top.yaml",
                "imports: [common.yaml]\ndefinitions:\n  - define-assembly:\n      name: top\n      flags:\n        - ref: id\n",
            )
            .with_resource(
                "mem:common.yaml",
                "definitions:\n  - define-flag:\n      name: id\n",
            );
        let loader = MetaschemaLoader::new(resolver);
        let top = loader.load("mem:top.yaml").await.unwrap();
        assert_eq!(top.imports().len(), 1);
        assert_eq!(top.imports()[0].location(), "mem:common.yaml");
        assert!(top.flag_definition("id").is_some());
    }

    #[tokio::test]
    async fn test_self_import_is_cycle() {
        let resolver =
            MemoryResolver::new().with_resource("mem:a.yaml", "imports: [a.yaml]\n");
        let err = MetaschemaLoader::new(resolver)
            .load("mem:a.yaml")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::ImportCycle {
                path: vec!["mem:a.yaml".to_string(), "mem:a.yaml".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let resolver = MemoryResolver::new()
            .with_resource("mem:a.yaml", "imports: [b.yaml]\n")
            .with_resource("mem:b.yaml", "imports: [c.yaml]\n")
            .with_resource("mem:c.yaml", "{}\n");
        let loader = MetaschemaLoader::with_config(
            resolver,
            LoaderConfig::new().with_max_import_depth(2),
        );
        let err = loader.load("mem:a.yaml").await.unwrap_err();
        assert!(matches!(err, Error::ImportDepthExceeded { max_depth: 2, .. }));
    }

    #[tokio::test]
    async fn test_load_str_resolves_imports() {
        let resolver = MemoryResolver::new().with_resource(
            "mem:common.yaml",
            "definitions:\n  - define-flag:\n      name: id\n",
        );
        let loader = MetaschemaLoader::new(resolver);
        let top = loader
            .load_str("mem:top.yaml", "imports: [common.yaml]\n")
            .await
            .unwrap();
        assert!(top.flag_definition("id").is_some());
        assert_eq!(loader.resolver().requests(), vec!["mem:common.yaml"]);
    }
}
