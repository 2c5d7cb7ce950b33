//! Route discovery from a directory tree.
//!
//! Rust cannot load handlers from files at runtime, so the files only decide
//! the URL paths: each route module is registered under the name of its file
//! (relative to the routes directory, without the extension), and
//! [`Discovery::scan`] walks the directory to find where each one is
//! mounted.
//!
//! - `routes/index.rs` is mounted at `/`;
//! - `routes/users/index.rs` is mounted at `/users`;
//! - `routes/users/profile.rs` is mounted at `/users/profile`.
//!
//! The resulting [`RouteManifest`] is registered with [`Router::mount`].
//!
//! # Examples
//! ```rust,no_run
//! # use noheadache::*;
//! use noheadache::discovery::{Discovery, MethodMap};
//!
//! fn users(methods: &mut MethodMap) {
//!     methods.get(endpoints::simple(|response| {
//!         response.json(&serde_json::json!([]))?;
//!         Ok::<_, DispatchError>(())
//!     }));
//! }
//!
//! # fn main() -> Result<(), DispatchError> {
//! let manifest = Discovery::new("routes").module("users/index", users).scan()?;
//! let mut http = noheadache::http();
//! http.mount(manifest);
//! # Ok(())
//! # }
//! ```
//!
//! [`Router::mount`]: crate::Router::mount

use crate::error::DispatchError;
use crate::Endpoint;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;

/// A file-backed set of route handlers.
///
/// This is implemented for any `Fn(&mut MethodMap)`, so a plain function
/// that adds its handlers works as a module.
pub trait RouteModule: Send + Sync + 'static {
    /// Adds the handlers of this module, keyed by method.
    fn routes(&self, methods: &mut MethodMap);
}

impl<F> RouteModule for F
where
    F: Fn(&mut MethodMap) + Send + Sync + 'static,
{
    fn routes(&self, methods: &mut MethodMap) {
        self(methods);
    }
}

#[derive(Default)]
/// The handlers for a single path, keyed by method.  Adding a handler for a
/// method that already has one replaces it.
pub struct MethodMap(Vec<(http::Method, Pin<Box<dyn Endpoint>>)>);

macro_rules! method {
    ($($(#[$m:meta])* $v:vis fn $n:ident = $meth:expr;)+) => {
        $(
            $(#[$m])* $v fn $n<E: Endpoint>(&mut self, endpoint: E) -> &mut Self {
                self.method($meth, endpoint)
            }
        )+
    };
}

impl MethodMap {
    /// Adds the handler for the method.
    pub fn method<E: Endpoint>(&mut self, method: http::Method, endpoint: E) -> &mut Self {
        let endpoint: Pin<Box<dyn Endpoint>> = Box::pin(endpoint);
        match self.0.iter_mut().find(|(m, _)| *m == method) {
            Some(entry) => entry.1 = endpoint,
            None => self.0.push((method, endpoint)),
        }
        self
    }

    method![
        /// Adds a GET handler.
        pub fn get = http::Method::GET;
        /// Adds a POST handler.
        pub fn post = http::Method::POST;
        /// Adds a PUT handler.
        pub fn put = http::Method::PUT;
        /// Adds a PATCH handler.
        pub fn patch = http::Method::PATCH;
        /// Adds a DELETE handler.
        pub fn delete = http::Method::DELETE;
    ];

    /// The methods that have handlers, in the order they were added.
    pub fn methods(&self) -> impl Iterator<Item = &http::Method> {
        self.0.iter().map(|(method, _)| method)
    }

    /// The number of handlers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no handlers.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn merge(&mut self, other: MethodMap) {
        for (method, endpoint) in other.0 {
            match self.0.iter_mut().find(|(m, _)| *m == method) {
                Some(entry) => entry.1 = endpoint,
                None => self.0.push((method, endpoint)),
            }
        }
    }
}

impl IntoIterator for MethodMap {
    type Item = (http::Method, Pin<Box<dyn Endpoint>>);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl std::fmt::Debug for MethodMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.methods()).finish()
    }
}

#[derive(Debug, Default)]
/// A mapping from URL path to the handlers for that path, in the order the
/// paths were discovered.
pub struct RouteManifest(Vec<(String, MethodMap)>);

impl RouteManifest {
    /// Adds the handlers for the path.  If the path is already present, the
    /// handlers are merged, with the new ones replacing the old for the same
    /// method.
    pub fn insert<P: Into<String>>(&mut self, path: P, methods: MethodMap) -> &mut Self {
        let path = path.into();
        match self.0.iter_mut().find(|(p, _)| *p == path) {
            Some((_, existing)) => existing.merge(methods),
            None => self.0.push((path, methods)),
        }
        self
    }

    /// Returns the handlers for the path.
    pub fn get(&self, path: &str) -> Option<&MethodMap> {
        self.0.iter().find(|(p, _)| p == path).map(|(_, m)| m)
    }

    /// The paths in the manifest.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(path, _)| path.as_str())
    }

    /// The number of paths.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no paths.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for RouteManifest {
    type Item = (String, MethodMap);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Walks a routes directory, mounting the registered route modules at the
/// paths their files map to.
pub struct Discovery {
    root: PathBuf,
    modules: HashMap<String, Box<dyn RouteModule>>,
}

impl Discovery {
    /// Creates a discovery over the given routes directory.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Discovery {
            root: root.into(),
            modules: HashMap::new(),
        }
    }

    #[must_use]
    /// Associates the module with a file.  The name is the path of the file
    /// relative to the routes directory, with or without its extension
    /// (e.g. `users/index` or `users/index.rs`).
    pub fn module<M: RouteModule>(mut self, name: &str, module: M) -> Self {
        self.modules.insert(module_key(name), Box::new(module));
        self
    }

    /// Walks the routes directory, collecting the handlers of every file
    /// that has a module.
    ///
    /// Files without a module are skipped with a warning.  If the directory
    /// does not exist, the manifest is empty.
    ///
    /// # Errors
    /// Fails if a directory under the root cannot be read.
    pub fn scan(&self) -> Result<RouteManifest, DispatchError> {
        let mut manifest = RouteManifest::default();
        if !self.root.is_dir() {
            log::warn!("routes folder not found: {}", self.root.display());
            return Ok(manifest);
        }

        let mut found = Vec::new();
        self.walk(&self.root, &mut Vec::new(), &mut manifest, &mut found)?;

        for name in self.modules.keys().filter(|name| !found.contains(*name)) {
            log::warn!("route module {:?} has no file under {}", name, self.root.display());
        }

        log::debug!("discovered routes: {:?}", manifest);
        Ok(manifest)
    }

    fn walk(
        &self,
        directory: &Path,
        segments: &mut Vec<String>,
        manifest: &mut RouteManifest,
        found: &mut Vec<String>,
    ) -> Result<(), DispatchError> {
        let discovery_error = |source| DispatchError::Discovery {
            path: directory.to_path_buf(),
            source,
        };
        let mut entries = std::fs::read_dir(directory)
            .and_then(|entries| entries.collect::<Result<Vec<_>, _>>())
            .map_err(discovery_error)?;
        entries.sort_by_key(std::fs::DirEntry::file_name);

        for entry in entries {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let file_type = entry.file_type().map_err(discovery_error)?;
            let path = entry.path();

            if file_type.is_dir() {
                segments.push(name);
                self.walk(&path, segments, manifest, found)?;
                segments.pop();
            } else if file_type.is_file() {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or(name);
                let key = join_key(segments, &stem);
                match self.modules.get(&key) {
                    Some(module) => {
                        let mut methods = MethodMap::default();
                        module.routes(&mut methods);
                        if methods.is_empty() {
                            log::warn!("route module {:?} has no handlers", key);
                        }
                        manifest.insert(url_path_for(segments, &stem), methods);
                        found.push(key);
                    }
                    None => {
                        log::warn!("no route module for {}; skipping", path.display());
                    }
                }
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for Discovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Discovery")
            .field("root", &self.root)
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The URL path of a file in the given directory: `index` is the directory
/// itself, anything else is a path beneath it.
fn url_path_for(segments: &[String], stem: &str) -> String {
    let mut buffer = String::new();
    for segment in segments {
        buffer.push('/');
        buffer.push_str(segment);
    }
    if stem != "index" {
        buffer.push('/');
        buffer.push_str(stem);
    }
    if buffer.is_empty() {
        buffer.push('/');
    }
    buffer
}

fn join_key(segments: &[String], stem: &str) -> String {
    let mut key = segments.join("/");
    if !key.is_empty() {
        key.push('/');
    }
    key.push_str(stem);
    key
}

fn module_key(name: &str) -> String {
    let name = name.trim_matches('/');
    let (directory, file) = match name.rsplit_once('/') {
        Some((directory, file)) => (Some(directory), file),
        None => (None, name),
    };
    let stem = Path::new(file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_owned());
    match directory {
        Some(directory) => format!("{}/{}", directory, stem),
        None => stem,
    }
}
