//! Symbol index seams and the tree-sitter backed local implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use async_trait::async_trait;
use linecomp_core::{
    ImplementationCandidate, Position, ScopeNode, SymbolImplementationLocation, SymbolReference,
    SymbolSource, normalize_path,
};
use linecomp_parse::{Definition, ParseError, PythonParser, is_builtin_name, is_python_path};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::backend::BackendError;
use crate::source::{SymbolSourceFetcher, extract_symbol_source};

const SKIPPED_DIRS: &[&str] = &[".git", "__pycache__", "node_modules", "target", ".linecomp"];

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0} is outside the workspace")]
    OutsideWorkspace(String),
    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),
    #[error("index worker failed: {0}")]
    Worker(String),
    #[error("lookup cancelled")]
    Cancelled,
    #[error("backend request failed: {0}")]
    Backend(#[from] BackendError),
}

/// Finds call/use sites inside a line range of a file.
#[async_trait]
pub trait ReferenceFinder: Send + Sync {
    async fn find_references(
        &self,
        path: &str,
        start_line: usize,
        end_line: usize,
    ) -> Result<Vec<SymbolReference>, IndexError>;
}

/// Scope trees and go-to-implementation.
#[async_trait]
pub trait SymbolIndex: Send + Sync {
    async fn scope_tree(&self, path: &str) -> Result<Vec<ScopeNode>, IndexError>;

    /// Definition sites of the symbol at `position`. Implementations should
    /// stop early once `cancel` fires.
    async fn find_implementation(
        &self,
        path: &str,
        position: Position,
        cancel: &CancellationToken,
    ) -> Result<Vec<ImplementationCandidate>, IndexError>;
}

struct CachedDefinitions {
    modified: SystemTime,
    definitions: Arc<Vec<Definition>>,
}

struct IndexInner {
    root: PathBuf,
    parser: Mutex<PythonParser>,
    definitions: Mutex<HashMap<PathBuf, CachedDefinitions>>,
}

/// Index over the Python files of one workspace.
#[derive(Clone)]
pub struct LocalSymbolIndex {
    inner: Arc<IndexInner>,
}

impl LocalSymbolIndex {
    /// The root is canonicalized so that every lookup can be confined to it.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let root = root.into();
        let root = root.canonicalize().map_err(|source| IndexError::Io {
            path: root.display().to_string(),
            source,
        })?;
        Ok(Self {
            inner: Arc::new(IndexInner {
                root,
                parser: Mutex::new(PythonParser::new()?),
                definitions: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    async fn run_blocking<T, F>(&self, job: F) -> Result<T, IndexError>
    where
        T: Send + 'static,
        F: FnOnce(&IndexInner) -> Result<T, IndexError> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || job(&inner))
            .await
            .map_err(|err| IndexError::Worker(err.to_string()))?
    }
}

impl IndexInner {
    /// Canonical path of a workspace file. Anything that lands outside the
    /// root after resolving `..` and symlinks is refused.
    fn resolve(&self, path: &str) -> Result<PathBuf, IndexError> {
        let resolved = self
            .root
            .join(path)
            .canonicalize()
            .map_err(|source| IndexError::Io {
                path: path.to_owned(),
                source,
            })?;
        if !resolved.starts_with(&self.root) {
            return Err(IndexError::OutsideWorkspace(path.to_owned()));
        }
        Ok(resolved)
    }

    fn display_path(&self, path: &Path) -> String {
        let shown = path.strip_prefix(&self.root).unwrap_or(path);
        normalize_path(&shown.to_string_lossy())
    }

    fn read(&self, path: &Path) -> Result<String, IndexError> {
        std::fs::read_to_string(path).map_err(|source| IndexError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    fn with_parser<T>(
        &self,
        job: impl FnOnce(&mut PythonParser) -> Result<T, ParseError>,
    ) -> Result<T, IndexError> {
        let mut parser = self
            .parser
            .lock()
            .map_err(|_| IndexError::Worker("parser lock poisoned".to_owned()))?;
        Ok(job(&mut parser)?)
    }

    /// Definitions of one file, reparsed only when its mtime moves forward.
    fn definitions(&self, path: &Path) -> Result<Arc<Vec<Definition>>, IndexError> {
        let modified = std::fs::metadata(path)
            .and_then(|metadata| metadata.modified())
            .map_err(|source| IndexError::Io {
                path: path.display().to_string(),
                source,
            })?;

        {
            let cache = self
                .definitions
                .lock()
                .map_err(|_| IndexError::Worker("definition cache lock poisoned".to_owned()))?;
            if let Some(cached) = cache.get(path)
                && modified <= cached.modified
            {
                return Ok(cached.definitions.clone());
            }
        }

        let source = self.read(path)?;
        let definitions = Arc::new(self.with_parser(|parser| parser.definitions(&source))?);
        let mut cache = self
            .definitions
            .lock()
            .map_err(|_| IndexError::Worker("definition cache lock poisoned".to_owned()))?;
        cache.insert(
            path.to_path_buf(),
            CachedDefinitions {
                modified,
                definitions: definitions.clone(),
            },
        );
        Ok(definitions)
    }

    fn candidates_in(
        &self,
        path: &Path,
        name: &str,
    ) -> Result<Vec<ImplementationCandidate>, IndexError> {
        Ok(self
            .definitions(path)?
            .iter()
            .filter(|definition| definition.name == name)
            .map(|definition| ImplementationCandidate {
                path: self.display_path(path),
                range: definition.range,
            })
            .collect())
    }

    fn find_implementation(
        &self,
        path: &str,
        position: Position,
        cancel: &CancellationToken,
    ) -> Result<Vec<ImplementationCandidate>, IndexError> {
        let origin = self.resolve(path)?;
        let source = self.read(&origin)?;
        let Some(name) = identifier_at(&source, position) else {
            return Ok(Vec::new());
        };
        if is_builtin_name(&name) {
            return Ok(Vec::new());
        }

        let local = self.candidates_in(&origin, &name)?;
        if !local.is_empty() {
            return Ok(local);
        }

        let mut found = Vec::new();
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                !(entry.file_type().is_dir()
                    && SKIPPED_DIRS
                        .iter()
                        .any(|skipped| entry.file_name() == *skipped))
            });
        for entry in walker {
            if cancel.is_cancelled() {
                return Err(IndexError::Cancelled);
            }
            let Ok(entry) = entry else {
                continue;
            };
            let candidate = entry.path();
            if !entry.file_type().is_file() || !is_python_path(candidate) || candidate == origin {
                continue;
            }
            match self.candidates_in(candidate, &name) {
                Ok(mut matches) => found.append(&mut matches),
                Err(err) => {
                    tracing::debug!(path = %candidate.display(), error = %err, "skipping unreadable file");
                }
            }
        }
        Ok(found)
    }

    fn symbol_sources(
        &self,
        locations: &[SymbolImplementationLocation],
    ) -> Result<Vec<SymbolSource>, IndexError> {
        locations
            .iter()
            .map(|location| {
                let text = self.read(&self.resolve(&location.path)?)?;
                self.with_parser(|parser| extract_symbol_source(parser, &text, location))
            })
            .collect()
    }
}

#[async_trait]
impl ReferenceFinder for LocalSymbolIndex {
    async fn find_references(
        &self,
        path: &str,
        start_line: usize,
        end_line: usize,
    ) -> Result<Vec<SymbolReference>, IndexError> {
        let path = path.to_owned();
        self.run_blocking(move |inner| {
            let source = inner.read(&inner.resolve(&path)?)?;
            let references =
                inner.with_parser(|parser| parser.call_references(&source, start_line, end_line))?;
            Ok(references
                .into_iter()
                .filter(|reference| !is_builtin_name(&reference.name))
                .collect())
        })
        .await
    }
}

#[async_trait]
impl SymbolIndex for LocalSymbolIndex {
    async fn scope_tree(&self, path: &str) -> Result<Vec<ScopeNode>, IndexError> {
        let path = path.to_owned();
        self.run_blocking(move |inner| {
            let source = inner.read(&inner.resolve(&path)?)?;
            inner.with_parser(|parser| parser.scope_forest(&source))
        })
        .await
    }

    async fn find_implementation(
        &self,
        path: &str,
        position: Position,
        cancel: &CancellationToken,
    ) -> Result<Vec<ImplementationCandidate>, IndexError> {
        let path = path.to_owned();
        let cancel = cancel.clone();
        self.run_blocking(move |inner| inner.find_implementation(&path, position, &cancel))
            .await
    }
}

#[async_trait]
impl SymbolSourceFetcher for LocalSymbolIndex {
    async fn fetch_sources(
        &self,
        locations: &[SymbolImplementationLocation],
    ) -> Result<Vec<SymbolSource>, IndexError> {
        let locations = locations.to_vec();
        self.run_blocking(move |inner| inner.symbol_sources(&locations))
            .await
    }
}

/// Identifier token covering `position`, if any.
pub(crate) fn identifier_at(source: &str, position: Position) -> Option<String> {
    let line = source.split('\n').nth(position.line)?;
    let chars = line.chars().collect::<Vec<_>>();
    let is_ident = |ch: &char| ch.is_alphanumeric() || *ch == '_';

    let mut start = position.column.min(chars.len());
    while start > 0 && is_ident(&chars[start - 1]) {
        start -= 1;
    }
    let mut end = position.column.min(chars.len());
    while end < chars.len() && is_ident(&chars[end]) {
        end += 1;
    }

    let name = chars[start..end].iter().collect::<String>();
    (!name.is_empty() && !name.starts_with(|ch: char| ch.is_ascii_digit())).then_some(name)
}
