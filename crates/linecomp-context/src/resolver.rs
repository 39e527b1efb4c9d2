//! Implementation Resolver: bounded-time fan-out over go-to-implementation.

use std::collections::HashSet;
use std::time::Duration;

use futures::future::join_all;
use linecomp_config::PipelineConfig;
use linecomp_core::{SymbolImplementationLocation, SymbolReference, normalize_path};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::index::{IndexError, SymbolIndex};

#[derive(Debug, Clone)]
pub struct ImplementationResolver {
    timeout: Duration,
    max_concurrency: usize,
    builtin_path_segments: Vec<String>,
    dedupe: bool,
}

impl ImplementationResolver {
    pub fn new(timeout: Duration) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            timeout,
            max_concurrency: defaults.implementation_concurrency,
            builtin_path_segments: defaults.builtin_path_segments,
            dedupe: false,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            timeout: config.implementation_timeout(),
            max_concurrency: config.implementation_concurrency.max(1),
            builtin_path_segments: config.builtin_path_segments.clone(),
            dedupe: config.dedupe_implementations,
        }
    }

    pub fn with_builtin_path_segments(mut self, segments: Vec<String>) -> Self {
        self.builtin_path_segments = segments;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// True when some path component equals a configured builtin segment.
    pub fn is_builtin_path(&self, path: &str) -> bool {
        let normalized = normalize_path(path);
        normalized.split('/').any(|component| {
            self.builtin_path_segments
                .iter()
                .any(|segment| component == segment)
        })
    }

    /// Resolves every reference under one shared deadline.
    ///
    /// Output follows input order. References whose lookup fails, finds
    /// nothing, is still pending at the deadline, or lands in a builtin path
    /// are dropped.
    pub async fn resolve(
        &self,
        index: &dyn SymbolIndex,
        path: &str,
        references: &[SymbolReference],
        expand_to_class: bool,
    ) -> Vec<SymbolImplementationLocation> {
        if references.is_empty() {
            return Vec::new();
        }

        let cancel = CancellationToken::new();
        let permits = Semaphore::new(self.max_concurrency);

        let lookups = join_all(references.iter().map(|reference| {
            let cancel = &cancel;
            let permits = &permits;
            async move {
                let lookup = async {
                    let _permit = permits.acquire().await.ok()?;
                    match index
                        .find_implementation(path, reference.position(), cancel)
                        .await
                    {
                        Ok(candidates) => candidates.into_iter().next(),
                        Err(IndexError::Cancelled) => None,
                        Err(err) => {
                            tracing::warn!(
                                symbol = %reference.name,
                                line = reference.line,
                                error = %err,
                                "implementation lookup failed"
                            );
                            None
                        }
                    }
                };
                tokio::select! {
                    _ = cancel.cancelled() => None,
                    found = lookup => found,
                }
            }
        }));
        tokio::pin!(lookups);

        let results = tokio::select! {
            results = &mut lookups => results,
            _ = tokio::time::sleep(self.timeout) => {
                cancel.cancel();
                let results = lookups.await;
                tracing::debug!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    unresolved = results.iter().filter(|result| result.is_none()).count(),
                    "implementation lookups hit the deadline"
                );
                results
            }
        };

        let mut seen = HashSet::new();
        references
            .iter()
            .zip(results)
            .filter_map(|(reference, candidate)| {
                let candidate = candidate?;
                if self.is_builtin_path(&candidate.path) {
                    return None;
                }
                Some(SymbolImplementationLocation::from_candidate(
                    reference.name.clone(),
                    &candidate,
                    expand_to_class,
                ))
            })
            .filter(|location| {
                !self.dedupe || {
                    let (path, a, b, c, d) = location.location_key();
                    seen.insert((path.to_owned(), a, b, c, d))
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_paths_match_whole_components() {
        let resolver = ImplementationResolver::new(Duration::from_secs(1));
        assert!(resolver.is_builtin_path(
            "/home/u/.vscode/extensions/ms-python/dist/typeshed-fallback/stdlib/os/__init__.pyi"
        ));
        assert!(resolver.is_builtin_path(r"C:\py\typeshed\stdlib\json.pyi"));
        assert!(resolver.is_builtin_path("lib/builtins.pyi"));
        assert!(!resolver.is_builtin_path("src/stdlib_helpers.py"));
        assert!(!resolver.is_builtin_path("app/models.py"));
    }

    #[test]
    fn config_carries_dedupe_and_segments() {
        let config = PipelineConfig {
            dedupe_implementations: true,
            builtin_path_segments: vec!["site-packages".to_owned()],
            implementation_concurrency: 0,
            ..PipelineConfig::default()
        };
        let resolver = ImplementationResolver::from_config(&config);
        assert!(resolver.dedupe);
        assert_eq!(resolver.max_concurrency, 1);
        assert!(resolver.is_builtin_path("venv/lib/site-packages/requests/api.py"));
        assert!(!resolver.is_builtin_path("typeshed/stdlib/os.pyi"));
    }
}
