//! Context Compiler: the tagged-section document behind "copy context".

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use linecomp_core::protocol::SuggestRequest;
use linecomp_core::{
    ContextInstance, ContextItem, ContextSection, SectionTag, fence_language_for_path,
    render_sections,
};
use linecomp_infer::UrlReader;

/// Joins supplementary text entries inside the CONTEXT section.
pub const SUPPLEMENTARY_SEPARATOR: &str = "\n\n";

const TASK_TITLE: &str = "Main task";
const CONTEXT_TITLE: &str = "Additional context";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileRequest {
    pub main_text: Option<String>,
    pub supplementary_text: Vec<String>,
    pub urls: Vec<String>,
    pub filepaths: Vec<String>,
    /// Carried through but not consumed yet.
    pub web_search_enabled: bool,
    pub workspace_root: Option<PathBuf>,
}

impl CompileRequest {
    /// Splits an instance into compiler inputs. Ignored items are dropped and
    /// the main text item becomes the task.
    pub fn from_instance(instance: &ContextInstance, workspace_root: Option<PathBuf>) -> Self {
        let mut request = Self {
            main_text: instance.main_text().map(str::to_owned),
            web_search_enabled: instance.web_search_enabled,
            workspace_root,
            ..Self::default()
        };
        request.push_items(instance.supplementary_items());
        request
    }

    /// Same split for a request that already went over the wire.
    pub fn from_suggest(request: &SuggestRequest, workspace_root: Option<PathBuf>) -> Self {
        let main_text = match &request.primary_context {
            Some(ContextItem::Text {
                body,
                ignored: false,
            }) => Some(body.clone()),
            _ => None,
        };
        let mut compiled = Self {
            main_text,
            web_search_enabled: request.web_search_enabled,
            workspace_root,
            ..Self::default()
        };
        compiled.push_items(request.user_context.iter().filter(|item| !item.is_ignored()));
        compiled
    }

    fn push_items<'a>(&mut self, items: impl Iterator<Item = &'a ContextItem>) {
        for item in items {
            match item {
                ContextItem::File { path } => self.filepaths.push(path.clone()),
                ContextItem::Url { address } => self.urls.push(address.clone()),
                ContextItem::Text { body, .. } => self.supplementary_text.push(body.clone()),
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.main_text.is_none()
            && self.supplementary_text.is_empty()
            && self.urls.is_empty()
            && self.filepaths.is_empty()
    }

    /// Reads a context file. With a workspace root, the canonical path must
    /// stay under the canonical root.
    async fn read_file(&self, path: &str) -> std::io::Result<String> {
        let Some(root) = &self.workspace_root else {
            return tokio::fs::read_to_string(path).await;
        };
        let root = tokio::fs::canonicalize(root).await?;
        let resolved = tokio::fs::canonicalize(root.join(path)).await?;
        if !resolved.starts_with(&root) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("{path} is outside the workspace"),
            ));
        }
        tokio::fs::read_to_string(&resolved).await
    }
}

#[derive(Clone)]
pub struct ContextCompiler {
    reader: Arc<dyn UrlReader>,
}

impl ContextCompiler {
    pub fn new(reader: Arc<dyn UrlReader>) -> Self {
        Self { reader }
    }

    /// Sections in document order. A file or URL that cannot be read is
    /// logged and left out.
    pub async fn compile_sections(&self, request: &CompileRequest) -> Vec<ContextSection> {
        let mut sections = Vec::new();

        let task = request
            .main_text
            .as_ref()
            .map(|text| ContextSection::new(SectionTag::Task, TASK_TITLE, text.as_str()));
        sections.extend(task.clone());

        if !request.supplementary_text.is_empty() {
            sections.push(ContextSection::new(
                SectionTag::Context,
                CONTEXT_TITLE,
                request.supplementary_text.join(SUPPLEMENTARY_SEPARATOR),
            ));
        }

        let files = join_all(
            request
                .filepaths
                .iter()
                .map(|path| async move { (path, request.read_file(path).await) }),
        )
        .await;
        for (path, read) in files {
            match read {
                Ok(body) => sections.push(
                    ContextSection::new(SectionTag::File, path.as_str(), body)
                        .with_language(fence_language_for_path(path)),
                ),
                Err(err) => {
                    tracing::warn!(path = %path, error = %err, "skipping unreadable context file");
                }
            }
        }

        let pages = join_all(
            request
                .urls
                .iter()
                .map(|url| async move { (url, self.reader.read(url).await) }),
        )
        .await;
        for (url, fetched) in pages {
            match fetched {
                Ok(body) => sections.push(ContextSection::new(SectionTag::Url, url.as_str(), body)),
                Err(err) => {
                    tracing::warn!(url = %url, error = %err, "skipping unreachable context url");
                }
            }
        }

        sections.extend(task);
        sections
    }

    pub async fn compile(&self, request: &CompileRequest) -> String {
        render_sections(&self.compile_sections(request).await)
    }
}
