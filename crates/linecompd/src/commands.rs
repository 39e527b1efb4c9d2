use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use linecomp_config::{LinecompConfig, ensure_workspace_config, validate_config};
use linecomp_context::state::ModelConfig;
use linecomp_context::{
    BackendClient, CompletionPipeline, ContextCompiler, DocumentCursor, ExtensionState,
    InProcessCompletionService, LocalSymbolIndex, StateStore, TriggerQueue, copy_context,
};
use linecomp_core::{ContextItem, Position, normalize_path};
use linecomp_infer::{JinaReader, MockProvider, ProviderOverrides, UrlReader, load_provider};

use crate::cli::{
    Cli, Commands, CompleteArgs, ContextCommand, CopyContextArgs, ProviderArgs, ServeArgs,
    SettingsCommand,
};
use crate::clipboard::copy_to_clipboard;
use crate::server::{self, AppState};

const SUMMARY_CHARS: usize = 60;

impl ProviderArgs {
    pub fn overrides(&self) -> ProviderOverrides {
        ProviderOverrides {
            provider: self.provider,
            model: self.model.clone(),
            endpoint: self.endpoint.clone(),
            api_key_env: self.api_key_env.clone(),
        }
    }
}

/// A resolved workspace root and its configuration.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub config: LinecompConfig,
}

impl Workspace {
    pub fn open(path: &Path) -> Result<Self> {
        let root = path
            .canonicalize()
            .with_context(|| format!("failed to resolve workspace path {}", path.display()))?;
        let config = ensure_workspace_config(&root).with_context(|| {
            format!(
                "failed to load or create workspace config at {}",
                linecomp_config::config_path(&root).display()
            )
        })?;
        for warning in validate_config(&config) {
            tracing::warn!(code = warning.code, "{}", warning.message);
        }
        Ok(Self { root, config })
    }

    pub fn state_store(&self) -> StateStore {
        StateStore::for_workspace(&self.root)
    }

    fn reader(&self, state: &ExtensionState) -> Arc<dyn UrlReader> {
        Arc::new(JinaReader::from_config(
            &self.config.reader,
            state.settings.jina_api_key.as_deref(),
        ))
    }

    fn index(&self) -> Result<Arc<LocalSymbolIndex>> {
        Ok(Arc::new(
            LocalSymbolIndex::new(self.root.clone()).context("failed to initialise the python index")?,
        ))
    }

    fn in_process_service(
        &self,
        provider: &ProviderArgs,
        state: &ExtensionState,
    ) -> Result<InProcessCompletionService> {
        let loaded = load_provider(&self.config, provider.overrides())
            .context("failed to load completion provider")?;
        tracing::info!(
            provider = %loaded.provider_name,
            model = %loaded.model_name,
            "completion provider ready"
        );
        Ok(InProcessCompletionService::new(
            Arc::from(loaded.provider),
            ContextCompiler::new(self.reader(state)),
            self.config.pipeline.marker.clone(),
            Some(self.root.clone()),
        ))
    }

    /// Reads `file` from disk; the document path is workspace-relative.
    pub fn document(&self, file: &Path, line: usize, column: usize) -> Result<DocumentCursor> {
        let absolute = if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.root.join(file)
        };
        let text = std::fs::read_to_string(&absolute)
            .with_context(|| format!("failed to read {}", absolute.display()))?;
        let relative = absolute.strip_prefix(&self.root).unwrap_or(&absolute);
        Ok(DocumentCursor::new(
            normalize_path(&relative.to_string_lossy()),
            text,
            Position::new(line, column),
        ))
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let workspace = Workspace::open(&cli.workspace)?;
    let mut out = std::io::stdout();
    match cli.command {
        Commands::Serve(args) => run_serve(&workspace, args).await,
        Commands::Complete(args) => run_complete(&workspace, args, &mut out).await,
        Commands::CopyContext(args) => run_copy_context(&workspace, args, &mut out).await,
        Commands::Context(command) => run_context(&workspace.state_store(), command, &mut out),
        Commands::Settings(command) => run_settings(&workspace.state_store(), command, &mut out),
    }
}

pub async fn run_serve(workspace: &Workspace, args: ServeArgs) -> Result<()> {
    let state = workspace.state_store().load()?;
    let service = workspace.in_process_service(&args.provider, &state)?;
    let index = workspace.index()?;
    let addr = match args.bind.as_deref() {
        Some(bind) => bind
            .parse()
            .with_context(|| format!("invalid bind address '{bind}'"))?,
        None => workspace.config.backend.bind_addr()?,
    };

    server::serve(
        addr,
        AppState {
            service: Arc::new(service),
            references: index.clone(),
            sources: index,
        },
    )
    .await
}

pub async fn run_complete(
    workspace: &Workspace,
    args: CompleteArgs,
    out: &mut dyn Write,
) -> Result<()> {
    let document = workspace.document(&args.file, args.line, args.column)?;
    let state = workspace.state_store().load()?;
    let index = workspace.index()?;
    let config = &workspace.config;

    let pipeline = if args.in_process {
        let service = Arc::new(workspace.in_process_service(&args.provider, &state)?);
        CompletionPipeline::new(index.clone(), index.clone(), index, service, &config.pipeline)
    } else {
        let client = Arc::new(match args.backend.as_deref() {
            Some(url) => BackendClient::new(url, config.backend.request_timeout()),
            None => BackendClient::from_config(&config.backend),
        });
        tracing::debug!(url = client.base_url(), "using completion backend");
        CompletionPipeline::new(
            index,
            client.clone(),
            client.clone(),
            client,
            &config.pipeline,
        )
    };
    let pipeline =
        pipeline.with_expand_to_class(args.expand_to_class || config.pipeline.expand_to_class);

    let triggers = TriggerQueue::default();
    triggers.enqueue(&document.path);
    let outcome = pipeline
        .provide(&triggers, &document, state.active_instance())
        .await;

    for candidate in outcome.candidates() {
        writeln!(out, "{candidate}")?;
    }
    if let Some(notice) = outcome.notice() {
        eprintln!("{notice}");
    }
    Ok(())
}

pub async fn run_copy_context(
    workspace: &Workspace,
    args: CopyContextArgs,
    out: &mut dyn Write,
) -> Result<()> {
    let state = workspace.state_store().load()?;
    let instance = state
        .active_instance()
        .context("no active context instance")?;
    let compiler = ContextCompiler::new(workspace.reader(&state));
    let root = Some(workspace.root.clone());

    let text = match (&args.file, args.line, args.column) {
        (Some(file), Some(line), Some(column)) => {
            let document = workspace.document(file, line, column)?;
            let index = workspace.index()?;
            // the copy flow never reaches the model
            let service = Arc::new(InProcessCompletionService::new(
                Arc::new(MockProvider),
                compiler.clone(),
                workspace.config.pipeline.marker.clone(),
                root.clone(),
            ));
            let pipeline = CompletionPipeline::new(
                index.clone(),
                index.clone(),
                index,
                service,
                &workspace.config.pipeline,
            );
            copy_context(&compiler, instance, root, Some((&pipeline, &document))).await
        }
        _ => copy_context(&compiler, instance, root, None).await,
    };

    if args.clipboard {
        copy_to_clipboard(&text)?;
        tracing::info!(chars = text.chars().count(), "context copied to clipboard");
    } else {
        writeln!(out, "{text}")?;
    }
    Ok(())
}

pub fn run_context(store: &StateStore, command: ContextCommand, out: &mut dyn Write) -> Result<()> {
    let state = match command {
        ContextCommand::List => store.load()?,
        ContextCommand::New { name } => store.update(|state| state.create_instance(&name))?,
        ContextCommand::Rename { id, name } => {
            store.update(|state| state.rename_instance(&id, &name))?
        }
        ContextCommand::Remove { id } => store.update(|state| state.remove_instance(&id))?,
        ContextCommand::Activate { id } => store.update(|state| state.activate(&id))?,
        ContextCommand::AddFile { path } => {
            store.update(|state| state.add_item(ContextItem::file(path)))?
        }
        ContextCommand::AddUrl { url } => store.update(|state| state.add_item(ContextItem::url(url)))?,
        ContextCommand::AddText { text } => {
            store.update(|state| state.add_item(ContextItem::text(text)))?
        }
        ContextCommand::EditText { index, text } => {
            store.update(|state| state.edit_text(index, &text))?
        }
        ContextCommand::RemoveItem { index } => store.update(|state| state.remove_item(index))?,
        ContextCommand::MoveItem { from, to } => store.update(|state| state.move_item(from, to))?,
        ContextCommand::ToggleIgnore { index } => {
            store.update(|state| state.toggle_ignore(index))?
        }
        ContextCommand::SetMain { index } => store.update(|state| state.set_main(index))?,
        ContextCommand::ClearMain => store.update(ExtensionState::clear_main)?,
        ContextCommand::WebSearch { state: toggle } => {
            store.update(|state| state.set_web_search(toggle.enabled()))?
        }
    };
    write_instances(&state, out)
}

pub fn run_settings(
    store: &StateStore,
    command: SettingsCommand,
    out: &mut dyn Write,
) -> Result<()> {
    let state = match command {
        SettingsCommand::Show => store.load()?,
        SettingsCommand::SetJinaKey { key } => {
            store.update(|state| Ok(state.set_jina_api_key(&key)))?
        }
        SettingsCommand::AddModel {
            name,
            url,
            paste_delay_ms,
        } => store.update(|state| {
            state.add_model_config(ModelConfig {
                name,
                url,
                paste_delay_ms,
            })
        })?,
        SettingsCommand::RemoveModel { name } => {
            store.update(|state| state.remove_model_config(&name))?
        }
    };
    write_settings(&state, out)
}

fn summarize(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default().trim();
    let mut summary = first_line.chars().take(SUMMARY_CHARS).collect::<String>();
    if first_line.chars().count() > SUMMARY_CHARS || text.trim().lines().count() > 1 {
        summary.push_str("...");
    }
    summary
}

fn write_instances(state: &ExtensionState, out: &mut dyn Write) -> Result<()> {
    for instance in &state.instances {
        let active = instance.id == state.active_instance_id;
        let web = if instance.web_search_enabled {
            "  [web search]"
        } else {
            ""
        };
        writeln!(
            out,
            "{} {}  {}  ({} items){web}",
            if active { "*" } else { " " },
            instance.id,
            instance.name,
            instance.items.len()
        )?;
        if !active {
            continue;
        }
        for (index, item) in instance.items.iter().enumerate() {
            let main = if instance.main_item == Some(index) {
                "main "
            } else {
                ""
            };
            let ignored = if item.is_ignored() { "ignored " } else { "" };
            let summary = match item {
                ContextItem::File { path } => path.clone(),
                ContextItem::Url { address } => address.clone(),
                ContextItem::Text { body, .. } => summarize(body),
            };
            writeln!(
                out,
                "    [{index}] {:<4} {main}{ignored}{summary}",
                item.kind_str()
            )?;
        }
    }
    Ok(())
}

fn write_settings(state: &ExtensionState, out: &mut dyn Write) -> Result<()> {
    let key = if state.settings.jina_api_key.is_some() {
        "set"
    } else {
        "not set"
    };
    writeln!(out, "jina api key: {key}")?;
    if state.settings.model_configs.is_empty() {
        writeln!(out, "models: none")?;
    }
    for model in &state.settings.model_configs {
        writeln!(
            out,
            "model {}  {}  paste delay {} ms",
            model.name, model.url, model.paste_delay_ms
        )?;
    }
    Ok(())
}
