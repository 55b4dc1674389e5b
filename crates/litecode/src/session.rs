//! One editing session: the open documents, the language table, the run
//! worker and the preview server, passed explicitly to whoever drives them.

use langcore::{classify_with, FoldChange, HighlightMode, HighlightSpan, Language, LanguageRegistry};
use live_preview::PreviewServer;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::document::{DiscardPrompt, DocumentId, DocumentStore};
use crate::error::{EngineError, Result};
use crate::execution::{debug_trace, EngineEvent, ExecutionEngine, RunId, RunRequest};
use crate::session_state::SessionState;
use crate::workspace::{self, FindReport, TreeEntry};

/// What a run request turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunDispatch {
    Process(RunId),
    Preview { run: RunId, url: String },
}

impl RunDispatch {
    pub fn run(&self) -> RunId {
        match self {
            RunDispatch::Process(run) | RunDispatch::Preview { run, .. } => *run,
        }
    }
}

pub struct Session {
    config: Config,
    registry: LanguageRegistry,
    documents: DocumentStore,
    engine: ExecutionEngine,
    preview: PreviewServer,
    root: PathBuf,
}

impl Session {
    /// Build a session rooted at `root`. Engine events arrive on the returned
    /// receiver and must be applied by the owner of display state.
    pub fn new(
        config: Config,
        registry: LanguageRegistry,
        root: PathBuf,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        // Document paths are canonical, so the root must be too.
        let root = root.canonicalize().unwrap_or(root);
        let (engine, events) = ExecutionEngine::channel();
        let session = Self {
            config,
            registry,
            documents: DocumentStore::new(),
            engine,
            preview: PreviewServer::new(),
            root,
        };
        (session, events)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn documents_mut(&mut self) -> &mut DocumentStore {
        &mut self.documents
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn preview(&self) -> &PreviewServer {
        &self.preview
    }

    pub fn language_of(&self, id: DocumentId) -> Result<&Language> {
        let document = self.documents.get(id)?;
        Ok(self.registry.lookup_by_name(document.language()))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn open_folder(&mut self, dir: &Path) -> Result<()> {
        let dir = self.resolve(dir);
        if !dir.is_dir() {
            return Err(EngineError::NotADirectory(dir));
        }
        self.root = dir.canonicalize().unwrap_or(dir);
        log::info!("Opened folder {}", self.root.display());
        Ok(())
    }

    pub fn new_document(&mut self) -> DocumentId {
        let language = self
            .registry
            .lookup_by_name(&self.config.editor.default_language);
        self.documents.create(language)
    }

    /// Open `path`, relative paths resolving against the root.
    pub fn open(&mut self, path: &Path) -> Result<DocumentId> {
        let path = self.resolve(path);
        let language = self.registry.for_path(&path);
        self.documents.open_from_path(&path, language)
    }

    pub fn set_active(&mut self, id: DocumentId) -> Result<()> {
        self.documents.set_active(id)
    }

    pub fn edit(&mut self, id: DocumentId, text: &str) -> Result<()> {
        self.documents.update_content(id, text)
    }

    pub fn highlight(&self, id: DocumentId, mode: HighlightMode) -> Result<Vec<HighlightSpan>> {
        let document = self.documents.get(id)?;
        let language = self.registry.lookup_by_name(document.language());
        Ok(classify_with(mode, &document.text(), language))
    }

    pub fn toggle_fold(&mut self, id: DocumentId, line: usize) -> Result<FoldChange> {
        self.documents.toggle_fold(id, line)
    }

    pub fn toggle_breakpoint(&mut self, id: DocumentId, line: usize) -> Result<bool> {
        self.documents.toggle_breakpoint(id, line)
    }

    /// Boilerplate expansion, for documents in the markup language only.
    pub fn expand_boilerplate(&mut self, id: DocumentId, line: usize) -> Result<bool> {
        if !self.language_of(id)?.is_markup() {
            return Ok(false);
        }
        self.documents.expand_html_boilerplate(id, line)
    }

    pub fn set_language(&mut self, id: DocumentId, name: &str) -> Result<Option<PathBuf>> {
        let language = self
            .registry
            .get(name)
            .ok_or_else(|| EngineError::UnknownLanguage(name.to_string()))?;
        let renamed = self.documents.set_language(id, language)?;
        if let Some(path) = &renamed {
            self.preview.notify_document_saved(path, language.is_markup());
        }
        Ok(renamed)
    }

    pub fn save(&mut self, id: DocumentId) -> Result<PathBuf> {
        let path = self.documents.save(id)?;
        self.after_save(id, &path);
        Ok(path)
    }

    pub fn save_as(&mut self, id: DocumentId, path: &Path) -> Result<PathBuf> {
        let path = self.resolve(path);
        let path = self.documents.save_as(id, &path)?;
        self.after_save(id, &path);
        Ok(path)
    }

    fn after_save(&self, id: DocumentId, path: &Path) {
        let is_markup = self.language_of(id).is_ok_and(Language::is_markup);
        self.preview.notify_document_saved(path, is_markup);
    }

    /// Periodic save of every dirty document with a path, when enabled.
    pub fn autosave(&mut self) -> Vec<(DocumentId, EngineError)> {
        if !self.config.editor.autosave {
            return Vec::new();
        }
        self.documents.autosave()
    }

    /// Persisted path of `id`, saving pending edits first.
    fn persisted_path(&mut self, id: DocumentId) -> Result<PathBuf> {
        let document = self.documents.get(id)?;
        if document.path().is_none() {
            return Err(EngineError::NoPath(id));
        }
        if document.is_dirty() {
            return self.save(id);
        }
        document.path().map(Path::to_path_buf).ok_or(EngineError::NoPath(id))
    }

    /// Run `id` with its language's runner, or serve it when it is markup.
    pub async fn run(&mut self, id: DocumentId) -> Result<RunDispatch> {
        let path = self.persisted_path(id)?;
        let language = self.language_of(id)?;

        if language.is_markup() {
            let url = self.start_preview(id).await?;
            let run = self
                .engine
                .report(id, "preview", &[format!("Live server running at {}", url)]);
            return Ok(RunDispatch::Preview { run, url });
        }

        let runner = language
            .runner()
            .ok_or_else(|| EngineError::NotExecutable(language.name().to_string()))?;
        let request = RunRequest::from_template(runner, &path, self.config.run_timeout());
        log::info!("Running {} with `{}`", path.display(), request.command_line());
        Ok(RunDispatch::Process(self.engine.spawn(id, request)))
    }

    /// Report the breakpoints of `id` through the output channel.
    pub fn debug(&mut self, id: DocumentId) -> Result<RunId> {
        self.persisted_path(id)?;
        let language = self.language_of(id)?;
        if language.is_markup() {
            return Err(EngineError::NotExecutable(language.name().to_string()));
        }
        let trace = debug_trace(self.documents.get(id)?.breakpoints());
        Ok(self.engine.report(id, "debug", &trace))
    }

    pub fn cancel_run(&mut self) -> bool {
        self.engine.cancel()
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    /// Serve the folder holding markup document `id` and return its URL.
    pub async fn start_preview(&mut self, id: DocumentId) -> Result<String> {
        let language = self.language_of(id)?;
        if !language.is_markup() {
            return Err(EngineError::NotMarkup(language.name().to_string()));
        }
        let path = self.persisted_path(id)?;

        let root = if path.starts_with(&self.root) {
            self.root.clone()
        } else {
            path.parent().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone())
        };
        let url = self
            .preview
            .start(&root, self.config.preview.port, Some(&path))
            .await?;
        Ok(url)
    }

    pub async fn stop_preview(&mut self) {
        self.preview.stop().await;
    }

    pub fn find_in_files(&self, term: &str) -> FindReport {
        workspace::find_in_files(&self.root, term)
    }

    pub fn tree(&self) -> Result<Vec<TreeEntry>> {
        workspace::list_tree(&self.root)
    }

    pub fn close(&mut self, id: DocumentId, prompt: &mut dyn DiscardPrompt) -> Result<()> {
        self.documents.close(id, prompt)
    }

    pub fn close_all(&mut self, prompt: &mut dyn DiscardPrompt) -> Result<()> {
        self.documents.close_all(prompt)
    }

    pub fn state(&self) -> SessionState {
        SessionState::new(&self.root, self.documents.active().and_then(|d| d.path()))
    }

    /// Re-open the last folder and file when they still exist.
    pub fn restore(&mut self, state: &SessionState) -> Option<DocumentId> {
        if let Some(folder) = state.folder().filter(|f| f.is_dir()) {
            if let Err(e) = self.open_folder(folder) {
                log::warn!("Could not restore folder {}: {}", folder.display(), e);
            }
        }
        let file = state.file().filter(|f| f.is_file())?;
        match self.open(file) {
            Ok(id) => Some(id),
            Err(e) => {
                log::warn!("Could not restore {}: {}", file.display(), e);
                None
            }
        }
    }

    /// Ask about every unsaved document, then stop the workers and persist
    /// the session state. Any declined discard aborts the teardown.
    pub async fn shutdown(
        &mut self,
        prompt: &mut dyn DiscardPrompt,
        state_path: Option<&Path>,
    ) -> Result<()> {
        for document in self.documents.unsaved() {
            if !prompt.confirm_discard(document) {
                return Err(EngineError::DiscardDeclined(document.display_name()));
            }
        }

        self.engine.cancel();
        self.preview.stop().await;
        if let Some(path) = state_path {
            self.state().save(path).await?;
        }
        log::info!("Session closed");
        Ok(())
    }
}
