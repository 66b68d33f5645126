//! The checker driver.
//!
//! Owns the virtual source store and the ambient caches, runs full check
//! passes against the current store state, and in watch mode folds
//! file-system events into debounced rechecks. Everything runs on one
//! task: watch callbacks only feed a channel, so the pass body never
//! races a store mutation.

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use kiln_source::path::{join_normalized, normalize};
use kiln_source::{ParseSettings, SourceUnit, StoreError, VirtualSourceStore};
use notify::{EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{self, ConfigError, ProjectConfig};
use crate::diagnostic::{render_diagnostics, Diagnostic};
use crate::host::{AmbientCache, StoreHost};
use crate::program::Program;
use crate::resolve::Resolver;

/// Quiet period after the last relevant event before a recheck runs.
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(300);

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),
}

/// Setup input for a [`CheckerTool`].
#[derive(Debug, Clone)]
pub struct CheckerOptions {
    /// Project root directory (absolute).
    pub project_root: PathBuf,
    /// Program entry point, absolute or root-relative.
    pub entry: PathBuf,
    /// Project config path; defaults to `<root>/tsconfig.json`.
    pub config_path: Option<PathBuf>,
    /// Glob patterns for exotic component sources, root-relative or
    /// absolute.
    pub exotic_globs: Vec<String>,
}

/// Result of one check pass.
#[derive(Debug)]
pub struct CheckSummary {
    pub diagnostics: Vec<Diagnostic>,
    pub error_count: usize,
    /// Non-declaration files the pass walked.
    pub checked_file_count: usize,
    pub duration: Duration,
    /// Store revision the pass observed at start; compare against the
    /// store's current revision to detect whether it is already stale.
    pub store_revision: u64,
}

impl CheckSummary {
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }
}

/// Explicit debounce state: a deadline that every relevant event pushes
/// out by the window, cleared when the recheck runs.
#[derive(Debug)]
struct Debounce {
    window: Duration,
    deadline: Option<tokio::time::Instant>,
}

impl Debounce {
    fn new(window: Duration) -> Debounce {
        Debounce { window, deadline: None }
    }

    fn arm(&mut self) {
        self.deadline = Some(tokio::time::Instant::now() + self.window);
    }

    fn clear(&mut self) {
        self.deadline = None;
    }

    fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    fn deadline(&self) -> Option<tokio::time::Instant> {
        self.deadline
    }
}

/// Incremental static checker for one project.
pub struct CheckerTool {
    project_root: PathBuf,
    config: ProjectConfig,
    settings: ParseSettings,
    resolver: Resolver,
    store: VirtualSourceStore,
    ambient: AmbientCache,
    on_errors_found: Option<Box<dyn Fn(usize)>>,
    passes: Cell<u64>,
}

impl CheckerTool {
    /// Load the project config and populate the store. Must complete
    /// before the first check pass.
    pub async fn setup(options: CheckerOptions) -> Result<CheckerTool, CheckError> {
        let project_root = normalize(&options.project_root);
        let config_path = options
            .config_path
            .clone()
            .unwrap_or_else(|| project_root.join("tsconfig.json"));

        let config = if config_path.is_file() {
            config::load_project_config(&config_path)?
        } else {
            debug!("no project config at {}, using defaults", config_path.display());
            ProjectConfig::default()
        };

        let settings = config.compiler_options.parse_settings();
        let resolver = Resolver::new(&project_root, &config.compiler_options);
        let mut store = VirtualSourceStore::new(settings);

        store.include_file(&resolve_against(&project_root, &options.entry));
        let declarations: Vec<PathBuf> = config
            .declaration_files()
            .map(|file| join_normalized(&project_root, file))
            .collect();
        store.include_files(&declarations);

        let exotic_globs: Vec<String> = options
            .exotic_globs
            .iter()
            .map(|pattern| absolutize_pattern(&project_root, pattern))
            .collect();
        store.add_exotic_sources(&exotic_globs).await?;
        store.preload_sources().await?;
        info!("tracking {} source files", store.tracked_len());

        Ok(CheckerTool {
            project_root,
            config,
            settings,
            resolver,
            store,
            ambient: AmbientCache::new(),
            on_errors_found: None,
            passes: Cell::new(0),
        })
    }

    /// Register a hook fired with the diagnostic count whenever a pass
    /// finds errors (a caller's notification layer).
    pub fn on_errors_found(&mut self, hook: impl Fn(usize) + 'static) {
        self.on_errors_found = Some(Box::new(hook));
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// The loaded project configuration, compiler options included.
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn store(&self) -> &VirtualSourceStore {
        &self.store
    }

    /// Number of completed check passes (including failed ones).
    pub fn passes_run(&self) -> u64 {
        self.passes.get()
    }

    /// Run one full check pass against the current store state.
    ///
    /// Builds a program from the entry paths, walks every
    /// non-declaration unit collecting syntactic then semantic
    /// diagnostics, and folds in resolution and transform failures. The
    /// body is fully synchronous; the store cannot change under it.
    pub fn type_check(&self) -> Result<CheckSummary, CheckError> {
        let start = Instant::now();
        let store_revision = self.store.revision();

        let host = StoreHost::new(&self.store, &self.ambient, self.settings);
        let roots = self.store.entry_file_paths();
        let program = Program::create(&roots, &self.resolver, &host);

        let mut diagnostics: Vec<Diagnostic> = Vec::new();

        for root in program.missing_roots() {
            let file = self.store.get_real_file_path(root);
            diagnostics.push(Diagnostic::error(
                "missing-entry",
                file,
                1,
                1,
                "entry file could not be read",
            ));
        }

        for (real_path, reason) in self.store.failed_transforms() {
            diagnostics.push(Diagnostic::error("transform", real_path.to_path_buf(), 1, 1, reason));
        }

        for unit in program.source_files() {
            if unit.is_declaration() {
                continue;
            }
            for item in unit.syntactic_diagnostics() {
                diagnostics.push(self.positioned(unit, item.start, "parse", &item.message));
            }
            for item in unit.semantic_diagnostics() {
                diagnostics.push(self.positioned(unit, item.start, "semantic", &item.message));
            }
        }

        for failure in program.resolution_errors() {
            let (line, column) = self.map_position(&failure.importer, failure.line, failure.column);
            diagnostics.push(Diagnostic::error(
                "module-not-found",
                self.store.get_real_file_path(&failure.importer),
                line,
                column,
                format!("Cannot find module '{}'", failure.specifier),
            ));
        }

        let error_count = diagnostics.len();
        if error_count > 0 {
            if let Some(hook) = &self.on_errors_found {
                hook(error_count);
            }
        }
        self.passes.set(self.passes.get() + 1);

        Ok(CheckSummary {
            diagnostics,
            error_count,
            checked_file_count: program.checked_file_count(),
            duration: start.elapsed(),
            store_revision,
        })
    }

    /// Print a pass result in console form.
    pub fn report(&self, summary: &CheckSummary) {
        if !summary.diagnostics.is_empty() {
            print!("{}", render_diagnostics(&summary.diagnostics));
        }

        let status = if summary.has_errors() { "\x1b[31m✗\x1b[0m" } else { "\x1b[32m✓\x1b[0m" };
        println!(
            "\n{} Type checked {} files in {:.2?}",
            status, summary.checked_file_count, summary.duration
        );
        if summary.has_errors() {
            println!("  \x1b[31m{} error(s)\x1b[0m", summary.error_count);
        } else {
            println!("  \x1b[32mTypes OK: no errors found\x1b[0m");
        }
    }

    /// Watch the given globs and recheck on changes. Runs until the
    /// watcher channel closes.
    pub async fn watch(&mut self, globs: &[String]) -> Result<(), CheckError> {
        let globs: Vec<String> =
            globs.iter().map(|pattern| absolutize_pattern(&self.project_root, pattern)).collect();
        let patterns = compile_patterns(&globs)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(
            move |result: Result<notify::Event, notify::Error>| match result {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(error) => warn!("watch error: {error}"),
            },
        )?;

        for root in watch_roots(&globs) {
            if root.is_dir() {
                watcher.watch(&root, RecursiveMode::Recursive)?;
            }
        }
        info!("watching for file changes");

        self.run_event_loop(rx, &patterns).await;
        Ok(())
    }

    /// The driver's select loop. Events, the debounce deadline, and
    /// check passes all run as discrete turns of this single task; at
    /// most one pass is ever in flight.
    async fn run_event_loop(
        &mut self,
        mut rx: mpsc::UnboundedReceiver<notify::Event>,
        patterns: &[glob::Pattern],
    ) {
        let mut debounce = Debounce::new(DEBOUNCE_WINDOW);

        loop {
            let received = match debounce.deadline() {
                Some(deadline) => tokio::select! {
                    event = rx.recv() => Some(event),
                    _ = tokio::time::sleep_until(deadline) => None,
                },
                None => Some(rx.recv().await),
            };

            match received {
                Some(Some(event)) => self.absorb_event(&event, patterns, &mut debounce).await,
                Some(None) => break,
                None => {
                    debounce.clear();
                    self.run_pass();
                }
            }
        }

        // Flush a recheck that was still pending at shutdown.
        if debounce.is_armed() {
            self.run_pass();
        }
    }

    async fn absorb_event(
        &mut self,
        event: &notify::Event,
        patterns: &[glob::Pattern],
        debounce: &mut Debounce,
    ) {
        let removal = match &event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => false,
            EventKind::Remove(_) => true,
            _ => return,
        };

        for event_path in &event.paths {
            let path = normalize(event_path);
            if !patterns.iter().any(|pattern| pattern.matches_path(&path)) {
                continue;
            }

            if removal {
                if self.store.try_remove_source(&path) {
                    debug!("removing file: {}", path.display());
                    debounce.arm();
                }
                continue;
            }

            match self.store.add_or_update_source(&path).await {
                Ok(outcome) => {
                    match outcome {
                        kiln_source::UpdateOutcome::Added => {
                            debug!("tracking new file: {}", path.display());
                        }
                        kiln_source::UpdateOutcome::Changed => {
                            debug!("updating file: {}", path.display());
                        }
                        _ => {}
                    }
                    if outcome.schedules_recheck() {
                        debounce.arm();
                    }
                }
                Err(read_error) => {
                    // Atomic saves surface as a modify for a path that is
                    // already gone; treat that as the delete it is.
                    if !path.exists() && self.store.try_remove_source(&path) {
                        debug!("removing file: {}", path.display());
                        debounce.arm();
                    } else {
                        warn!("{read_error}");
                    }
                }
            }
        }
    }

    fn run_pass(&self) {
        match self.type_check() {
            Ok(summary) => self.report(&summary),
            Err(fatal) => error!("fatal error during type-checking: {fatal}"),
        }
    }

    fn positioned(
        &self,
        unit: &SourceUnit,
        offset: u32,
        code: &'static str,
        message: &str,
    ) -> Diagnostic {
        let (line, column) = unit.line_col(offset);
        let (line, column) = self.map_position(unit.path(), line, column);
        Diagnostic::error(code, self.store.get_real_file_path(unit.path()), line, column, message)
    }

    /// Translate a position in virtual text back through the exotic
    /// block mapping, when there is one.
    fn map_position(&self, engine_path: &Path, line: u32, column: u32) -> (u32, u32) {
        match self.store.block_location(engine_path) {
            Some(block) => block.map_to_original(line, column),
            None => (line, column),
        }
    }
}

fn resolve_against(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        join_normalized(root, &path.to_string_lossy())
    }
}

fn absolutize_pattern(root: &Path, pattern: &str) -> String {
    if pattern.starts_with('/') {
        pattern.to_string()
    } else {
        format!("{}/{}", root.display(), pattern)
    }
}

fn compile_patterns(globs: &[String]) -> Result<Vec<glob::Pattern>, CheckError> {
    globs
        .iter()
        .map(|pattern| {
            glob::Pattern::new(pattern).map_err(|source| {
                CheckError::Store(StoreError::Pattern { pattern: pattern.clone(), source })
            })
        })
        .collect()
}

/// Directory roots to subscribe for a set of glob patterns: everything
/// before the first wildcard segment.
fn watch_roots(globs: &[String]) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = Vec::new();
    for pattern in globs {
        let base = match pattern.find('*') {
            Some(star) => match pattern[..star].rfind('/') {
                Some(sep) => &pattern[..sep],
                None => ".",
            },
            None => pattern.as_str(),
        };
        let base = PathBuf::from(base);
        if !roots.contains(&base) {
            roots.push(base);
        }
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{ModifyKind, RemoveKind};
    use std::fs;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    const GOOD_COMPONENT: &str = "<template>\n  <div/>\n</template>\n<script lang=\"ts\">\nexport const label = 'ok';\n</script>\n";

    async fn checker_for(dir: &TempDir) -> CheckerTool {
        CheckerTool::setup(CheckerOptions {
            project_root: dir.path().to_path_buf(),
            entry: PathBuf::from("src/index.ts"),
            config_path: None,
            exotic_globs: vec!["src/**/*.vue".to_string()],
        })
        .await
        .unwrap()
    }

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        normalize(&path)
    }

    fn modify_event(path: &Path) -> notify::Event {
        notify::Event {
            kind: EventKind::Modify(ModifyKind::Any),
            paths: vec![path.to_path_buf()],
            attrs: notify::event::EventAttributes::default(),
        }
    }

    #[tokio::test]
    async fn test_clean_project_checks_without_errors() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/index.ts", "import { helper } from './lib';\nexport const x = helper;\n");
        write(&dir, "src/lib.ts", "export const helper = 1;\n");

        let checker = checker_for(&dir).await;
        let summary = checker.type_check().unwrap();

        assert!(!summary.has_errors());
        // The entry plus the ambiently discovered dependency.
        assert_eq!(summary.checked_file_count, 2);
    }

    #[tokio::test]
    async fn test_exotic_diagnostic_uses_real_path_and_offset_lines() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/index.ts", "import './Widget.vue';\n");
        // Script block opens on line 4; the broken statement is on
        // document line 5.
        let widget = write(
            &dir,
            "src/Widget.vue",
            "<template>\n  <div/>\n</template>\n<script lang=\"ts\">\nconst = 1;\n</script>\n",
        );

        let checker = checker_for(&dir).await;
        let summary = checker.type_check().unwrap();

        assert!(summary.has_errors());
        let parse_errors: Vec<_> =
            summary.diagnostics.iter().filter(|d| d.code == "parse").collect();
        assert!(!parse_errors.is_empty());
        for diagnostic in &parse_errors {
            assert_eq!(diagnostic.file, widget);
            assert!(
                diagnostic.line >= 4,
                "line {} not mapped through the block offset",
                diagnostic.line
            );
        }

        // Rendered output never mentions the virtual path.
        let rendered = render_diagnostics(&summary.diagnostics);
        assert!(!rendered.contains(".vue.ts"));
    }

    #[tokio::test]
    async fn test_missing_entry_is_a_diagnostic() {
        let dir = TempDir::new().unwrap();

        let checker = checker_for(&dir).await;
        let summary = checker.type_check().unwrap();

        assert!(summary.has_errors());
        assert!(summary.diagnostics.iter().any(|d| d.code == "missing-entry"));
    }

    #[tokio::test]
    async fn test_unresolvable_import_is_a_diagnostic() {
        let dir = TempDir::new().unwrap();
        let index = write(&dir, "src/index.ts", "import { gone } from './gone';\n");

        let checker = checker_for(&dir).await;
        let summary = checker.type_check().unwrap();

        assert_eq!(summary.error_count, 1);
        let diagnostic = &summary.diagnostics[0];
        assert_eq!(diagnostic.code, "module-not-found");
        assert_eq!(diagnostic.file, index);
        assert!(diagnostic.message.contains("./gone"));
    }

    #[tokio::test]
    async fn test_transform_failure_keeps_pass_alive() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/index.ts", "import './Widget.vue';\n");
        let widget = write(&dir, "src/Widget.vue", GOOD_COMPONENT);

        let mut checker = checker_for(&dir).await;
        assert!(!checker.type_check().unwrap().has_errors());

        // Break the component: unclosed script block.
        fs::write(&widget, "<script lang=\"ts\">\nexport const label = 'broken';\n").unwrap();
        let outcome = checker.store.add_or_update_source(&widget).await.unwrap();
        assert_eq!(outcome, kiln_source::UpdateOutcome::TransformFailed);

        let summary = checker.type_check().unwrap();
        // The pass completes on the stale-but-valid virtual text and
        // reports the transform failure.
        assert!(summary.diagnostics.iter().any(|d| d.code == "transform" && d.file == widget));
        assert_eq!(summary.checked_file_count, 2);
    }

    #[tokio::test]
    async fn test_error_hook_fires_with_count() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/index.ts", "import './gone';\n");

        let mut checker = checker_for(&dir).await;
        let seen = Rc::new(Cell::new(0usize));
        let seen_in_hook = Rc::clone(&seen);
        checker.on_errors_found(move |count| seen_in_hook.set(count));

        checker.type_check().unwrap();
        assert_eq!(seen.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_rearm_extends_deadline() {
        let mut debounce = Debounce::new(DEBOUNCE_WINDOW);
        assert!(!debounce.is_armed());

        debounce.arm();
        let first = debounce.deadline().unwrap();

        tokio::time::advance(Duration::from_millis(200)).await;
        debounce.arm();
        let second = debounce.deadline().unwrap();

        assert_eq!(second - first, Duration::from_millis(200));
        debounce.clear();
        assert!(!debounce.is_armed());
    }

    #[tokio::test]
    async fn test_event_burst_coalesces_into_one_pass() {
        let dir = TempDir::new().unwrap();
        let index = write(&dir, "src/index.ts", "export const x = 1;\n");

        let mut checker = checker_for(&dir).await;
        let patterns =
            compile_patterns(&[format!("{}/src/**/*.ts", dir.path().display())]).unwrap();

        let (tx, rx) = mpsc::unbounded_channel();
        fs::write(&index, "export const x = 2;\n").unwrap();
        // A burst of events inside one debounce window.
        tx.send(modify_event(&index)).unwrap();
        tx.send(modify_event(&index)).unwrap();
        tx.send(modify_event(&index)).unwrap();

        let closer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(tx);
        });

        checker.run_event_loop(rx, &patterns).await;
        closer.await.unwrap();

        assert_eq!(checker.passes_run(), 1);
        let unit = checker.store.get_source(&index).unwrap();
        assert_eq!(unit.version(), 2);
    }

    #[tokio::test]
    async fn test_remove_event_drops_record_and_schedules_pass() {
        let dir = TempDir::new().unwrap();
        let index = write(&dir, "src/index.ts", "export const x = 1;\n");
        let extra = write(&dir, "src/extra.ts", "export const y = 2;\n");

        let mut checker = checker_for(&dir).await;
        checker.store.add_or_update_source(&extra).await.unwrap();
        assert!(checker.store.get_source(&extra).is_some());

        let patterns =
            compile_patterns(&[format!("{}/src/**/*.ts", dir.path().display())]).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        fs::remove_file(&extra).unwrap();
        tx.send(notify::Event {
            kind: EventKind::Remove(RemoveKind::File),
            paths: vec![extra.to_path_buf()],
            attrs: notify::event::EventAttributes::default(),
        })
        .unwrap();
        drop(tx);

        checker.run_event_loop(rx, &patterns).await;

        assert!(checker.store.get_source(&extra).is_none());
        assert!(checker.store.get_source(&index).is_some());
        // The flush at shutdown ran the pending pass.
        assert_eq!(checker.passes_run(), 1);
    }

    #[tokio::test]
    async fn test_hook_not_used_on_clean_pass() {
        let dir = TempDir::new().unwrap();
        write(&dir, "src/index.ts", "export const x = 1;\n");

        let mut checker = checker_for(&dir).await;
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in_hook = Arc::clone(&fired);
        checker.on_errors_found(move |_| {
            fired_in_hook.fetch_add(1, Ordering::SeqCst);
        });

        checker.type_check().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
