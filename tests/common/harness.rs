//! Mock collaborators and an engine harness driven by an injected event
//! channel instead of the OS watcher.

#![allow(dead_code)] // not every suite touches every helper

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use asmlens::config::AppConfig;
use asmlens::demangle::Demangler;
use asmlens::engine::{Engine, EngineOptions, Snapshot};
use asmlens::toolchain::{CompileOutput, ToolError, Toolchain};
use asmlens::watcher::WatchEvent;

pub fn ok_output(assembly: &str) -> CompileOutput {
    CompileOutput {
        assembly: assembly.to_string(),
        diagnostics: String::new(),
        success: true,
    }
}

pub fn failed_output(diagnostics: &str) -> CompileOutput {
    CompileOutput {
        assembly: String::new(),
        diagnostics: diagnostics.to_string(),
        success: false,
    }
}

/// One scripted compiler response: wait, then answer.
pub struct ScriptedCompile {
    pub delay: Duration,
    pub output: CompileOutput,
}

/// Toolchain whose compiles answer from a script, falling back to a default
/// output when the script runs dry. Calls are counted.
pub struct MockToolchain {
    script: Mutex<VecDeque<ScriptedCompile>>,
    default_output: CompileOutput,
    report: String,
    calls: AtomicUsize,
}

impl MockToolchain {
    pub fn new(default_output: CompileOutput) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_output,
            report: String::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_report(mut self, report: &str) -> Self {
        self.report = report.to_string();
        self
    }

    pub fn with_scripted(self, responses: Vec<ScriptedCompile>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            *script = responses.into();
        }
        self
    }

    pub fn compile_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Toolchain for MockToolchain {
    async fn compile(&self, _source: &Path, _flags: &[String]) -> Result<CompileOutput, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match scripted {
            Some(step) => {
                tokio::time::sleep(step.delay).await;
                Ok(step.output)
            }
            None => Ok(self.default_output.clone()),
        }
    }

    async fn analyze(&self, _assembly: &str) -> Result<String, ToolError> {
        Ok(self.report.clone())
    }
}

/// Demangler answering from a fixed table; unknown names fail.
#[derive(Default)]
pub struct TableDemangler {
    entries: HashMap<String, String>,
}

impl TableDemangler {
    pub fn with(mut self, mangled: &str, demangled: &str) -> Self {
        self.entries.insert(mangled.to_string(), demangled.to_string());
        self
    }
}

#[async_trait]
impl Demangler for TableDemangler {
    async fn demangle(&self, mangled: &str) -> Option<String> {
        self.entries.get(mangled).cloned()
    }
}

/// Everything a test needs to drive the engine by hand.
pub struct EngineHarness {
    pub engine: Engine,
    pub snapshots: mpsc::Receiver<Arc<Snapshot>>,
    pub watch_tx: mpsc::Sender<WatchEvent>,
    pub source: PathBuf,
    _dir: tempfile::TempDir,
}

impl EngineHarness {
    /// Spawn an engine over a real temp source file, a mock toolchain, and
    /// an injected watch-event channel.
    pub fn spawn(toolchain: Arc<MockToolchain>, debounce: Duration) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("main.cpp");
        std::fs::write(&source, "int main() { return 0; }\n").expect("write source");

        let (watch_tx, watch_rx) = mpsc::channel(64);
        let options = EngineOptions {
            debounce,
            ..EngineOptions::default()
        };
        let (engine, snapshots) = Engine::spawn_with_watch(
            source.clone(),
            AppConfig::default(),
            toolchain,
            Arc::new(TableDemangler::default()),
            options,
            None,
            watch_rx,
        );

        Self {
            engine,
            snapshots,
            watch_tx,
            source,
            _dir: dir,
        }
    }

    pub async fn touch(&self) {
        let event = WatchEvent {
            path: self.source.clone(),
            at: std::time::SystemTime::now(),
        };
        self.watch_tx.send(event).await.expect("watch channel open");
    }

    pub async fn next_snapshot(&mut self) -> Arc<Snapshot> {
        tokio::time::timeout(Duration::from_secs(5), self.snapshots.recv())
            .await
            .expect("snapshot within deadline")
            .expect("engine alive")
    }
}
