//! Hot reload: filesystem events wake the loop, timestamps decide.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;

use anyhow::{bail, Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::backend::CompilerBackend;
use crate::config::WatchSettings;
use crate::shader_unit::DynamicShader;
use crate::sink::DiagnosticSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchTick {
    Idle,
    Reloaded { ok: bool },
}

pub struct ShaderWatcher<B: CompilerBackend> {
    shader: DynamicShader<B>,
    settings: WatchSettings,
    watcher: RecommendedWatcher,
    events: mpsc::Receiver<()>,
    watched_dirs: BTreeSet<PathBuf>,
}

impl<B: CompilerBackend> ShaderWatcher<B> {
    /// Watches the directories of every file the shader's last build read.
    pub fn new(shader: DynamicShader<B>, settings: WatchSettings) -> Result<Self> {
        let (watch_tx, watch_rx) = mpsc::channel::<()>();
        let watcher =
            notify::recommended_watcher(move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    if should_reload(&event) {
                        let _ = watch_tx.send(());
                    }
                }
                Err(error) => {
                    warn!("file watcher error: {error}");
                }
            })
            .context("failed to create file watcher")?;

        let mut session = Self {
            shader,
            settings,
            watcher,
            events: watch_rx,
            watched_dirs: BTreeSet::new(),
        };
        session.sync_watch_list()?;
        Ok(session)
    }

    pub fn shader(&self) -> &DynamicShader<B> {
        &self.shader
    }

    pub fn watched_dirs(&self) -> impl Iterator<Item = &Path> {
        self.watched_dirs.iter().map(PathBuf::as_path)
    }

    /// Waits for one event or one poll interval, then reloads if stale.
    pub fn tick(&mut self, sink: &mut dyn DiagnosticSink) -> Result<WatchTick> {
        match self.events.recv_timeout(self.settings.poll_interval()) {
            Ok(()) => {
                thread::sleep(self.settings.debounce());
                while self.events.try_recv().is_ok() {}
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => bail!("file watcher stopped"),
        }

        if !self.shader.was_updated() {
            return Ok(WatchTick::Idle);
        }

        let result = self.shader.reload(sink);
        self.sync_watch_list()?;
        match (&result, self.shader.entry()) {
            (Ok(()), Some(entry)) => info!(entry = %entry.display(), "reloaded shader"),
            (Ok(()), None) => {}
            (Err(error), _) => warn!("reload failed: {error}"),
        }
        Ok(WatchTick::Reloaded { ok: result.is_ok() })
    }

    pub fn run(&mut self, sink: &mut dyn DiagnosticSink) -> Result<()> {
        loop {
            self.tick(sink)?;
        }
    }

    fn sync_watch_list(&mut self) -> Result<()> {
        let wanted = self
            .shader
            .watched_files()
            .filter_map(Path::parent)
            .filter(|dir| dir.is_dir())
            .map(Path::to_path_buf)
            .collect::<BTreeSet<_>>();

        for stale in self.watched_dirs.difference(&wanted) {
            let _ = self.watcher.unwatch(stale);
            debug!(dir = %stale.display(), "stopped watching");
        }
        for dir in wanted.difference(&self.watched_dirs) {
            self.watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .with_context(|| format!("failed to watch {}", dir.display()))?;
            debug!(dir = %dir.display(), "watching");
        }

        self.watched_dirs = wanted;
        Ok(())
    }
}

fn should_reload(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_) | EventKind::Any
    )
}
