//! 文件监视器
//!
//! 订阅覆盖工件 include 通配符与仓库位置的最小根目录集合，
//! 投递 `(路径, 种类)` 回调。同一路径的连续事件在去抖窗口
//! （约 300 ms）内合并，只处理最新内容。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use crate::error::{JitError, JitResult};

/// 去抖窗口
pub const DEBOUNCE_INTERVAL: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Create,
    Modify,
    Delete,
    Rename,
}

#[derive(Debug, Clone)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

fn classify(kind: &EventKind) -> Option<FileEventKind> {
    match kind {
        EventKind::Create(_) => Some(FileEventKind::Create),
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => Some(FileEventKind::Rename),
        EventKind::Modify(_) => Some(FileEventKind::Modify),
        EventKind::Remove(_) => Some(FileEventKind::Delete),
        _ => None,
    }
}

/// 活动的监视会话；丢弃即停止
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    stop: Arc<AtomicBool>,
    flush_thread: Option<std::thread::JoinHandle<()>>,
}

impl FileWatcher {
    /// 监视给定根目录，按去抖窗口投递合并后的事件
    pub fn watch(
        directories: &[PathBuf],
        callback: impl Fn(FileEvent) + Send + 'static,
    ) -> JitResult<Self> {
        let pending: Arc<Mutex<HashMap<PathBuf, (Instant, FileEventKind)>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let pending_for_events = Arc::clone(&pending);
        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| {
                let Ok(event) = result else {
                    return;
                };
                let Some(kind) = classify(&event.kind) else {
                    return;
                };
                let now = Instant::now();
                let mut pending = pending_for_events.lock();
                for path in event.paths {
                    // 同一路径的后续事件刷新时间戳：最新内容胜出
                    pending.insert(path, (now, kind));
                }
            },
            notify::Config::default(),
        )
        .map_err(|error| JitError::Watch(error.to_string()))?;

        for directory in directories {
            watcher
                .watch(directory, RecursiveMode::Recursive)
                .map_err(|error| JitError::Watch(error.to_string()))?;
            tracing::debug!(directory = %directory.display(), "Watching directory");
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);
        let pending_for_thread = Arc::clone(&pending);

        let flush_thread = std::thread::Builder::new()
            .name("hlang-watch-debounce".to_string())
            .spawn(move || {
                while !stop_for_thread.load(Ordering::Relaxed) {
                    std::thread::sleep(Duration::from_millis(50));

                    let now = Instant::now();
                    let ready: Vec<FileEvent> = {
                        let mut pending = pending_for_thread.lock();
                        let ready_paths: Vec<PathBuf> = pending
                            .iter()
                            .filter(|(_, (instant, _))| {
                                now.duration_since(*instant) >= DEBOUNCE_INTERVAL
                            })
                            .map(|(path, _)| path.clone())
                            .collect();
                        ready_paths
                            .into_iter()
                            .filter_map(|path| {
                                pending
                                    .remove(&path)
                                    .map(|(_, kind)| FileEvent { path, kind })
                            })
                            .collect()
                    };

                    for event in ready {
                        callback(event);
                    }
                }
            })
            .map_err(|error| JitError::Watch(error.to_string()))?;

        Ok(Self {
            _watcher: watcher,
            stop,
            flush_thread: Some(flush_thread),
        })
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.flush_thread.take() {
            let _ = thread.join();
        }
    }
}
