//! 进度总线：进程内发布 / 订阅 `{progress, status, label, details}`
//!
//! - 订阅时立即回放当前状态（订阅者永远看不到空白首帧）
//! - 发布时先快照订阅者集合、释放锁，再逐个回调；回调内再次 publish / subscribe 不会破坏集合
//! - 单个回调 panic 只记录日志，不影响其他订阅者
//!
//! 加载任务跑在多线程运行时上，两个角色可能同时发布。每帧在写入当前状态的同一临界区内
//! 分配递增序号；每个订阅者只接收比已投递序号更新的帧。回调执行期间到达的新帧暂存为
//! 待投递帧（只保留最新一帧），回调返回后由同一线程补投，因此订阅者最后看到的总是最新状态。
//!
//! 当前状态同时写入 `watch` 通道，供异步 UI 端用 `watch()` 消费。

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::watch;

/// 总线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// 单帧进度
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressState {
    /// 0-100
    pub progress: f32,
    pub status: ProgressStatus,
    pub label: String,
    pub details: Option<String>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            progress: 0.0,
            status: ProgressStatus::Idle,
            label: String::new(),
            details: None,
        }
    }
}

type Callback = Arc<dyn Fn(&ProgressState) + Send + Sync>;

/// 单个订阅者的投递状态
#[derive(Default)]
struct Mailbox {
    delivered: Option<u64>,
    busy: bool,
    pending: Option<(u64, ProgressState)>,
}

struct Subscriber {
    id: u64,
    callback: Callback,
    mailbox: Mutex<Mailbox>,
}

impl Subscriber {
    fn new(id: u64, callback: Callback) -> Self {
        Self {
            id,
            callback,
            mailbox: Mutex::new(Mailbox::default()),
        }
    }

    fn mailbox(&self) -> MutexGuard<'_, Mailbox> {
        // 回调从不在持锁时执行，锁不会因回调 panic 中毒
        self.mailbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 投递序号为 `seq` 的帧；过期帧丢弃，正在回调时只暂存
    fn offer(&self, seq: u64, state: &ProgressState) {
        let mut frame = {
            let mut mb = self.mailbox();
            if mb.delivered.is_some_and(|d| seq <= d) {
                return;
            }
            if mb.busy {
                if mb.pending.as_ref().map_or(true, |(p, _)| seq > *p) {
                    mb.pending = Some((seq, state.clone()));
                }
                return;
            }
            mb.busy = true;
            mb.delivered = Some(seq);
            state.clone()
        };

        loop {
            deliver(self.id, &self.callback, &frame);
            let mut mb = self.mailbox();
            match mb.pending.take() {
                Some((next_seq, next)) if mb.delivered.map_or(true, |d| next_seq > d) => {
                    mb.delivered = Some(next_seq);
                    frame = next;
                }
                _ => {
                    mb.busy = false;
                    return;
                }
            }
        }
    }
}

struct BusInner {
    subscribers: Mutex<BTreeMap<u64, Arc<Subscriber>>>,
    next_id: AtomicU64,
    /// 最新帧序号；与 `current` 的写入在同一把锁内完成
    sequence: Mutex<u64>,
    current: watch::Sender<ProgressState>,
}

/// 进度总线句柄（Clone 共享同一条总线）
#[derive(Clone)]
pub struct ProgressBus {
    inner: Arc<BusInner>,
}

/// subscribe 返回的退订句柄
#[must_use = "dropping the Subscription keeps the callback registered; call unsubscribe() to remove it"]
pub struct Subscription {
    id: u64,
    bus: std::sync::Weak<BusInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.bus.upgrade() {
            if let Ok(mut subs) = inner.subscribers.lock() {
                subs.remove(&self.id);
            }
        }
    }
}

impl ProgressBus {
    pub fn new() -> Self {
        let (current, _) = watch::channel(ProgressState::default());
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(0),
                sequence: Mutex::new(0),
                current,
            }),
        }
    }

    /// 注册回调并立即回放当前状态
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ProgressState) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Arc::new(Subscriber::new(id, Arc::new(callback)));
        if let Ok(mut subs) = self.inner.subscribers.lock() {
            subs.insert(id, Arc::clone(&subscriber));
        }
        // 先注册再读快照：并发发布的新帧要么被回放，要么序号更大而使回放被丢弃
        let (seq, snapshot) = self.latest();
        subscriber.offer(seq, &snapshot);
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// 异步消费端：watch 接收器，初值即当前状态
    pub fn watch(&self) -> watch::Receiver<ProgressState> {
        self.inner.current.subscribe()
    }

    pub fn current(&self) -> ProgressState {
        self.inner.current.borrow().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().map(|s| s.len()).unwrap_or(0)
    }

    fn latest(&self) -> (u64, ProgressState) {
        let seq = self.inner.sequence.lock().unwrap_or_else(PoisonError::into_inner);
        (*seq, self.inner.current.borrow().clone())
    }

    /// 覆盖当前状态并扇出给所有订阅者
    pub fn publish(&self, state: ProgressState) {
        let seq = {
            let mut seq = self.inner.sequence.lock().unwrap_or_else(PoisonError::into_inner);
            *seq += 1;
            self.inner.current.send_replace(state.clone());
            *seq
        };
        let snapshot: Vec<Arc<Subscriber>> = match self.inner.subscribers.lock() {
            Ok(subs) => subs.values().cloned().collect(),
            Err(_) => return,
        };
        for subscriber in snapshot {
            subscriber.offer(seq, &state);
        }
    }

    pub fn report_progress(&self, percent: f32, label: impl Into<String>, details: Option<String>) {
        self.publish(ProgressState {
            progress: percent.clamp(0.0, 100.0),
            status: ProgressStatus::Loading,
            label: label.into(),
            details,
        });
    }

    /// 成功：进度强制 100
    pub fn report_success(&self, label: Option<String>, details: Option<String>) {
        self.publish(ProgressState {
            progress: 100.0,
            status: ProgressStatus::Success,
            label: label.unwrap_or_else(|| "Ready".to_string()),
            details,
        });
    }

    /// 失败：保留上一次的进度值
    pub fn report_error(&self, label: Option<String>, details: Option<String>) {
        let last = self.current().progress;
        self.publish(ProgressState {
            progress: last,
            status: ProgressStatus::Error,
            label: label.unwrap_or_else(|| "Error".to_string()),
            details,
        });
    }

    pub fn reset(&self) {
        self.publish(ProgressState::default());
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

fn deliver(id: u64, callback: &Callback, state: &ProgressState) {
    if catch_unwind(AssertUnwindSafe(|| callback(state))).is_err() {
        tracing::error!(subscriber = id, "Progress subscriber panicked; continuing delivery");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_subscribe_replays_current_state() {
        let bus = ProgressBus::new();
        bus.report_progress(42.0, "Loading classifier", None);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        let sub = bus.subscribe(move |s| seen_cb.lock().unwrap().push(s.clone()));

        let frames = seen.lock().unwrap().clone();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].progress, 42.0);
        assert_eq!(frames[0].status, ProgressStatus::Loading);
        sub.unsubscribe();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_fresh_bus_replays_idle_frame() {
        let bus = ProgressBus::new();
        let status = Arc::new(Mutex::new(None));
        let status_cb = status.clone();
        let _sub = bus.subscribe(move |s| *status_cb.lock().unwrap() = Some(s.status));
        assert_eq!(*status.lock().unwrap(), Some(ProgressStatus::Idle));
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_others() {
        let bus = ProgressBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let _bad = bus.subscribe(|s| {
            if s.status == ProgressStatus::Loading {
                panic!("subscriber failure");
            }
        });
        let count_cb = count.clone();
        let _good = bus.subscribe(move |_| {
            count_cb.fetch_add(1, Ordering::SeqCst);
        });

        bus.report_progress(10.0, "step", None);
        // 回放 1 次 + 发布 1 次
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_error_preserves_progress_and_success_forces_100() {
        let bus = ProgressBus::new();
        bus.report_progress(63.0, "Loading generator", None);
        bus.report_error(None, Some("Failed to fetch".into()));
        let s = bus.current();
        assert_eq!(s.progress, 63.0);
        assert_eq!(s.status, ProgressStatus::Error);

        bus.report_success(Some("Models ready".into()), None);
        assert_eq!(bus.current().progress, 100.0);
    }

    #[test]
    fn test_reentrant_publish_and_subscribe() {
        let bus = ProgressBus::new();
        let inner_bus = bus.clone();
        let late = Arc::new(AtomicUsize::new(0));
        let late_cb = late.clone();
        let _sub = bus.subscribe(move |s| {
            if s.label == "trigger" {
                let late_inner = late_cb.clone();
                let sub = inner_bus.subscribe(move |_| {
                    late_inner.fetch_add(1, Ordering::SeqCst);
                });
                inner_bus.report_progress(50.0, "nested", None);
                sub.unsubscribe();
            }
        });

        bus.report_progress(10.0, "trigger", None);
        // 嵌套订阅者：回放一次 + 嵌套发布一次
        assert_eq!(late.load(Ordering::SeqCst), 2);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.current().label, "nested");
    }

    #[test]
    fn test_slow_subscriber_ends_on_latest_frame() {
        let bus = ProgressBus::new();
        let last = Arc::new(Mutex::new(ProgressState::default()));
        let last_cb = last.clone();
        let _sub = bus.subscribe(move |s| {
            if s.label.starts_with("classifier") {
                std::thread::sleep(std::time::Duration::from_millis(20));
            }
            *last_cb.lock().unwrap() = s.clone();
        });

        let classifier_bus = bus.clone();
        let classifier = std::thread::spawn(move || {
            classifier_bus.report_progress(30.0, "classifier 60%", None);
        });
        std::thread::sleep(std::time::Duration::from_millis(5));
        let generator_bus = bus.clone();
        let generator = std::thread::spawn(move || {
            generator_bus.report_success(Some("generator model ready".into()), None);
        });
        classifier.join().unwrap();
        generator.join().unwrap();

        assert_eq!(*last.lock().unwrap(), bus.current());
    }

    #[test]
    fn test_concurrent_publishers_never_regress_subscriber() {
        let bus = ProgressBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        let _sub = bus.subscribe(move |s| seen_cb.lock().unwrap().push(s.clone()));

        let workers: Vec<_> = (0..4)
            .map(|t| {
                let bus = bus.clone();
                std::thread::spawn(move || {
                    for step in 0..50 {
                        bus.report_progress(step as f32, format!("worker {t}"), None);
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.last(), Some(&bus.current()));
        // 同一发布者的帧按发布顺序到达
        for t in 0..4 {
            let label = format!("worker {t}");
            let steps: Vec<f32> = seen.iter().filter(|s| s.label == label).map(|s| s.progress).collect();
            assert!(steps.windows(2).all(|w| w[0] < w[1]), "{label}: {steps:?}");
        }
    }

    #[test]
    fn test_publish_from_own_callback_is_delivered_after_return() {
        let bus = ProgressBus::new();
        let inner_bus = bus.clone();
        let labels = Arc::new(Mutex::new(Vec::new()));
        let labels_cb = labels.clone();
        let _sub = bus.subscribe(move |s| {
            labels_cb.lock().unwrap().push(s.label.clone());
            if s.label == "first" {
                inner_bus.report_progress(20.0, "second", None);
                // 回调尚未返回，新帧只暂存
                assert_eq!(labels_cb.lock().unwrap().last().map(String::as_str), Some("first"));
            }
        });

        bus.report_progress(10.0, "first", None);
        assert_eq!(*labels.lock().unwrap(), vec!["", "first", "second"]);
    }

    #[test]
    fn test_percent_is_clamped() {
        let bus = ProgressBus::new();
        bus.report_progress(140.0, "over", None);
        assert_eq!(bus.current().progress, 100.0);
    }

    #[tokio::test]
    async fn test_watch_receiver_sees_latest() {
        let bus = ProgressBus::new();
        let mut rx = bus.watch();
        bus.report_progress(20.0, "Loading", None);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().progress, 20.0);
    }
}
