// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 阻塞队列 (Blocking transfer queue)
///
/// 多生产者/多消费者, `pop` 阻塞等待直到有数据或被停止.
/// 停止后仍接受 `push`, `pop` 会先取完剩余数据再返回 `None`.
use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

struct State<T> {
    items: VecDeque<T>,
    stopped: bool,
}

pub struct BlockingQueue<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

impl<T> BlockingQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                stopped: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// 追加到队尾并唤醒一个等待者
    pub fn push(&self, item: T) {
        self.state.lock().items.push_back(item);
        self.ready.notify_one();
    }

    /// 取出队首; 队列为空且已停止时返回 `None`
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.stopped {
                return None;
            }
            self.ready.wait(&mut state);
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// 设置停止标志并唤醒所有等待者 (幂等)
    pub fn stop(&self) {
        self.state.lock().stopped = true;
        self.ready.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// 丢弃全部内容, 返回丢弃数量
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let n = state.items.len();
        state.items.clear();
        n
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for BlockingQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BlockingQueue")
            .field("len", &state.items.len())
            .field("stopped", &state.stopped)
            .finish()
    }
}
