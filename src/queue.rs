//! The per-connection pipeline queue of parsed messages.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::Async;
use futures::task::{self, Task};

use error::HttpError;
use flow::FlowControl;
use message::Message;


/// FIFO of parsed messages or error sentinels
///
/// Messages are enqueued at headers-complete; an error sentinel wakes
/// every waiter. At capacity the queue pauses the transport reader,
/// dropping below capacity resumes it, so the queue never grows beyond
/// capacity + 1 (the parser stops at message boundaries while paused).
#[derive(Clone)]
pub struct Queue {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    items: VecDeque<Result<Message, HttpError>>,
    limit: usize,
    flow: FlowControl,
    holding: bool,
    task: Option<Task>,
}

impl Queue {
    pub fn new(limit: usize, flow: &FlowControl) -> Queue {
        Queue {
            inner: Arc::new(Mutex::new(Inner {
                items: VecDeque::new(),
                limit: limit,
                flow: flow.clone(),
                holding: false,
                task: None,
            })),
        }
    }
    pub fn push(&self, item: Result<Message, HttpError>) {
        let mut inner = self.inner.lock().unwrap();
        inner.items.push_back(item);
        if inner.items.len() >= inner.limit && !inner.holding {
            inner.holding = true;
            inner.flow.pause();
        }
        if let Some(ref task) = inner.task {
            task.notify();
        }
    }
    /// Take the next message, or park the current task until one
    /// arrives.
    pub fn poll_pop(&self) -> Async<Result<Message, HttpError>> {
        let mut inner = self.inner.lock().unwrap();
        match inner.items.pop_front() {
            Some(item) => {
                if inner.holding && inner.items.len() < inner.limit {
                    inner.holding = false;
                    inner.flow.resume();
                }
                Async::Ready(item)
            }
            None => {
                inner.task = Some(task::current());
                Async::NotReady
            }
        }
    }
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use futures::{Async, Future, lazy};

    use flow::FlowControl;
    use super::Queue;
    use error::HttpError;

    #[test]
    fn capacity_pauses_and_pop_resumes() {
        lazy(|| -> Result<(), ()> {
            let flow = FlowControl::new();
            let queue = Queue::new(2, &flow);
            queue.push(Err(HttpError::Closed));
            assert!(!flow.is_paused());
            queue.push(Err(HttpError::Closed));
            assert!(flow.is_paused());
            assert!(matches!(queue.poll_pop(), Async::Ready(_)));
            assert!(!flow.is_paused());
            assert!(matches!(queue.poll_pop(), Async::Ready(_)));
            assert!(matches!(queue.poll_pop(), Async::NotReady));
            Ok(())
        }).wait().unwrap();
    }
}
