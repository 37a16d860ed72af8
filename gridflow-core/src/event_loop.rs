// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! A single-worker event loop that serializes processing of asynchronous
//! notifications (metadata updates, discovery events, ...) so that a
//! consumer never has to reason about interleaved callbacks from multiple
//! threads.

use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{GridflowError, Result};

/// Implemented by the single consumer of an [`EventLoop`]'s events.
///
/// `on_event` is invoked exactly once per posted event, strictly in the
/// order the events were posted. An error returned from `on_event` is
/// logged and the loop continues; it is never propagated to the poster.
#[async_trait]
pub trait EventHandler<T>: Send + Sync {
    async fn on_event(&self, event: T) -> Result<()>;

    /// Called once when the loop stops, either because `stop` was invoked
    /// or because the sender side was dropped.
    async fn on_stop(&self) {}
}

/// A cloneable handle used to post events onto an [`EventLoop`].
#[derive(Clone)]
pub struct EventSender<T> {
    name: String,
    tx: mpsc::Sender<T>,
}

impl<T: Send + 'static> EventSender<T> {
    pub async fn post_event(&self, event: T) -> Result<()> {
        self.tx.send(event).await.map_err(|_| {
            GridflowError::EventLoopStopped(self.name.clone())
        })
    }
}

enum LoopState<T> {
    NotStarted(mpsc::Receiver<T>),
    Running {
        join: JoinHandle<()>,
        stop_tx: oneshot::Sender<()>,
    },
    Stopped,
}

/// A named, single-threaded worker that drains a bounded mpsc channel and
/// hands each event to an [`EventHandler`].
pub struct EventLoop<T> {
    name: String,
    buffer_size: usize,
    sender: EventSender<T>,
    handler: Arc<dyn EventHandler<T>>,
    state: LoopState<T>,
}

impl<T: Send + 'static> EventLoop<T> {
    pub fn new(
        name: String,
        buffer_size: usize,
        handler: Arc<dyn EventHandler<T>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        let sender = EventSender {
            name: name.clone(),
            tx,
        };
        Self {
            name,
            buffer_size,
            sender,
            handler,
            state: LoopState::NotStarted(rx),
        }
    }

    pub fn get_sender(&self) -> Result<EventSender<T>> {
        match self.state {
            LoopState::Stopped => {
                Err(GridflowError::EventLoopStopped(self.name.clone()))
            }
            _ => Ok(self.sender.clone()),
        }
    }

    /// Spawn the worker task. Calling this more than once is a no-op other
    /// than returning the already-running state.
    pub fn start(&mut self) -> Result<()> {
        let rx = match std::mem::replace(&mut self.state, LoopState::Stopped) {
            LoopState::NotStarted(rx) => rx,
            other @ LoopState::Running { .. } => {
                self.state = other;
                return Ok(());
            }
            LoopState::Stopped => {
                return Err(GridflowError::EventLoopNotStarted(self.name.clone()));
            }
        };

        let name = self.name.clone();
        let handler = self.handler.clone();
        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::task::spawn(Self::run(name, rx, handler, stop_rx));
        self.state = LoopState::Running { join, stop_tx };
        Ok(())
    }

    async fn run(
        name: String,
        mut rx: mpsc::Receiver<T>,
        handler: Arc<dyn EventHandler<T>>,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        info!("Event loop {name} started");
        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                event = rx.recv() => {
                    match event {
                        Some(event) => {
                            if let Err(e) = handler.on_event(event).await {
                                warn!("Event loop {name} handler error: {e}");
                            }
                        }
                        None => break,
                    }
                }
            }
        }
        handler.on_stop().await;
        info!("Event loop {name} stopped");
    }

    /// Stop accepting new events and wait for in-flight processing to
    /// drain. Further calls to `get_sender` will fail.
    pub async fn stop(&mut self) {
        match std::mem::replace(&mut self.state, LoopState::Stopped) {
            LoopState::Running { join, stop_tx } => {
                let _ = stop_tx.send(());
                if let Err(e) = join.await {
                    error!("Event loop {} panicked: {e}", self.name);
                }
            }
            _ => {}
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use parking_lot::Mutex;

    struct CollectingHandler {
        seen: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl EventHandler<u32> for CollectingHandler {
        async fn on_event(&self, event: u32) -> Result<()> {
            self.seen.lock().push(event);
            Ok(())
        }
    }

    #[tokio::test]
    async fn events_are_processed_in_order() {
        let handler = Arc::new(CollectingHandler {
            seen: Mutex::new(vec![]),
        });
        let mut event_loop = EventLoop::new("test".to_owned(), 16, handler.clone());
        event_loop.start().unwrap();

        let sender = event_loop.get_sender().unwrap();
        for i in 0..10 {
            sender.post_event(i).await.unwrap();
        }

        // give the worker a chance to drain
        for _ in 0..50 {
            if handler.seen.lock().len() == 10 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        assert_eq!(*handler.seen.lock(), (0..10).collect::<Vec<_>>());

        event_loop.stop().await;
    }

    #[tokio::test]
    async fn post_after_stop_fails() {
        let handler = Arc::new(CollectingHandler {
            seen: Mutex::new(vec![]),
        });
        let mut event_loop = EventLoop::new("test".to_owned(), 4, handler);
        event_loop.start().unwrap();
        let sender = event_loop.get_sender().unwrap();
        event_loop.stop().await;

        assert!(sender.post_event(1).await.is_err());
        assert!(event_loop.get_sender().is_err());
    }
}
