// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The `runner` module.
//!
//! Owns the `"runner"` event on the `f64` bus. While started, a worker thread
//! calls it at a fixed rate with the seconds elapsed since the previous tick.
//! Other modules subscribe to the event to take part in the update loop.

use axon_sdk::prelude::*;
use parking_lot::Mutex;
use std::any::Any;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Name of the event called on every tick.
pub const RUNNER_EVENT: &str = "runner";

/// Time between two ticks.
pub const TICK_INTERVAL: Duration = Duration::from_millis(16);

struct Worker {
    stop: flume::Sender<()>,
    thread: JoinHandle<u64>,
}

#[derive(Default)]
pub struct Runner {
    context: ModuleContext,
    bus: Mutex<Option<Arc<EventBus<f64>>>>,
    worker: Mutex<Option<Worker>>,
}

impl Runner {
    /// `true` while the tick thread is running.
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    fn halt(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        let _ = worker.stop.send(());
        match worker.thread.join() {
            Ok(ticks) => log::info!("Runner stopped after {ticks} tick(s)"),
            Err(_) => log::error!("Runner tick thread panicked"),
        }
    }
}

fn tick_loop(bus: Arc<EventBus<f64>>, stop: flume::Receiver<()>) -> u64 {
    let mut ticks = 0;
    let mut last = Instant::now();
    loop {
        match stop.recv_timeout(TICK_INTERVAL) {
            Err(flume::RecvTimeoutError::Timeout) => {
                let now = Instant::now();
                bus.call(RUNNER_EVENT, now.duration_since(last).as_secs_f64());
                last = now;
                ticks += 1;
            }
            Ok(()) | Err(flume::RecvTimeoutError::Disconnected) => return ticks,
        }
    }
}

impl Module for Runner {
    fn initialize(&self, registry: &Arc<RegistryContext>) {
        self.context.bind(registry);
        let Some(bus) = self.context.bus::<f64>() else {
            return;
        };
        bus.create(RUNNER_EVENT);
        *self.bus.lock() = Some(bus);
        log::info!("Runner initialized");
    }

    fn release(&self) {
        self.halt();
        if let Some(bus) = self.bus.lock().take() {
            bus.destroy(RUNNER_EVENT);
            bus.request_delete();
        }
        log::info!("Runner released");
    }

    fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            log::warn!("Runner already started");
            return;
        }
        let Some(bus) = self.bus.lock().clone() else {
            log::error!("Runner started before initialization");
            return;
        };

        let (stop, signal) = flume::bounded(1);
        let spawned = thread::Builder::new()
            .name("axon-runner".to_string())
            .spawn(move || tick_loop(bus, signal));
        match spawned {
            Ok(thread) => {
                *worker = Some(Worker { stop, thread });
                log::info!("Runner started ({} ms per tick)", TICK_INTERVAL.as_millis());
            }
            Err(err) => log::error!("Failed to spawn the runner thread: {err}"),
        }
    }

    fn stop(&self) {
        self.halt();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

axon_sdk::export_module!(Runner::default());
