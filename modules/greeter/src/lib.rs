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

//! The `greeter` module: while started, it holds the `runner` module, runs
//! it and counts its ticks.

use axon_sdk::prelude::*;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};

const RUNNER: &str = "runner";
const REPORT_EVERY: u64 = 60;

#[derive(Default)]
pub struct Greeter {
    context: ModuleContext,
    bus: Mutex<Option<Arc<EventBus<f64>>>>,
    session: Mutex<Option<Session>>,
    ticks: Arc<AtomicU64>,
}

/// What `start` acquired and `stop` gives back.
struct Session {
    loader: Arc<ModuleLoader>,
    runner: Option<ModuleHandle>,
    subscription: Option<HandlerId>,
}

impl Greeter {
    /// Ticks seen since the module was created.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    fn subscribe(&self) -> Option<HandlerId> {
        let bus = self.bus.lock().clone()?;
        let ticks = Arc::clone(&self.ticks);
        bus.subscribe(RUNNER, move |dt: &f64| {
            let seen = ticks.fetch_add(1, Ordering::Relaxed) + 1;
            if seen % REPORT_EVERY == 0 {
                log::info!("Greeter: {seen} ticks, last one took {dt:.4} s");
            }
        })
    }
}

impl Module for Greeter {
    fn initialize(&self, registry: &Arc<RegistryContext>) {
        self.context.bind(registry);
        *self.bus.lock() = self.context.bus::<f64>();
        log::info!("Hello from greeter");
    }

    fn release(&self) {
        if let Some(bus) = self.bus.lock().take() {
            bus.request_delete();
        }
        log::info!("Goodbye from greeter after {} tick(s)", self.ticks());
    }

    // Everything acquired here is given back in `stop`.
    fn start(&self) {
        let mut session = self.session.lock();
        if session.is_some() {
            log::warn!("Greeter already started");
            return;
        }
        let Some(loader) = self.context.loader() else {
            return;
        };

        let runner = match loader.load(RUNNER) {
            Ok(handle) => Some(handle),
            Err(err) => {
                log::error!("Greeter could not load '{RUNNER}': {err}");
                None
            }
        };
        let subscription = runner.as_ref().and_then(|_| self.subscribe());
        if let Some(handle) = &runner {
            handle.with(|module| module.start());
        }
        *session = Some(Session {
            loader,
            runner,
            subscription,
        });
    }

    fn stop(&self) {
        let Some(session) = self.session.lock().take() else {
            return;
        };
        if let Some(handle) = &session.runner {
            handle.with(|module| module.stop());
        }
        if let (Some(bus), Some(id)) = (self.bus.lock().as_ref(), session.subscription) {
            bus.unsubscribe(RUNNER, id);
        }
        if session.runner.is_some() {
            session.loader.unload(RUNNER);
        }
        session.loader.request_delete();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

axon_sdk::export_module!(Greeter::default());

#[cfg(test)]
mod tests {
    use super::*;
    use axon_core::declare_module;
    use axon_core::platform::{StaticPlatform, StaticSymbols};

    /// Stand-in for the real runner: owns the event, never ticks by itself.
    #[derive(Default)]
    struct StubRunner {
        context: ModuleContext,
    }

    impl Module for StubRunner {
        fn initialize(&self, registry: &Arc<RegistryContext>) {
            self.context.bind(registry);
            if let Some(bus) = self.context.bus::<f64>() {
                bus.create(RUNNER);
            }
        }
        fn release(&self) {
            if let Some(bus) = self.context.bus::<f64>() {
                bus.destroy(RUNNER);
                bus.request_delete();
                bus.request_delete();
            }
        }
        fn start(&self) {}
        fn stop(&self) {}
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    declare_module!(STUB_RUNNER, stub_create, stub_destroy, StubRunner::default());

    #[test]
    fn greeter_drives_the_runner_between_start_and_stop() {
        // --- 1. ARRANGE ---
        let platform = Arc::new(StaticPlatform::new());
        platform.register("runner", StaticSymbols::new(stub_create, stub_destroy));
        platform.register(
            "greeter",
            StaticSymbols::new(__axon_export_create, __axon_export_destroy),
        );
        let registry = Arc::new(RegistryContext::new(
            KernelConfig::new("/opt/axon/bin"),
            platform.clone(),
        ));
        let loader = ModuleLoader::instance(&registry);
        let bus = EventBus::<f64>::instance(&registry);
        let greeter = loader.load("greeter").expect("greeter should load");

        // --- 2. ACT ---
        let before_start = loader.is_loaded(RUNNER);
        greeter.with(|module| module.start());
        let while_started = loader.ref_count(RUNNER);
        let called = (0..3).map(|_| bus.call(RUNNER, 0.016)).sum::<usize>();
        greeter.with(|module| module.stop());

        // --- 3. ASSERT ---
        assert!(!before_start, "initialize loads nothing");
        assert_eq!(while_started, 1, "start loaded the runner");
        assert_eq!(called, 3);
        assert!(!loader.is_loaded(RUNNER), "stop gave the runner back");
        assert!(!bus.exists(RUNNER));
        let ticks = greeter.with(|module| {
            module.as_any().downcast_ref::<Greeter>().map(Greeter::ticks)
        });
        assert_eq!(ticks, Some(Some(3)));

        assert_eq!(loader.unload("greeter"), UnloadOutcome::Released);
        bus.request_delete();
        loader.request_delete();
        assert_eq!(registry.loader_ref_count(), 0);
        assert_eq!(registry.bus_ref_count::<f64>(), 0);
    }
}
