//! Browser image preloading.

use crate::probe::{PreloadOutcome, ReadinessProbe, ReadyCallback};
use std::rc::Rc;
use std::cell::RefCell;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::HtmlImageElement;

/// Default upper bound on how long a preload may hold a swap.
pub const DEFAULT_PRELOAD_TIMEOUT_MS: i32 = 5_000;

/// Probe that loads the resource as an image.
///
/// Reports `Ready` on load, `Failed` on error and `TimedOut` once the bound
/// elapses, whichever comes first.
#[derive(Clone, Copy, Debug)]
pub struct ImagePreloader {
    timeout_ms: i32,
}

impl Default for ImagePreloader {
    fn default() -> Self {
        Self::new(DEFAULT_PRELOAD_TIMEOUT_MS)
    }
}

impl ImagePreloader {
    /// Creates a preloader that gives up after `timeout_ms`.
    pub fn new(timeout_ms: i32) -> Self {
        Self { timeout_ms }
    }
}

type Slot = Rc<RefCell<Option<ReadyCallback>>>;

fn settle(slot: &Slot, outcome: PreloadOutcome) {
    let ready = slot.borrow_mut().take();
    if let Some(ready) = ready {
        ready(outcome);
    }
}

impl ReadinessProbe for ImagePreloader {
    fn prepare(&self, resource: &str, ready: ReadyCallback) {
        let slot: Slot = Rc::new(RefCell::new(Some(ready)));

        let image = match HtmlImageElement::new() {
            Ok(image) => image,
            Err(err) => {
                settle(&slot, PreloadOutcome::Failed(format!("{err:?}")));
                return;
            }
        };

        let on_load = {
            let slot = slot.clone();
            Closure::once_into_js(move || settle(&slot, PreloadOutcome::Ready))
        };
        let on_error = {
            let slot = slot.clone();
            let resource = resource.to_owned();
            Closure::once_into_js(move || {
                settle(&slot, PreloadOutcome::Failed(format!("failed to load {resource}")))
            })
        };
        image.set_onload(Some(on_load.unchecked_ref()));
        image.set_onerror(Some(on_error.unchecked_ref()));

        if let Some(window) = web_sys::window() {
            let on_timeout = {
                let slot = slot.clone();
                Closure::once_into_js(move || settle(&slot, PreloadOutcome::TimedOut))
            };
            if let Err(err) = window.set_timeout_with_callback_and_timeout_and_arguments_0(
                on_timeout.unchecked_ref::<js_sys::Function>(),
                self.timeout_ms,
            ) {
                tracing::warn!(error = ?err, "failed to schedule preload timeout");
            }
        }

        image.set_src(resource);
    }
}
