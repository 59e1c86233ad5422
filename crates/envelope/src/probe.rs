//! Readiness probes for swap-gated updates.

/// Terminal outcome of preparing a resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PreloadOutcome {
    /// The resource is available
    Ready,
    /// Preparing failed; the swap proceeds anyway
    Failed(String),
    /// The probe gave up waiting; the swap proceeds anyway
    TimedOut,
}

impl PreloadOutcome {
    /// Returns true for `Ready`.
    pub fn is_ready(&self) -> bool {
        matches!(self, PreloadOutcome::Ready)
    }
}

/// Callback a probe invokes exactly once with its outcome.
pub type ReadyCallback = Box<dyn FnOnce(PreloadOutcome)>;

/// Asynchronous readiness check run before committing a state swap.
///
/// Implementations must eventually call `ready` with some terminal outcome.
/// They may call it synchronously from inside `prepare`.
pub trait ReadinessProbe {
    /// Starts preparing `resource` and reports through `ready`.
    fn prepare(&self, resource: &str, ready: ReadyCallback);
}

impl<F> ReadinessProbe for F
where
    F: Fn(&str, ReadyCallback),
{
    fn prepare(&self, resource: &str, ready: ReadyCallback) {
        self(resource, ready)
    }
}

/// Probe that reports every resource ready immediately.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysReady;

impl ReadinessProbe for AlwaysReady {
    fn prepare(&self, _resource: &str, ready: ReadyCallback) {
        ready(PreloadOutcome::Ready);
    }
}
