//! Container lifecycle events.

/// Events published on the container's lifecycle channel.
///
/// Shutdown completion is not synchronously observable through the stop
/// call alone; subscribers watch for both events to decide when teardown
/// has fully finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The embedded HTTP server has stopped serving.
    ServerStopped,
    /// The container has released its deployment context references.
    ContextDestroyed,
}

/// Capacity of the lifecycle broadcast channel.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 16;
