//! Structured telemetry pipeline for internal invariant failures.
//!
//! The coordinator has branches that should be unreachable when its invariants hold
//! (a slot that vanished mid-mirror, a frame counter that disagrees with its delay).
//! Instead of panicking, or logging an untyped string, such branches emit a
//! structured [`Violation`] that can be:
//!
//! - Logged via `tracing` (default behavior)
//! - Collected programmatically for testing
//! - Sent to a custom observer (metrics, alerting, etc.)
//!
//! # Example
//!
//! ```
//! use trailstate::telemetry::{CollectingObserver, ViolationObserver};
//! use std::sync::Arc;
//!
//! let observer = Arc::new(CollectingObserver::new());
//! // ... hand the observer to a coordinator builder, run some operations ...
//! assert!(observer.violations().is_empty(), "unexpected violations");
//! ```

use crate::Frame;
use parking_lot::Mutex;

/// Severity of an internal invariant failure.
///
/// Severities are ordered from least to most severe, allowing filtering and
/// comparison operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// Unexpected but recoverable - the operation continued with a fallback.
    Warning,
    /// Serious issue - the operation may have degraded behavior.
    Error,
    /// Critical invariant broken - state may be corrupted.
    Critical,
}

impl ViolationSeverity {
    /// Returns a string representation suitable for logging/metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categories of internal invariant failures.
///
/// Each category corresponds to a major subsystem of the engine, making it easy to
/// filter and route violations.
///
/// # Forward Compatibility
///
/// This enum is marked `#[non_exhaustive]` because new categories may be added in
/// future versions. Always include a wildcard arm when matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ViolationKind {
    /// A slot's frame disagrees with the coordinator's frame minus its delay.
    FrameSync,
    /// The pending event store broke an ordering or pruning guarantee.
    EventStore,
    /// Mirroring or snapshot state management hit an impossible condition.
    StateManagement,
    /// Invalidation delivery hit an impossible condition.
    Invalidation,
    /// A configuration constraint was violated at runtime.
    Configuration,
    /// Internal logic error (should never happen).
    InternalError,
}

impl ViolationKind {
    /// Returns a string representation suitable for logging/metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FrameSync => "frame_sync",
            Self::EventStore => "event_store",
            Self::StateManagement => "state_management",
            Self::Invalidation => "invalidation",
            Self::Configuration => "configuration",
            Self::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded invariant failure.
///
/// Contains the context needed to diagnose a violation of expected behavior:
/// severity, subsystem, human-readable message, source location and (when known)
/// the frame at which it occurred.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Violation {
    /// The severity level of this violation.
    pub severity: ViolationSeverity,
    /// The subsystem where the violation occurred.
    pub kind: ViolationKind,
    /// Human-readable description of what went wrong.
    pub message: String,
    /// Source location where the violation was detected (file:line).
    pub location: &'static str,
    /// The frame at which the violation occurred, if applicable.
    pub frame: Option<Frame>,
}

impl Violation {
    /// Creates a new violation record.
    #[must_use]
    pub fn new(
        severity: ViolationSeverity,
        kind: ViolationKind,
        message: impl Into<String>,
        location: &'static str,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            location,
            frame: None,
        }
    }

    /// Attaches the frame at which the violation occurred.
    #[must_use]
    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frame = Some(frame);
        self
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}: {} (at {})",
            self.severity, self.kind, self.message, self.location
        )?;
        if let Some(frame) = self.frame {
            write!(f, " frame={frame}")?;
        }
        Ok(())
    }
}

/// Receives violation records as they are reported.
pub trait ViolationObserver: Send + Sync {
    /// Called once per reported violation.
    fn on_violation(&self, violation: &Violation);
}

/// The default observer: forwards violations to `tracing` at a level matching
/// their severity.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ViolationObserver for TracingObserver {
    fn on_violation(&self, violation: &Violation) {
        match violation.severity {
            ViolationSeverity::Warning => {
                tracing::warn!(
                    kind = violation.kind.as_str(),
                    location = violation.location,
                    "{}",
                    violation.message
                );
            },
            ViolationSeverity::Error | ViolationSeverity::Critical => {
                tracing::error!(
                    kind = violation.kind.as_str(),
                    severity = violation.severity.as_str(),
                    location = violation.location,
                    "{}",
                    violation.message
                );
            },
        }
    }
}

/// An observer that stores every violation for later inspection.
///
/// Intended for tests: operations that should be violation-free can assert the
/// collection is empty afterwards.
#[derive(Default)]
pub struct CollectingObserver {
    violations: Mutex<Vec<Violation>>,
}

impl CollectingObserver {
    /// Creates a new, empty observer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every violation recorded so far, in report order.
    #[must_use]
    pub fn violations(&self) -> Vec<Violation> {
        self.violations.lock().clone()
    }

    /// Discards all recorded violations.
    pub fn clear(&self) {
        self.violations.lock().clear();
    }
}

impl ViolationObserver for CollectingObserver {
    fn on_violation(&self, violation: &Violation) {
        self.violations.lock().push(violation.clone());
    }
}

/// Delivers a violation to `observer` when one is registered, falling back to the
/// default tracing output otherwise.
///
/// This function is used internally by the coordinator; it is public so the
/// reporting macros can reach it from other modules.
pub fn report_to_observer(
    observer: Option<&std::sync::Arc<dyn ViolationObserver>>,
    violation: &Violation,
) {
    match observer {
        Some(observer) => observer.on_violation(violation),
        None => TracingObserver.on_violation(violation),
    }
}

/// Reports an invariant failure through the default tracing observer.
///
/// Captures the source location automatically. Use the four-or-more argument form
/// for formatted messages.
#[macro_export]
macro_rules! report_violation {
    ($severity:expr, $kind:expr, $msg:literal) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::Violation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};

    ($severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::Violation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};
}

/// Reports an invariant failure to an `Option<Arc<dyn ViolationObserver>>`,
/// falling back to tracing when none is registered.
#[macro_export]
macro_rules! report_violation_to {
    ($observer:expr, $severity:expr, $kind:expr, $msg:literal) => {{
        let violation = $crate::telemetry::Violation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};

    ($observer:expr, $severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        let violation = $crate::telemetry::Violation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};
}

// #########
// # TESTS #
// #########
