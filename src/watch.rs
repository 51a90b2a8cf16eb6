//! # Edge Detection
//!
//! Generic change-detector over an optional value.
//!
//! Both telemetry sources in this system are level-triggered: the armor
//! sensor re-reports its cumulative hit count every frame, and the referee
//! re-broadcasts its event tokens with every message. [`EdgeWatch`] turns
//! those levels into one-shot events while suppressing the transitions that
//! only exist because a link dropped and came back.

/// Detects genuine value-to-value transitions in an optional stream.
///
/// [`EdgeWatch::update`] returns `true` only when both the previous and the
/// new value are present and unequal. First acquisition after an absence is
/// swallowed, as is the transition into absence, so a reconnecting link can
/// never manufacture an event out of its own restart.
///
/// # Examples
///
/// ```
/// use arena_hud::watch::EdgeWatch;
///
/// let mut watch = EdgeWatch::new();
/// assert!(!watch.update(Some(3))); // first acquisition
/// assert!(!watch.update(Some(3))); // no change
/// assert!(watch.update(Some(5)));  // genuine edge
/// assert!(!watch.update(None));    // became absent
/// assert!(!watch.update(Some(5))); // re-acquisition
/// ```
#[derive(Debug, Clone)]
pub struct EdgeWatch<T> {
    previous: Option<T>,
}

impl<T> Default for EdgeWatch<T> {
    fn default() -> Self {
        Self { previous: None }
    }
}

impl<T: PartialEq> EdgeWatch<T> {
    /// Create a watch armed to "no prior value".
    pub fn new() -> Self {
        Self { previous: None }
    }

    /// Advance the watch with the latest observed value.
    ///
    /// Returns `true` only on a present-to-present inequality. The new value
    /// is always stored regardless of the return value.
    pub fn update(&mut self, current: Option<T>) -> bool {
        let edged = match (&self.previous, &current) {
            (Some(prev), Some(cur)) => prev != cur,
            _ => false,
        };
        self.previous = current;
        edged
    }

    /// The last value stored by [`update`](Self::update).
    pub fn previous(&self) -> Option<&T> {
        self.previous.as_ref()
    }

    /// Re-arm the watch: the next real transition is treated as a first
    /// acquisition and suppressed once.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}
