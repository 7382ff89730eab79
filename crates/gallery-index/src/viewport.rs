//! Viewport-first request ordering
//!
//! Items inside the viewport come first, then the remaining items in rings
//! expanding outward, alternating one before and one after the viewport.

use thumbnail_cache::Priority;

/// Half-open range `[start, end)` of entry indices currently on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub start: usize,
    pub end: usize,
}

impl Viewport {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// A viewport covering everything
    pub const fn all() -> Self {
        Self::new(0, usize::MAX)
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end
    }
}

/// Indices `0..len` in request order, each tagged with its priority
pub fn priority_order(len: usize, viewport: Viewport) -> Vec<(usize, Priority)> {
    let start = viewport.start.min(len);
    let end = viewport.end.clamp(start, len);

    let mut order = Vec::with_capacity(len);
    order.extend((start..end).map(|i| (i, Priority::Visible)));

    let mut before = (0..start).rev();
    let mut after = end..len;
    loop {
        let mut added = false;
        if let Some(i) = before.next() {
            order.push((i, Priority::Prefetch));
            added = true;
        }
        if let Some(i) = after.next() {
            order.push((i, Priority::Prefetch));
            added = true;
        }
        if !added {
            break;
        }
    }
    order
}
