//! Progress reporting for long-running generation.

/// Receives monotonic completion fractions in `0.0..=1.0`.
///
/// The planner only pushes; an observer must not block. Any `FnMut(f64)`
/// closure is an observer.
pub trait ProgressObserver {
    fn on_progress(&mut self, fraction: f64);
}

impl<F: FnMut(f64)> ProgressObserver for F {
    fn on_progress(&mut self, fraction: f64) {
        self(fraction)
    }
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&mut self, _fraction: f64) {}
}

/// Maps a sub-task's `0..=1` onto `offset..=offset + scale` of the parent.
pub struct ScaledProgress<'a> {
    inner: &'a mut dyn ProgressObserver,
    offset: f64,
    scale: f64,
}

impl<'a> ScaledProgress<'a> {
    pub fn new(inner: &'a mut dyn ProgressObserver, offset: f64, scale: f64) -> Self {
        Self {
            inner,
            offset,
            scale,
        }
    }
}

impl ProgressObserver for ScaledProgress<'_> {
    fn on_progress(&mut self, fraction: f64) {
        self.inner.on_progress(self.offset + fraction * self.scale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_and_scaling() {
        let mut seen = Vec::new();
        {
            let mut record = |p: f64| seen.push(p);
            let mut scaled = ScaledProgress::new(&mut record, 0.5, 0.25);
            scaled.on_progress(0.0);
            scaled.on_progress(1.0);
        }
        assert_eq!(seen, vec![0.5, 0.75]);
    }
}
