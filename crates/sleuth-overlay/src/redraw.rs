//! Redraw requests from the overlay to whatever presents it.

use crossbeam_channel::Sender;
use sleuth_core::Rect;

/// Receives requests to repaint a region of the overlay surface.
///
/// Called from the animation thread, so implementations must not block
/// for long.
pub trait RedrawSink: Send + Sync {
    fn request_redraw(&self, region: Rect);
}

impl RedrawSink for Sender<Rect> {
    fn request_redraw(&self, region: Rect) {
        let _ = self.send(region);
    }
}

/// [`RedrawSink`] adapter for a closure. Created by [`redraw_fn`].
#[derive(Clone, Copy)]
pub struct FnRedrawSink<F>(F);

impl<F> RedrawSink for FnRedrawSink<F>
where
    F: Fn(Rect) + Send + Sync,
{
    fn request_redraw(&self, region: Rect) {
        (self.0)(region);
    }
}

/// Wrap a closure as a [`RedrawSink`].
pub const fn redraw_fn<F>(f: F) -> FnRedrawSink<F>
where
    F: Fn(Rect) + Send + Sync,
{
    FnRedrawSink(f)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn channel_sink_forwards() {
        let (tx, rx) = crossbeam_channel::unbounded();
        tx.request_redraw(Rect::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(rx.try_recv().unwrap(), Rect::new(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn disconnected_channel_is_ignored() {
        let (tx, rx) = crossbeam_channel::unbounded::<Rect>();
        drop(rx);
        tx.request_redraw(Rect::new(0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn closure_sink() {
        let count = AtomicUsize::new(0);
        let sink = redraw_fn(|_| {
            count.fetch_add(1, Ordering::Relaxed);
        });
        sink.request_redraw(Rect::new(0.0, 0.0, 1.0, 1.0));
        sink.request_redraw(Rect::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(count.load(Ordering::Relaxed), 2);
    }
}
