// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Time to screen geometry for the zoomable waveform.
//!
//! `pan` is the fraction of the sample hidden to the left of the view and
//! `zoom` is how many views fit across the whole sample. Screen positions are
//! normalized to `[0, 1]` across the view width.

/// Default maximum zoom factor.
pub const DEFAULT_ZOOM_MAX: f64 = 50.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WaveformView {
    duration: f64,
    zoom: f64,
    pan: f64,
    zoom_max: f64,
}

impl WaveformView {
    pub fn new(duration: f64) -> WaveformView {
        WaveformView::with_zoom_max(duration, DEFAULT_ZOOM_MAX)
    }

    pub fn with_zoom_max(duration: f64, zoom_max: f64) -> WaveformView {
        let duration = if duration.is_finite() && duration > 0.0 {
            duration
        } else {
            0.0
        };
        let zoom_max = if zoom_max.is_finite() {
            zoom_max.max(1.0)
        } else {
            DEFAULT_ZOOM_MAX
        };
        WaveformView {
            duration,
            zoom: 1.0,
            pan: 0.0,
            zoom_max,
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn pan(&self) -> f64 {
        self.pan
    }

    pub fn zoom_max(&self) -> f64 {
        self.zoom_max
    }

    /// Largest pan allowed at the current zoom.
    pub fn max_pan(&self) -> f64 {
        (1.0 - 1.0 / self.zoom).max(0.0)
    }

    /// Seconds visible across the view.
    pub fn visible_duration(&self) -> f64 {
        self.duration / self.zoom
    }

    /// Visible `[start, end]` in seconds.
    pub fn visible_range(&self) -> (f64, f64) {
        let start = self.pan * self.duration;
        (start, (start + self.visible_duration()).min(self.duration))
    }

    /// Time under a pixel position across a view of the given width,
    /// clamped to the sample.
    pub fn screen_to_time(&self, x: f64, width: f64) -> f64 {
        if self.duration == 0.0 || width.is_nan() || width <= 0.0 || !x.is_finite() {
            return 0.0;
        }
        self.fraction_to_time(x / width)
    }

    /// Time under a normalized screen position, clamped to the sample.
    pub fn fraction_to_time(&self, fraction: f64) -> f64 {
        if self.duration == 0.0 || !fraction.is_finite() {
            return 0.0;
        }
        (self.pan * self.duration + fraction * self.visible_duration()).clamp(0.0, self.duration)
    }

    /// Normalized screen position of a time. Values outside `[0, 1]` are off
    /// screen.
    pub fn time_to_screen(&self, time: f64) -> f64 {
        if self.duration == 0.0 {
            return 0.0;
        }
        (time - self.pan * self.duration) / self.visible_duration()
    }

    pub fn is_visible(&self, time: f64) -> bool {
        (0.0..=1.0).contains(&self.time_to_screen(time))
    }

    /// Sets the zoom without an anchor, keeping pan in range.
    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = self.clamp_zoom(zoom);
        self.pan = self.clamp_pan(self.pan);
    }

    /// Zooms so that whatever was under the anchor stays under it. `anchor`
    /// is a normalized screen position.
    pub fn zoom_at(&mut self, zoom: f64, anchor: f64) {
        let anchor = if anchor.is_finite() {
            anchor.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let zoom = self.clamp_zoom(zoom);
        // time(anchor) = duration * (pan + anchor / zoom) must not change.
        let pan = self.pan + anchor * (1.0 / self.zoom - 1.0 / zoom);
        self.zoom = zoom;
        self.pan = self.clamp_pan(pan);
    }

    /// Pans by a fraction of the whole sample.
    pub fn pan_by(&mut self, delta: f64) {
        if delta.is_finite() {
            self.pan = self.clamp_pan(self.pan + delta);
        }
    }

    pub fn set_pan(&mut self, pan: f64) {
        self.pan = self.clamp_pan(pan);
    }

    fn clamp_zoom(&self, zoom: f64) -> f64 {
        if zoom.is_finite() {
            zoom.clamp(1.0, self.zoom_max)
        } else {
            self.zoom
        }
    }

    fn clamp_pan(&self, pan: f64) -> f64 {
        if pan.is_finite() {
            pan.clamp(0.0, self.max_pan())
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_screen_time_mapping() {
        let mut view = WaveformView::new(4.0);
        assert_eq!(0.0, view.screen_to_time(0.0, 800.0));
        assert_eq!(2.0, view.screen_to_time(400.0, 800.0));
        assert_eq!(4.0, view.screen_to_time(800.0, 800.0));
        // Clamped past the edges.
        assert_eq!(4.0, view.screen_to_time(1200.0, 800.0));
        assert_eq!(0.0, view.screen_to_time(-10.0, 800.0));

        view.set_zoom(2.0);
        view.set_pan(0.5);
        assert_eq!((2.0, 4.0), view.visible_range());
        assert_eq!(3.0, view.screen_to_time(400.0, 800.0));
        assert_eq!(0.5, view.time_to_screen(3.0));
        assert_eq!(-1.0, view.time_to_screen(0.0));
        assert!(!view.is_visible(1.0));
        assert!(view.is_visible(2.5));
    }

    #[test]
    fn test_anchor_stable_zoom() {
        let mut view = WaveformView::new(4.0);
        let x = view.time_to_screen(2.0);
        view.zoom_at(4.0, x);
        assert_eq!(4.0, view.zoom());
        assert!((view.fraction_to_time(x) - 2.0).abs() < EPSILON);
        assert!((view.time_to_screen(2.0) - x).abs() < EPSILON);
    }

    #[test]
    fn test_anchor_stable_zoom_in_property() {
        for anchor_step in 0..=20 {
            let anchor = anchor_step as f64 / 20.0;
            let mut zoom = 1.0;
            let mut view = WaveformView::new(7.5);
            while zoom < DEFAULT_ZOOM_MAX {
                let before = view.fraction_to_time(anchor);
                zoom = (zoom * 1.7).min(DEFAULT_ZOOM_MAX);
                view.zoom_at(zoom, anchor);
                let after = view.fraction_to_time(anchor);
                assert!(
                    (before - after).abs() < EPSILON,
                    "anchor {} zoom {}: {} != {}",
                    anchor,
                    zoom,
                    before,
                    after
                );
                assert!(view.pan() >= 0.0 && view.pan() <= view.max_pan() + EPSILON);
            }
        }
    }

    #[test]
    fn test_zoom_and_pan_clamped() {
        let mut view = WaveformView::new(4.0);
        view.set_zoom(500.0);
        assert_eq!(DEFAULT_ZOOM_MAX, view.zoom());
        view.set_zoom(0.1);
        assert_eq!(1.0, view.zoom());
        assert_eq!(0.0, view.max_pan());

        view.pan_by(0.3);
        assert_eq!(0.0, view.pan());

        view.set_zoom(4.0);
        view.pan_by(2.0);
        assert_eq!(0.75, view.pan());
        view.pan_by(-5.0);
        assert_eq!(0.0, view.pan());

        view.set_pan(0.75);
        view.set_zoom(2.0);
        assert_eq!(0.5, view.pan());
        view.set_zoom(1.0);
        assert_eq!(0.0, view.pan());

        view.set_zoom(f64::NAN);
        assert_eq!(1.0, view.zoom());
    }

    #[test]
    fn test_degenerate_duration() {
        let mut view = WaveformView::new(0.0);
        assert_eq!(0.0, view.screen_to_time(400.0, 800.0));
        assert_eq!(0.0, view.time_to_screen(1.0));
        view.zoom_at(10.0, 0.5);
        assert_eq!(0.0, view.screen_to_time(400.0, 800.0));

        let view = WaveformView::new(f64::NAN);
        assert_eq!(0.0, view.duration());
        assert_eq!(0.0, WaveformView::new(4.0).screen_to_time(10.0, 0.0));
    }

    #[test]
    fn test_custom_zoom_max() {
        let mut view = WaveformView::with_zoom_max(4.0, 8.0);
        view.set_zoom(20.0);
        assert_eq!(8.0, view.zoom());
        assert_eq!(1.0, WaveformView::with_zoom_max(4.0, 0.5).zoom_max());
    }
}
