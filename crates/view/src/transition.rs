use std::f64::consts::PI;
use std::time::Duration;

use render_protocol::WorldPoint;

/// Cubic bezier easing through `(0, 0)`, `(p1)`, `(p2)`, `(1, 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitBezier {
    ax: f64,
    bx: f64,
    cx: f64,
    ay: f64,
    by: f64,
    cy: f64,
}

impl UnitBezier {
    pub const fn new(p1x: f64, p1y: f64, p2x: f64, p2y: f64) -> Self {
        let cx = 3.0 * p1x;
        let bx = 3.0 * (p2x - p1x) - cx;
        let ax = 1.0 - cx - bx;
        let cy = 3.0 * p1y;
        let by = 3.0 * (p2y - p1y) - cy;
        let ay = 1.0 - cy - by;
        Self {
            ax,
            bx,
            cx,
            ay,
            by,
            cy,
        }
    }

    /// Camera easing: fast start, long settle.
    pub const EASE: Self = Self::new(0.0, 0.0, 0.25, 1.0);

    fn sample_x(&self, t: f64) -> f64 {
        ((self.ax * t + self.bx) * t + self.cx) * t
    }

    fn sample_y(&self, t: f64) -> f64 {
        ((self.ay * t + self.by) * t + self.cy) * t
    }

    fn sample_derivative_x(&self, t: f64) -> f64 {
        (3.0 * self.ax * t + 2.0 * self.bx) * t + self.cx
    }

    fn solve_x(&self, x: f64, epsilon: f64) -> f64 {
        let mut t = x;
        for _ in 0..8 {
            let error = self.sample_x(t) - x;
            if error.abs() < epsilon {
                return t;
            }
            let derivative = self.sample_derivative_x(t);
            if derivative.abs() < 1e-6 {
                break;
            }
            t -= error / derivative;
        }

        let mut low = 0.0;
        let mut high = 1.0;
        t = x.clamp(low, high);
        while low < high {
            let sampled = self.sample_x(t);
            if (sampled - x).abs() < epsilon {
                return t;
            }
            if x > sampled {
                low = t;
            } else {
                high = t;
            }
            t = (high - low) * 0.5 + low;
            if high - low < epsilon {
                break;
            }
        }
        t
    }

    pub fn solve(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return 0.0;
        }
        if x >= 1.0 {
            return 1.0;
        }
        self.sample_y(self.solve_x(x, 1e-6))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraTarget {
    pub center: WorldPoint,
    pub zoom: f64,
    /// Radians.
    pub bearing: f64,
}

/// One running camera animation. A newer transition replaces it, starting
/// from wherever this one had got to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraTransition {
    start: Duration,
    duration: Duration,
    from: CameraTarget,
    to: CameraTarget,
    /// Extra zoom-out at the midpoint, in zoom levels.
    arc: f64,
}

impl CameraTransition {
    pub fn new(start: Duration, duration: Duration, from: CameraTarget, to: CameraTarget) -> Self {
        Self {
            start,
            duration,
            from,
            to,
            arc: 0.0,
        }
    }

    pub fn with_arc(mut self, arc: f64) -> Self {
        self.arc = arc.max(0.0);
        self
    }

    pub fn target(&self) -> CameraTarget {
        self.to
    }

    pub fn progress(&self, now: Duration) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_sub(self.start);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
    }

    pub fn is_finished(&self, now: Duration) -> bool {
        self.progress(now) >= 1.0
    }

    pub fn sample(&self, now: Duration) -> CameraTarget {
        let progress = self.progress(now);
        if progress >= 1.0 {
            return self.to;
        }
        let t = UnitBezier::EASE.solve(progress);
        let lerp = |from: f64, to: f64| from + (to - from) * t;
        let bearing_delta = shortest_angle(self.to.bearing - self.from.bearing);
        CameraTarget {
            center: WorldPoint {
                x: lerp(self.from.center.x, self.to.center.x),
                y: lerp(self.from.center.y, self.to.center.y),
            },
            zoom: lerp(self.from.zoom, self.to.zoom) - self.arc * 4.0 * t * (1.0 - t),
            bearing: self.from.bearing + bearing_delta * t,
        }
    }
}

/// Wraps an angle delta into `(-PI, PI]`.
pub(crate) fn shortest_angle(delta: f64) -> f64 {
    let wrapped = (delta + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped == -PI { PI } else { wrapped }
}

pub(crate) fn wrap_bearing(radians: f64) -> f64 {
    shortest_angle(radians)
}
