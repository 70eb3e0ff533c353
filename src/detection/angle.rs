//! Planar joint angle from three landmarks.

use super::frame::Landmark;

/// Interior angle at `vertex` between the rays towards `a` and `c`, in
/// degrees within `[0, 180]`.
///
/// Non-finite coordinates are the caller's problem; `PoseLandmarks`
/// filters them before calling in.
pub fn joint_angle(a: Landmark, vertex: Landmark, c: Landmark) -> f64 {
    let towards_c = (c.y - vertex.y).atan2(c.x - vertex.x);
    let towards_a = (a.y - vertex.y).atan2(a.x - vertex.x);

    let angle = (towards_c - towards_a).to_degrees().abs();
    if angle > 180.0 {
        360.0 - angle
    } else {
        angle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: f64, y: f64) -> Landmark {
        Landmark::new(x, y)
    }

    #[test]
    fn straight_arm_is_180() {
        let angle = joint_angle(at(0.0, 0.0), at(0.5, 0.0), at(1.0, 0.0));
        assert!((angle - 180.0).abs() < 1e-9);
    }

    #[test]
    fn right_angle() {
        let angle = joint_angle(at(0.0, 0.0), at(0.5, 0.0), at(0.5, 0.5));
        assert!((angle - 90.0).abs() < 1e-9);
    }

    #[test]
    fn reflex_difference_folds_back_below_180() {
        // Raw atan2 difference is 270 degrees here.
        let angle = joint_angle(at(0.0, -1.0), at(0.0, 0.0), at(-1.0, 0.0));
        assert!((angle - 90.0).abs() < 1e-9);
    }

    #[test]
    fn symmetric_in_endpoints() {
        let a = at(0.1, 0.7);
        let b = at(0.4, 0.4);
        let c = at(0.9, 0.5);
        assert!((joint_angle(a, b, c) - joint_angle(c, b, a)).abs() < 1e-9);
    }

    #[test]
    fn always_within_range() {
        let points = [at(0.0, 0.0), at(1.0, 0.2), at(-0.3, 0.8), at(0.5, -0.9)];
        for a in points {
            for c in points {
                let angle = joint_angle(a, at(0.25, 0.25), c);
                assert!((0.0..=180.0).contains(&angle), "{angle}");
            }
        }
    }
}
