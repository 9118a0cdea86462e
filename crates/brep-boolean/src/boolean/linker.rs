//! Stitching of raw intersection fragments into maximal continuous curves.

use tracing::{debug, instrument, warn};

use crate::error::BooleanError;
use crate::geometry::curves::Curve2d;
use crate::geometry::oracle::{CurveEvent, GeometryOracle};
use crate::geometry::point::Point2d;

/// Gaps wider than this between joined ends get a straight connector.
const BRIDGE_EPS: f64 = 1e-12;

/// A chain of parameter-space curves, each starting where the previous one
/// ends. Parameter `s` runs over `[0, n]`; segment `k` covers `[k, k + 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedCurve {
    pub segments: Vec<Curve2d>,
    pub closed: bool,
}

impl LinkedCurve {
    pub fn single(curve: Curve2d) -> Self {
        Self {
            segments: vec![curve],
            closed: false,
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn domain(&self) -> (f64, f64) {
        (0.0, self.segments.len() as f64)
    }

    pub fn start(&self) -> Point2d {
        self.segments.first().map_or(Point2d::ORIGIN, Curve2d::start)
    }

    pub fn end(&self) -> Point2d {
        self.segments.last().map_or(Point2d::ORIGIN, Curve2d::end)
    }

    /// Chain parameter of parameter `t` on segment `k`.
    pub fn chain_param(&self, k: usize, t: f64) -> f64 {
        let (t0, t1) = self.segments[k].domain();
        let local = if (t1 - t0).abs() > 0.0 { (t - t0) / (t1 - t0) } else { 0.0 };
        k as f64 + local.clamp(0.0, 1.0)
    }

    fn locate(&self, s: f64) -> (usize, f64) {
        let n = self.segments.len();
        let k = (s.max(0.0).floor() as usize).min(n.saturating_sub(1));
        let (t0, t1) = self.segments[k].domain();
        let local = (s - k as f64).clamp(0.0, 1.0);
        (k, t0 + (t1 - t0) * local)
    }

    pub fn point_at(&self, s: f64) -> Point2d {
        if self.segments.is_empty() {
            return Point2d::ORIGIN;
        }
        let (k, t) = self.locate(s);
        self.segments[k].point_at(t)
    }

    pub fn tangent_at(&self, s: f64) -> Point2d {
        if self.segments.is_empty() {
            return Point2d::ORIGIN;
        }
        let (k, t) = self.locate(s);
        self.segments[k].tangent_at(t)
    }

    pub fn reversed(&self) -> Self {
        Self {
            segments: self.segments.iter().rev().map(Curve2d::reversed).collect(),
            closed: self.closed,
        }
    }

    /// Curves covering chain parameters `[s0, s1]`.
    pub fn sub_range(&self, s0: f64, s1: f64) -> Result<Vec<Curve2d>, BooleanError> {
        let (d0, d1) = self.domain();
        if s0.is_nan() || s1.is_nan() || s1 <= s0 || s0 < d0 - 1e-12 || s1 > d1 + 1e-12 {
            return Err(BooleanError::InvalidInterval { start: s0, end: s1 });
        }
        let mut out = Vec::new();
        let first = (s0.floor() as usize).min(self.segments.len() - 1);
        let last = (s1.ceil() as usize).clamp(first + 1, self.segments.len());
        for k in first..last {
            let lo = (s0 - k as f64).clamp(0.0, 1.0);
            let hi = (s1 - k as f64).clamp(0.0, 1.0);
            if hi - lo <= 1e-12 {
                continue;
            }
            let (t0, t1) = self.segments[k].domain();
            let seg = &self.segments[k];
            if lo <= 0.0 && hi >= 1.0 {
                out.push(seg.clone());
            } else {
                out.push(seg.sub_curve(t0 + (t1 - t0) * lo, t0 + (t1 - t0) * hi)?);
            }
        }
        if out.is_empty() {
            return Err(BooleanError::InvalidInterval { start: s0, end: s1 });
        }
        Ok(out)
    }

    pub fn bbox_diagonal(&self, samples: usize) -> f64 {
        super::membership::loop_bounding_box(&self.segments, samples).diagonal()
    }

    fn append(&mut self, other: LinkedCurve) {
        let gap = self.end().distance_to(&other.start());
        if gap > BRIDGE_EPS {
            self.segments.push(Curve2d::line(self.end(), other.start()));
        }
        self.segments.extend(other.segments);
    }

    fn update_closed(&mut self, tol: f64, samples: usize) {
        self.closed = self.start().distance_to(&self.end()) <= tol && self.bbox_diagonal(samples) > tol;
    }
}

/// Join fragments end to end until no more joins are possible. Overlapping
/// single fragments are resolved first: a fragment inside another is dropped,
/// an end overlap is trimmed off the shorter one, and interior overlaps are
/// left alone.
#[instrument(skip_all, fields(count = curves.len()))]
pub fn link_curves(
    curves: Vec<LinkedCurve>,
    oracle: &dyn GeometryOracle,
    tol: f64,
    samples: usize,
) -> Vec<LinkedCurve> {
    let mut slots: Vec<Option<LinkedCurve>> = curves.into_iter().map(Some).collect();
    for c in slots.iter_mut().flatten() {
        c.update_closed(tol, samples);
    }

    resolve_overlaps(&mut slots, oracle, tol, samples);

    loop {
        let mut joined = false;
        'search: for i in 0..slots.len() {
            for j in 0..slots.len() {
                if i == j {
                    continue;
                }
                let (Some(a), Some(b)) = (&slots[i], &slots[j]) else {
                    continue;
                };
                if a.closed || b.closed {
                    continue;
                }
                if let Some(mut merged) = try_join(a, b, tol) {
                    merged.update_closed(tol, samples);
                    slots[i] = Some(merged);
                    slots[j] = None;
                    joined = true;
                    break 'search;
                }
            }
        }
        if !joined {
            break;
        }
    }

    let linked: Vec<LinkedCurve> = slots.into_iter().flatten().collect();
    debug!(
        linked = linked.len(),
        closed = linked.iter().filter(|c| c.closed).count(),
        "linked intersection curves"
    );
    linked
}

fn try_join(a: &LinkedCurve, b: &LinkedCurve, tol: f64) -> Option<LinkedCurve> {
    let close = |p: Point2d, q: Point2d| p.distance_to(&q) <= tol;
    let (mut head, tail) = if close(a.end(), b.start()) {
        (a.clone(), b.clone())
    } else if close(b.end(), a.start()) {
        (b.clone(), a.clone())
    } else if close(a.end(), b.end()) {
        (a.clone(), b.reversed())
    } else if close(a.start(), b.start()) {
        (a.reversed(), b.clone())
    } else {
        return None;
    };
    head.append(tail);
    Some(head)
}

fn resolve_overlaps(slots: &mut [Option<LinkedCurve>], oracle: &dyn GeometryOracle, tol: f64, samples: usize) {
    for i in 0..slots.len() {
        for j in (i + 1)..slots.len() {
            let (Some(a), Some(b)) = (&slots[i], &slots[j]) else {
                continue;
            };
            if a.len() != 1 || b.len() != 1 || a.closed || b.closed {
                continue;
            }
            let (ca, cb) = (&a.segments[0], &b.segments[0]);
            let Some((ra, rb)) = oracle.curve_curve(ca, cb, tol).into_iter().find_map(|e| match e {
                CurveEvent::Overlap { a, b } => Some((a, b)),
                _ => None,
            }) else {
                continue;
            };

            let covers = |c: &Curve2d, r: (f64, f64)| {
                c.point_at(r.0).distance_to(&c.start()) <= tol && c.point_at(r.1).distance_to(&c.end()) <= tol
            };
            if covers(ca, ra) {
                debug!(dropped = i, kept = j, "fragment contained in another");
                slots[i] = None;
                continue;
            }
            if covers(cb, rb) {
                debug!(dropped = j, kept = i, "fragment contained in another");
                slots[j] = None;
                continue;
            }

            let at_end = |c: &Curve2d, r: (f64, f64)| {
                c.point_at(r.0).distance_to(&c.start()) <= tol || c.point_at(r.1).distance_to(&c.end()) <= tol
            };
            if !(at_end(ca, ra) && at_end(cb, rb)) {
                warn!(i, j, "fragments overlap in their interiors; left unlinked");
                continue;
            }

            // Trim the shorter fragment so the two meet at one point.
            let (idx, c, r) = if a.bbox_diagonal(samples) <= b.bbox_diagonal(samples) {
                (i, ca, ra)
            } else {
                (j, cb, rb)
            };
            let (t0, t1) = c.domain();
            let remainder = if c.point_at(r.0).distance_to(&c.start()) <= tol {
                c.sub_curve(r.1, t1)
            } else {
                c.sub_curve(t0, r.0)
            };
            match remainder {
                Ok(rest) => {
                    debug!(fragment = idx, "trimmed end overlap");
                    slots[idx] = Some(LinkedCurve::single(rest));
                }
                Err(e) => {
                    warn!(fragment = idx, error = %e, "could not trim overlapping fragment");
                }
            }
        }
    }
}
