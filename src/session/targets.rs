//! Target markers shown on the operator display

use crate::error::{Result, SessionError};
use crate::geometry::{DisplayGeometry, Rect};
use serde::Serialize;

/// Outline used when drawing a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Shape {
    Oval,
    Rect,
}

/// A marker region in primary-surface pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub rect: Rect,
    pub shape: Shape,
}

/// Where a target goes, in degrees of visual angle from the screen center
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// Center point; needs a radius
    At { x: f64, y: f64 },
    /// `[left, top, right, bottom]`; used as-is
    Bounds([f64; 4]),
}

impl Placement {
    pub fn at(x: f64, y: f64) -> Self {
        Self::At { x, y }
    }
}

/// Convert a batch of placements into clamped pixel targets.
///
/// With a radius every placement must be a point and becomes an oval; without
/// one every placement must already be a rectangle.
pub fn resolve(
    geometry: &DisplayGeometry,
    placements: &[Placement],
    radius_deg: Option<f64>,
) -> Result<Vec<Target>> {
    if let Some(r) = radius_deg {
        if !(r >= 0.0) {
            return Err(SessionError::invalid(format!("target radius {} is negative", r)));
        }
    }

    placements
        .iter()
        .enumerate()
        .map(|(i, placement)| {
            let (rect, shape) = match (placement, radius_deg) {
                (Placement::At { x, y }, Some(r)) => {
                    let center = geometry.degrees_to_point(*x, *y);
                    (Rect::around(center, geometry.angle_to_pixels(r)), Shape::Oval)
                }
                (Placement::Bounds([l, t, r, b]), None) => {
                    let top_left = geometry.degrees_to_point(*l, *t);
                    let bottom_right = geometry.degrees_to_point(*r, *b);
                    (
                        Rect::new(top_left.x, top_left.y, bottom_right.x, bottom_right.y),
                        Shape::Rect,
                    )
                }
                (Placement::At { .. }, None) => {
                    return Err(SessionError::invalid(format!(
                        "target {} is a point but no radius was given",
                        i
                    )))
                }
                (Placement::Bounds(_), Some(_)) => {
                    return Err(SessionError::invalid(format!(
                        "target {} is a rectangle but a radius was given",
                        i
                    )))
                }
            };
            Ok(Target {
                rect: geometry.clamp_rect(rect),
                shape,
            })
        })
        .collect()
}

/// Ordered list of targets; order only affects draw order
#[derive(Debug, Clone, Default)]
pub struct TargetStore {
    targets: Vec<Target>,
}

impl TargetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, targets: Vec<Target>) {
        self.targets.extend(targets);
    }

    pub fn clear(&mut self) {
        self.targets.clear();
    }

    pub fn as_slice(&self) -> &[Target] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
