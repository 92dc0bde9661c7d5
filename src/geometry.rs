//! Continuous geometry input: solid-region descriptors mapping position to
//! material parameters.
//!
//! The core never parses a scene file; it consumes either a `Scene` of solid
//! primitives or any user type implementing `MaterialMap`. Overlap follows
//! first-hit-wins ordering, with a background medium behind everything.

use nalgebra::Vector3;

use crate::material::Medium;

/// Anything that can answer "what material is at this continuous position".
pub trait MaterialMap: Sync {
    fn medium_at(&self, p: Vector3<f64>) -> Medium;
}

/// Solid primitive shapes.
#[derive(Debug, Clone)]
pub enum Shape {
    Block {
        center: Vector3<f64>,
        size: Vector3<f64>,
    },
    Sphere {
        center: Vector3<f64>,
        radius: f64,
    },
    /// Axis-aligned cylinder along `axis`.
    Cylinder {
        center: Vector3<f64>,
        radius: f64,
        height: f64,
        axis: usize,
    },
}

impl Shape {
    pub fn contains(&self, p: Vector3<f64>) -> bool {
        match self {
            Shape::Block { center, size } => (0..3).all(|a| {
                let half = size[a] / 2.0;
                (p[a] - center[a]).abs() <= half
            }),
            Shape::Sphere { center, radius } => (p - center).norm() <= *radius,
            Shape::Cylinder {
                center,
                radius,
                height,
                axis,
            } => {
                let d = p - center;
                if d[*axis].abs() > height / 2.0 {
                    return false;
                }
                let mut r2 = 0.0;
                for a in 0..3 {
                    if a != *axis {
                        r2 += d[a] * d[a];
                    }
                }
                r2 <= radius * radius
            }
        }
    }
}

/// One solid object with its material.
#[derive(Debug, Clone)]
pub struct Solid {
    pub shape: Shape,
    pub medium: Medium,
}

/// A list of solids over a background medium. Earlier objects shadow later
/// ones where they overlap.
#[derive(Debug, Clone)]
pub struct Scene {
    pub background: Medium,
    pub objects: Vec<Solid>,
}

impl Scene {
    pub fn new(background: Medium) -> Self {
        Self {
            background,
            objects: Vec::new(),
        }
    }

    pub fn vacuum() -> Self {
        Self::new(Medium::vacuum())
    }

    pub fn push(&mut self, shape: Shape, medium: Medium) -> &mut Self {
        self.objects.push(Solid { shape, medium });
        self
    }
}

impl MaterialMap for Scene {
    fn medium_at(&self, p: Vector3<f64>) -> Medium {
        for obj in &self.objects {
            if obj.shape.contains(p) {
                return obj.medium;
            }
        }
        self.background
    }
}

/// Wrap a plain closure as a material map.
pub struct FnMaterial<F>(pub F);

impl<F> MaterialMap for FnMaterial<F>
where
    F: Fn(Vector3<f64>) -> Medium + Sync,
{
    fn medium_at(&self, p: Vector3<f64>) -> Medium {
        self.0(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_object_wins_on_overlap() {
        let mut scene = Scene::vacuum();
        scene.push(
            Shape::Sphere {
                center: Vector3::new(0.0, 0.0, 0.0),
                radius: 1.0,
            },
            Medium::dielectric(12.0),
        );
        scene.push(
            Shape::Block {
                center: Vector3::new(0.0, 0.0, 0.0),
                size: Vector3::new(4.0, 4.0, 4.0),
            },
            Medium::dielectric(2.0),
        );
        let inside = scene.medium_at(Vector3::new(0.1, 0.0, 0.0));
        assert!((inside.epsilon - 12.0).abs() < 1e-12, "sphere shadows block");
        let ring = scene.medium_at(Vector3::new(1.5, 0.0, 0.0));
        assert!((ring.epsilon - 2.0).abs() < 1e-12);
        let outside = scene.medium_at(Vector3::new(3.0, 0.0, 0.0));
        assert!((outside.epsilon - 1.0).abs() < 1e-12);
    }

    #[test]
    fn cylinder_extent_checks_both_radius_and_height() {
        let cyl = Shape::Cylinder {
            center: Vector3::new(0.0, 0.0, 0.0),
            radius: 1.0,
            height: 2.0,
            axis: 2,
        };
        assert!(cyl.contains(Vector3::new(0.5, 0.5, 0.9)));
        assert!(!cyl.contains(Vector3::new(0.5, 0.5, 1.1)));
        assert!(!cyl.contains(Vector3::new(0.9, 0.9, 0.0)));
    }
}
