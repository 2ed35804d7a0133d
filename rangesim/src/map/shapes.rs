//! Primitive meshes, each centred on the origin of its local frame with outward facing triangles.

use super::Mesh;
use crate::Point3;
use std::f64::consts::PI;
use std::sync::Arc;

impl Mesh {
    /// A UV sphere made of `n_lat` bands between the poles, each split into `n_long` segments.
    /// Both counts are clamped to a minimum of 3.
    ///
    /// # Arguments
    ///
    /// * `radius`: radius of the vertices from the centre
    /// * `n_long`: number of segments around the z axis
    /// * `n_lat`: number of bands from pole to pole
    ///
    /// returns: Arc<Mesh>
    pub fn sphere(radius: f64, n_long: usize, n_lat: usize) -> Arc<Mesh> {
        let n_long = n_long.max(3);
        let n_lat = n_lat.max(3);

        let mut vertices = vec![Point3::new(0.0, 0.0, radius)];
        for i in 1..n_lat {
            let theta = PI * i as f64 / n_lat as f64;
            let (s, c) = theta.sin_cos();
            for j in 0..n_long {
                let phi = 2.0 * PI * j as f64 / n_long as f64;
                vertices.push(Point3::new(
                    radius * s * phi.cos(),
                    radius * s * phi.sin(),
                    radius * c,
                ));
            }
        }
        vertices.push(Point3::new(0.0, 0.0, -radius));

        let south = (vertices.len() - 1) as u32;
        let ring = |i: usize, j: usize| (1 + (i - 1) * n_long + j % n_long) as u32;

        let mut faces = Vec::with_capacity(2 * n_long * (n_lat - 1));
        for j in 0..n_long {
            faces.push([0, ring(1, j), ring(1, j + 1)]);
        }
        for i in 1..n_lat - 1 {
            for j in 0..n_long {
                let a = ring(i, j);
                let b = ring(i + 1, j);
                let c = ring(i + 1, j + 1);
                let d = ring(i, j + 1);
                faces.push([a, b, c]);
                faces.push([a, c, d]);
            }
        }
        for j in 0..n_long {
            faces.push([ring(n_lat - 1, j), south, ring(n_lat - 1, j + 1)]);
        }

        Mesh::from_parts(vertices, faces, None)
    }

    /// An axis aligned cube with an edge length of 1.
    pub fn cube() -> Arc<Mesh> {
        let vertices = vec![
            Point3::new(-0.5, -0.5, -0.5),
            Point3::new(0.5, -0.5, -0.5),
            Point3::new(0.5, 0.5, -0.5),
            Point3::new(-0.5, 0.5, -0.5),
            Point3::new(-0.5, -0.5, 0.5),
            Point3::new(0.5, -0.5, 0.5),
            Point3::new(0.5, 0.5, 0.5),
            Point3::new(-0.5, 0.5, 0.5),
        ];
        let faces = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 6, 2],
            [3, 7, 6],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ];
        Mesh::from_parts(vertices, faces, None)
    }

    /// A unit square in the xy plane facing +z.
    pub fn plane() -> Arc<Mesh> {
        let vertices = vec![
            Point3::new(-0.5, -0.5, 0.0),
            Point3::new(0.5, -0.5, 0.0),
            Point3::new(0.5, 0.5, 0.0),
            Point3::new(-0.5, 0.5, 0.0),
        ];
        Mesh::from_parts(vertices, vec![[0, 1, 2], [0, 2, 3]], None)
    }

    /// A closed cylinder along z with a radius of 0.5 and a height of 1, approximated with
    /// `n_sides` (at least 3) side segments.
    pub fn cylinder(n_sides: usize) -> Arc<Mesh> {
        let n = n_sides.max(3);
        let mut vertices = Vec::with_capacity(2 * n + 2);
        for z in [-0.5, 0.5] {
            for j in 0..n {
                let phi = 2.0 * PI * j as f64 / n as f64;
                vertices.push(Point3::new(0.5 * phi.cos(), 0.5 * phi.sin(), z));
            }
        }
        vertices.push(Point3::new(0.0, 0.0, -0.5));
        vertices.push(Point3::new(0.0, 0.0, 0.5));

        let bottom = |j: usize| (j % n) as u32;
        let top = |j: usize| (n + j % n) as u32;
        let bottom_center = (2 * n) as u32;
        let top_center = (2 * n + 1) as u32;

        let mut faces = Vec::with_capacity(4 * n);
        for j in 0..n {
            faces.push([bottom(j), bottom(j + 1), top(j + 1)]);
            faces.push([bottom(j), top(j + 1), top(j)]);
            faces.push([bottom_center, bottom(j + 1), bottom(j)]);
            faces.push([top_center, top(j), top(j + 1)]);
        }

        Mesh::from_parts(vertices, faces, None)
    }
}
