//! Spherical geometry helpers for directions on the unit sphere.

pub mod sphere;
