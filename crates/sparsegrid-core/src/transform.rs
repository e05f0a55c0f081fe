//! Grid transforms and the packed index-to-object layout.

use bytemuck::{Pod, Zeroable};
use glam::{Affine3A, DMat4, DVec3, DVec4, Mat3, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Map from grid index space to object space.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GridTransform {
    /// Affine matrix acting on column vectors; translation in the last column.
    Linear(DMat4),
    /// Any other map (frustum, warped, ...), named by its kind.
    NonLinear { kind: String },
}

impl Default for GridTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl GridTransform {
    /// Index space equals object space.
    pub const IDENTITY: Self = Self::Linear(DMat4::IDENTITY);

    /// Cubic voxels of edge `voxel_size`.
    pub fn uniform_scale(voxel_size: f64) -> Self {
        Self::Linear(DMat4::from_scale(DVec3::splat(voxel_size)))
    }

    /// Per-axis scale followed by a translation.
    pub fn scale_translation(scale: DVec3, translation: DVec3) -> Self {
        Self::Linear(DMat4::from_translation(translation) * DMat4::from_scale(scale))
    }

    /// Returns true for an affine matrix with finite entries.
    pub fn is_linear(&self) -> bool {
        match self {
            Self::Linear(matrix) => is_affine(matrix),
            Self::NonLinear { .. } => false,
        }
    }

    /// Extract the packed index-to-object layout.
    pub fn index_to_object(&self) -> Result<IndexToObject> {
        match self {
            Self::Linear(matrix) if is_affine(matrix) => Ok(IndexToObject::from_matrix(matrix)),
            Self::Linear(_) => Err(Error::NonLinearTransform {
                kind: "projective matrix".to_string(),
            }),
            Self::NonLinear { kind } => Err(Error::NonLinearTransform { kind: kind.clone() }),
        }
    }
}

fn is_affine(matrix: &DMat4) -> bool {
    matrix.row(3) == DVec4::W && matrix.is_finite()
}

/// Index-to-object transform as 12 floats: the 3x3 linear block in row-major
/// order, then the translation.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(transparent)]
pub struct IndexToObject(pub [f32; 12]);

impl Default for IndexToObject {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl IndexToObject {
    /// Identity transform.
    pub const IDENTITY: Self = Self([
        1.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, //
        0.0, 0.0, 1.0, //
        0.0, 0.0, 0.0,
    ]);

    /// Transpose a column-major 4x4 affine matrix into the packed layout.
    pub fn from_matrix(matrix: &DMat4) -> Self {
        let m = matrix.to_cols_array();
        Self([
            m[0] as f32,
            m[4] as f32,
            m[8] as f32,
            m[1] as f32,
            m[5] as f32,
            m[9] as f32,
            m[2] as f32,
            m[6] as f32,
            m[10] as f32,
            m[12] as f32,
            m[13] as f32,
            m[14] as f32,
        ])
    }

    /// The packed floats.
    #[inline]
    pub const fn as_array(&self) -> &[f32; 12] {
        &self.0
    }

    /// Linear block.
    pub fn linear(&self) -> Mat3 {
        let a = &self.0;
        Mat3::from_cols_array(&[a[0], a[1], a[2], a[3], a[4], a[5], a[6], a[7], a[8]]).transpose()
    }

    /// Translation.
    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.0[9], self.0[10], self.0[11])
    }

    /// As a glam affine transform.
    pub fn to_affine(&self) -> Affine3A {
        Affine3A::from_mat3_translation(self.linear(), self.translation())
    }

    /// Map an index-space point to object space.
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.linear() * point + self.translation()
    }
}
