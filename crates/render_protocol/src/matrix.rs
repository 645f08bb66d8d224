//! Column-major matrix helpers.
//!
//! Tile matrices at high zoom need more precision than `f32` offers, so the
//! arithmetic here runs on `f64` and only the upload form is `f32`.

pub type TransformMatrix4x4 = [f32; 16];

pub type Matrix4x4F64 = [f64; 16];

pub const IDENTITY_MATRIX: TransformMatrix4x4 = [
    1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
];

const IDENTITY_F64: Matrix4x4F64 = [
    1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
];

pub fn identity() -> Matrix4x4F64 {
    IDENTITY_F64
}

pub fn ortho(left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) -> Matrix4x4F64 {
    let lr = 1.0 / (left - right);
    let bt = 1.0 / (bottom - top);
    let nf = 1.0 / (near - far);
    let mut out = [0.0; 16];
    out[0] = -2.0 * lr;
    out[5] = -2.0 * bt;
    out[10] = 2.0 * nf;
    out[12] = (left + right) * lr;
    out[13] = (top + bottom) * bt;
    out[14] = (far + near) * nf;
    out[15] = 1.0;
    out
}

/// `left * right`, so `right` is applied to a vector first.
pub fn multiply(left: &Matrix4x4F64, right: &Matrix4x4F64) -> Matrix4x4F64 {
    let mut out = [0.0; 16];
    for column in 0..4 {
        for row in 0..4 {
            let mut sum = 0.0;
            for k in 0..4 {
                sum += left[k * 4 + row] * right[column * 4 + k];
            }
            out[column * 4 + row] = sum;
        }
    }
    out
}

pub fn rotate_z(matrix: &Matrix4x4F64, radians: f64) -> Matrix4x4F64 {
    let (sine, cosine) = radians.sin_cos();
    let mut rotation = IDENTITY_F64;
    rotation[0] = cosine;
    rotation[1] = sine;
    rotation[4] = -sine;
    rotation[5] = cosine;
    multiply(matrix, &rotation)
}

pub fn translate(matrix: &Matrix4x4F64, x: f64, y: f64, z: f64) -> Matrix4x4F64 {
    let mut translation = IDENTITY_F64;
    translation[12] = x;
    translation[13] = y;
    translation[14] = z;
    multiply(matrix, &translation)
}

pub fn scale(matrix: &Matrix4x4F64, x: f64, y: f64, z: f64) -> Matrix4x4F64 {
    let mut scaling = IDENTITY_F64;
    scaling[0] = x;
    scaling[5] = y;
    scaling[10] = z;
    multiply(matrix, &scaling)
}

pub fn transform_point(matrix: &Matrix4x4F64, x: f64, y: f64) -> (f64, f64) {
    let out_x = matrix[0] * x + matrix[4] * y + matrix[12];
    let out_y = matrix[1] * x + matrix[5] * y + matrix[13];
    let w = matrix[3] * x + matrix[7] * y + matrix[15];
    if w == 0.0 || w == 1.0 {
        return (out_x, out_y);
    }
    (out_x / w, out_y / w)
}

pub fn to_gpu(matrix: &Matrix4x4F64) -> TransformMatrix4x4 {
    matrix.map(|value| value as f32)
}

pub fn from_gpu(matrix: &TransformMatrix4x4) -> Matrix4x4F64 {
    matrix.map(f64::from)
}
