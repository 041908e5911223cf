use num_traits::Float;

/// Scalar types the backends can multiply.
///
/// Implemented for `f32` and `f64`, each dispatching to the matching `matrixmultiply`
/// kernel.
pub trait Dtype: Float + Default + Send + Sync + std::fmt::Debug + 'static {
    /// Computes `C = alpha * A * B + beta * C` on strided row/column layouts.
    ///
    /// # Safety
    ///
    /// Every pointer must be valid for all elements the dimensions and strides address.
    /// When `beta` is zero `C` is not read.
    #[allow(clippy::too_many_arguments)]
    unsafe fn gemm_kernel(
        m: usize,
        k: usize,
        n: usize,
        alpha: Self,
        a: *const Self,
        rsa: isize,
        csa: isize,
        b: *const Self,
        rsb: isize,
        csb: isize,
        beta: Self,
        c: *mut Self,
        rsc: isize,
        csc: isize,
    );
}

impl Dtype for f32 {
    unsafe fn gemm_kernel(
        m: usize,
        k: usize,
        n: usize,
        alpha: f32,
        a: *const f32,
        rsa: isize,
        csa: isize,
        b: *const f32,
        rsb: isize,
        csb: isize,
        beta: f32,
        c: *mut f32,
        rsc: isize,
        csc: isize,
    ) {
        matrixmultiply::sgemm(
            m, k, n, alpha, a, rsa, csa, b, rsb, csb, beta, c, rsc, csc,
        );
    }
}

impl Dtype for f64 {
    unsafe fn gemm_kernel(
        m: usize,
        k: usize,
        n: usize,
        alpha: f64,
        a: *const f64,
        rsa: isize,
        csa: isize,
        b: *const f64,
        rsb: isize,
        csb: isize,
        beta: f64,
        c: *mut f64,
        rsc: isize,
        csc: isize,
    ) {
        matrixmultiply::dgemm(
            m, k, n, alpha, a, rsa, csa, b, rsb, csb, beta, c, rsc, csc,
        );
    }
}
