//! Operand layouts shared by the backends.
//!
//! All matrices are dense and row-major. A transposed operand is expressed as swapped
//! strides so that a single kernel call covers every combination of transpose flags.

use crate::{dtype::Dtype, error::BlasError};

/// Whether an operand is used as stored or transposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transpose {
    /// Use the operand as stored.
    NoTrans,
    /// Use the transpose of the stored operand.
    Trans,
}

/// A validated `C = alpha * op(A) * op(B) + beta * C` problem.
///
/// `op(A)` is `m x k`, `op(B)` is `k x n`, `C` is `m x n` and always row-major with
/// row stride `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GemmLayout {
    pub m: usize,
    pub k: usize,
    pub n: usize,
    pub rsa: isize,
    pub csa: isize,
    pub rsb: isize,
    pub csb: isize,
}

fn check(operand: &'static str, required: usize, actual: usize) -> Result<(), BlasError> {
    if actual < required {
        return Err(BlasError::DimensionMismatch {
            operand,
            required,
            actual,
        });
    }
    Ok(())
}

impl GemmLayout {
    /// Layout of a matrix-matrix product.
    #[allow(clippy::too_many_arguments)]
    pub fn gemm(
        trans_a: Transpose,
        trans_b: Transpose,
        m: usize,
        n: usize,
        k: usize,
        a_len: usize,
        b_len: usize,
        c_len: usize,
    ) -> Result<Self, BlasError> {
        check("a", m * k, a_len)?;
        check("b", k * n, b_len)?;
        check("c", m * n, c_len)?;
        let (rsa, csa) = match trans_a {
            Transpose::NoTrans => (k as isize, 1),
            Transpose::Trans => (1, m as isize),
        };
        let (rsb, csb) = match trans_b {
            Transpose::NoTrans => (n as isize, 1),
            Transpose::Trans => (1, k as isize),
        };
        Ok(Self {
            m,
            k,
            n,
            rsa,
            csa,
            rsb,
            csb,
        })
    }

    /// Layout of `y = alpha * op(A) * x + beta * y` for a stored `m x n` matrix `A`,
    /// expressed as a product with a single output column.
    pub fn gemv(
        trans_a: Transpose,
        m: usize,
        n: usize,
        a_len: usize,
        x_len: usize,
        y_len: usize,
    ) -> Result<Self, BlasError> {
        check("a", m * n, a_len)?;
        let (rows, cols, rsa, csa) = match trans_a {
            Transpose::NoTrans => (m, n, n as isize, 1),
            Transpose::Trans => (n, m, 1, n as isize),
        };
        check("x", cols, x_len)?;
        check("y", rows, y_len)?;
        Ok(Self {
            m: rows,
            k: cols,
            n: 1,
            rsa,
            csa,
            rsb: 1,
            csb: 1,
        })
    }

    /// Runs the product on output rows `[row_start, row_start + c.len() / n)`.
    ///
    /// `c` must hold exactly those rows.
    pub fn run_rows<T: Dtype>(
        &self,
        row_start: usize,
        alpha: T,
        a: &[T],
        b: &[T],
        beta: T,
        c: &mut [T],
    ) {
        let rows = if self.n == 0 { 0 } else { c.len() / self.n };
        if rows == 0 {
            return;
        }
        if self.k == 0 {
            // empty reduction: only the beta term remains
            for v in c.iter_mut() {
                *v = if beta == T::zero() { T::zero() } else { *v * beta };
            }
            return;
        }
        let a_offset = row_start as isize * self.rsa;
        // SAFETY: the layout was validated against the full operand lengths and the chunk
        // only addresses rows inside it.
        unsafe {
            T::gemm_kernel(
                rows,
                self.k,
                self.n,
                alpha,
                a.as_ptr().offset(a_offset),
                self.rsa,
                self.csa,
                b.as_ptr(),
                self.rsb,
                self.csb,
                beta,
                c.as_mut_ptr(),
                self.n as isize,
                1,
            );
        }
    }

    /// Number of output elements.
    pub fn output_len(&self) -> usize {
        self.m * self.n
    }
}
