//! Backend abstraction for dense linear algebra.
//!
//! A [`Backend`] computes on buffers resident on one [`Device`]. Layers hold a shared handle
//! to one backend and ask their blobs for views on [`Backend::device`], so the same layer
//! code runs on host or device memory.

use caffeine_blob::Device;
use rayon::prelude::*;

use crate::{
    dtype::Dtype,
    error::BlasError,
    gemm::{GemmLayout, Transpose},
};

/// Backend trait defining the numeric primitives layers delegate to.
///
/// All matrices are dense and row-major. Implementations must agree numerically: given the
/// same inputs, results may differ only by floating point rounding.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so a handle can be shared between layers.
pub trait Backend<T: Dtype>: Send + Sync {
    /// Returns the device whose memory this backend reads and writes.
    fn device(&self) -> Device;

    /// Computes `C = alpha * op(A) * op(B) + beta * C`.
    ///
    /// `op(A)` is `m x k`, `op(B)` is `k x n` and `C` is `m x n`. With `beta` zero the
    /// previous contents of `C` are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if an operand is too small for the dimensions.
    #[allow(clippy::too_many_arguments)]
    fn gemm(
        &self,
        trans_a: Transpose,
        trans_b: Transpose,
        m: usize,
        n: usize,
        k: usize,
        alpha: T,
        a: &[T],
        b: &[T],
        beta: T,
        c: &mut [T],
    ) -> Result<(), BlasError>;

    /// Computes `y = alpha * op(A) * x + beta * y` for a stored `m x n` matrix `A`.
    ///
    /// # Errors
    ///
    /// Returns an error if an operand is too small for the dimensions.
    #[allow(clippy::too_many_arguments)]
    fn gemv(
        &self,
        trans_a: Transpose,
        m: usize,
        n: usize,
        alpha: T,
        a: &[T],
        x: &[T],
        beta: T,
        y: &mut [T],
    ) -> Result<(), BlasError>;

    /// Calls `f(row_index, row)` for every `row_len`-sized row of `out`.
    ///
    /// Rows may be visited concurrently; `f` must only depend on its arguments and on
    /// shared state it captures by reference.
    fn for_each_row(&self, out: &mut [T], row_len: usize, f: &(dyn Fn(usize, &mut [T]) + Sync));

    /// Waits for all pending work on the device.
    ///
    /// Both backends in this crate finish their work before returning, so this is a no-op
    /// for them.
    fn synchronize(&self) -> Result<(), BlasError> {
        Ok(())
    }
}

/// Host backend running every kernel on the calling thread.
#[derive(Clone, Debug, Default)]
pub struct CpuBackend;

impl CpuBackend {
    /// Creates a new host backend.
    pub fn new() -> Self {
        Self
    }
}

impl<T: Dtype> Backend<T> for CpuBackend {
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn gemm(
        &self,
        trans_a: Transpose,
        trans_b: Transpose,
        m: usize,
        n: usize,
        k: usize,
        alpha: T,
        a: &[T],
        b: &[T],
        beta: T,
        c: &mut [T],
    ) -> Result<(), BlasError> {
        let layout = GemmLayout::gemm(trans_a, trans_b, m, n, k, a.len(), b.len(), c.len())?;
        layout.run_rows(0, alpha, a, b, beta, &mut c[..layout.output_len()]);
        Ok(())
    }

    fn gemv(
        &self,
        trans_a: Transpose,
        m: usize,
        n: usize,
        alpha: T,
        a: &[T],
        x: &[T],
        beta: T,
        y: &mut [T],
    ) -> Result<(), BlasError> {
        let layout = GemmLayout::gemv(trans_a, m, n, a.len(), x.len(), y.len())?;
        layout.run_rows(0, alpha, a, x, beta, &mut y[..layout.output_len()]);
        Ok(())
    }

    fn for_each_row(&self, out: &mut [T], row_len: usize, f: &(dyn Fn(usize, &mut [T]) + Sync)) {
        if row_len == 0 {
            return;
        }
        out.chunks_exact_mut(row_len)
            .enumerate()
            .for_each(|(i, row)| f(i, row));
    }
}

/// Device backend computing on device memory with a dedicated worker pool.
///
/// Output rows are split into chunks, each chunk runs the same kernel as [`CpuBackend`],
/// and every call joins all chunks before returning.
pub struct ParallelBackend {
    pool: rayon::ThreadPool,
    min_rows_per_task: usize,
}

impl ParallelBackend {
    /// Creates a backend with `num_threads` workers, or one per core when zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker pool cannot be started.
    pub fn new(num_threads: usize) -> Result<Self, BlasError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("caffeine-parallel-{i}"))
            .build()
            .map_err(|e| BlasError::DeviceInit(e.to_string()))?;
        log::debug!(
            "parallel backend started with {} threads",
            pool.current_num_threads()
        );
        Ok(Self {
            pool,
            min_rows_per_task: 1,
        })
    }

    /// Sets the smallest number of output rows a single task computes.
    pub fn with_min_rows_per_task(mut self, rows: usize) -> Self {
        self.min_rows_per_task = rows.max(1);
        self
    }

    /// Returns the number of worker threads.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn rows_per_task(&self, rows: usize) -> usize {
        rows.div_ceil(self.num_threads()).max(self.min_rows_per_task)
    }

    fn run<T: Dtype>(&self, layout: GemmLayout, alpha: T, a: &[T], b: &[T], beta: T, c: &mut [T]) {
        if layout.n == 0 || layout.m == 0 {
            return;
        }
        let rows_per_task = self.rows_per_task(layout.m);
        let c = &mut c[..layout.output_len()];
        self.pool.install(|| {
            c.par_chunks_mut(rows_per_task * layout.n)
                .enumerate()
                .for_each(|(i, chunk)| {
                    layout.run_rows(i * rows_per_task, alpha, a, b, beta, chunk);
                });
        });
    }
}

impl std::fmt::Debug for ParallelBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelBackend")
            .field("num_threads", &self.num_threads())
            .field("min_rows_per_task", &self.min_rows_per_task)
            .finish()
    }
}

impl<T: Dtype> Backend<T> for ParallelBackend {
    fn device(&self) -> Device {
        Device::Parallel
    }

    fn gemm(
        &self,
        trans_a: Transpose,
        trans_b: Transpose,
        m: usize,
        n: usize,
        k: usize,
        alpha: T,
        a: &[T],
        b: &[T],
        beta: T,
        c: &mut [T],
    ) -> Result<(), BlasError> {
        let layout = GemmLayout::gemm(trans_a, trans_b, m, n, k, a.len(), b.len(), c.len())?;
        self.run(layout, alpha, a, b, beta, c);
        Ok(())
    }

    fn gemv(
        &self,
        trans_a: Transpose,
        m: usize,
        n: usize,
        alpha: T,
        a: &[T],
        x: &[T],
        beta: T,
        y: &mut [T],
    ) -> Result<(), BlasError> {
        let layout = GemmLayout::gemv(trans_a, m, n, a.len(), x.len(), y.len())?;
        self.run(layout, alpha, a, x, beta, y);
        Ok(())
    }

    fn for_each_row(&self, out: &mut [T], row_len: usize, f: &(dyn Fn(usize, &mut [T]) + Sync)) {
        if row_len == 0 {
            return;
        }
        self.pool.install(|| {
            out.par_chunks_exact_mut(row_len)
                .enumerate()
                .for_each(|(i, row)| f(i, row));
        });
    }
}
