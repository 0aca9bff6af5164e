#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
#[cfg(feature = "rayon")]
use std::sync::Arc;

use crate::error::OpsError;

/// Controls how the units of work of an operator are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionStrategy {
    /// Use the global Rayon thread pool and process every unit of work in parallel.
    #[default]
    Parallel,

    /// Run sequentially on the current thread.
    ///
    /// This is the portable reference backend, useful for small inputs and debugging.
    Serial,

    /// Run on a dedicated thread pool with `n` threads.
    ///
    /// The pool is built once when the [`ExecutionContext`] is created.
    Fixed(usize),
}

#[derive(Clone)]
enum Backend {
    Serial,
    #[cfg(feature = "rayon")]
    Global,
    #[cfg(feature = "rayon")]
    Pool(Arc<rayon::ThreadPool>),
}

/// The execution context passed explicitly to every operator.
///
/// It owns the compute backend: the serial CPU reference, or, with the `rayon` feature
/// enabled, the Rayon global pool or a dedicated pool. Every unit of work writes only to
/// the output slab it owns, so results are identical across backends.
#[derive(Clone)]
pub struct ExecutionContext {
    strategy: ExecutionStrategy,
    backend: Backend,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("strategy", &self.strategy)
            .field("backend", &self.backend_name())
            .finish()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        let backend = {
            #[cfg(feature = "rayon")]
            {
                Backend::Global
            }
            #[cfg(not(feature = "rayon"))]
            {
                Backend::Serial
            }
        };
        Self {
            strategy: ExecutionStrategy::Parallel,
            backend,
        }
    }
}

impl ExecutionContext {
    /// Create a new execution context for the given strategy.
    ///
    /// Without the `rayon` feature every strategy falls back to serial execution.
    ///
    /// # Errors
    ///
    /// Returns an error if a fixed pool is requested with zero threads or fails to build.
    pub fn new(strategy: ExecutionStrategy) -> Result<Self, OpsError> {
        let backend = match strategy {
            ExecutionStrategy::Serial => Backend::Serial,
            ExecutionStrategy::Fixed(0) => {
                return Err(OpsError::InvalidParameter {
                    name: "num_threads",
                    reason: "thread count must be > 0".to_string(),
                })
            }
            #[cfg(feature = "rayon")]
            ExecutionStrategy::Parallel => Backend::Global,
            #[cfg(feature = "rayon")]
            ExecutionStrategy::Fixed(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| OpsError::Parallel(e.to_string()))?;
                log::debug!("built a dedicated pool with {n} threads");
                Backend::Pool(Arc::new(pool))
            }
            #[cfg(not(feature = "rayon"))]
            _ => {
                log::debug!("rayon backend disabled, running {strategy:?} serially");
                Backend::Serial
            }
        };
        Ok(Self { strategy, backend })
    }

    /// The serial CPU reference context.
    pub fn serial() -> Self {
        Self {
            strategy: ExecutionStrategy::Serial,
            backend: Backend::Serial,
        }
    }

    /// The strategy the context was created with.
    pub fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    /// A short name of the backend that actually runs the work.
    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Serial => "serial",
            #[cfg(feature = "rayon")]
            Backend::Global => "rayon-global",
            #[cfg(feature = "rayon")]
            Backend::Pool(_) => "rayon-pool",
        }
    }

    /// Evaluate `op` for every unit of work `0..n` and collect the results in order.
    pub fn map<R, F>(&self, n: usize, op: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize) -> R + Send + Sync,
    {
        match &self.backend {
            Backend::Serial => (0..n).map(op).collect(),
            #[cfg(feature = "rayon")]
            Backend::Global => (0..n).into_par_iter().map(op).collect(),
            #[cfg(feature = "rayon")]
            Backend::Pool(pool) => pool.install(|| (0..n).into_par_iter().map(&op).collect()),
        }
    }

    /// Run `op` on every `width`-sized slab of `dst`, passing the slab index.
    ///
    /// `dst` must hold exactly `n * width` elements.
    pub fn for_each_slab<T, F>(&self, dst: &mut [T], n: usize, width: usize, op: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Send + Sync,
    {
        self.run(slabs(dst, n, width), |i, slab| op(i, slab));
    }

    /// Run `op` on every element of `dst`, passing the element index.
    ///
    /// Unlike [`Self::for_each_slab`] this allocates nothing, which suits loops that
    /// update the same buffer many times.
    pub fn for_each_mut<T, F>(&self, dst: &mut [T], op: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Send + Sync,
    {
        match &self.backend {
            Backend::Serial => dst.iter_mut().enumerate().for_each(|(i, v)| op(i, v)),
            #[cfg(feature = "rayon")]
            Backend::Global => dst.par_iter_mut().enumerate().for_each(|(i, v)| op(i, v)),
            #[cfg(feature = "rayon")]
            Backend::Pool(pool) => {
                pool.install(|| dst.par_iter_mut().enumerate().for_each(|(i, v)| op(i, v)))
            }
        }
    }

    /// Run `op` on matching slabs of two output buffers, passing the slab index.
    pub fn for_each_slab2<T, U, F>(
        &self,
        (a, width_a): (&mut [T], usize),
        (b, width_b): (&mut [U], usize),
        n: usize,
        op: F,
    ) where
        T: Send,
        U: Send,
        F: Fn(usize, &mut [T], &mut [U]) + Send + Sync,
    {
        let items: Vec<_> = slabs(a, n, width_a)
            .into_iter()
            .zip(slabs(b, n, width_b))
            .collect();
        self.run(items, |i, (sa, sb)| op(i, sa, sb));
    }

    /// Find the index of the largest value, the lowest index winning ties.
    ///
    /// NaN values are never selected unless every value is NaN.
    pub fn argmax(&self, values: &[f32]) -> Option<usize> {
        let pick = |a: (usize, f32), b: (usize, f32)| -> (usize, f32) {
            if b.1 > a.1 || (b.1 == a.1 && b.0 < a.0) || (a.1.is_nan() && !b.1.is_nan()) {
                b
            } else {
                a
            }
        };
        let best = match &self.backend {
            Backend::Serial => values.iter().copied().enumerate().reduce(pick),
            #[cfg(feature = "rayon")]
            Backend::Global => values.par_iter().copied().enumerate().reduce_with(pick),
            #[cfg(feature = "rayon")]
            Backend::Pool(pool) => {
                pool.install(|| values.par_iter().copied().enumerate().reduce_with(pick))
            }
        };
        best.map(|(i, _)| i)
    }

    fn run<I, F>(&self, items: Vec<I>, op: F)
    where
        I: Send,
        F: Fn(usize, I) + Send + Sync,
    {
        match &self.backend {
            Backend::Serial => items
                .into_iter()
                .enumerate()
                .for_each(|(i, item)| op(i, item)),
            #[cfg(feature = "rayon")]
            Backend::Global => items
                .into_par_iter()
                .enumerate()
                .for_each(|(i, item)| op(i, item)),
            #[cfg(feature = "rayon")]
            Backend::Pool(pool) => pool.install(|| {
                items
                    .into_par_iter()
                    .enumerate()
                    .for_each(|(i, item)| op(i, item))
            }),
        }
    }
}

/// Split a buffer into `n` disjoint mutable slabs of `width` elements.
fn slabs<T>(buf: &mut [T], n: usize, width: usize) -> Vec<&mut [T]> {
    debug_assert_eq!(buf.len(), n * width, "slab buffer size mismatch");
    if width == 0 {
        return (0..n).map(|_| <&mut [T]>::default()).collect();
    }
    buf.chunks_mut(width).collect()
}
