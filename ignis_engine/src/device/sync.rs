/// Fence and Semaphore - host and GPU synchronization primitives
///
/// Pure wrappers: no retry or timeout beyond the backend's indefinite wait.
/// A fence supports a single waiter at a time.

use crate::error::Result;
use crate::device::backend::{BackendFence, BackendSemaphore};
use crate::device::context::GpuContext;

/// Binary host-visible fence
pub struct Fence {
    backend: Box<dyn BackendFence>,
}

impl Fence {
    pub fn new(context: &GpuContext, signaled: bool) -> Result<Self> {
        Ok(Self {
            backend: context.backend().create_fence(signaled)?,
        })
    }

    /// Block until the fence is signaled
    pub fn wait(&self) -> Result<()> {
        self.backend.wait()
    }

    /// Return the fence to the unsignaled state
    pub fn reset(&self) -> Result<()> {
        self.backend.reset()
    }

    pub fn wait_and_reset(&self) -> Result<()> {
        self.wait()?;
        self.reset()
    }

    pub fn is_signaled(&self) -> Result<bool> {
        self.backend.is_signaled()
    }

    /// Swap in a new, signaled fence.
    ///
    /// A fence reset for a submission that never reached the queue is never
    /// signaled again; its owner replaces it so the next `wait` returns.
    pub fn recreate_signaled(&mut self, context: &GpuContext) -> Result<()> {
        self.backend = context.backend().create_fence(true)?;
        Ok(())
    }

    pub fn backend(&self) -> &dyn BackendFence {
        self.backend.as_ref()
    }
}

/// GPU-GPU or GPU-present synchronization token
pub struct Semaphore {
    backend: Box<dyn BackendSemaphore>,
}

impl Semaphore {
    pub fn new(context: &GpuContext) -> Result<Self> {
        Ok(Self {
            backend: context.backend().create_semaphore()?,
        })
    }

    /// Swap in a new, unsignaled semaphore (drops a pending signal nobody will wait on)
    pub fn recreate(&mut self, context: &GpuContext) -> Result<()> {
        self.backend = context.backend().create_semaphore()?;
        Ok(())
    }

    pub fn backend(&self) -> &dyn BackendSemaphore {
        self.backend.as_ref()
    }
}
