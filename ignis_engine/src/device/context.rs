/// GpuContext - shared backend access for every core GPU object
///
/// Contains everything recording and submission need:
/// - The backend (logical device, allocator, queues)
/// - One command pool per queue, created lazily
///
/// Shared via `Arc` by the device, commands and the renderer, so resources
/// created from it can stage uploads and submit work on their own.

use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::device::backend::{Backend, BackendCommandPool, DeviceProperties, SubmitBatch};
use crate::device::command::{Command, CommandState};
use crate::device::sync::{Fence, Semaphore};
use crate::device::types::Queue;
use crate::ignis_debug;

struct CommandPoolEntry {
    pool: Arc<dyn BackendCommandPool>,
    /// Pools are not thread-safe; only their creator may allocate from them
    owner: ThreadId,
}

/// One command buffer of a submission with the semaphores it waits on and signals
#[derive(Clone, Copy)]
pub struct SubmitInfo<'a> {
    pub command: &'a Command,
    pub waits: &'a [&'a Semaphore],
    pub signals: &'a [&'a Semaphore],
}

impl<'a> SubmitInfo<'a> {
    /// Submission without semaphores
    pub fn new(command: &'a Command) -> Self {
        Self { command, waits: &[], signals: &[] }
    }
}

/// Shared GPU context
pub struct GpuContext {
    backend: Box<dyn Backend>,
    command_pools: Mutex<FxHashMap<Queue, CommandPoolEntry>>,
}

impl GpuContext {
    /// Wrap a backend into a shareable context
    pub fn new(backend: Box<dyn Backend>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            command_pools: Mutex::new(FxHashMap::default()),
        })
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn properties(&self) -> &DeviceProperties {
        self.backend.properties()
    }

    /// Command pool of `queue`, created on first use by the calling thread.
    ///
    /// Debug builds assert that later calls come from that same thread.
    pub fn command_pool(&self, queue: Queue) -> Result<Arc<dyn BackendCommandPool>> {
        let mut pools = self
            .command_pools
            .lock()
            .map_err(|_| Error::BackendError("command pool registry poisoned".to_string()))?;

        let current = thread::current().id();
        if let Some(entry) = pools.get(&queue) {
            debug_assert_eq!(
                entry.owner, current,
                "command pool of {:?} used from a thread that did not create it",
                queue
            );
            return Ok(Arc::clone(&entry.pool));
        }

        let pool = self.backend.create_command_pool(queue.index())?;
        ignis_debug!("ignis::Device", "Created command pool for queue {}", queue.index());
        pools.insert(
            queue,
            CommandPoolEntry {
                pool: Arc::clone(&pool),
                owner: current,
            },
        );
        Ok(pool)
    }

    /// Submit ended commands as one queue submission.
    ///
    /// All commands must target the same queue. `fence`, when given, is
    /// signaled only after every command completes.
    ///
    /// # Panics
    ///
    /// If `submits` is empty, a command is not in the executable state, or
    /// commands target different queues.
    pub fn submit(&self, submits: &[SubmitInfo<'_>], fence: Option<&Fence>) -> Result<()> {
        assert!(!submits.is_empty(), "submission without commands");
        let queue = submits[0].command.queue();

        for submit in submits {
            assert!(
                submit.command.state() == CommandState::Executable,
                "submitted a command that is not executable ({:?})",
                submit.command.state()
            );
            assert_eq!(
                submit.command.queue(),
                queue,
                "all commands of a submission must target the same queue"
            );
        }

        let batches: Vec<SubmitBatch<'_>> = submits
            .iter()
            .map(|submit| SubmitBatch {
                command: submit.command.backend(),
                waits: submit.waits.iter().map(|s| s.backend()).collect(),
                signals: submit.signals.iter().map(|s| s.backend()).collect(),
            })
            .collect();

        self.backend
            .submit(queue.index(), &batches, fence.map(|f| f.backend()))
    }
}
