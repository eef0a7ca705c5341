/// Vulkan fences and semaphores

use std::any::Any;
use std::sync::Arc;

use ash::vk;
use ignis_engine::ignis::device::{BackendFence, BackendSemaphore};
use ignis_engine::ignis::Result;
use ignis_engine::ignis_err;

use crate::vulkan_context::VulkanContext;

pub struct VulkanFence {
    context: Arc<VulkanContext>,
    pub(crate) fence: vk::Fence,
}

impl VulkanFence {
    pub(crate) fn new(context: Arc<VulkanContext>, signaled: bool) -> Result<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { context.device.create_fence(&info, None) }
            .map_err(|e| ignis_err!("ignis::vulkan", "Failed to create fence: {:?}", e))?;
        Ok(Self { context, fence })
    }
}

impl BackendFence for VulkanFence {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn wait(&self) -> Result<()> {
        unsafe { self.context.device.wait_for_fences(&[self.fence], true, u64::MAX) }
            .map_err(|e| ignis_err!("ignis::vulkan", "Failed to wait for fence: {:?}", e))
    }

    fn reset(&self) -> Result<()> {
        unsafe { self.context.device.reset_fences(&[self.fence]) }
            .map_err(|e| ignis_err!("ignis::vulkan", "Failed to reset fence: {:?}", e))
    }

    fn is_signaled(&self) -> Result<bool> {
        unsafe { self.context.device.get_fence_status(self.fence) }
            .map_err(|e| ignis_err!("ignis::vulkan", "Failed to query fence status: {:?}", e))
    }
}

impl Drop for VulkanFence {
    fn drop(&mut self) {
        unsafe { self.context.device.destroy_fence(self.fence, None) };
    }
}

pub struct VulkanSemaphore {
    context: Arc<VulkanContext>,
    pub(crate) semaphore: vk::Semaphore,
}

impl VulkanSemaphore {
    pub(crate) fn new(context: Arc<VulkanContext>) -> Result<Self> {
        let info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { context.device.create_semaphore(&info, None) }
            .map_err(|e| ignis_err!("ignis::vulkan", "Failed to create semaphore: {:?}", e))?;
        Ok(Self { context, semaphore })
    }
}

impl BackendSemaphore for VulkanSemaphore {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanSemaphore {
    fn drop(&mut self) {
        unsafe { self.context.device.destroy_semaphore(self.semaphore, None) };
    }
}
