/// VulkanBackend - Vulkan 1.3 implementation of the Backend trait
///
/// Central object for creating resources and submitting commands. Owns the
/// shared `VulkanContext`; every object it creates keeps that context alive.

use std::any::Any;
use std::ffi::CString;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use ignis_engine::ignis::device::{
    Backend, BackendBuffer, BackendCommandBuffer, BackendCommandPool, BackendFence, BackendImage,
    BackendPipeline, BackendSemaphore, BackendShader, BackendSurface, BackendSwapchain, BufferDesc,
    DeviceConfig, DeviceProperties, Extent2D, ImageDesc, ImageLayout, PipelineCreateInfo,
    ShaderDesc, SubmitBatch, SwapchainCreateInfo, IMAGE_SAMPLER_BINDING,
};
use ignis_engine::ignis::{Error, Result};
use ignis_engine::{ignis_err, ignis_error, ignis_info, ignis_warn};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use rustc_hash::FxHashSet;

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_command::{VulkanCommandBuffer, VulkanCommandPool};
use crate::vulkan_context::{native, require, VulkanContext};
use crate::vulkan_descriptor::{BindlessDescriptors, MAX_BINDLESS_RESOURCES};
use crate::vulkan_features::{select_features, DeviceFeatures};
use crate::vulkan_format::{image_layout_to_vk, sample_counts_from_vk};
use crate::vulkan_image::VulkanImage;
use crate::vulkan_pipeline::VulkanPipeline;
use crate::vulkan_shader::VulkanShader;
use crate::vulkan_swapchain::{VulkanSurface, VulkanSwapchain};
use crate::vulkan_sync::{VulkanFence, VulkanSemaphore};

type DebugMessenger = Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>;

pub struct VulkanBackend {
    context: Arc<VulkanContext>,
    properties: DeviceProperties,
    enabled_features: FxHashSet<String>,
}

fn init_error(what: &str, e: impl std::fmt::Debug) -> Error {
    ignis_error!("ignis::vulkan", "{}: {:?}", what, e);
    Error::InitializationFailed(format!("{}: {:?}", what, e))
}

fn c_strings(names: &[String]) -> Result<Vec<CString>> {
    names
        .iter()
        .map(|name| {
            CString::new(name.as_str())
                .map_err(|_| Error::InitializationFailed(format!("invalid extension name {:?}", name)))
        })
        .collect()
}

/// Validation layer and debug messenger, when compiled in and requested
#[cfg(feature = "vulkan-validation")]
fn create_debug_messenger(entry: &ash::Entry, instance: &ash::Instance) -> Result<DebugMessenger> {
    let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);
    crate::debug::init_debug_config();

    let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

    let messenger = unsafe { debug_utils.create_debug_utils_messenger(&debug_info, None) }
        .map_err(|e| init_error("Failed to create debug messenger", e))?;
    Ok(Some((debug_utils, messenger)))
}

#[cfg(not(feature = "vulkan-validation"))]
fn create_debug_messenger(_entry: &ash::Entry, _instance: &ash::Instance) -> Result<DebugMessenger> {
    Ok(None)
}

/// Graphics queue family and its queue count
fn graphics_family(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Option<(u32, u32)> {
    unsafe { instance.get_physical_device_queue_family_properties(physical_device) }
        .iter()
        .enumerate()
        .find(|(_, family)| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|(index, family)| (index as u32, family.queue_count))
}

fn device_type_rank(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 3,
        _ => 4,
    }
}

/// Vulkan 1.3 device with a graphics queue, discrete GPUs first
fn pick_physical_device(instance: &ash::Instance) -> Result<(vk::PhysicalDevice, u32, u32)> {
    let devices = unsafe { instance.enumerate_physical_devices() }
        .map_err(|e| init_error("Failed to enumerate physical devices", e))?;

    devices
        .into_iter()
        .filter_map(|device| {
            let properties = unsafe { instance.get_physical_device_properties(device) };
            if properties.api_version < vk::API_VERSION_1_3 {
                return None;
            }
            let (family, count) = graphics_family(instance, device)?;
            Some((device_type_rank(properties.device_type), device, family, count))
        })
        .min_by_key(|&(rank, ..)| rank)
        .map(|(_, device, family, count)| (device, family, count))
        .ok_or_else(|| {
            ignis_error!("ignis::vulkan", "No Vulkan 1.3 GPU with a graphics queue found");
            Error::InitializationFailed("No Vulkan 1.3 GPU with a graphics queue found".to_string())
        })
}

fn query_properties(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> DeviceProperties {
    let mut v12 = vk::PhysicalDeviceVulkan12Properties::default();
    let base = {
        let mut properties2 = vk::PhysicalDeviceProperties2::default().push_next(&mut v12);
        unsafe { instance.get_physical_device_properties2(physical_device, &mut properties2) };
        properties2.properties
    };
    let limits = &base.limits;

    let device_name = base
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "Unknown GPU".to_string());

    let max_bindless_resources = MAX_BINDLESS_RESOURCES
        .min(v12.max_per_stage_descriptor_update_after_bind_storage_buffers)
        .min(v12.max_per_stage_descriptor_update_after_bind_uniform_buffers)
        .min(v12.max_per_stage_descriptor_update_after_bind_sampled_images)
        .min(v12.max_per_stage_descriptor_update_after_bind_samplers);

    DeviceProperties {
        device_name,
        min_uniform_buffer_alignment: limits.min_uniform_buffer_offset_alignment,
        min_storage_buffer_alignment: limits.min_storage_buffer_offset_alignment,
        sample_counts: sample_counts_from_vk(
            limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts,
        ),
        max_push_constants_size: limits.max_push_constants_size,
        max_bindless_resources,
    }
}

impl VulkanBackend {
    /// Create a Vulkan 1.3 device able to present to windows of `display`
    pub fn new(display: &impl HasDisplayHandle, config: &DeviceConfig) -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| init_error("Failed to load Vulkan library", e))?;

        let validation = cfg!(feature = "vulkan-validation") && config.enable_validation;
        if config.enable_validation && !validation {
            ignis_warn!(
                "ignis::vulkan",
                "Validation requested but the vulkan-validation feature is disabled"
            );
        }

        // ===== INSTANCE =====
        let app_name = CString::new(config.app_name.as_str())
            .map_err(|_| Error::InitializationFailed("application name contains NUL".to_string()))?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"Ignis")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let display_handle = display
            .display_handle()
            .map_err(|e| init_error("Failed to get display handle", e))?;
        let mut instance_extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(|e| init_error("Failed to get required extensions", e))?
            .to_vec();
        let extra_instance_extensions = c_strings(&config.instance_extensions)?;
        instance_extensions.extend(extra_instance_extensions.iter().map(|name| name.as_ptr()));
        if validation {
            instance_extensions.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let layer_names = if validation {
            vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
        } else {
            vec![]
        };

        let instance_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_names)
            .enabled_extension_names(&instance_extensions);
        let instance = unsafe { entry.create_instance(&instance_info, None) }
            .map_err(|e| init_error("Failed to create Vulkan instance", e))?;

        // Past this point the instance must be destroyed on failure
        let result = Self::create_device(&entry, &instance, config, validation);
        match result {
            Ok((device_parts, properties, enabled_features)) => {
                let DeviceParts {
                    physical_device,
                    device,
                    allocator,
                    queue_family,
                    queues,
                    descriptors,
                    debug_messenger,
                } = device_parts;
                let context = Arc::new(VulkanContext::new(
                    entry,
                    instance,
                    physical_device,
                    device,
                    allocator,
                    queue_family,
                    queues,
                    descriptors,
                    debug_messenger,
                ));
                ignis_info!(
                    "ignis::vulkan",
                    "Vulkan device ready: {} ({} graphics queues, {} bindless slots)",
                    properties.device_name,
                    context.queues.len(),
                    properties.max_bindless_resources
                );
                Ok(Self {
                    context,
                    properties,
                    enabled_features,
                })
            }
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                Err(e)
            }
        }
    }

    fn create_device(
        entry: &ash::Entry,
        instance: &ash::Instance,
        config: &DeviceConfig,
        validation: bool,
    ) -> Result<(DeviceParts, DeviceProperties, FxHashSet<String>)> {
        let debug_messenger = if validation {
            create_debug_messenger(entry, instance)?
        } else {
            None
        };
        let destroy_messenger = |messenger: DebugMessenger| {
            crate::debug::cleanup_debug_config();
            if let Some((debug_utils, messenger)) = messenger {
                unsafe { debug_utils.destroy_debug_utils_messenger(messenger, None) };
            }
        };

        let picked = pick_physical_device(instance).and_then(|(physical_device, family, count)| {
            let supported = DeviceFeatures::query(instance, physical_device);
            let selection =
                select_features(&supported, &config.required_features, &config.optional_features)?;
            Ok((physical_device, family, count, selection))
        });
        let (physical_device, queue_family, queue_count, selection) = match picked {
            Ok(picked) => picked,
            Err(e) => {
                destroy_messenger(debug_messenger);
                return Err(e);
            }
        };
        let properties = query_properties(instance, physical_device);

        // ===== LOGICAL DEVICE =====
        let priorities = vec![1.0_f32; queue_count as usize];
        let queue_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&priorities)];

        let extra_extensions = match c_strings(&config.extensions) {
            Ok(names) => names,
            Err(e) => {
                destroy_messenger(debug_messenger);
                return Err(e);
            }
        };
        let mut device_extensions = vec![ash::khr::swapchain::NAME.as_ptr()];
        device_extensions.extend(extra_extensions.iter().map(|name| name.as_ptr()));

        let mut enabled = selection.enabled;
        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .features(enabled.core)
            .push_next(&mut enabled.v12)
            .push_next(&mut enabled.v13);
        let device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&device_extensions)
            .push_next(&mut features2);

        let device = match unsafe { instance.create_device(physical_device, &device_info, None) } {
            Ok(device) => device,
            Err(e) => {
                destroy_messenger(debug_messenger);
                return Err(init_error("Failed to create logical device", e));
            }
        };
        let queues: Vec<vk::Queue> = (0..queue_count)
            .map(|index| unsafe { device.get_device_queue(queue_family, index) })
            .collect();

        // ===== ALLOCATOR AND DESCRIPTORS =====
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: selection.names.contains("BufferDeviceAddress"),
            allocation_sizes: Default::default(),
        })
        .map_err(|e| init_error("Failed to create GPU allocator", e));
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                destroy_messenger(debug_messenger);
                return Err(e);
            }
        };

        let device_limit = unsafe { instance.get_physical_device_properties(physical_device) }
            .limits
            .max_sampler_anisotropy;
        let anisotropy = config
            .sampler
            .effective_anisotropy(selection.names.contains("SamplerAnisotropy"), device_limit);
        if matches!(config.sampler.max_anisotropy, Some(level) if level > 1.0) && anisotropy.is_none() {
            ignis_warn!("ignis::vulkan", "Sampler anisotropy requested without the SamplerAnisotropy feature");
        }
        let descriptors = match BindlessDescriptors::new(
            &device,
            properties.max_bindless_resources,
            &config.sampler,
            anisotropy,
        ) {
            Ok(descriptors) => descriptors,
            Err(e) => {
                drop(allocator);
                unsafe { device.destroy_device(None) };
                destroy_messenger(debug_messenger);
                return Err(e);
            }
        };

        Ok((
            DeviceParts {
                physical_device,
                device,
                allocator,
                queue_family,
                queues,
                descriptors,
                debug_messenger,
            },
            properties,
            selection.names,
        ))
    }

    /// Create a presentation surface for `window`.
    ///
    /// `width`/`height` is the window size, used when the surface lets the
    /// swapchain pick its extent.
    pub fn create_surface(
        &self,
        window: &(impl HasDisplayHandle + HasWindowHandle),
        width: u32,
        height: u32,
    ) -> Result<VulkanSurface> {
        let display_handle = window
            .display_handle()
            .map_err(|e| init_error("Failed to get display handle", e))?;
        let window_handle = window
            .window_handle()
            .map_err(|e| init_error("Failed to get window handle", e))?;

        let surface = unsafe {
            ash_window::create_surface(
                &self.context._entry,
                &self.context.instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| init_error("Failed to create surface", e))?;

        Ok(VulkanSurface::new(
            Arc::clone(&self.context),
            surface,
            Extent2D::new(width, height),
        ))
    }
}

/// Everything `create_device` hands over to the context
struct DeviceParts {
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    allocator: Allocator,
    queue_family: u32,
    queues: Vec<vk::Queue>,
    descriptors: BindlessDescriptors,
    debug_messenger: DebugMessenger,
}

impl Backend for VulkanBackend {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    fn is_feature_enabled(&self, name: &str) -> bool {
        self.enabled_features.contains(name)
    }

    fn queue_count(&self) -> u32 {
        self.context.queues.len() as u32
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Box<dyn BackendBuffer>> {
        Ok(Box::new(VulkanBuffer::new(Arc::clone(&self.context), desc)?))
    }

    fn create_image(&self, desc: &ImageDesc) -> Result<Box<dyn BackendImage>> {
        Ok(Box::new(VulkanImage::new(Arc::clone(&self.context), desc)?))
    }

    fn create_shader(&self, desc: &ShaderDesc<'_>) -> Result<Box<dyn BackendShader>> {
        Ok(Box::new(VulkanShader::new(Arc::clone(&self.context), desc)?))
    }

    fn create_pipeline(
        &self,
        info: &PipelineCreateInfo<'_>,
        push_constant_size: u32,
    ) -> Result<Box<dyn BackendPipeline>> {
        Ok(Box::new(VulkanPipeline::new(
            Arc::clone(&self.context),
            info,
            push_constant_size,
        )?))
    }

    fn create_fence(&self, signaled: bool) -> Result<Box<dyn BackendFence>> {
        Ok(Box::new(VulkanFence::new(Arc::clone(&self.context), signaled)?))
    }

    fn create_semaphore(&self) -> Result<Box<dyn BackendSemaphore>> {
        Ok(Box::new(VulkanSemaphore::new(Arc::clone(&self.context))?))
    }

    fn create_command_pool(&self, queue: u32) -> Result<Arc<dyn BackendCommandPool>> {
        if queue >= self.queue_count() {
            return Err(Error::InvalidResource(format!(
                "queue {} out of range ({} graphics queues)",
                queue,
                self.queue_count()
            )));
        }
        // Every queue belongs to the graphics family, so pools only differ by owner thread
        Ok(Arc::new(VulkanCommandPool::new(Arc::clone(&self.context))?))
    }

    fn create_swapchain(
        &self,
        surface: &dyn BackendSurface,
        info: &SwapchainCreateInfo,
    ) -> Result<Box<dyn BackendSwapchain>> {
        let surface = require::<VulkanSurface>(surface.as_any(), "surface")?;
        Ok(Box::new(VulkanSwapchain::new(surface, info)?))
    }

    fn write_buffer_descriptor(&self, binding: u32, slot: u32, buffer: &dyn BackendBuffer, size: u64) {
        let buffer = native::<VulkanBuffer>(buffer.as_any(), "buffer");
        let descriptors = &self.context.descriptors;
        if slot >= descriptors.capacity {
            ignis_error!(
                "ignis::vulkan",
                "Descriptor slot {} exceeds bindless capacity {}",
                slot,
                descriptors.capacity
            );
            return;
        }
        if let Err(e) = descriptors.write_buffer(&self.context.device, binding, slot, buffer.buffer, size) {
            ignis_error!("ignis::vulkan", "Buffer descriptor write failed: {}", e);
        }
    }

    fn write_image_descriptor(&self, binding: u32, slot: u32, image: &dyn BackendImage, layout: ImageLayout) {
        let image = native::<VulkanImage>(image.as_any(), "image");
        let descriptors = &self.context.descriptors;
        if binding != IMAGE_SAMPLER_BINDING || slot >= descriptors.capacity {
            ignis_error!(
                "ignis::vulkan",
                "Invalid image descriptor binding {} slot {} (capacity {})",
                binding,
                slot,
                descriptors.capacity
            );
            return;
        }
        if let Err(e) =
            descriptors.write_image(&self.context.device, slot, image.view, image_layout_to_vk(layout))
        {
            ignis_error!("ignis::vulkan", "Image descriptor write failed: {}", e);
        }
    }

    fn submit(
        &self,
        queue: u32,
        batches: &[SubmitBatch<'_>],
        fence: Option<&dyn BackendFence>,
    ) -> Result<()> {
        let semaphore_infos = |semaphores: &[&dyn BackendSemaphore]| -> Result<Vec<vk::SemaphoreSubmitInfo<'static>>> {
            semaphores
                .iter()
                .map(|s| {
                    let semaphore = require::<VulkanSemaphore>(s.as_any(), "semaphore")?;
                    Ok(vk::SemaphoreSubmitInfo::default()
                        .semaphore(semaphore.semaphore)
                        .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS))
                })
                .collect()
        };

        let mut command_infos = Vec::with_capacity(batches.len());
        let mut wait_infos = Vec::with_capacity(batches.len());
        let mut signal_infos = Vec::with_capacity(batches.len());
        for batch in batches {
            let command = require::<VulkanCommandBuffer>(batch.command.as_any(), "command buffer")?;
            command_infos.push([vk::CommandBufferSubmitInfo::default().command_buffer(command.command_buffer)]);
            wait_infos.push(semaphore_infos(&batch.waits)?);
            signal_infos.push(semaphore_infos(&batch.signals)?);
        }

        let submits: Vec<vk::SubmitInfo2> = (0..batches.len())
            .map(|i| {
                vk::SubmitInfo2::default()
                    .command_buffer_infos(&command_infos[i])
                    .wait_semaphore_infos(&wait_infos[i])
                    .signal_semaphore_infos(&signal_infos[i])
            })
            .collect();

        let fence = match fence {
            Some(fence) => require::<VulkanFence>(fence.as_any(), "fence")?.fence,
            None => vk::Fence::null(),
        };

        let queue_handle = self.context.queue(queue)?;
        unsafe { self.context.device.queue_submit2(*queue_handle, &submits, fence) }.map_err(|e| {
            match e {
                vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                    ignis_error!("ignis::vulkan", "vkQueueSubmit2 out of memory");
                    Error::OutOfMemory
                }
                other => ignis_err!("ignis::vulkan", "vkQueueSubmit2 failed: {:?}", other),
            }
        })
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe { self.context.device.device_wait_idle() }
            .map_err(|e| ignis_err!("ignis::vulkan", "vkDeviceWaitIdle failed: {:?}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discrete_gpus_rank_first() {
        let mut types = [
            vk::PhysicalDeviceType::CPU,
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            vk::PhysicalDeviceType::DISCRETE_GPU,
            vk::PhysicalDeviceType::OTHER,
        ];
        types.sort_by_key(|&t| device_type_rank(t));
        assert_eq!(types[0], vk::PhysicalDeviceType::DISCRETE_GPU);
        assert_eq!(types[1], vk::PhysicalDeviceType::INTEGRATED_GPU);
        assert_eq!(types[3], vk::PhysicalDeviceType::OTHER);
    }

    #[test]
    fn test_extension_names_reject_nul() {
        assert!(c_strings(&["VK_KHR_swapchain".to_string()]).is_ok());
        assert!(c_strings(&["bad\0name".to_string()]).is_err());
    }
}
