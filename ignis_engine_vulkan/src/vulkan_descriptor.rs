/// BindlessDescriptors - the global descriptor set
///
/// One set, three runtime arrays indexed by resource slot:
/// - binding 0: storage buffers
/// - binding 1: uniform buffers
/// - binding 2: combined image samplers (all sharing the configured global sampler)
///
/// Bindings are partially bound and updatable after bind, so new resources
/// are written while earlier frames using the set are still in flight.

use std::sync::Mutex;

use ash::vk;
use ignis_engine::ignis::device::{
    SamplerConfig, IMAGE_SAMPLER_BINDING, STORAGE_BUFFER_BINDING, UNIFORM_BUFFER_BINDING,
};
use ignis_engine::ignis::{Error, Result};
use ignis_engine::{ignis_err, ignis_error};

use crate::vulkan_format::sampler_info_to_vk;

/// Capacity of each array when the device allows it
pub(crate) const MAX_BINDLESS_RESOURCES: u32 = 1024;

pub(crate) struct BindlessDescriptors {
    pub(crate) set_layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    pub(crate) set: vk::DescriptorSet,
    sampler: vk::Sampler,
    pub(crate) capacity: u32,
    /// `vkUpdateDescriptorSets` needs the set externally synchronized
    write_lock: Mutex<()>,
}

impl BindlessDescriptors {
    pub(crate) fn new(
        device: &ash::Device,
        capacity: u32,
        sampler: &SamplerConfig,
        anisotropy: Option<f32>,
    ) -> Result<Self> {
        let types = [
            (STORAGE_BUFFER_BINDING, vk::DescriptorType::STORAGE_BUFFER),
            (UNIFORM_BUFFER_BINDING, vk::DescriptorType::UNIFORM_BUFFER),
            (IMAGE_SAMPLER_BINDING, vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
        ];

        let bindings: Vec<vk::DescriptorSetLayoutBinding> = types
            .iter()
            .map(|&(binding, ty)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(ty)
                    .descriptor_count(capacity)
                    .stage_flags(vk::ShaderStageFlags::ALL)
            })
            .collect();
        let binding_flags = [vk::DescriptorBindingFlags::PARTIALLY_BOUND
            | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND; 3];
        let mut flags_info =
            vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);

        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
            .bindings(&bindings)
            .push_next(&mut flags_info);

        unsafe {
            let set_layout = device
                .create_descriptor_set_layout(&layout_info, None)
                .map_err(|e| {
                    ignis_error!("ignis::vulkan", "Failed to create bindless set layout: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create bindless set layout: {:?}", e))
                })?;

            let pool_sizes: Vec<vk::DescriptorPoolSize> = types
                .iter()
                .map(|&(_, ty)| vk::DescriptorPoolSize {
                    ty,
                    descriptor_count: capacity,
                })
                .collect();
            let pool_info = vk::DescriptorPoolCreateInfo::default()
                .flags(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND)
                .pool_sizes(&pool_sizes)
                .max_sets(1);
            let pool = match device.create_descriptor_pool(&pool_info, None) {
                Ok(pool) => pool,
                Err(e) => {
                    device.destroy_descriptor_set_layout(set_layout, None);
                    ignis_error!("ignis::vulkan", "Failed to create bindless descriptor pool: {:?}", e);
                    return Err(Error::InitializationFailed(format!(
                        "Failed to create bindless descriptor pool: {:?}",
                        e
                    )));
                }
            };

            let set_layouts = [set_layout];
            let alloc_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(pool)
                .set_layouts(&set_layouts);
            let set = match device.allocate_descriptor_sets(&alloc_info) {
                Ok(sets) => sets[0],
                Err(e) => {
                    device.destroy_descriptor_pool(pool, None);
                    device.destroy_descriptor_set_layout(set_layout, None);
                    ignis_error!("ignis::vulkan", "Failed to allocate bindless descriptor set: {:?}", e);
                    return Err(Error::InitializationFailed(format!(
                        "Failed to allocate bindless descriptor set: {:?}",
                        e
                    )));
                }
            };

            let sampler_info = sampler_info_to_vk(sampler, anisotropy);
            let sampler = match device.create_sampler(&sampler_info, None) {
                Ok(sampler) => sampler,
                Err(e) => {
                    device.destroy_descriptor_pool(pool, None);
                    device.destroy_descriptor_set_layout(set_layout, None);
                    ignis_error!("ignis::vulkan", "Failed to create global sampler: {:?}", e);
                    return Err(Error::InitializationFailed(format!(
                        "Failed to create global sampler: {:?}",
                        e
                    )));
                }
            };

            Ok(Self {
                set_layout,
                pool,
                set,
                sampler,
                capacity,
                write_lock: Mutex::new(()),
            })
        }
    }

    /// Write `buffer` at `binding[slot]`
    pub(crate) fn write_buffer(
        &self,
        device: &ash::Device,
        binding: u32,
        slot: u32,
        buffer: vk::Buffer,
        size: u64,
    ) -> Result<()> {
        let ty = match binding {
            STORAGE_BUFFER_BINDING => vk::DescriptorType::STORAGE_BUFFER,
            UNIFORM_BUFFER_BINDING => vk::DescriptorType::UNIFORM_BUFFER,
            other => {
                return Err(Error::InvalidResource(format!(
                    "binding {} does not hold buffers",
                    other
                )))
            }
        };
        let buffer_info = [vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range: size,
        }];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.set)
            .dst_binding(binding)
            .dst_array_element(slot)
            .descriptor_type(ty)
            .buffer_info(&buffer_info);

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ignis_err!("ignis::vulkan", "descriptor write lock poisoned"))?;
        unsafe { device.update_descriptor_sets(&[write], &[]) };
        Ok(())
    }

    /// Write `view` at `IMAGE_SAMPLER_BINDING[slot]`, sampled in `layout`
    pub(crate) fn write_image(
        &self,
        device: &ash::Device,
        slot: u32,
        view: vk::ImageView,
        layout: vk::ImageLayout,
    ) -> Result<()> {
        let image_info = [vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: view,
            image_layout: layout,
        }];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.set)
            .dst_binding(IMAGE_SAMPLER_BINDING)
            .dst_array_element(slot)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info);

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ignis_err!("ignis::vulkan", "descriptor write lock poisoned"))?;
        unsafe { device.update_descriptor_sets(&[write], &[]) };
        Ok(())
    }

    /// Destroy the Vulkan objects; the device must still be alive
    pub(crate) unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_sampler(self.sampler, None);
        device.destroy_descriptor_pool(self.pool, None);
        device.destroy_descriptor_set_layout(self.set_layout, None);
    }
}
