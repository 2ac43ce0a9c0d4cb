//! Descriptor layouts derived from shader reflection, and the per-draw plans that fill them.
//!
//! A pipeline's layout is computed once from the merged reflection of its stages. Alongside the
//! layout bindings it records, for every constant-buffer slot of every stage, which bindings read
//! from that slot. Quick-bind synchronization walks only those usage lists when a handful of
//! constant buffers were rebound, instead of rescanning every resource of the pipeline.

use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;
use bytemuck::{Pod, Zeroable};
use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::backend::{
    DescriptorSetLayoutId, ImageViewId, PipelineLayoutId, SamplerId, TextureManager,
};
use crate::constant_buffers::{ConstantBufferSet, QuickBind};
use crate::engine::{
    SamplerPool, ShaderStage, ShaderStageFlags, TexturePool, SHADER_STAGE_COUNT,
    STAGE_CONSTANT_BUFFER_COUNT,
};
use crate::memory::{BufferBinding, BufferManager, BufferResolver, DynamicBufferBinding};
use crate::pipeline::{Pipeline, PipelineShaderStage};
use crate::shader::{BindlessHandle, ShaderInfo, StorageBufferDescriptor, TextureDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    UniformBuffer,
    StorageBuffer,
    UniformTexelBuffer,
    StorageTexelBuffer,
    CombinedImageSampler,
    StorageImage,
}

impl DescriptorType {
    pub fn is_buffer(self) -> bool {
        matches!(
            self,
            DescriptorType::UniformBuffer | DescriptorType::StorageBuffer
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutBinding {
    pub binding: u32,
    pub ty: DescriptorType,
    pub count: u32,
    pub stages: ShaderStageFlags,
}

/// Copies a whole binding of the previously bound set into the same binding of a new set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorCopy {
    pub binding: u32,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BindingUsage {
    binding: u32,
    /// Index into the stage's reflected descriptor list of the binding's kind.
    descriptor_index: u32,
}

/// Bindings that read from one constant-buffer slot.
#[derive(Debug, Clone, Default)]
struct ConstantBufferUsage {
    uniform_buffers: SmallVec<[BindingUsage; 1]>,
    storage_buffers: SmallVec<[BindingUsage; 1]>,
    combined_image_samplers: SmallVec<[BindingUsage; 2]>,
}

#[derive(Debug, Clone, Default)]
struct StageDescriptorLayout {
    usages: [ConstantBufferUsage; STAGE_CONSTANT_BUFFER_COUNT],
}

/// Descriptor set layout of a pipeline, one binding per reflected descriptor in stage order.
#[derive(Debug, Clone, Default)]
pub struct DescriptorLayout {
    bindings: Vec<LayoutBinding>,
    copies: Vec<DescriptorCopy>,
    stages: [StageDescriptorLayout; SHADER_STAGE_COUNT],
}

impl DescriptorLayout {
    pub fn new(stages: &[Option<PipelineShaderStage>; SHADER_STAGE_COUNT]) -> Self {
        let mut bindings = Vec::new();
        let mut stage_layouts: [StageDescriptorLayout; SHADER_STAGE_COUNT] = Default::default();

        let mut push = |ty: DescriptorType, count: u32, stage_flags: ShaderStageFlags| -> u32 {
            let binding = bindings.len() as u32;
            bindings.push(LayoutBinding {
                binding,
                ty,
                count,
                stages: stage_flags,
            });
            binding
        };

        for stage in ShaderStage::ALL {
            let Some(shader) = &stages[stage.index()] else {
                continue;
            };
            let info = &shader.info;
            let flags = stage.flags();
            let usages = &mut stage_layouts[stage.index()].usages;

            for (index, desc) in info.constant_buffers.iter().enumerate() {
                let binding = push(DescriptorType::UniformBuffer, desc.count, flags);
                for cbuf in desc.index..desc.index.saturating_add(desc.count) {
                    if let Some(usage) = usages.get_mut(cbuf as usize) {
                        usage.uniform_buffers.push(BindingUsage {
                            binding,
                            descriptor_index: index as u32,
                        });
                    }
                }
            }

            for (index, desc) in info.storage_buffers.iter().enumerate() {
                let binding = push(DescriptorType::StorageBuffer, desc.count, flags);
                if let Some(usage) = usages.get_mut(desc.cbuf_index as usize) {
                    usage.storage_buffers.push(BindingUsage {
                        binding,
                        descriptor_index: index as u32,
                    });
                }
            }

            for desc in &info.texture_buffers {
                push(DescriptorType::UniformTexelBuffer, desc.count, flags);
            }
            for desc in &info.image_buffers {
                push(DescriptorType::StorageTexelBuffer, desc.count, flags);
            }
            if !info.texture_buffers.is_empty() || !info.image_buffers.is_empty() {
                warn!(%stage, "texel buffer descriptors are laid out but never written");
            }

            for (index, desc) in info.textures.iter().enumerate() {
                let binding = push(DescriptorType::CombinedImageSampler, desc.count, flags);
                let usage = BindingUsage {
                    binding,
                    descriptor_index: index as u32,
                };
                if let Some(slot) = usages.get_mut(desc.cbuf_index as usize) {
                    slot.combined_image_samplers.push(usage);
                }
                if let Some(secondary) = desc.secondary {
                    if secondary.cbuf_index != desc.cbuf_index {
                        if let Some(slot) = usages.get_mut(secondary.cbuf_index as usize) {
                            slot.combined_image_samplers.push(usage);
                        }
                    }
                }
            }

            for desc in &info.images {
                push(DescriptorType::StorageImage, desc.count, flags);
            }
            if !info.images.is_empty() {
                warn!(%stage, "storage image descriptors are laid out but never written");
            }
        }

        let copies = bindings
            .iter()
            .map(|b| DescriptorCopy {
                binding: b.binding,
                count: b.count,
            })
            .collect();

        Self {
            bindings,
            copies,
            stages: stage_layouts,
        }
    }

    pub fn bindings(&self) -> &[LayoutBinding] {
        &self.bindings
    }

    pub fn copies(&self) -> &[DescriptorCopy] {
        &self.copies
    }

    fn usage(&self, stage: ShaderStage, cbuf_index: u32) -> Option<&ConstantBufferUsage> {
        self.stages[stage.index()].usages.get(cbuf_index as usize)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageBinding {
    pub view: ImageViewId,
    pub sampler: SamplerId,
}

/// One binding's worth of descriptors. `first` indexes the plan's buffer or image list,
/// depending on `ty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWrite {
    pub binding: u32,
    pub ty: DescriptorType,
    pub first: u32,
    pub count: u32,
}

impl DescriptorWrite {
    pub fn resolve<'r>(
        &self,
        buffers: &'r [BufferBinding],
        images: &'r [ImageBinding],
    ) -> ResolvedDescriptorWrite<'r> {
        let range = self.first as usize..(self.first + self.count) as usize;
        let resources = if self.ty.is_buffer() {
            DescriptorResources::Buffers(&buffers[range])
        } else {
            DescriptorResources::Images(&images[range])
        };
        ResolvedDescriptorWrite {
            binding: self.binding,
            ty: self.ty,
            resources,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DescriptorResources<'r> {
    Buffers(&'r [BufferBinding]),
    Images(&'r [ImageBinding]),
}

/// A descriptor write with every buffer resolved to its current backing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedDescriptorWrite<'r> {
    pub binding: u32,
    pub ty: DescriptorType,
    pub resources: DescriptorResources<'r>,
}

/// Descriptor writes and copies planned for one draw, allocated from the draw's arena.
#[derive(Debug)]
pub struct DescriptorUpdateInfo<'a> {
    /// Applied before `writes`, sourcing from the previously bound set.
    pub copies: &'a [DescriptorCopy],
    pub writes: BumpVec<'a, DescriptorWrite>,
    pub buffers: BumpVec<'a, DynamicBufferBinding>,
    pub images: BumpVec<'a, ImageBinding>,
    pub pipeline_layout: PipelineLayoutId,
    pub set_layout: DescriptorSetLayoutId,
    pub set_index: u32,
}

impl DescriptorUpdateInfo<'_> {
    /// Resolves deferred buffer bindings. Must only run at replay time.
    pub fn resolve_buffers(&self, resolver: &dyn BufferResolver) -> Vec<BufferBinding> {
        self.buffers.iter().map(|b| b.resolve(resolver)).collect()
    }
}

/// Outcome of an incremental descriptor sync.
#[derive(Debug)]
pub enum QuickBindSync<'a> {
    Update(DescriptorUpdateInfo<'a>),
    /// No binding of the pipeline reads the rebound buffers; the current set stays valid.
    Unchanged,
}

/// Live state descriptors are resolved from.
pub struct DescriptorSources<'s> {
    pub constant_buffers: &'s ConstantBufferSet,
    pub texture_pool: &'s TexturePool,
    pub sampler_pool: &'s SamplerPool,
    pub memory: &'s mut dyn BufferManager,
    pub textures: &'s mut dyn TextureManager,
}

/// In-memory layout of a storage buffer descriptor inside a constant buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct StorageBufferDescriptorData {
    address: u64,
    size: u32,
    reserved: u32,
}

const STORAGE_BUFFER_DESCRIPTOR_STRIDE: u32 =
    std::mem::size_of::<StorageBufferDescriptorData>() as u32;

fn constant_buffer_binding(
    sources: &mut DescriptorSources<'_>,
    stage: ShaderStage,
    info: &ShaderInfo,
    index: u32,
) -> DynamicBufferBinding {
    let Some(view) = sources.constant_buffers.get(stage, index) else {
        return sources.memory.dummy_binding().into();
    };

    let used_size = info
        .constant_buffer_used_sizes
        .get(index as usize)
        .copied()
        .unwrap_or(0);
    let view = if used_size != 0 {
        view.truncated(used_size.into())
    } else {
        view
    };

    sources.memory.block_sequenced_writes(&view);
    view.into()
}

fn storage_buffer_binding(
    sources: &mut DescriptorSources<'_>,
    stage: ShaderStage,
    desc: &StorageBufferDescriptor,
    array_index: u32,
) -> DynamicBufferBinding {
    let mut raw = [0u8; STORAGE_BUFFER_DESCRIPTOR_STRIDE as usize];
    sources.constant_buffers.read_bytes(
        sources.memory,
        stage,
        desc.cbuf_index,
        desc.cbuf_offset + array_index * STORAGE_BUFFER_DESCRIPTOR_STRIDE,
        &mut raw,
    );
    let ssbo: StorageBufferDescriptorData = bytemuck::pod_read_unaligned(&raw);

    match sources.memory.lookup(ssbo.address, ssbo.size.into()) {
        Some(view) => {
            sources.memory.block_sequenced_writes(&view);
            if desc.is_written {
                sources.memory.mark_gpu_dirty(&view);
            }
            view.into()
        }
        None => {
            trace!(
                address = ssbo.address,
                size = ssbo.size,
                "storage buffer is not backed by guest memory"
            );
            sources.memory.dummy_binding().into()
        }
    }
}

fn texture_binding(
    sources: &mut DescriptorSources<'_>,
    stage: ShaderStage,
    desc: &TextureDescriptor,
    array_index: u32,
) -> ImageBinding {
    let element_offset = array_index << desc.size_shift;
    let cbufs = sources.constant_buffers;
    let mut raw = cbufs.read_u32(
        sources.memory,
        stage,
        desc.cbuf_index,
        desc.cbuf_offset + element_offset,
    );
    if let Some(secondary) = desc.secondary {
        raw |= cbufs.read_u32(
            sources.memory,
            stage,
            secondary.cbuf_index,
            secondary.cbuf_offset + element_offset,
        );
    }

    let handle = BindlessHandle(raw);
    let sampler = sources.textures.sampler(
        sources.sampler_pool,
        handle.sampler_index(),
        handle.texture_index(),
    );
    let view = sources
        .textures
        .texture_view(sources.texture_pool, handle.texture_index(), desc.ty);
    ImageBinding { view, sampler }
}

/// Accumulates writes and their resources in arena memory.
struct DescriptorWriter<'a> {
    writes: BumpVec<'a, DescriptorWrite>,
    buffers: BumpVec<'a, DynamicBufferBinding>,
    images: BumpVec<'a, ImageBinding>,
}

impl<'a> DescriptorWriter<'a> {
    fn new(arena: &'a Bump) -> Self {
        Self {
            writes: BumpVec::new_in(arena),
            buffers: BumpVec::new_in(arena),
            images: BumpVec::new_in(arena),
        }
    }

    fn write_buffers(
        &mut self,
        binding: u32,
        ty: DescriptorType,
        resources: impl IntoIterator<Item = DynamicBufferBinding>,
    ) {
        let first = self.buffers.len() as u32;
        self.buffers.extend(resources);
        let count = self.buffers.len() as u32 - first;
        if count != 0 {
            self.writes.push(DescriptorWrite {
                binding,
                ty,
                first,
                count,
            });
        }
    }

    fn write_images(
        &mut self,
        binding: u32,
        ty: DescriptorType,
        resources: impl IntoIterator<Item = ImageBinding>,
    ) {
        let first = self.images.len() as u32;
        self.images.extend(resources);
        let count = self.images.len() as u32 - first;
        if count != 0 {
            self.writes.push(DescriptorWrite {
                binding,
                ty,
                first,
                count,
            });
        }
    }

    fn finish(self, pipeline: &Pipeline, copies: &'a [DescriptorCopy]) -> DescriptorUpdateInfo<'a> {
        let compiled = pipeline.compiled();
        DescriptorUpdateInfo {
            copies,
            writes: self.writes,
            buffers: self.buffers,
            images: self.images,
            pipeline_layout: compiled.layout,
            set_layout: compiled.set_layout,
            set_index: 0,
        }
    }
}

impl Pipeline {
    /// Plans writes for every resource of every active stage. Returns `None` when the pipeline
    /// has nothing to write.
    pub fn sync_descriptors<'a>(
        &self,
        arena: &'a Bump,
        sources: &mut DescriptorSources<'_>,
    ) -> Option<DescriptorUpdateInfo<'a>> {
        let mut writer = DescriptorWriter::new(arena);
        let mut binding = 0u32;

        for stage in ShaderStage::ALL {
            let Some(shader) = self.stage(stage) else {
                continue;
            };
            let info = &shader.info;

            for desc in &info.constant_buffers {
                writer.write_buffers(
                    binding,
                    DescriptorType::UniformBuffer,
                    (0..desc.count)
                        .map(|i| constant_buffer_binding(sources, stage, info, desc.index + i)),
                );
                binding += 1;
            }

            for desc in &info.storage_buffers {
                writer.write_buffers(
                    binding,
                    DescriptorType::StorageBuffer,
                    (0..desc.count).map(|i| storage_buffer_binding(sources, stage, desc, i)),
                );
                binding += 1;
            }

            binding += (info.texture_buffers.len() + info.image_buffers.len()) as u32;

            for desc in &info.textures {
                writer.write_images(
                    binding,
                    DescriptorType::CombinedImageSampler,
                    (0..desc.count).map(|i| texture_binding(sources, stage, desc, i)),
                );
                binding += 1;
            }

            binding += info.images.len() as u32;
        }

        debug_assert_eq!(binding as usize, self.descriptor_layout().bindings().len());

        if writer.writes.is_empty() {
            return None;
        }
        Some(writer.finish(self, &[]))
    }

    /// Plans writes only for the bindings that read from the rebound constant buffers, copying
    /// every other binding from the previously bound set.
    pub fn sync_descriptors_quick_bind<'a>(
        &self,
        arena: &'a Bump,
        quick_bind: &QuickBind,
        sources: &mut DescriptorSources<'_>,
    ) -> QuickBindSync<'a> {
        let layout = self.descriptor_layout();
        let mut writer = DescriptorWriter::new(arena);
        let mut written: SmallVec<[u32; 8]> = SmallVec::new();

        for entry in quick_bind.entries() {
            let stage = entry.stage;
            let (Some(shader), Some(cbuf_usage)) =
                (self.stage(stage), layout.usage(stage, entry.index))
            else {
                continue;
            };
            let info = &shader.info;

            for usage in &cbuf_usage.uniform_buffers {
                if written.contains(&usage.binding) {
                    continue;
                }
                written.push(usage.binding);
                let desc = &info.constant_buffers[usage.descriptor_index as usize];
                writer.write_buffers(
                    usage.binding,
                    DescriptorType::UniformBuffer,
                    (0..desc.count)
                        .map(|i| constant_buffer_binding(sources, stage, info, desc.index + i)),
                );
            }

            for usage in &cbuf_usage.storage_buffers {
                if written.contains(&usage.binding) {
                    continue;
                }
                written.push(usage.binding);
                let desc = &info.storage_buffers[usage.descriptor_index as usize];
                writer.write_buffers(
                    usage.binding,
                    DescriptorType::StorageBuffer,
                    (0..desc.count).map(|i| storage_buffer_binding(sources, stage, desc, i)),
                );
            }

            for usage in &cbuf_usage.combined_image_samplers {
                if written.contains(&usage.binding) {
                    continue;
                }
                written.push(usage.binding);
                let desc = &info.textures[usage.descriptor_index as usize];
                writer.write_images(
                    usage.binding,
                    DescriptorType::CombinedImageSampler,
                    (0..desc.count).map(|i| texture_binding(sources, stage, desc, i)),
                );
            }
        }

        if writer.writes.is_empty() {
            return QuickBindSync::Unchanged;
        }
        let copies = arena.alloc_slice_copy(layout.copies());
        QuickBindSync::Update(writer.finish(self, copies))
    }
}
