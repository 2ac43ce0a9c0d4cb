//! The 3D engine channel: register-driven state plus the draw and clear methods that turn it
//! into host pipelines, descriptor sets and recorded state updates.

use tracing::{debug, trace, warn};

use crate::backend::{
    Attachments, DescriptorAllocator, DescriptorSetId, ImageViewId, InterconnectContext,
    PipelineHandle, PipelineLayoutId,
};
use crate::config::InterconnectConfig;
use crate::constant_buffers::{ConstantBufferSet, ConstantBuffers};
use crate::descriptor::{DescriptorSources, DescriptorUpdateInfo, QuickBindSync};
use crate::engine::{
    ClearAspects, ClearSurface, ClearSurfaceControl, ColorWriteMask, DepthBias, EngineRegisters,
    IndexFormat, Rect2D, SamplerPool, ShaderStage, TexturePool, Viewport, VIEWPORT_COUNT,
};
use crate::error::{InterconnectError, Result};
use crate::memory::{BufferBinding, BufferManager};
use crate::packed_state::PackedPipelineState;
use crate::pipeline::{Pipeline, PipelineCacheStats, PipelineId, PipelineManager};
use crate::state_updater::{StateUpdateBuilder, StencilDynamicState, StencilFaceDynamic};
use crate::stats::InterconnectStats;
use crate::topology::{
    expand_quads_indexed_u32, expand_quads_nonindexed_u32, quad_index_count,
    translate_draw_topology, DrawTopology, PrimitiveTopology,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawParams {
    pub topology: DrawTopology,
    pub transform_feedback_enable: bool,
    pub indexed: bool,
    /// Vertex or index count.
    pub count: u32,
    /// First vertex, or first index for indexed draws.
    pub first: u32,
    pub instance_count: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
}

/// Draw as issued to the host after topology emulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawOp {
    pub pipeline: PipelineHandle,
    pub topology: PrimitiveTopology,
    pub attachments: Attachments,
    pub indexed: bool,
    pub count: u32,
    pub first: u32,
    pub instance_count: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
    pub transform_feedback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorClear {
    pub target: u8,
    pub view: ImageViewId,
    /// Raw clear value bits, interpreted according to the target format.
    pub value: [u32; 4],
    pub write_mask: ColorWriteMask,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearOp {
    /// Clipped clear region. Never empty.
    pub rect: Rect2D,
    pub layer: u16,
    pub color: Option<ColorClear>,
    pub depth_stencil_view: Option<ImageViewId>,
    pub depth: Option<f32>,
    pub stencil: Option<u32>,
    pub stencil_write_mask: u8,
}

/// Operation recorded after a state update list has been replayed.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedOp {
    Draw(DrawOp),
    Clear(ClearOp),
}

/// Triangle-list indices for non-indexed quad draws, shared by every such draw of the channel.
#[derive(Debug, Default)]
struct QuadIndexCache {
    binding: Option<BufferBinding>,
    vertex_count: u32,
}

impl QuadIndexCache {
    fn ensure(
        &mut self,
        memory: &mut dyn BufferManager,
        vertex_count: u32,
        stats: &mut InterconnectStats,
    ) -> Result<BufferBinding> {
        if let Some(binding) = self.binding {
            if vertex_count <= self.vertex_count {
                return Ok(binding);
            }
        }

        let indices = expand_quads_nonindexed_u32(vertex_count);
        let bytes: &[u8] = bytemuck::cast_slice(&indices);
        let binding = memory
            .upload(bytes)
            .map_err(|source| InterconnectError::IndexUpload {
                size: bytes.len(),
                source,
            })?;
        debug!(
            vertex_count,
            index_count = indices.len(),
            "generated quad index buffer"
        );

        self.binding = Some(binding);
        self.vertex_count = vertex_count;
        InterconnectStats::bump(&mut stats.quad_index_generations);
        Ok(binding)
    }
}

/// Last values recorded for state that persists across draws of one recording unit.
#[derive(Debug, Clone, Default)]
struct DynamicStateCache {
    viewports: [Option<Viewport>; VIEWPORT_COUNT],
    scissors: [Option<Rect2D>; VIEWPORT_COUNT],
    line_width: Option<f32>,
    depth_bias: Option<DepthBias>,
    blend_constants: Option<[f32; 4]>,
    depth_bounds: Option<(f32, f32)>,
    stencil: Option<StencilDynamicState>,
    pipeline: Option<PipelineHandle>,
}

/// Stores `value` and reports whether it differs from what was recorded last.
fn update<T: PartialEq + Copy>(slot: &mut Option<T>, value: T) -> bool {
    if *slot == Some(value) {
        return false;
    }
    *slot = Some(value);
    true
}

enum DescriptorAction<'a> {
    Update {
        info: DescriptorUpdateInfo<'a>,
        dst: DescriptorSetId,
        src: Option<DescriptorSetId>,
    },
    Push(DescriptorUpdateInfo<'a>),
    Rebind {
        layout: PipelineLayoutId,
        set: DescriptorSetId,
    },
    Nothing,
}

fn allocate_descriptor_set(
    descriptors: &mut dyn DescriptorAllocator,
    batch: &mut Vec<DescriptorSetId>,
    stats: &mut InterconnectStats,
    pipeline: &Pipeline,
) -> Result<DescriptorSetId> {
    let set = descriptors
        .allocate_set(pipeline.compiled().set_layout)
        .map_err(InterconnectError::DescriptorAllocation)?;
    batch.push(set);
    InterconnectStats::bump(&mut stats.descriptor_sets_allocated);
    Ok(set)
}

fn stencil_face(reference: u8, compare_mask: u8, write_mask: u8) -> StencilFaceDynamic {
    StencilFaceDynamic {
        reference: reference.into(),
        compare_mask: compare_mask.into(),
        write_mask: write_mask.into(),
    }
}

pub struct Maxwell3D {
    config: InterconnectConfig,
    registers: EngineRegisters,
    constant_buffers: ConstantBuffers,
    pipelines: PipelineManager,
    active_pipeline: Option<PipelineId>,
    active_descriptor_set: Option<DescriptorSetId>,
    /// Pool registers the active descriptor set was resolved against.
    descriptor_pools: Option<(TexturePool, SamplerPool)>,
    descriptor_batch: Vec<DescriptorSetId>,
    quad_indices: QuadIndexCache,
    dynamic_state: DynamicStateCache,
    stats: InterconnectStats,
}

impl Maxwell3D {
    pub fn new(config: InterconnectConfig) -> Self {
        Self {
            constant_buffers: ConstantBuffers::new(config.quick_bind_capacity()),
            descriptor_batch: Vec::with_capacity(config.descriptor_batch_size),
            config,
            registers: EngineRegisters::default(),
            pipelines: PipelineManager::new(),
            active_pipeline: None,
            active_descriptor_set: None,
            descriptor_pools: None,
            quad_indices: QuadIndexCache::default(),
            dynamic_state: DynamicStateCache::default(),
            stats: InterconnectStats::default(),
        }
    }

    pub fn config(&self) -> &InterconnectConfig {
        &self.config
    }

    pub fn registers(&self) -> &EngineRegisters {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut EngineRegisters {
        &mut self.registers
    }

    pub fn constant_buffers(&self) -> &ConstantBufferSet {
        &self.constant_buffers.set
    }

    pub fn active_pipeline(&self) -> Option<&Pipeline> {
        self.active_pipeline.map(|id| self.pipelines.get(id))
    }

    pub fn active_descriptor_set(&self) -> Option<DescriptorSetId> {
        self.active_descriptor_set
    }

    pub fn pipeline_stats(&self) -> PipelineCacheStats {
        self.pipelines.stats()
    }

    pub fn stats(&self) -> InterconnectStats {
        self.stats
    }

    /// Writes `data` into the selected constant buffer at `offset` bytes.
    pub fn load_constant_buffer(
        &mut self,
        memory: &mut dyn BufferManager,
        data: &[u32],
        offset: u32,
    ) {
        let selector = self.registers.constant_buffer_selector;
        let Some(view) = memory.lookup(selector.address, selector.size.into()) else {
            warn!(
                address = selector.address,
                size = selector.size,
                "constant buffer load to unmapped selector"
            );
            return;
        };
        self.constant_buffers.load(memory, &view, data, offset);
    }

    /// Binds the selected constant buffer to `index` of `stage`, or unbinds the slot.
    pub fn bind_constant_buffer(
        &mut self,
        memory: &mut dyn BufferManager,
        stage: ShaderStage,
        index: u32,
        enable: bool,
    ) {
        if !enable {
            self.constant_buffers.unbind(stage, index);
            return;
        }

        let selector = self.registers.constant_buffer_selector;
        match memory.lookup(selector.address, selector.size.into()) {
            Some(view) => self.constant_buffers.bind(stage, index, view),
            None => {
                trace!(
                    %stage,
                    index,
                    address = selector.address,
                    "binding unmapped constant buffer"
                );
                self.constant_buffers.unbind(stage, index);
            }
        }
    }

    pub fn disable_quick_constant_buffer_bind(&mut self) {
        self.constant_buffers.disable_quick_bind();
    }

    fn attachments(&self) -> Attachments {
        let regs = &self.registers;
        let count = usize::from(regs.color_target_count).min(regs.color_targets.len());
        Attachments {
            color: regs.color_targets[..count]
                .iter()
                .map(|target| target.view.filter(|_| !target.format.is_none()))
                .collect(),
            depth: regs
                .depth_target
                .view
                .filter(|_| !regs.depth_target.format.is_none()),
        }
    }

    fn resolve_pipeline(
        &mut self,
        ctx: &mut InterconnectContext<'_>,
        key: &PackedPipelineState,
        attachments: &Attachments,
    ) -> Result<PipelineId> {
        let Some(from) = self.active_pipeline else {
            return self.pipelines.find_or_create(
                ctx.shaders,
                ctx.pipelines,
                key,
                &self.registers.shader_programs,
                attachments,
            );
        };

        if self.pipelines.get(from).source_state() == key {
            return Ok(from);
        }
        if let Some(next) = self.pipelines.lookup_next(from, key) {
            return Ok(next);
        }

        let next = self.pipelines.find_or_create(
            ctx.shaders,
            ctx.pipelines,
            key,
            &self.registers.shader_programs,
            attachments,
        )?;
        self.pipelines.add_transition(from, next);
        Ok(next)
    }

    /// Whether the rebinds since the previous draw can be applied on top of the active set.
    fn quick_bind_allowed(&mut self, previous: Option<PipelineId>, next: PipelineId) -> bool {
        if self.config.push_descriptors
            || self.constant_buffers.quick_bind().is_none()
            || self.active_descriptor_set.is_none()
        {
            return false;
        }
        let pools = (self.registers.texture_pool, self.registers.sampler_pool);
        if self.descriptor_pools != Some(pools) {
            return false;
        }
        match previous {
            Some(previous) if previous == next => true,
            Some(previous) => self.pipelines.check_binding_match(previous, next),
            None => false,
        }
    }

    fn plan_descriptors<'a>(
        &mut self,
        ctx: &mut InterconnectContext<'a>,
        pipeline_id: PipelineId,
        quick: bool,
    ) -> Result<DescriptorAction<'a>> {
        let arena = ctx.arena;
        let pipeline = self.pipelines.get(pipeline_id);
        let mut sources = DescriptorSources {
            constant_buffers: &self.constant_buffers.set,
            texture_pool: &self.registers.texture_pool,
            sampler_pool: &self.registers.sampler_pool,
            memory: &mut *ctx.memory,
            textures: &mut *ctx.textures,
        };

        if self.config.push_descriptors {
            InterconnectStats::bump(&mut self.stats.full_descriptor_syncs);
            return Ok(match pipeline.sync_descriptors(arena, &mut sources) {
                Some(info) => DescriptorAction::Push(info),
                None => DescriptorAction::Nothing,
            });
        }

        let quick_bind = if quick {
            self.constant_buffers.quick_bind()
        } else {
            None
        };
        if let (Some(quick_bind), Some(src)) = (quick_bind, self.active_descriptor_set) {
            InterconnectStats::bump(&mut self.stats.quick_descriptor_syncs);
            return match pipeline.sync_descriptors_quick_bind(arena, quick_bind, &mut sources) {
                QuickBindSync::Unchanged => {
                    InterconnectStats::bump(&mut self.stats.quick_descriptor_syncs_unchanged);
                    Ok(DescriptorAction::Rebind {
                        layout: pipeline.compiled().layout,
                        set: src,
                    })
                }
                QuickBindSync::Update(info) => {
                    let dst = allocate_descriptor_set(
                        ctx.descriptors,
                        &mut self.descriptor_batch,
                        &mut self.stats,
                        pipeline,
                    )?;
                    Ok(DescriptorAction::Update {
                        info,
                        dst,
                        src: Some(src),
                    })
                }
            };
        }

        InterconnectStats::bump(&mut self.stats.full_descriptor_syncs);
        match pipeline.sync_descriptors(arena, &mut sources) {
            Some(info) => {
                let dst = allocate_descriptor_set(
                    ctx.descriptors,
                    &mut self.descriptor_batch,
                    &mut self.stats,
                    pipeline,
                )?;
                Ok(DescriptorAction::Update {
                    info,
                    dst,
                    src: None,
                })
            }
            None => Ok(DescriptorAction::Nothing),
        }
    }

    fn bind_vertex_streams(
        &self,
        builder: &mut StateUpdateBuilder<'_>,
        memory: &mut dyn BufferManager,
    ) {
        for (index, stream) in self.registers.vertex_streams.iter().enumerate() {
            if !stream.enable {
                continue;
            }
            match memory.lookup(stream.address, stream.size) {
                Some(view) => builder.set_vertex_buffer_view(index as u32, view),
                None => {
                    trace!(index, address = stream.address, "vertex stream is not backed");
                    builder.set_vertex_buffer(index as u32, memory.dummy_binding());
                }
            }
        }
    }

    fn bind_transform_feedback(
        &self,
        builder: &mut StateUpdateBuilder<'_>,
        memory: &mut dyn BufferManager,
    ) {
        for (index, buffer) in self.registers.transform_feedback_buffers.iter().enumerate() {
            if !buffer.enable {
                continue;
            }
            match memory.lookup(buffer.address, buffer.size) {
                Some(view) => builder.set_transform_feedback_buffer_view(index as u32, view),
                None => trace!(
                    index,
                    address = buffer.address,
                    "transform feedback buffer is not backed"
                ),
            }
        }
    }

    /// Binds the index buffer, emulating quads if needed. Returns the host draw's
    /// `(indexed, count, first, vertex_offset)`.
    fn bind_index_buffer(
        &mut self,
        builder: &mut StateUpdateBuilder<'_>,
        memory: &mut dyn BufferManager,
        params: &DrawParams,
        quads: bool,
    ) -> Result<(bool, u32, u32, i32)> {
        let index_buffer = self.registers.index_buffer;

        if !params.indexed {
            if !quads {
                return Ok((false, params.count, params.first, params.vertex_offset));
            }
            let binding = self.quad_indices.ensure(memory, params.count, &mut self.stats)?;
            builder.set_index_buffer(binding, IndexFormat::U32);
            // The first vertex becomes a signed vertex offset; saturate past `i32::MAX`.
            let vertex_offset = i32::try_from(params.first).unwrap_or(i32::MAX);
            return Ok((true, quad_index_count(params.count), 0, vertex_offset));
        }

        let Some(view) = memory.lookup(index_buffer.address, index_buffer.size) else {
            return Err(InterconnectError::UnmappedIndexBuffer {
                address: index_buffer.address,
            });
        };

        if !quads {
            builder.set_index_buffer_view(view, index_buffer.format);
            return Ok((true, params.count, params.first, params.vertex_offset));
        }

        let stride = index_buffer.format.size();
        let mut guest = vec![0u8; (u64::from(params.count) * stride) as usize];
        memory.read(&view, u64::from(params.first) * stride, &mut guest);
        let indices = expand_quads_indexed_u32(&guest, index_buffer.format);
        let bytes: &[u8] = bytemuck::cast_slice(&indices);
        let binding = memory
            .upload(bytes)
            .map_err(|source| InterconnectError::IndexUpload {
                size: bytes.len(),
                source,
            })?;
        builder.set_index_buffer(binding, IndexFormat::U32);
        Ok((true, indices.len() as u32, 0, params.vertex_offset))
    }

    fn record_dynamic_state(
        &self,
        cache: &mut DynamicStateCache,
        builder: &mut StateUpdateBuilder<'_>,
    ) {
        let regs = &self.registers;

        for (index, viewport) in regs.viewports.iter().enumerate() {
            if update(&mut cache.viewports[index], *viewport) {
                builder.set_viewport(index as u32, *viewport);
            }
        }
        for (index, scissor) in regs.scissors.iter().enumerate() {
            let rect = scissor.rect();
            if update(&mut cache.scissors[index], rect) {
                builder.set_scissor(index as u32, rect);
            }
        }
        if update(&mut cache.line_width, regs.line_width) {
            builder.set_line_width(regs.line_width);
        }
        if regs.depth_bias_enable && update(&mut cache.depth_bias, regs.depth_bias) {
            builder.set_depth_bias(regs.depth_bias);
        }
        if update(&mut cache.blend_constants, regs.blend_constants) {
            builder.set_blend_constants(regs.blend_constants);
        }
        if regs.depth_bounds_enable && update(&mut cache.depth_bounds, regs.depth_bounds) {
            builder.set_depth_bounds(regs.depth_bounds.0, regs.depth_bounds.1);
        }
        if regs.stencil_enable {
            let front = &regs.stencil_front;
            let back = if regs.stencil_two_sided {
                &regs.stencil_back
            } else {
                front
            };
            let stencil = StencilDynamicState {
                front: stencil_face(front.func_ref, front.func_mask, front.write_mask),
                back: stencil_face(back.func_ref, back.func_mask, back.write_mask),
            };
            if update(&mut cache.stencil, stencil) {
                builder.set_stencil_state(stencil);
            }
        }
    }

    /// Records one draw: resolves the pipeline, synchronizes descriptors, and submits the state
    /// updates followed by the draw.
    pub fn draw<'a>(
        &mut self,
        ctx: &mut InterconnectContext<'a>,
        params: &DrawParams,
    ) -> Result<()> {
        let translation = translate_draw_topology(params.topology);
        let key = PackedPipelineState::from_registers(
            &self.registers,
            translation.topology,
            params.transform_feedback_enable,
        );
        let attachments = self.attachments();

        let previous = self.active_pipeline;
        let pipeline_id = self.resolve_pipeline(ctx, &key, &attachments)?;
        if previous != Some(pipeline_id) {
            InterconnectStats::bump(&mut self.stats.pipeline_switches);
        }

        let quick = self.quick_bind_allowed(previous, pipeline_id);
        let descriptors = self.plan_descriptors(ctx, pipeline_id, quick)?;

        let mut builder = StateUpdateBuilder::new(ctx.arena);
        self.bind_vertex_streams(&mut builder, &mut *ctx.memory);
        let (indexed, count, first, vertex_offset) = self.bind_index_buffer(
            &mut builder,
            &mut *ctx.memory,
            params,
            translation.needs_quad_emulation,
        )?;
        if params.transform_feedback_enable {
            self.bind_transform_feedback(&mut builder, &mut *ctx.memory);
        }
        // Committed only once the submitter has accepted the list.
        let mut dynamic_state = self.dynamic_state.clone();
        self.record_dynamic_state(&mut dynamic_state, &mut builder);

        let compiled = *self.pipelines.get(pipeline_id).compiled();
        if update(&mut dynamic_state.pipeline, compiled.pipeline) {
            builder.set_pipeline(compiled.pipeline);
        }

        let active_set = match descriptors {
            DescriptorAction::Update { info, dst, src } => {
                builder.set_descriptor_set_with_update(info, dst, src);
                Some(dst)
            }
            DescriptorAction::Push(info) => {
                builder.set_descriptor_set_with_push(info);
                None
            }
            DescriptorAction::Rebind { layout, set } => {
                builder.set_descriptor_set(layout, 0, set);
                Some(set)
            }
            DescriptorAction::Nothing => None,
        };

        let updater = builder.build(&mut *ctx.memory);
        trace!(
            pipeline = pipeline_id.0,
            topology = %params.topology,
            indexed,
            count,
            nodes = updater.len(),
            quick,
            "recording draw"
        );
        let op = DrawOp {
            pipeline: compiled.pipeline,
            topology: translation.topology,
            attachments,
            indexed,
            count,
            first,
            instance_count: params.instance_count,
            vertex_offset,
            first_instance: params.first_instance,
            transform_feedback: params.transform_feedback_enable,
        };
        ctx.submitter
            .submit(updater, RecordedOp::Draw(op))
            .map_err(InterconnectError::Submission)?;

        self.dynamic_state = dynamic_state;
        self.active_pipeline = Some(pipeline_id);
        self.active_descriptor_set = active_set;
        self.descriptor_pools = Some((self.registers.texture_pool, self.registers.sampler_pool));
        self.constant_buffers.reset_quick_bind();
        InterconnectStats::bump(&mut self.stats.draws);

        if self.descriptor_batch.len() >= self.config.descriptor_batch_size.max(1) {
            self.retire_descriptor_batch(ctx);
        }
        Ok(())
    }

    /// Effective clear region: the clear rect clipped to the surface clip, and to scissor 0 and
    /// viewport clip 0 when the clear control asks for them.
    pub fn clear_scissor(&self) -> Rect2D {
        let regs = &self.registers;
        let mut rect = regs.clear_rect.rect().intersect(&regs.surface_clip.rect());
        if regs.clear_surface_control.contains(ClearSurfaceControl::USE_SCISSOR0) {
            rect = rect.intersect(&regs.scissors[0].rect());
        }
        if regs.clear_surface_control.contains(ClearSurfaceControl::USE_VIEWPORT_CLIP0) {
            rect = rect.intersect(&regs.viewport_clip0.rect());
        }
        rect
    }

    pub fn clear(
        &mut self,
        ctx: &mut InterconnectContext<'_>,
        surface: ClearSurface,
    ) -> Result<()> {
        let regs = &self.registers;
        let rect = self.clear_scissor();

        let write_mask = ColorWriteMask::from_clear_aspects(surface.aspects);
        let color = regs
            .color_targets
            .get(usize::from(surface.mrt_select))
            .filter(|target| !write_mask.is_empty() && !target.format.is_none())
            .and_then(|target| target.view)
            .map(|view| ColorClear {
                target: surface.mrt_select,
                view,
                value: regs.color_clear_value,
                write_mask,
            });

        let depth_stencil_view = regs
            .depth_target
            .view
            .filter(|_| !regs.depth_target.format.is_none());
        let depth = (surface.aspects.contains(ClearAspects::DEPTH) && depth_stencil_view.is_some())
            .then_some(regs.depth_clear_value);
        let stencil = (surface.aspects.contains(ClearAspects::STENCIL)
            && depth_stencil_view.is_some())
        .then_some(regs.stencil_clear_value);
        let stencil_write_mask = if regs
            .clear_surface_control
            .contains(ClearSurfaceControl::RESPECT_STENCIL_MASK)
        {
            regs.stencil_front.write_mask
        } else {
            u8::MAX
        };

        if rect.is_empty() || (color.is_none() && depth.is_none() && stencil.is_none()) {
            trace!(?rect, aspects = ?surface.aspects, "skipping clear");
            InterconnectStats::bump(&mut self.stats.clears_skipped);
            return Ok(());
        }

        let op = ClearOp {
            rect,
            layer: surface.rt_array_index,
            color,
            depth_stencil_view: depth_stencil_view.filter(|_| depth.is_some() || stencil.is_some()),
            depth,
            stencil,
            stencil_write_mask,
        };

        let mut builder = StateUpdateBuilder::new(ctx.arena);
        builder.set_scissor(0, rect);
        // The next draw has to restore its own scissor 0.
        self.dynamic_state.scissors[0] = None;
        let updater = builder.build(&mut *ctx.memory);

        ctx.submitter
            .submit(updater, RecordedOp::Clear(op))
            .map_err(InterconnectError::Submission)?;
        InterconnectStats::bump(&mut self.stats.clears);
        Ok(())
    }

    fn retire_descriptor_batch(&mut self, ctx: &mut InterconnectContext<'_>) {
        if self.descriptor_batch.is_empty() {
            return;
        }
        let batch = std::mem::replace(
            &mut self.descriptor_batch,
            Vec::with_capacity(self.config.descriptor_batch_size),
        );
        debug!(sets = batch.len(), "retiring descriptor set batch");
        ctx.submitter.retire_descriptor_sets(batch);
        // The active set went out with the batch and can no longer be copied from.
        self.active_descriptor_set = None;
        self.descriptor_pools = None;
    }

    /// Ends the current recording unit: hands outstanding descriptor sets to the submitter and
    /// forgets all state recorded into the unit.
    pub fn flush_descriptor_sets(&mut self, ctx: &mut InterconnectContext<'_>) {
        self.retire_descriptor_batch(ctx);
        self.active_descriptor_set = None;
        self.descriptor_pools = None;
        self.dynamic_state = DynamicStateCache::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ClearRect, Scissor, SurfaceClip, ViewportClip};

    fn engine() -> Maxwell3D {
        Maxwell3D::new(InterconnectConfig::default())
    }

    #[test]
    fn clear_scissor_is_clear_rect_within_surface_clip() {
        let mut maxwell = engine();
        let regs = maxwell.registers_mut();
        regs.surface_clip = SurfaceClip {
            x: 0,
            width: 100,
            y: 0,
            height: 100,
        };
        regs.clear_rect = ClearRect {
            min_x: 50,
            max_x: 150,
            min_y: 10,
            max_y: 20,
        };
        assert_eq!(maxwell.clear_scissor(), Rect2D::new(50, 10, 50, 10));
    }

    #[test]
    fn clear_control_adds_scissor_and_viewport_clip() {
        let mut maxwell = engine();
        let regs = maxwell.registers_mut();
        regs.surface_clip = SurfaceClip {
            x: 0,
            width: 256,
            y: 0,
            height: 256,
        };
        regs.clear_rect = ClearRect {
            min_x: 0,
            max_x: 256,
            min_y: 0,
            max_y: 256,
        };
        regs.scissors[0] = Scissor {
            enable: true,
            min_x: 16,
            max_x: 128,
            min_y: 0,
            max_y: 256,
        };
        regs.viewport_clip0 = ViewportClip {
            min_x: 0,
            max_x: 256,
            min_y: 32,
            max_y: 64,
        };
        assert_eq!(maxwell.clear_scissor(), Rect2D::new(0, 0, 256, 256));

        maxwell.registers_mut().clear_surface_control =
            ClearSurfaceControl::USE_SCISSOR0 | ClearSurfaceControl::USE_VIEWPORT_CLIP0;
        assert_eq!(maxwell.clear_scissor(), Rect2D::new(16, 32, 112, 32));
    }

    #[test]
    fn dynamic_state_update_reports_changes_only() {
        let mut slot = None;
        assert!(update(&mut slot, 1.0f32));
        assert!(!update(&mut slot, 1.0f32));
        assert!(update(&mut slot, 2.0f32));
    }
}
