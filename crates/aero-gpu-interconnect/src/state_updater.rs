//! Deferred state-update recording.
//!
//! A draw decides every state change it needs up front and appends it to a
//! [`StateUpdateBuilder`]. The finished [`StateUpdater`] is handed to the submitter, which replays
//! it against a [`CommandRecorder`] once, possibly after other work has reassigned buffer
//! backings. Guest buffer views are therefore kept unresolved until replay.
//!
//! Nodes live in a `bumpalo` vector borrowed from the caller's per-draw arena, so building a list
//! costs no heap allocation beyond arena growth.

use bumpalo::collections::Vec as BumpVec;
use bumpalo::Bump;
use smallvec::SmallVec;
use tracing::trace;

use crate::backend::{DescriptorSetId, PipelineHandle, PipelineLayoutId};
use crate::descriptor::{DescriptorCopy, DescriptorUpdateInfo, ResolvedDescriptorWrite};
use crate::engine::{DepthBias, IndexFormat, Rect2D, Viewport, VERTEX_STREAM_COUNT};
use crate::memory::{
    BufferBinding, BufferManager, BufferResolver, BufferView, DynamicBufferBinding,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StencilFaceDynamic {
    pub reference: u32,
    pub compare_mask: u32,
    pub write_mask: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StencilDynamicState {
    pub front: StencilFaceDynamic,
    pub back: StencilFaceDynamic,
}

/// Replay target of a [`StateUpdater`], implemented by the host command buffer wrapper.
pub trait CommandRecorder {
    fn bind_vertex_buffers(&mut self, first: u32, bindings: &[BufferBinding]);
    fn bind_index_buffer(&mut self, binding: BufferBinding, format: IndexFormat);
    fn bind_transform_feedback_buffer(&mut self, index: u32, binding: BufferBinding);
    fn set_viewport(&mut self, index: u32, viewport: &Viewport);
    fn set_scissor(&mut self, index: u32, scissor: Rect2D);
    fn set_line_width(&mut self, width: f32);
    fn set_depth_bias(&mut self, bias: DepthBias);
    fn set_blend_constants(&mut self, constants: [f32; 4]);
    fn set_depth_bounds(&mut self, min: f32, max: f32);
    fn set_stencil_state(&mut self, state: &StencilDynamicState);
    fn bind_pipeline(&mut self, pipeline: PipelineHandle);

    /// Fills `dst`: every copy from `src` is applied first, then `writes` overwrite their
    /// bindings.
    fn update_descriptor_set(
        &mut self,
        dst: DescriptorSetId,
        src: Option<DescriptorSetId>,
        copies: &[DescriptorCopy],
        writes: &[ResolvedDescriptorWrite<'_>],
    );

    fn push_descriptor_set(
        &mut self,
        layout: PipelineLayoutId,
        set_index: u32,
        writes: &[ResolvedDescriptorWrite<'_>],
    );

    fn bind_descriptor_set(
        &mut self,
        layout: PipelineLayoutId,
        set_index: u32,
        set: DescriptorSetId,
    );
}

/// One deferred state mutation.
#[derive(Debug)]
pub enum StateUpdateCmd<'a> {
    /// Contiguous vertex buffer binds starting at `first`, all of the same kind.
    BindVertexBuffers {
        first: u32,
        bindings: BumpVec<'a, DynamicBufferBinding>,
    },
    BindIndexBuffer {
        binding: DynamicBufferBinding,
        format: IndexFormat,
    },
    BindTransformFeedbackBuffer {
        index: u32,
        binding: DynamicBufferBinding,
    },
    SetViewport {
        index: u32,
        viewport: Viewport,
    },
    SetScissor {
        index: u32,
        scissor: Rect2D,
    },
    SetLineWidth(f32),
    SetDepthBias(DepthBias),
    SetBlendConstants([f32; 4]),
    SetDepthBounds {
        min: f32,
        max: f32,
    },
    SetStencilState(StencilDynamicState),
    BindPipeline(PipelineHandle),
    /// Fill `dst` from `info` (copying from `src` first) and bind it.
    SetDescriptorSetWithUpdate {
        info: DescriptorUpdateInfo<'a>,
        dst: DescriptorSetId,
        src: Option<DescriptorSetId>,
    },
    SetDescriptorSetWithPush {
        info: DescriptorUpdateInfo<'a>,
    },
    BindDescriptorSet {
        layout: PipelineLayoutId,
        set_index: u32,
        set: DescriptorSetId,
    },
}

struct VertexBatch<'a> {
    first: u32,
    deferred: bool,
    bindings: BumpVec<'a, DynamicBufferBinding>,
}

impl VertexBatch<'_> {
    fn accepts(&self, index: u32, deferred: bool) -> bool {
        self.deferred == deferred && self.first + self.bindings.len() as u32 == index
    }
}

pub struct StateUpdateBuilder<'a> {
    arena: &'a Bump,
    cmds: BumpVec<'a, StateUpdateCmd<'a>>,
    vertex_batch: Option<VertexBatch<'a>>,
    /// Views referenced by deferred binds; marked as blocking sequenced writes on build.
    views: SmallVec<[BufferView; VERTEX_STREAM_COUNT]>,
}

impl<'a> StateUpdateBuilder<'a> {
    pub fn new(arena: &'a Bump) -> Self {
        Self {
            arena,
            cmds: BumpVec::new_in(arena),
            vertex_batch: None,
            views: SmallVec::new(),
        }
    }

    fn flush_vertex_batch(&mut self) {
        if let Some(batch) = self.vertex_batch.take() {
            self.cmds.push(StateUpdateCmd::BindVertexBuffers {
                first: batch.first,
                bindings: batch.bindings,
            });
        }
    }

    fn push(&mut self, cmd: StateUpdateCmd<'a>) {
        self.flush_vertex_batch();
        self.cmds.push(cmd);
    }

    fn track(&mut self, binding: DynamicBufferBinding) {
        if let DynamicBufferBinding::Deferred(view) = binding {
            self.views.push(view);
        }
    }

    fn append_vertex_buffer(&mut self, index: u32, binding: DynamicBufferBinding) {
        let deferred = matches!(binding, DynamicBufferBinding::Deferred(_));
        self.track(binding);

        if let Some(batch) = self
            .vertex_batch
            .as_mut()
            .filter(|batch| batch.accepts(index, deferred))
        {
            batch.bindings.push(binding);
            return;
        }

        self.flush_vertex_batch();
        let mut bindings = BumpVec::new_in(self.arena);
        bindings.push(binding);
        self.vertex_batch = Some(VertexBatch {
            first: index,
            deferred,
            bindings,
        });
    }

    pub fn set_vertex_buffer(&mut self, index: u32, binding: BufferBinding) {
        self.append_vertex_buffer(index, binding.into());
    }

    pub fn set_vertex_buffer_view(&mut self, index: u32, view: BufferView) {
        self.append_vertex_buffer(index, view.into());
    }

    pub fn set_index_buffer(&mut self, binding: BufferBinding, format: IndexFormat) {
        self.push(StateUpdateCmd::BindIndexBuffer {
            binding: binding.into(),
            format,
        });
    }

    pub fn set_index_buffer_view(&mut self, view: BufferView, format: IndexFormat) {
        let binding = view.into();
        self.track(binding);
        self.push(StateUpdateCmd::BindIndexBuffer { binding, format });
    }

    pub fn set_transform_feedback_buffer(&mut self, index: u32, binding: BufferBinding) {
        self.push(StateUpdateCmd::BindTransformFeedbackBuffer {
            index,
            binding: binding.into(),
        });
    }

    pub fn set_transform_feedback_buffer_view(&mut self, index: u32, view: BufferView) {
        let binding = view.into();
        self.track(binding);
        self.push(StateUpdateCmd::BindTransformFeedbackBuffer { index, binding });
    }

    pub fn set_viewport(&mut self, index: u32, viewport: Viewport) {
        self.push(StateUpdateCmd::SetViewport { index, viewport });
    }

    pub fn set_scissor(&mut self, index: u32, scissor: Rect2D) {
        self.push(StateUpdateCmd::SetScissor { index, scissor });
    }

    pub fn set_line_width(&mut self, width: f32) {
        self.push(StateUpdateCmd::SetLineWidth(width));
    }

    pub fn set_depth_bias(&mut self, bias: DepthBias) {
        self.push(StateUpdateCmd::SetDepthBias(bias));
    }

    pub fn set_blend_constants(&mut self, constants: [f32; 4]) {
        self.push(StateUpdateCmd::SetBlendConstants(constants));
    }

    pub fn set_depth_bounds(&mut self, min: f32, max: f32) {
        self.push(StateUpdateCmd::SetDepthBounds { min, max });
    }

    pub fn set_stencil_state(&mut self, state: StencilDynamicState) {
        self.push(StateUpdateCmd::SetStencilState(state));
    }

    pub fn set_pipeline(&mut self, pipeline: PipelineHandle) {
        self.push(StateUpdateCmd::BindPipeline(pipeline));
    }

    pub fn set_descriptor_set_with_update(
        &mut self,
        info: DescriptorUpdateInfo<'a>,
        dst: DescriptorSetId,
        src: Option<DescriptorSetId>,
    ) {
        debug_assert!(info.copies.is_empty() || src.is_some());
        self.push(StateUpdateCmd::SetDescriptorSetWithUpdate { info, dst, src });
    }

    pub fn set_descriptor_set_with_push(&mut self, info: DescriptorUpdateInfo<'a>) {
        self.push(StateUpdateCmd::SetDescriptorSetWithPush { info });
    }

    pub fn set_descriptor_set(
        &mut self,
        layout: PipelineLayoutId,
        set_index: u32,
        set: DescriptorSetId,
    ) {
        self.push(StateUpdateCmd::BindDescriptorSet {
            layout,
            set_index,
            set,
        });
    }

    /// Finishes the list, marking every guest view it references as blocking sequenced writes.
    pub fn build(mut self, memory: &mut dyn BufferManager) -> StateUpdater<'a> {
        self.flush_vertex_batch();
        for view in &self.views {
            memory.block_sequenced_writes(view);
        }
        trace!(nodes = self.cmds.len(), views = self.views.len(), "built state update list");
        StateUpdater { cmds: self.cmds }
    }
}

/// A finished, single-use list of state updates.
#[derive(Debug)]
pub struct StateUpdater<'a> {
    cmds: BumpVec<'a, StateUpdateCmd<'a>>,
}

impl<'a> StateUpdater<'a> {
    pub fn len(&self) -> usize {
        self.cmds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cmds.is_empty()
    }

    pub fn commands(&self) -> &[StateUpdateCmd<'a>] {
        &self.cmds
    }

    /// Replays every node once, in append order, resolving guest views through `buffers`.
    pub fn record_all(self, recorder: &mut dyn CommandRecorder, buffers: &dyn BufferResolver) {
        for cmd in &self.cmds {
            match cmd {
                StateUpdateCmd::BindVertexBuffers { first, bindings } => {
                    let resolved: SmallVec<[BufferBinding; VERTEX_STREAM_COUNT]> =
                        bindings.iter().map(|b| b.resolve(buffers)).collect();
                    recorder.bind_vertex_buffers(*first, &resolved);
                }
                StateUpdateCmd::BindIndexBuffer { binding, format } => {
                    recorder.bind_index_buffer(binding.resolve(buffers), *format);
                }
                StateUpdateCmd::BindTransformFeedbackBuffer { index, binding } => {
                    recorder.bind_transform_feedback_buffer(*index, binding.resolve(buffers));
                }
                StateUpdateCmd::SetViewport { index, viewport } => {
                    recorder.set_viewport(*index, viewport);
                }
                StateUpdateCmd::SetScissor { index, scissor } => {
                    recorder.set_scissor(*index, *scissor);
                }
                StateUpdateCmd::SetLineWidth(width) => recorder.set_line_width(*width),
                StateUpdateCmd::SetDepthBias(bias) => recorder.set_depth_bias(*bias),
                StateUpdateCmd::SetBlendConstants(constants) => {
                    recorder.set_blend_constants(*constants);
                }
                StateUpdateCmd::SetDepthBounds { min, max } => {
                    recorder.set_depth_bounds(*min, *max);
                }
                StateUpdateCmd::SetStencilState(state) => recorder.set_stencil_state(state),
                StateUpdateCmd::BindPipeline(pipeline) => recorder.bind_pipeline(*pipeline),
                StateUpdateCmd::SetDescriptorSetWithUpdate { info, dst, src } => {
                    let resolved = info.resolve_buffers(buffers);
                    let writes: Vec<ResolvedDescriptorWrite<'_>> = info
                        .writes
                        .iter()
                        .map(|w| w.resolve(&resolved, &info.images))
                        .collect();
                    recorder.update_descriptor_set(*dst, *src, info.copies, &writes);
                    recorder.bind_descriptor_set(info.pipeline_layout, info.set_index, *dst);
                }
                StateUpdateCmd::SetDescriptorSetWithPush { info } => {
                    let resolved = info.resolve_buffers(buffers);
                    let writes: Vec<ResolvedDescriptorWrite<'_>> = info
                        .writes
                        .iter()
                        .map(|w| w.resolve(&resolved, &info.images))
                        .collect();
                    recorder.push_descriptor_set(info.pipeline_layout, info.set_index, &writes);
                }
                StateUpdateCmd::BindDescriptorSet {
                    layout,
                    set_index,
                    set,
                } => recorder.bind_descriptor_set(*layout, *set_index, *set),
            }
        }
    }
}
