//! Interfaces to the collaborators the interconnect drives but does not implement.
//!
//! Handles are opaque ids minted by the collaborators; the interconnect only stores and forwards
//! them. Collaborators report failures as `anyhow::Error`, which the interconnect wraps into
//! [`crate::InterconnectError`].

use bumpalo::Bump;
use smallvec::SmallVec;

use crate::descriptor::LayoutBinding;
use crate::engine::{SamplerPool, ShaderStage, TexturePool, COLOR_TARGET_COUNT};
use crate::maxwell3d::RecordedOp;
use crate::memory::BufferManager;
use crate::packed_state::PackedPipelineState;
use crate::shader::{ShaderBinary, ShaderInfo, TextureType};
use crate::state_updater::StateUpdater;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderModuleId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineLayoutId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorSetLayoutId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorSetId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageViewId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SamplerId(pub u32);

/// Output of shader translation for one host stage.
#[derive(Debug, Clone)]
pub struct TranslatedShader {
    pub module: ShaderModuleId,
    pub info: ShaderInfo,
}

pub trait ShaderTranslator {
    /// Translates the programs feeding `stage` (one, or two for a combined vertex stage).
    fn translate(
        &mut self,
        stage: ShaderStage,
        programs: &[&ShaderBinary],
        state: &PackedPipelineState,
    ) -> anyhow::Result<TranslatedShader>;
}

/// Render targets a pipeline is created against and a draw renders into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachments {
    pub color: SmallVec<[Option<ImageViewId>; COLOR_TARGET_COUNT]>,
    pub depth: Option<ImageViewId>,
}

#[derive(Debug, Clone, Copy)]
pub struct GraphicsPipelineDesc<'a> {
    pub state: &'a PackedPipelineState,
    pub stages: &'a [(ShaderStage, ShaderModuleId)],
    pub layout_bindings: &'a [LayoutBinding],
    pub attachments: &'a Attachments,
}

/// Handles produced when a graphics pipeline is compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledPipeline {
    pub pipeline: PipelineHandle,
    pub layout: PipelineLayoutId,
    pub set_layout: DescriptorSetLayoutId,
}

pub trait PipelineFactory {
    fn create_graphics_pipeline(
        &mut self,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> anyhow::Result<CompiledPipeline>;
}

pub trait DescriptorAllocator {
    fn allocate_set(&mut self, layout: DescriptorSetLayoutId) -> anyhow::Result<DescriptorSetId>;
}

pub trait TextureManager {
    fn texture_view(&mut self, pool: &TexturePool, index: u32, ty: TextureType) -> ImageViewId;

    fn sampler(&mut self, pool: &SamplerPool, sampler_index: u32, texture_index: u32) -> SamplerId;
}

/// Receives finished update lists and owns their execution and GPU-completion tracking.
pub trait CommandSubmitter {
    /// Replays `updater` followed by `op`. The list borrows the context arena, so it must be
    /// consumed before this call returns.
    fn submit(&mut self, updater: StateUpdater<'_>, op: RecordedOp) -> anyhow::Result<()>;

    /// Takes ownership of a batch of descriptor sets until the work using them completes.
    fn retire_descriptor_sets(&mut self, sets: Vec<DescriptorSetId>);
}

/// Collaborators and scratch memory for one engine operation.
pub struct InterconnectContext<'a> {
    pub shaders: &'a mut dyn ShaderTranslator,
    pub pipelines: &'a mut dyn PipelineFactory,
    pub descriptors: &'a mut dyn DescriptorAllocator,
    pub memory: &'a mut dyn BufferManager,
    pub textures: &'a mut dyn TextureManager,
    pub submitter: &'a mut dyn CommandSubmitter,
    /// Per-draw arena owned by the current recording unit; reset by its owner in bulk.
    pub arena: &'a Bump,
}
