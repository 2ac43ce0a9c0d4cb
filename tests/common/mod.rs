//! In-memory collaborators for driving `Maxwell3D` end to end.
//!
//! The submitter replays every update list immediately into [`ModelRecorder`], which keeps a
//! model of descriptor set contents so tests can compare what each draw actually saw bound.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use aero_gpu_interconnect::backend::{
    CommandSubmitter, CompiledPipeline, DescriptorAllocator, DescriptorSetId,
    DescriptorSetLayoutId, GraphicsPipelineDesc, ImageViewId, PipelineFactory, PipelineHandle,
    PipelineLayoutId, SamplerId, ShaderModuleId, ShaderTranslator, TextureManager,
    TranslatedShader,
};
use aero_gpu_interconnect::descriptor::{
    DescriptorCopy, DescriptorResources, ImageBinding, ResolvedDescriptorWrite,
};
use aero_gpu_interconnect::engine::{
    DepthBias, IndexFormat, Rect2D, SamplerPool, ShaderProgram, ShaderStage, TexturePool,
    Viewport,
};
use aero_gpu_interconnect::memory::{
    BufferBinding, BufferId, BufferManager, BufferResolver, BufferView, GuestBufferId,
};
use aero_gpu_interconnect::packed_state::PackedPipelineState;
use aero_gpu_interconnect::shader::{ShaderBinary, ShaderInfo, TextureType};
use aero_gpu_interconnect::state_updater::{CommandRecorder, StencilDynamicState, StateUpdater};
use aero_gpu_interconnect::{
    DrawParams, InterconnectConfig, InterconnectContext, Maxwell3D, RecordedOp,
};
use bumpalo::Bump;

pub const DUMMY_BUFFER: BufferId = BufferId(u32::MAX);
pub const UPLOAD_BUFFER_BASE: u32 = 0x1000_0000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

struct GuestBuffer {
    address: u64,
    data: Vec<u8>,
    backing: BufferId,
}

#[derive(Default)]
pub struct FakeMemory {
    buffers: Vec<GuestBuffer>,
    next_backing: u32,
    blocked: Vec<BufferView>,
    dirty: Vec<BufferView>,
    uploads: Vec<Vec<u8>>,
}

impl FakeMemory {
    fn buffer(&self, view: &BufferView) -> &GuestBuffer {
        &self.buffers[view.buffer.0 as usize]
    }

    fn containing(&self, address: u64, size: u64) -> Option<usize> {
        self.buffers.iter().position(|b| {
            address >= b.address && address + size <= b.address + b.data.len() as u64
        })
    }
}

impl BufferResolver for FakeMemory {
    fn resolve(&self, view: &BufferView) -> BufferBinding {
        BufferBinding {
            buffer: self.buffer(view).backing,
            offset: view.offset,
            size: view.size,
        }
    }
}

impl BufferManager for FakeMemory {
    fn lookup(&mut self, address: u64, size: u64) -> Option<BufferView> {
        let index = self.containing(address, size)?;
        Some(BufferView {
            buffer: GuestBufferId(index as u32),
            offset: address - self.buffers[index].address,
            size,
        })
    }

    fn read(&mut self, view: &BufferView, offset: u64, out: &mut [u8]) {
        let data = &self.buffer(view).data;
        for (i, byte) in out.iter_mut().enumerate() {
            let within_view = offset + (i as u64) < view.size;
            let pos = (view.offset + offset) as usize + i;
            *byte = if within_view && pos < data.len() {
                data[pos]
            } else {
                0
            };
        }
    }

    fn write(&mut self, view: &BufferView, offset: u64, bytes: &[u8]) {
        let data = &mut self.buffers[view.buffer.0 as usize].data;
        let start = (view.offset + offset) as usize;
        data[start..start + bytes.len()].copy_from_slice(bytes);
    }

    fn block_sequenced_writes(&mut self, view: &BufferView) {
        self.blocked.push(*view);
    }

    fn mark_gpu_dirty(&mut self, view: &BufferView) {
        self.dirty.push(*view);
    }

    fn dummy_binding(&mut self) -> BufferBinding {
        BufferBinding {
            buffer: DUMMY_BUFFER,
            offset: 0,
            size: 0x100,
        }
    }

    fn upload(&mut self, data: &[u8]) -> anyhow::Result<BufferBinding> {
        let buffer = BufferId(UPLOAD_BUFFER_BASE + self.uploads.len() as u32);
        self.uploads.push(data.to_vec());
        Ok(BufferBinding {
            buffer,
            offset: 0,
            size: data.len() as u64,
        })
    }
}

/// Memory shared between the engine context and the replaying submitter.
#[derive(Clone, Default)]
pub struct SharedMemory(Rc<RefCell<FakeMemory>>);

impl SharedMemory {
    pub fn map(&self, address: u64, size: usize) -> GuestBufferId {
        let mut memory = self.0.borrow_mut();
        memory.next_backing += 1;
        let backing = BufferId(memory.next_backing);
        memory.buffers.push(GuestBuffer {
            address,
            data: vec![0; size],
            backing,
        });
        GuestBufferId(memory.buffers.len() as u32 - 1)
    }

    pub fn write_bytes(&self, address: u64, bytes: &[u8]) {
        let mut memory = self.0.borrow_mut();
        let index = memory
            .containing(address, bytes.len() as u64)
            .expect("write to unmapped guest memory");
        let buffer = &mut memory.buffers[index];
        let start = (address - buffer.address) as usize;
        buffer.data[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub fn write_u32(&self, address: u64, value: u32) {
        self.write_bytes(address, &value.to_le_bytes());
    }

    /// Moves a guest buffer to a fresh host allocation.
    pub fn reassign(&self, id: GuestBufferId) -> BufferId {
        let mut memory = self.0.borrow_mut();
        memory.next_backing += 1;
        let backing = BufferId(memory.next_backing);
        memory.buffers[id.0 as usize].backing = backing;
        backing
    }

    pub fn backing(&self, id: GuestBufferId) -> BufferId {
        self.0.borrow().buffers[id.0 as usize].backing
    }

    pub fn uploads(&self) -> Vec<Vec<u8>> {
        self.0.borrow().uploads.clone()
    }

    pub fn blocked(&self) -> Vec<BufferView> {
        self.0.borrow().blocked.clone()
    }

    pub fn dirty(&self) -> Vec<BufferView> {
        self.0.borrow().dirty.clone()
    }
}

impl BufferResolver for SharedMemory {
    fn resolve(&self, view: &BufferView) -> BufferBinding {
        self.0.borrow().resolve(view)
    }
}

impl BufferManager for SharedMemory {
    fn lookup(&mut self, address: u64, size: u64) -> Option<BufferView> {
        self.0.borrow_mut().lookup(address, size)
    }

    fn read(&mut self, view: &BufferView, offset: u64, out: &mut [u8]) {
        self.0.borrow_mut().read(view, offset, out);
    }

    fn write(&mut self, view: &BufferView, offset: u64, data: &[u8]) {
        self.0.borrow_mut().write(view, offset, data);
    }

    fn block_sequenced_writes(&mut self, view: &BufferView) {
        self.0.borrow_mut().block_sequenced_writes(view);
    }

    fn mark_gpu_dirty(&mut self, view: &BufferView) {
        self.0.borrow_mut().mark_gpu_dirty(view);
    }

    fn dummy_binding(&mut self) -> BufferBinding {
        self.0.borrow_mut().dummy_binding()
    }

    fn upload(&mut self, data: &[u8]) -> anyhow::Result<BufferBinding> {
        self.0.borrow_mut().upload(data)
    }
}

/// Reports reflection registered per program hash; unknown programs read nothing.
#[derive(Default)]
pub struct FakeShaders {
    infos: HashMap<u64, ShaderInfo>,
    pub translated: Vec<ShaderStage>,
    pub fail_stage: Option<ShaderStage>,
}

impl FakeShaders {
    pub fn register(&mut self, binary: &ShaderBinary, info: ShaderInfo) {
        self.infos.insert(binary.hash(), info);
    }
}

impl ShaderTranslator for FakeShaders {
    fn translate(
        &mut self,
        stage: ShaderStage,
        programs: &[&ShaderBinary],
        _state: &PackedPipelineState,
    ) -> anyhow::Result<TranslatedShader> {
        if self.fail_stage == Some(stage) {
            anyhow::bail!("unsupported instruction in {stage} program");
        }
        self.translated.push(stage);
        let info = programs
            .last()
            .and_then(|binary| self.infos.get(&binary.hash()))
            .cloned()
            .unwrap_or_default();
        Ok(TranslatedShader {
            module: ShaderModuleId(self.translated.len() as u32),
            info,
        })
    }
}

#[derive(Default)]
pub struct FakeFactory {
    pub created: u32,
}

impl PipelineFactory for FakeFactory {
    fn create_graphics_pipeline(
        &mut self,
        _desc: &GraphicsPipelineDesc<'_>,
    ) -> anyhow::Result<CompiledPipeline> {
        self.created += 1;
        Ok(CompiledPipeline {
            pipeline: PipelineHandle(self.created),
            layout: PipelineLayoutId(self.created),
            set_layout: DescriptorSetLayoutId(self.created),
        })
    }
}

#[derive(Default)]
pub struct FakeDescriptors {
    pub allocated: Vec<(DescriptorSetId, DescriptorSetLayoutId)>,
}

impl DescriptorAllocator for FakeDescriptors {
    fn allocate_set(&mut self, layout: DescriptorSetLayoutId) -> anyhow::Result<DescriptorSetId> {
        let set = DescriptorSetId(self.allocated.len() as u32 + 1);
        self.allocated.push((set, layout));
        Ok(set)
    }
}

/// Texture views are identified by texture index, samplers by the index actually used.
#[derive(Default)]
pub struct FakeTextures;

impl TextureManager for FakeTextures {
    fn texture_view(&mut self, _pool: &TexturePool, index: u32, _ty: TextureType) -> ImageViewId {
        ImageViewId(index)
    }

    fn sampler(&mut self, pool: &SamplerPool, sampler_index: u32, texture_index: u32) -> SamplerId {
        if pool.use_texture_index {
            SamplerId(texture_index)
        } else {
            SamplerId(sampler_index)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Buffer(BufferBinding),
    Image(ImageBinding),
}

pub type SetContents = BTreeMap<u32, Vec<Resource>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    VertexBuffers { first: u32, bindings: Vec<BufferBinding> },
    IndexBuffer(BufferBinding, IndexFormat),
    TransformFeedback(u32, BufferBinding),
    Viewport(u32),
    Scissor(u32, Rect2D),
    LineWidth(f32),
    DepthBias,
    BlendConstants,
    DepthBounds,
    Stencil(StencilDynamicState),
    Pipeline(PipelineHandle),
    UpdateSet {
        dst: DescriptorSetId,
        src: Option<DescriptorSetId>,
        copies: usize,
        written: Vec<u32>,
    },
    PushSet { written: Vec<u32> },
    BindSet(DescriptorSetId),
    Draw,
    Clear,
}

fn contents_of(writes: &[ResolvedDescriptorWrite<'_>], into: &mut SetContents) -> Vec<u32> {
    writes
        .iter()
        .map(|write| {
            let resources = match write.resources {
                DescriptorResources::Buffers(buffers) => {
                    buffers.iter().copied().map(Resource::Buffer).collect()
                }
                DescriptorResources::Images(images) => {
                    images.iter().copied().map(Resource::Image).collect()
                }
            };
            into.insert(write.binding, resources);
            write.binding
        })
        .collect()
}

/// Command recorder that models descriptor set contents.
#[derive(Default)]
pub struct ModelRecorder {
    pub events: Vec<Event>,
    pub sets: HashMap<DescriptorSetId, SetContents>,
    pub bound_set: Option<DescriptorSetId>,
    pub pushed: Option<SetContents>,
}

impl ModelRecorder {
    pub fn bound_contents(&self) -> Option<SetContents> {
        match (&self.pushed, self.bound_set) {
            (Some(pushed), _) => Some(pushed.clone()),
            (None, Some(set)) => self.sets.get(&set).cloned(),
            (None, None) => None,
        }
    }
}

impl CommandRecorder for ModelRecorder {
    fn bind_vertex_buffers(&mut self, first: u32, bindings: &[BufferBinding]) {
        self.events.push(Event::VertexBuffers {
            first,
            bindings: bindings.to_vec(),
        });
    }

    fn bind_index_buffer(&mut self, binding: BufferBinding, format: IndexFormat) {
        self.events.push(Event::IndexBuffer(binding, format));
    }

    fn bind_transform_feedback_buffer(&mut self, index: u32, binding: BufferBinding) {
        self.events.push(Event::TransformFeedback(index, binding));
    }

    fn set_viewport(&mut self, index: u32, _viewport: &Viewport) {
        self.events.push(Event::Viewport(index));
    }

    fn set_scissor(&mut self, index: u32, scissor: Rect2D) {
        self.events.push(Event::Scissor(index, scissor));
    }

    fn set_line_width(&mut self, width: f32) {
        self.events.push(Event::LineWidth(width));
    }

    fn set_depth_bias(&mut self, _bias: DepthBias) {
        self.events.push(Event::DepthBias);
    }

    fn set_blend_constants(&mut self, _constants: [f32; 4]) {
        self.events.push(Event::BlendConstants);
    }

    fn set_depth_bounds(&mut self, _min: f32, _max: f32) {
        self.events.push(Event::DepthBounds);
    }

    fn set_stencil_state(&mut self, state: &StencilDynamicState) {
        self.events.push(Event::Stencil(*state));
    }

    fn bind_pipeline(&mut self, pipeline: PipelineHandle) {
        self.events.push(Event::Pipeline(pipeline));
    }

    fn update_descriptor_set(
        &mut self,
        dst: DescriptorSetId,
        src: Option<DescriptorSetId>,
        copies: &[DescriptorCopy],
        writes: &[ResolvedDescriptorWrite<'_>],
    ) {
        let mut contents = SetContents::new();
        if let Some(source) = src.and_then(|src| self.sets.get(&src)) {
            for copy in copies {
                if let Some(resources) = source.get(&copy.binding) {
                    contents.insert(copy.binding, resources.clone());
                }
            }
        }
        let written = contents_of(writes, &mut contents);
        self.sets.insert(dst, contents);
        self.events.push(Event::UpdateSet {
            dst,
            src,
            copies: copies.len(),
            written,
        });
    }

    fn push_descriptor_set(
        &mut self,
        _layout: PipelineLayoutId,
        _set_index: u32,
        writes: &[ResolvedDescriptorWrite<'_>],
    ) {
        let mut contents = SetContents::new();
        let written = contents_of(writes, &mut contents);
        self.pushed = Some(contents);
        self.bound_set = None;
        self.events.push(Event::PushSet { written });
    }

    fn bind_descriptor_set(
        &mut self,
        _layout: PipelineLayoutId,
        _set_index: u32,
        set: DescriptorSetId,
    ) {
        self.bound_set = Some(set);
        self.pushed = None;
        self.events.push(Event::BindSet(set));
    }
}

/// Replays each submission as soon as it arrives.
pub struct ReplayingSubmitter {
    memory: SharedMemory,
    pub recorder: ModelRecorder,
    pub ops: Vec<RecordedOp>,
    /// Descriptor contents visible to each recorded operation.
    pub bound_at_op: Vec<Option<SetContents>>,
    pub retired: Vec<Vec<DescriptorSetId>>,
    /// Rejects the next submission without replaying it.
    pub fail_next: bool,
}

impl ReplayingSubmitter {
    fn new(memory: SharedMemory) -> Self {
        Self {
            memory,
            recorder: ModelRecorder::default(),
            ops: Vec::new(),
            bound_at_op: Vec::new(),
            retired: Vec::new(),
            fail_next: false,
        }
    }
}

impl CommandSubmitter for ReplayingSubmitter {
    fn submit(&mut self, updater: StateUpdater<'_>, op: RecordedOp) -> anyhow::Result<()> {
        if std::mem::take(&mut self.fail_next) {
            anyhow::bail!("command buffer rejected");
        }
        updater.record_all(&mut self.recorder, &self.memory);
        self.recorder.events.push(match op {
            RecordedOp::Draw(_) => Event::Draw,
            RecordedOp::Clear(_) => Event::Clear,
        });
        self.bound_at_op.push(self.recorder.bound_contents());
        self.ops.push(op);
        Ok(())
    }

    fn retire_descriptor_sets(&mut self, sets: Vec<DescriptorSetId>) {
        self.retired.push(sets);
    }
}

pub struct Harness {
    pub memory: SharedMemory,
    pub shaders: FakeShaders,
    pub factory: FakeFactory,
    pub descriptors: FakeDescriptors,
    pub textures: FakeTextures,
    pub submitter: ReplayingSubmitter,
    pub arena: Bump,
    pub maxwell: Maxwell3D,
}

impl Harness {
    pub fn new(config: InterconnectConfig) -> Self {
        init_tracing();
        let memory = SharedMemory::default();
        Self {
            submitter: ReplayingSubmitter::new(memory.clone()),
            memory,
            shaders: FakeShaders::default(),
            factory: FakeFactory::default(),
            descriptors: FakeDescriptors::default(),
            textures: FakeTextures,
            arena: Bump::new(),
            maxwell: Maxwell3D::new(config),
        }
    }

    /// Installs a vertex and a pixel program reporting the given reflection. `salt` makes the
    /// binaries distinct without changing their reflection.
    pub fn install_shaders(&mut self, vertex: ShaderInfo, fragment: ShaderInfo, salt: u8) {
        let vs = ShaderBinary::new(vec![b'v', salt]);
        let ps = ShaderBinary::new(vec![b'p', salt]);
        self.shaders.register(&vs, vertex);
        self.shaders.register(&ps, fragment);
        let programs = &mut self.maxwell.registers_mut().shader_programs;
        programs[ShaderProgram::Vertex.index()] = Some(vs);
        programs[ShaderProgram::Pixel.index()] = Some(ps);
    }

    /// Points the constant-buffer selector at `address` and binds it to `stage`/`index`.
    pub fn bind_constant_buffer(
        &mut self,
        stage: ShaderStage,
        index: u32,
        address: u64,
        size: u32,
    ) {
        let selector = &mut self.maxwell.registers_mut().constant_buffer_selector;
        selector.address = address;
        selector.size = size;
        self.maxwell
            .bind_constant_buffer(&mut self.memory, stage, index, true);
    }

    pub fn load_constant_buffer(&mut self, address: u64, size: u32, data: &[u32], offset: u32) {
        let selector = &mut self.maxwell.registers_mut().constant_buffer_selector;
        selector.address = address;
        selector.size = size;
        self.maxwell
            .load_constant_buffer(&mut self.memory, data, offset);
    }

    pub fn draw(&mut self, params: &DrawParams) -> aero_gpu_interconnect::Result<()> {
        let mut ctx = InterconnectContext {
            shaders: &mut self.shaders,
            pipelines: &mut self.factory,
            descriptors: &mut self.descriptors,
            memory: &mut self.memory,
            textures: &mut self.textures,
            submitter: &mut self.submitter,
            arena: &self.arena,
        };
        let result = self.maxwell.draw(&mut ctx, params);
        self.arena.reset();
        result
    }

    pub fn clear(
        &mut self,
        surface: aero_gpu_interconnect::engine::ClearSurface,
    ) -> aero_gpu_interconnect::Result<()> {
        let mut ctx = InterconnectContext {
            shaders: &mut self.shaders,
            pipelines: &mut self.factory,
            descriptors: &mut self.descriptors,
            memory: &mut self.memory,
            textures: &mut self.textures,
            submitter: &mut self.submitter,
            arena: &self.arena,
        };
        let result = self.maxwell.clear(&mut ctx, surface);
        self.arena.reset();
        result
    }

    pub fn flush_descriptor_sets(&mut self) {
        let mut ctx = InterconnectContext {
            shaders: &mut self.shaders,
            pipelines: &mut self.factory,
            descriptors: &mut self.descriptors,
            memory: &mut self.memory,
            textures: &mut self.textures,
            submitter: &mut self.submitter,
            arena: &self.arena,
        };
        self.maxwell.flush_descriptor_sets(&mut ctx);
    }

    pub fn events(&self) -> &[Event] {
        &self.submitter.recorder.events
    }

    pub fn last_bound(&self) -> Option<SetContents> {
        self.submitter.bound_at_op.last().cloned().flatten()
    }
}

pub fn triangles(count: u32) -> DrawParams {
    DrawParams {
        count,
        instance_count: 1,
        ..DrawParams::default()
    }
}
