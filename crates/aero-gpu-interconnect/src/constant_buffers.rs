//! Constant-buffer bindings per shader stage, plus tracking of which bindings changed since the
//! previous draw so descriptor updates can be limited to them.

use smallvec::SmallVec;

use crate::engine::{ShaderStage, SHADER_STAGE_COUNT, STAGE_CONSTANT_BUFFER_COUNT};
use crate::memory::{BufferManager, BufferView};

/// Upper bound on the number of rebinds a single quick bind can describe.
pub const MAX_QUICK_BIND_BUFFERS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuickBindEntry {
    pub stage: ShaderStage,
    pub index: u32,
}

/// Constant buffers rebound since the previous draw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuickBind {
    entries: SmallVec<[QuickBindEntry; MAX_QUICK_BIND_BUFFERS]>,
}

impl QuickBind {
    pub fn entries(&self) -> &[QuickBindEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstantBufferSet {
    stages: [[Option<BufferView>; STAGE_CONSTANT_BUFFER_COUNT]; SHADER_STAGE_COUNT],
}

impl ConstantBufferSet {
    pub fn get(&self, stage: ShaderStage, index: u32) -> Option<BufferView> {
        self.stages[stage.index()]
            .get(index as usize)
            .copied()
            .flatten()
    }

    pub fn set(&mut self, stage: ShaderStage, index: u32, view: Option<BufferView>) {
        debug_assert!((index as usize) < STAGE_CONSTANT_BUFFER_COUNT);
        if let Some(slot) = self.stages[stage.index()].get_mut(index as usize) {
            *slot = view;
        }
    }

    /// Reads bound contents; unbound buffers read as zero.
    pub fn read_bytes(
        &self,
        memory: &mut dyn BufferManager,
        stage: ShaderStage,
        index: u32,
        offset: u32,
        out: &mut [u8],
    ) {
        match self.get(stage, index) {
            Some(view) => memory.read(&view, offset.into(), out),
            None => out.fill(0),
        }
    }

    pub fn read_u32(
        &self,
        memory: &mut dyn BufferManager,
        stage: ShaderStage,
        index: u32,
        offset: u32,
    ) -> u32 {
        let mut bytes = [0u8; 4];
        self.read_bytes(memory, stage, index, offset, &mut bytes);
        u32::from_le_bytes(bytes)
    }
}

/// Constant-buffer state of one engine channel.
#[derive(Debug, Clone)]
pub struct ConstantBuffers {
    pub set: ConstantBufferSet,
    quick_bind: QuickBind,
    quick_bind_enabled: bool,
    max_quick_bind_buffers: usize,
}

impl ConstantBuffers {
    /// `max_quick_bind_buffers` of zero disables quick bind entirely.
    pub fn new(max_quick_bind_buffers: usize) -> Self {
        let max_quick_bind_buffers = max_quick_bind_buffers.min(MAX_QUICK_BIND_BUFFERS);
        Self {
            set: ConstantBufferSet::default(),
            quick_bind: QuickBind::default(),
            quick_bind_enabled: max_quick_bind_buffers > 0,
            max_quick_bind_buffers,
        }
    }

    /// Writes `data` into `view` at `offset` bytes.
    ///
    /// Loads can change handles and addresses that other descriptors read out of constant
    /// buffers, so they disable quick bind until the next draw.
    pub fn load(
        &mut self,
        memory: &mut dyn BufferManager,
        view: &BufferView,
        data: &[u32],
        offset: u32,
    ) {
        memory.write(view, offset.into(), bytemuck::cast_slice(data));
        self.disable_quick_bind();
    }

    pub fn bind(&mut self, stage: ShaderStage, index: u32, view: BufferView) {
        self.set.set(stage, index, Some(view));
        self.track_rebind(QuickBindEntry { stage, index });
    }

    pub fn unbind(&mut self, stage: ShaderStage, index: u32) {
        self.set.set(stage, index, None);
        self.track_rebind(QuickBindEntry { stage, index });
    }

    fn track_rebind(&mut self, entry: QuickBindEntry) {
        if !self.quick_bind_enabled || self.quick_bind.entries.contains(&entry) {
            return;
        }
        if self.quick_bind.entries.len() >= self.max_quick_bind_buffers {
            self.disable_quick_bind();
            return;
        }
        self.quick_bind.entries.push(entry);
    }

    /// Forces the next draw to fully resynchronize descriptors.
    pub fn disable_quick_bind(&mut self) {
        self.quick_bind_enabled = false;
        self.quick_bind.entries.clear();
    }

    /// Called after every draw.
    pub fn reset_quick_bind(&mut self) {
        self.quick_bind_enabled = self.max_quick_bind_buffers > 0;
        self.quick_bind.entries.clear();
    }

    /// Rebinds since the previous draw, if they can be applied incrementally.
    pub fn quick_bind(&self) -> Option<&QuickBind> {
        (self.quick_bind_enabled && !self.quick_bind.is_empty()).then_some(&self.quick_bind)
    }
}
