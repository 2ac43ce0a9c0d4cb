//! Buffer handles exchanged with the memory subsystem.

/// Host buffer allocation handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

/// Guest buffer tracked by the memory subsystem. Its host backing may be reassigned at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GuestBufferId(pub u32);

/// A concrete range of a host buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferBinding {
    pub buffer: BufferId,
    pub offset: u64,
    pub size: u64,
}

/// A range of a guest buffer. Only resolves to a [`BufferBinding`] through a [`BufferResolver`],
/// because the backing allocation is not stable between planning and replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferView {
    pub buffer: GuestBufferId,
    pub offset: u64,
    pub size: u64,
}

impl BufferView {
    /// The same view clamped to at most `size` bytes.
    pub fn truncated(self, size: u64) -> Self {
        Self {
            size: self.size.min(size),
            ..self
        }
    }
}

/// Buffer binding that is either already resolved or resolved at replay time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynamicBufferBinding {
    Resolved(BufferBinding),
    Deferred(BufferView),
}

impl DynamicBufferBinding {
    pub fn resolve(&self, resolver: &dyn BufferResolver) -> BufferBinding {
        match self {
            DynamicBufferBinding::Resolved(binding) => *binding,
            DynamicBufferBinding::Deferred(view) => resolver.resolve(view),
        }
    }
}

impl From<BufferBinding> for DynamicBufferBinding {
    fn from(binding: BufferBinding) -> Self {
        DynamicBufferBinding::Resolved(binding)
    }
}

impl From<BufferView> for DynamicBufferBinding {
    fn from(view: BufferView) -> Self {
        DynamicBufferBinding::Deferred(view)
    }
}

pub trait BufferResolver {
    /// Current backing of `view`.
    fn resolve(&self, view: &BufferView) -> BufferBinding;
}

pub trait BufferManager: BufferResolver {
    /// Finds the guest buffer covering `[address, address + size)`.
    fn lookup(&mut self, address: u64, size: u64) -> Option<BufferView>;

    /// Reads guest-visible contents. Bytes past the end of the view read as zero.
    fn read(&mut self, view: &BufferView, offset: u64, out: &mut [u8]);

    fn write(&mut self, view: &BufferView, offset: u64, data: &[u8]);

    /// Defers further sequenced CPU writes to the view's storage until the commands referencing
    /// it have been replayed.
    fn block_sequenced_writes(&mut self, view: &BufferView);

    /// Records that the GPU may write the view's storage, so CPU-side copies must be
    /// invalidated before they are read again.
    fn mark_gpu_dirty(&mut self, view: &BufferView);

    /// Small zero-filled binding used in place of unbound resources.
    fn dummy_binding(&mut self) -> BufferBinding;

    /// Uploads host-generated data into a buffer that stays valid until the manager drops it.
    fn upload(&mut self, data: &[u8]) -> anyhow::Result<BufferBinding>;
}
