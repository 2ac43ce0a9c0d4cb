//! Shader binaries and the reflection data the translator reports for them.

use std::sync::Arc;

use xxhash_rust::xxh3::xxh3_64;

use crate::engine::STAGE_CONSTANT_BUFFER_COUNT;

/// Guest shader program code, identified by a hash of its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderBinary {
    hash: u64,
    code: Arc<[u8]>,
}

impl ShaderBinary {
    pub fn new(code: impl Into<Arc<[u8]>>) -> Self {
        let code = code.into();
        Self {
            hash: xxh3_64(&code),
            code,
        }
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum TextureType {
    Color1D = 0,
    #[default]
    Color2D = 1,
    Color3D = 2,
    ColorCube = 3,
    ColorArray1D = 4,
    ColorArray2D = 5,
    ColorArrayCube = 6,
    Buffer = 7,
}

/// Range of constant buffers read directly as uniform buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstantBufferDescriptor {
    pub index: u32,
    pub count: u32,
}

/// Storage buffer whose `{address, size}` pair is stored in a constant buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageBufferDescriptor {
    pub cbuf_index: u32,
    pub cbuf_offset: u32,
    pub count: u32,
    pub is_written: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureBufferDescriptor {
    pub cbuf_index: u32,
    pub cbuf_offset: u32,
    pub count: u32,
    pub size_shift: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageBufferDescriptor {
    pub cbuf_index: u32,
    pub cbuf_offset: u32,
    pub count: u32,
    pub size_shift: u32,
    pub is_written: bool,
}

/// Location of the second handle word of a texture whose handle is split over two buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SecondaryHandle {
    pub cbuf_index: u32,
    pub cbuf_offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    pub ty: TextureType,
    pub cbuf_index: u32,
    pub cbuf_offset: u32,
    pub count: u32,
    pub size_shift: u32,
    pub secondary: Option<SecondaryHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageDescriptor {
    pub ty: TextureType,
    pub cbuf_index: u32,
    pub cbuf_offset: u32,
    pub count: u32,
    pub size_shift: u32,
    pub is_written: bool,
}

/// Resources a translated stage reads, in binding order per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderInfo {
    pub constant_buffers: Vec<ConstantBufferDescriptor>,
    pub storage_buffers: Vec<StorageBufferDescriptor>,
    pub texture_buffers: Vec<TextureBufferDescriptor>,
    pub image_buffers: Vec<ImageBufferDescriptor>,
    pub textures: Vec<TextureDescriptor>,
    pub images: Vec<ImageDescriptor>,
    /// Bytes of each constant buffer the shader can reach; zero when unknown.
    pub constant_buffer_used_sizes: [u32; STAGE_CONSTANT_BUFFER_COUNT],
}

impl ShaderInfo {
    /// Whether both stages declare the same descriptor shape and read the same constant buffer
    /// ranges, so a descriptor set filled for one is valid for the other.
    pub fn bindings_equal(&self, other: &ShaderInfo) -> bool {
        self.constant_buffer_used_sizes == other.constant_buffer_used_sizes
            && self.constant_buffers == other.constant_buffers
            && self.storage_buffers == other.storage_buffers
            && self.texture_buffers == other.texture_buffers
            && self.image_buffers == other.image_buffers
            && self.textures == other.textures
            && self.images == other.images
    }
}

/// 32-bit bindless texture handle read from a constant buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindlessHandle(pub u32);

impl BindlessHandle {
    pub fn texture_index(self) -> u32 {
        self.0 & 0xF_FFFF
    }

    pub fn sampler_index(self) -> u32 {
        self.0 >> 20
    }
}
