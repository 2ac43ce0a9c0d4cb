//! Packed pipeline state: the cache key of a compiled pipeline.
//!
//! Every fixed-function register that influences pipeline compilation is packed into a
//! `#[repr(C)]` plain-old-data struct. `bytemuck::Pod` guarantees the struct has no padding, so
//! equality and hashing operate on its raw bytes and are fully deterministic.

use std::hash::{Hash, Hasher};

use bytemuck::{Pod, Zeroable};
use xxhash_rust::xxh3::xxh3_64;

use crate::engine::{
    AttachmentBlend, EngineRegisters, StencilFace, COLOR_TARGET_COUNT, SHADER_PROGRAM_COUNT,
    VERTEX_ATTRIBUTE_COUNT, VERTEX_STREAM_COUNT,
};
use crate::topology::PrimitiveTopology;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct PackedVertexBinding {
    pub stride: u16,
    pub instanced: u8,
    pub enable: u8,
    pub divisor: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct PackedVertexAttribute {
    pub offset: u16,
    pub stream: u8,
    pub component_bit_widths: u8,
    pub numerical_type: u8,
    pub is_constant: u8,
    pub reserved: [u8; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct PackedAttachmentBlend {
    pub enable: u8,
    pub color_op: u8,
    pub src_color: u8,
    pub dst_color: u8,
    pub alpha_op: u8,
    pub src_alpha: u8,
    pub dst_alpha: u8,
    pub write_mask: u8,
}

impl From<&AttachmentBlend> for PackedAttachmentBlend {
    fn from(blend: &AttachmentBlend) -> Self {
        Self {
            enable: blend.enable.into(),
            color_op: blend.color_op as u8,
            src_color: blend.src_color as u8,
            dst_color: blend.dst_color as u8,
            alpha_op: blend.alpha_op as u8,
            src_alpha: blend.src_alpha as u8,
            dst_alpha: blend.dst_alpha as u8,
            write_mask: blend.write_mask.bits(),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct PackedStencilOps {
    pub fail: u8,
    pub depth_fail: u8,
    pub pass: u8,
    pub func: u8,
}

impl From<&StencilFace> for PackedStencilOps {
    fn from(face: &StencilFace) -> Self {
        Self {
            fail: face.fail as u8,
            depth_fail: face.depth_fail as u8,
            pass: face.pass as u8,
            func: face.func as u8,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct PackedPipelineState {
    pub shader_hashes: [u64; SHADER_PROGRAM_COUNT],
    pub vertex_bindings: [PackedVertexBinding; VERTEX_STREAM_COUNT],
    pub vertex_attributes: [PackedVertexAttribute; VERTEX_ATTRIBUTE_COUNT],
    pub color_formats: [u8; COLOR_TARGET_COUNT],
    pub attachment_blend: [PackedAttachmentBlend; COLOR_TARGET_COUNT],
    pub stencil_front: PackedStencilOps,
    pub stencil_back: PackedStencilOps,

    pub topology: u8,
    pub polygon_mode: u8,
    /// Zero when culling is disabled, otherwise the culled face.
    pub cull_mode: u8,
    pub front_face: u8,
    pub depth_format: u8,
    pub depth_test_enable: u8,
    pub depth_write_enable: u8,
    pub depth_func: u8,

    pub stencil_test_enable: u8,
    pub depth_bias_enable: u8,
    pub depth_bounds_test_enable: u8,
    pub depth_clamp_enable: u8,
    pub rasterizer_discard: u8,
    pub logic_op_enable: u8,
    pub logic_op: u8,
    pub alpha_to_coverage: u8,

    pub patch_control_points: u8,
    pub tessellation_domain: u8,
    pub tessellation_spacing: u8,
    pub tessellation_output_primitives: u8,
    pub transform_feedback_enable: u8,
    pub sample_count: u8,
    pub bindless_texture_constant_buffer: u8,
    pub color_target_count: u8,
}

impl Default for PackedPipelineState {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl PartialEq for PackedPipelineState {
    fn eq(&self, other: &Self) -> bool {
        bytemuck::bytes_of(self) == bytemuck::bytes_of(other)
    }
}

impl Eq for PackedPipelineState {}

impl Hash for PackedPipelineState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.stable_hash());
    }
}

impl PackedPipelineState {
    /// Packs the current register file. `topology` is the host topology after any emulation.
    pub fn from_registers(
        regs: &EngineRegisters,
        topology: PrimitiveTopology,
        transform_feedback_enable: bool,
    ) -> Self {
        let mut packed = Self::zeroed();

        for (hash, program) in packed.shader_hashes.iter_mut().zip(&regs.shader_programs) {
            *hash = program.as_ref().map_or(0, |binary| binary.hash());
        }

        for (packed_binding, stream) in packed
            .vertex_bindings
            .iter_mut()
            .zip(&regs.vertex_streams)
        {
            if !stream.enable {
                continue;
            }
            *packed_binding = PackedVertexBinding {
                stride: stream.stride,
                instanced: stream.instanced.into(),
                enable: 1,
                divisor: if stream.instanced { stream.divisor } else { 0 },
            };
        }

        for (packed_attribute, attribute) in packed
            .vertex_attributes
            .iter_mut()
            .zip(&regs.vertex_attributes)
        {
            *packed_attribute = PackedVertexAttribute {
                offset: attribute.offset,
                stream: attribute.stream,
                component_bit_widths: attribute.component_bit_widths,
                numerical_type: attribute.numerical_type,
                is_constant: attribute.is_constant.into(),
                reserved: [0; 2],
            };
        }

        let color_target_count = usize::from(regs.color_target_count).min(COLOR_TARGET_COUNT);
        for i in 0..color_target_count {
            packed.color_formats[i] = regs.color_targets[i].format.0;
            packed.attachment_blend[i] = (&regs.blend[i]).into();
        }
        packed.color_target_count = color_target_count as u8;
        packed.depth_format = regs.depth_target.format.0;

        packed.topology = topology as u8;
        packed.polygon_mode = regs.polygon_mode as u8;
        packed.cull_mode = if regs.cull_enable {
            regs.cull_face as u8
        } else {
            0
        };
        packed.front_face = regs.front_face as u8;
        packed.rasterizer_discard = regs.rasterizer_discard.into();
        packed.depth_clamp_enable = regs.depth_clamp_enable.into();
        packed.depth_bias_enable = regs.depth_bias_enable.into();

        packed.depth_test_enable = regs.depth_test_enable.into();
        if regs.depth_test_enable {
            packed.depth_write_enable = regs.depth_write_enable.into();
            packed.depth_func = regs.depth_func as u8;
        }
        packed.depth_bounds_test_enable = regs.depth_bounds_enable.into();

        packed.stencil_test_enable = regs.stencil_enable.into();
        if regs.stencil_enable {
            packed.stencil_front = (&regs.stencil_front).into();
            packed.stencil_back = if regs.stencil_two_sided {
                (&regs.stencil_back).into()
            } else {
                packed.stencil_front
            };
        }

        packed.logic_op_enable = regs.logic_op_enable.into();
        if regs.logic_op_enable {
            packed.logic_op = regs.logic_op as u8;
        }
        packed.alpha_to_coverage = regs.alpha_to_coverage.into();
        packed.sample_count = regs.sample_count;

        if topology == PrimitiveTopology::PatchList {
            packed.patch_control_points = regs.tessellation.patch_control_points;
            packed.tessellation_domain = regs.tessellation.domain;
            packed.tessellation_spacing = regs.tessellation.spacing;
            packed.tessellation_output_primitives = regs.tessellation.output_primitives;
        }

        packed.transform_feedback_enable = transform_feedback_enable.into();
        packed.bindless_texture_constant_buffer = regs.bindless_texture_constant_buffer;

        packed
    }

    /// Deterministic 64-bit hash of the packed bytes.
    pub fn stable_hash(&self) -> u64 {
        xxh3_64(bytemuck::bytes_of(self))
    }
}
