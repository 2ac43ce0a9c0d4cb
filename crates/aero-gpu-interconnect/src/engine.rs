//! Register-level view of the 3D engine.
//!
//! The register-decode dispatcher writes these structures directly; the interconnect only reads
//! them when a draw or clear is issued. Values are assumed to be pre-validated by the decoder, so
//! every field is already expressed in a typed form rather than as raw method data.

use std::fmt;

use bitflags::bitflags;

use crate::backend::ImageViewId;
use crate::shader::ShaderBinary;

pub const SHADER_STAGE_COUNT: usize = 5;
pub const SHADER_PROGRAM_COUNT: usize = 6;
pub const STAGE_CONSTANT_BUFFER_COUNT: usize = 18;
pub const VERTEX_STREAM_COUNT: usize = 16;
pub const VERTEX_ATTRIBUTE_COUNT: usize = 32;
pub const COLOR_TARGET_COUNT: usize = 8;
pub const VIEWPORT_COUNT: usize = 16;
pub const TRANSFORM_FEEDBACK_BUFFER_COUNT: usize = 4;

/// Host shader stage a translated module is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ShaderStage {
    Vertex = 0,
    TessellationControl = 1,
    TessellationEvaluation = 2,
    Geometry = 3,
    Fragment = 4,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; SHADER_STAGE_COUNT] = [
        ShaderStage::Vertex,
        ShaderStage::TessellationControl,
        ShaderStage::TessellationEvaluation,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn flags(self) -> ShaderStageFlags {
        match self {
            ShaderStage::Vertex => ShaderStageFlags::VERTEX,
            ShaderStage::TessellationControl => ShaderStageFlags::TESSELLATION_CONTROL,
            ShaderStage::TessellationEvaluation => ShaderStageFlags::TESSELLATION_EVALUATION,
            ShaderStage::Geometry => ShaderStageFlags::GEOMETRY,
            ShaderStage::Fragment => ShaderStageFlags::FRAGMENT,
        }
    }

    /// Engine programs feeding this stage. The last entry is the one that makes the stage active.
    pub fn programs(self) -> &'static [ShaderProgram] {
        match self {
            ShaderStage::Vertex => &[ShaderProgram::VertexCullBeforeFetch, ShaderProgram::Vertex],
            ShaderStage::TessellationControl => &[ShaderProgram::TessellationInit],
            ShaderStage::TessellationEvaluation => &[ShaderProgram::Tessellation],
            ShaderStage::Geometry => &[ShaderProgram::Geometry],
            ShaderStage::Fragment => &[ShaderProgram::Pixel],
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::TessellationControl => write!(f, "tessellation control"),
            ShaderStage::TessellationEvaluation => write!(f, "tessellation evaluation"),
            ShaderStage::Geometry => write!(f, "geometry"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const TESSELLATION_CONTROL = 1 << 1;
        const TESSELLATION_EVALUATION = 1 << 2;
        const GEOMETRY = 1 << 3;
        const FRAGMENT = 1 << 4;
    }
}

/// Program slots of the engine. Two vertex programs may be combined into one host stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ShaderProgram {
    VertexCullBeforeFetch = 0,
    Vertex = 1,
    TessellationInit = 2,
    Tessellation = 3,
    Geometry = 4,
    Pixel = 5,
}

impl ShaderProgram {
    pub const ALL: [ShaderProgram; SHADER_PROGRAM_COUNT] = [
        ShaderProgram::VertexCullBeforeFetch,
        ShaderProgram::Vertex,
        ShaderProgram::TessellationInit,
        ShaderProgram::Tessellation,
        ShaderProgram::Geometry,
        ShaderProgram::Pixel,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn stage(self) -> ShaderStage {
        match self {
            ShaderProgram::VertexCullBeforeFetch | ShaderProgram::Vertex => ShaderStage::Vertex,
            ShaderProgram::TessellationInit => ShaderStage::TessellationControl,
            ShaderProgram::Tessellation => ShaderStage::TessellationEvaluation,
            ShaderProgram::Geometry => ShaderStage::Geometry,
            ShaderProgram::Pixel => ShaderStage::Fragment,
        }
    }
}

/// Axis-aligned rectangle in framebuffer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2D {
    /// Rectangle covering every addressable pixel, used for disabled scissors.
    pub const UNBOUNDED: Rect2D = Rect2D {
        x: 0,
        y: 0,
        width: i32::MAX as u32,
        height: i32::MAX as u32,
    };

    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a rectangle from inclusive-min/exclusive-max bounds. Inverted bounds are empty.
    pub fn from_bounds(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            x: min_x as i32,
            y: min_y as i32,
            width: max_x.saturating_sub(min_x),
            height: max_y.saturating_sub(min_y),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Intersection of two rectangles. Disjoint inputs produce a zero-area rectangle anchored at
    /// the larger of the two origins.
    pub fn intersect(&self, other: &Rect2D) -> Rect2D {
        let x0 = i64::from(self.x.max(other.x));
        let y0 = i64::from(self.y.max(other.y));
        let x1 = (i64::from(self.x) + i64::from(self.width))
            .min(i64::from(other.x) + i64::from(other.width));
        let y1 = (i64::from(self.y) + i64::from(self.height))
            .min(i64::from(other.y) + i64::from(other.height));

        Rect2D {
            x: x0 as i32,
            y: y0 as i32,
            width: (x1 - x0).max(0) as u32,
            height: (y1 - y0).max(0) as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Per-viewport scissor register. Bounds are exclusive on the max side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Scissor {
    pub enable: bool,
    pub min_x: u16,
    pub max_x: u16,
    pub min_y: u16,
    pub max_y: u16,
}

impl Scissor {
    pub fn rect(&self) -> Rect2D {
        if !self.enable {
            return Rect2D::UNBOUNDED;
        }
        Rect2D::from_bounds(
            self.min_x.into(),
            self.min_y.into(),
            self.max_x.into(),
            self.max_y.into(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClearRect {
    pub min_x: u16,
    pub max_x: u16,
    pub min_y: u16,
    pub max_y: u16,
}

impl ClearRect {
    pub fn rect(&self) -> Rect2D {
        Rect2D::from_bounds(
            self.min_x.into(),
            self.min_y.into(),
            self.max_x.into(),
            self.max_y.into(),
        )
    }
}

/// Viewport clip 0, only consulted by clears that opt in through [`ClearSurfaceControl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewportClip {
    pub min_x: u16,
    pub max_x: u16,
    pub min_y: u16,
    pub max_y: u16,
}

impl ViewportClip {
    pub fn rect(&self) -> Rect2D {
        Rect2D::from_bounds(
            self.min_x.into(),
            self.min_y.into(),
            self.max_x.into(),
            self.max_y.into(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceClip {
    pub x: u16,
    pub width: u16,
    pub y: u16,
    pub height: u16,
}

impl SurfaceClip {
    pub fn rect(&self) -> Rect2D {
        Rect2D::new(
            self.x.into(),
            self.y.into(),
            self.width.into(),
            self.height.into(),
        )
    }
}

bitflags! {
    /// Extra clipping applied to clears on top of the clear rect and surface clip.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct ClearSurfaceControl: u32 {
        const RESPECT_STENCIL_MASK = 1 << 0;
        const USE_SCISSOR0 = 1 << 2;
        const USE_VIEWPORT_CLIP0 = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct ClearAspects: u32 {
        const DEPTH = 1 << 0;
        const STENCIL = 1 << 1;
        const RED = 1 << 2;
        const GREEN = 1 << 3;
        const BLUE = 1 << 4;
        const ALPHA = 1 << 5;
        const COLOR = Self::RED.bits()
            | Self::GREEN.bits()
            | Self::BLUE.bits()
            | Self::ALPHA.bits();
    }
}

bitflags! {
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct ColorWriteMask: u8 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
        const ALL = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

impl ColorWriteMask {
    pub fn from_clear_aspects(aspects: ClearAspects) -> Self {
        let mut mask = ColorWriteMask::empty();
        mask.set(ColorWriteMask::RED, aspects.contains(ClearAspects::RED));
        mask.set(ColorWriteMask::GREEN, aspects.contains(ClearAspects::GREEN));
        mask.set(ColorWriteMask::BLUE, aspects.contains(ClearAspects::BLUE));
        mask.set(ColorWriteMask::ALPHA, aspects.contains(ClearAspects::ALPHA));
        mask
    }
}

/// Argument of the clear method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClearSurface {
    pub aspects: ClearAspects,
    /// Color target index the color aspects apply to.
    pub mrt_select: u8,
    pub rt_array_index: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum IndexFormat {
    U8 = 0,
    U16 = 1,
    #[default]
    U32 = 2,
}

impl IndexFormat {
    pub fn size(self) -> u64 {
        match self {
            IndexFormat::U8 => 1,
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PolygonMode {
    #[default]
    Fill = 0,
    Line = 1,
    Point = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum CullFace {
    Front = 1,
    #[default]
    Back = 2,
    FrontAndBack = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum FrontFace {
    Clockwise = 0,
    #[default]
    CounterClockwise = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum CompareOp {
    Never = 0,
    Less = 1,
    Equal = 2,
    LessOrEqual = 3,
    Greater = 4,
    NotEqual = 5,
    GreaterOrEqual = 6,
    #[default]
    Always = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum StencilOp {
    #[default]
    Keep = 0,
    Zero = 1,
    Replace = 2,
    IncrementAndClamp = 3,
    DecrementAndClamp = 4,
    Invert = 5,
    IncrementAndWrap = 6,
    DecrementAndWrap = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum BlendOp {
    #[default]
    Add = 0,
    Subtract = 1,
    ReverseSubtract = 2,
    Min = 3,
    Max = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum BlendFactor {
    Zero = 0,
    #[default]
    One = 1,
    SrcColor = 2,
    OneMinusSrcColor = 3,
    SrcAlpha = 4,
    OneMinusSrcAlpha = 5,
    DstAlpha = 6,
    OneMinusDstAlpha = 7,
    DstColor = 8,
    OneMinusDstColor = 9,
    SrcAlphaSaturate = 10,
    ConstantColor = 11,
    OneMinusConstantColor = 12,
    ConstantAlpha = 13,
    OneMinusConstantAlpha = 14,
    Src1Color = 15,
    OneMinusSrc1Color = 16,
    Src1Alpha = 17,
    OneMinusSrc1Alpha = 18,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum LogicOp {
    Clear = 0,
    And = 1,
    AndReverse = 2,
    #[default]
    Copy = 3,
    AndInverted = 4,
    NoOp = 5,
    Xor = 6,
    Or = 7,
    Nor = 8,
    Equivalent = 9,
    Invert = 10,
    OrReverse = 11,
    CopyInverted = 12,
    OrInverted = 13,
    Nand = 14,
    Set = 15,
}

/// Format of a render target as programmed by the guest. Zero means "no target".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RenderTargetFormat(pub u8);

impl RenderTargetFormat {
    pub const NONE: RenderTargetFormat = RenderTargetFormat(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderTarget {
    pub format: RenderTargetFormat,
    /// View resolved by the texture manager when the target registers were written.
    pub view: Option<ImageViewId>,
}

/// Vertex stream (fetch buffer) registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VertexStream {
    pub enable: bool,
    pub stride: u16,
    pub address: u64,
    pub size: u64,
    pub instanced: bool,
    pub divisor: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VertexAttribute {
    /// Attribute reads a constant zero value instead of fetching.
    pub is_constant: bool,
    pub stream: u8,
    pub offset: u16,
    /// Raw component bit-width encoding, translated to a host format by the pipeline factory.
    pub component_bit_widths: u8,
    pub numerical_type: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexBuffer {
    pub address: u64,
    pub size: u64,
    pub format: IndexFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransformFeedbackBuffer {
    pub enable: bool,
    pub address: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DepthBias {
    pub constant_factor: f32,
    pub clamp: f32,
    pub slope_factor: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StencilFace {
    pub fail: StencilOp,
    pub depth_fail: StencilOp,
    pub pass: StencilOp,
    pub func: CompareOp,
    pub func_ref: u8,
    pub func_mask: u8,
    pub write_mask: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttachmentBlend {
    pub enable: bool,
    pub color_op: BlendOp,
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub alpha_op: BlendOp,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub write_mask: ColorWriteMask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TessellationParameters {
    pub patch_control_points: u8,
    pub domain: u8,
    pub spacing: u8,
    pub output_primitives: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TexturePool {
    pub address: u64,
    pub maximum_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SamplerPool {
    pub address: u64,
    pub maximum_index: u32,
    /// Sampler index is taken from the texture index rather than from the bindless handle.
    pub use_texture_index: bool,
}

/// Constant-buffer selector: the buffer subsequent loads and binds refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConstantBufferSelector {
    pub address: u64,
    pub size: u32,
}

/// Register file consumed by the interconnect.
#[derive(Debug, Clone)]
pub struct EngineRegisters {
    pub shader_programs: [Option<ShaderBinary>; SHADER_PROGRAM_COUNT],
    pub vertex_streams: [VertexStream; VERTEX_STREAM_COUNT],
    pub vertex_attributes: [VertexAttribute; VERTEX_ATTRIBUTE_COUNT],
    pub index_buffer: IndexBuffer,
    pub transform_feedback_buffers: [TransformFeedbackBuffer; TRANSFORM_FEEDBACK_BUFFER_COUNT],

    pub color_targets: [RenderTarget; COLOR_TARGET_COUNT],
    /// Number of leading color targets that are active.
    pub color_target_count: u8,
    pub depth_target: RenderTarget,

    pub viewports: [Viewport; VIEWPORT_COUNT],
    pub scissors: [Scissor; VIEWPORT_COUNT],
    pub line_width: f32,

    pub polygon_mode: PolygonMode,
    pub cull_enable: bool,
    pub cull_face: CullFace,
    pub front_face: FrontFace,
    pub rasterizer_discard: bool,
    pub depth_clamp_enable: bool,
    pub depth_bias_enable: bool,
    pub depth_bias: DepthBias,

    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_func: CompareOp,
    pub depth_bounds_enable: bool,
    pub depth_bounds: (f32, f32),
    pub stencil_enable: bool,
    pub stencil_two_sided: bool,
    pub stencil_front: StencilFace,
    pub stencil_back: StencilFace,

    pub blend: [AttachmentBlend; COLOR_TARGET_COUNT],
    pub blend_constants: [f32; 4],
    pub logic_op_enable: bool,
    pub logic_op: LogicOp,
    pub alpha_to_coverage: bool,
    pub sample_count: u8,

    pub tessellation: TessellationParameters,
    pub bindless_texture_constant_buffer: u8,

    pub texture_pool: TexturePool,
    pub sampler_pool: SamplerPool,
    pub constant_buffer_selector: ConstantBufferSelector,

    pub clear_rect: ClearRect,
    pub surface_clip: SurfaceClip,
    pub viewport_clip0: ViewportClip,
    pub clear_surface_control: ClearSurfaceControl,
    pub color_clear_value: [u32; 4],
    pub depth_clear_value: f32,
    pub stencil_clear_value: u32,
}

impl Default for EngineRegisters {
    fn default() -> Self {
        Self {
            shader_programs: Default::default(),
            vertex_streams: [VertexStream::default(); VERTEX_STREAM_COUNT],
            vertex_attributes: [VertexAttribute::default(); VERTEX_ATTRIBUTE_COUNT],
            index_buffer: IndexBuffer::default(),
            transform_feedback_buffers: [TransformFeedbackBuffer::default();
                TRANSFORM_FEEDBACK_BUFFER_COUNT],
            color_targets: [RenderTarget::default(); COLOR_TARGET_COUNT],
            color_target_count: 0,
            depth_target: RenderTarget::default(),
            viewports: [Viewport::default(); VIEWPORT_COUNT],
            scissors: [Scissor::default(); VIEWPORT_COUNT],
            line_width: 1.0,
            polygon_mode: PolygonMode::Fill,
            cull_enable: false,
            cull_face: CullFace::Back,
            front_face: FrontFace::CounterClockwise,
            rasterizer_discard: false,
            depth_clamp_enable: false,
            depth_bias_enable: false,
            depth_bias: DepthBias::default(),
            depth_test_enable: false,
            depth_write_enable: false,
            depth_func: CompareOp::Always,
            depth_bounds_enable: false,
            depth_bounds: (0.0, 1.0),
            stencil_enable: false,
            stencil_two_sided: false,
            stencil_front: StencilFace::default(),
            stencil_back: StencilFace::default(),
            blend: [AttachmentBlend {
                write_mask: ColorWriteMask::ALL,
                ..AttachmentBlend::default()
            }; COLOR_TARGET_COUNT],
            blend_constants: [0.0; 4],
            logic_op_enable: false,
            logic_op: LogicOp::Copy,
            alpha_to_coverage: false,
            sample_count: 1,
            tessellation: TessellationParameters::default(),
            bindless_texture_constant_buffer: 0,
            texture_pool: TexturePool::default(),
            sampler_pool: SamplerPool::default(),
            constant_buffer_selector: ConstantBufferSelector::default(),
            clear_rect: ClearRect::default(),
            surface_clip: SurfaceClip::default(),
            viewport_clip0: ViewportClip::default(),
            clear_surface_control: ClearSurfaceControl::empty(),
            color_clear_value: [0; 4],
            depth_clear_value: 0.0,
            stencil_clear_value: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn intersect_overlapping_rects() {
        let a = Rect2D::new(0, 0, 100, 100);
        let b = Rect2D::new(50, 25, 100, 100);
        assert_eq!(a.intersect(&b), Rect2D::new(50, 25, 50, 75));
        assert_eq!(b.intersect(&a), Rect2D::new(50, 25, 50, 75));
    }

    #[test]
    fn intersect_nested_rect_yields_inner() {
        let outer = Rect2D::new(0, 0, 1280, 720);
        let inner = Rect2D::new(10, 20, 30, 40);
        assert_eq!(outer.intersect(&inner), inner);
        assert_eq!(inner.intersect(&outer), inner);
    }

    #[test]
    fn intersect_disjoint_rects_is_empty() {
        let a = Rect2D::new(0, 0, 10, 10);
        let b = Rect2D::new(20, 20, 10, 10);
        let r = a.intersect(&b);
        assert!(r.is_empty());
        assert_eq!(r.area(), 0);
    }

    #[test]
    fn disabled_scissor_is_unbounded() {
        let scissor = Scissor {
            enable: false,
            min_x: 5,
            max_x: 6,
            min_y: 5,
            max_y: 6,
        };
        assert_eq!(scissor.rect(), Rect2D::UNBOUNDED);
    }

    #[test]
    fn inverted_bounds_are_empty() {
        assert!(Rect2D::from_bounds(10, 10, 5, 20).is_empty());
    }

    fn rect() -> impl Strategy<Value = Rect2D> {
        (0i32..512, 0i32..512, 0u32..512, 0u32..512)
            .prop_map(|(x, y, width, height)| Rect2D::new(x, y, width, height))
    }

    fn contains(outer: &Rect2D, inner: &Rect2D) -> bool {
        inner.x >= outer.x
            && inner.y >= outer.y
            && i64::from(inner.x) + i64::from(inner.width)
                <= i64::from(outer.x) + i64::from(outer.width)
            && i64::from(inner.y) + i64::from(inner.height)
                <= i64::from(outer.y) + i64::from(outer.height)
    }

    proptest! {
        #[test]
        fn intersection_is_commutative_and_contained(a in rect(), b in rect()) {
            let ab = a.intersect(&b);
            prop_assert_eq!(ab, b.intersect(&a));
            prop_assert!(ab.area() <= a.area().min(b.area()));
            if !ab.is_empty() {
                prop_assert!(contains(&a, &ab));
                prop_assert!(contains(&b, &ab));
            }
        }
    }

    #[test]
    fn vertex_stage_is_fed_by_both_vertex_programs() {
        for program in ShaderProgram::ALL {
            assert!(program.stage().programs().contains(&program));
        }
        assert_eq!(
            ShaderStage::Vertex.programs().last(),
            Some(&ShaderProgram::Vertex)
        );
    }
}
