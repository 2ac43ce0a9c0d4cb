use std::fmt;

use crate::engine::IndexFormat;

/// Primitive topology as programmed through the draw method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum DrawTopology {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
    Quads,
    QuadStrip,
    Polygon,
    LinesAdjacency,
    LineStripAdjacency,
    TrianglesAdjacency,
    TriangleStripAdjacency,
    Patches,
}

impl fmt::Display for DrawTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DrawTopology::Points => "points",
            DrawTopology::Lines => "lines",
            DrawTopology::LineLoop => "line_loop",
            DrawTopology::LineStrip => "line_strip",
            DrawTopology::Triangles => "triangles",
            DrawTopology::TriangleStrip => "triangle_strip",
            DrawTopology::TriangleFan => "triangle_fan",
            DrawTopology::Quads => "quads",
            DrawTopology::QuadStrip => "quad_strip",
            DrawTopology::Polygon => "polygon",
            DrawTopology::LinesAdjacency => "lines_adjacency",
            DrawTopology::LineStripAdjacency => "line_strip_adjacency",
            DrawTopology::TrianglesAdjacency => "triangles_adjacency",
            DrawTopology::TriangleStripAdjacency => "triangle_strip_adjacency",
            DrawTopology::Patches => "patches",
        };
        f.write_str(s)
    }
}

/// Topologies the host API can draw natively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PrimitiveTopology {
    PointList = 0,
    LineList = 1,
    LineStrip = 2,
    #[default]
    TriangleList = 3,
    TriangleStrip = 4,
    TriangleFan = 5,
    LineListWithAdjacency = 6,
    LineStripWithAdjacency = 7,
    TriangleListWithAdjacency = 8,
    TriangleStripWithAdjacency = 9,
    PatchList = 10,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrimitiveTopologyTranslation {
    pub topology: PrimitiveTopology,
    /// Quads are drawn as a triangle list; callers must synthesize or convert indices.
    pub needs_quad_emulation: bool,
}

pub fn translate_draw_topology(topology: DrawTopology) -> PrimitiveTopologyTranslation {
    let host = |topology| PrimitiveTopologyTranslation {
        topology,
        needs_quad_emulation: false,
    };

    match topology {
        DrawTopology::Points => host(PrimitiveTopology::PointList),
        DrawTopology::Lines => host(PrimitiveTopology::LineList),
        // Approximated: the closing segment is not drawn.
        DrawTopology::LineLoop | DrawTopology::LineStrip => host(PrimitiveTopology::LineStrip),
        DrawTopology::Triangles => host(PrimitiveTopology::TriangleList),
        // A quad strip rasterizes identically to a triangle strip over the same vertices.
        DrawTopology::TriangleStrip | DrawTopology::QuadStrip => {
            host(PrimitiveTopology::TriangleStrip)
        }
        // Convex polygons are triangle fans.
        DrawTopology::TriangleFan | DrawTopology::Polygon => host(PrimitiveTopology::TriangleFan),
        DrawTopology::Quads => PrimitiveTopologyTranslation {
            topology: PrimitiveTopology::TriangleList,
            needs_quad_emulation: true,
        },
        DrawTopology::LinesAdjacency => host(PrimitiveTopology::LineListWithAdjacency),
        DrawTopology::LineStripAdjacency => host(PrimitiveTopology::LineStripWithAdjacency),
        DrawTopology::TrianglesAdjacency => host(PrimitiveTopology::TriangleListWithAdjacency),
        DrawTopology::TriangleStripAdjacency => {
            host(PrimitiveTopology::TriangleStripWithAdjacency)
        }
        DrawTopology::Patches => host(PrimitiveTopology::PatchList),
    }
}

const QUAD_VERTEX_COUNT: u32 = 4;
const QUAD_EMITTED_INDEX_COUNT: u32 = 6;
/// Triangle-list ordering of one quad: (0, 1, 2) and (0, 2, 3).
const QUAD_TRIANGLE_ORDER: [u32; 6] = [0, 1, 2, 0, 2, 3];

/// Number of triangle-list indices emitted for `vertex_count` quad vertices. Trailing vertices
/// that do not form a whole quad are dropped.
pub fn quad_index_count(vertex_count: u32) -> u32 {
    (vertex_count / QUAD_VERTEX_COUNT) * QUAD_EMITTED_INDEX_COUNT
}

/// Build an index buffer for a non-indexed quad-list draw call.
pub fn expand_quads_nonindexed_u32(vertex_count: u32) -> Vec<u32> {
    let quads = vertex_count / QUAD_VERTEX_COUNT;
    let mut out = Vec::with_capacity(quad_index_count(vertex_count) as usize);
    for quad in 0..quads {
        let base = quad * QUAD_VERTEX_COUNT;
        out.extend(QUAD_TRIANGLE_ORDER.iter().map(|&i| base + i));
    }
    out
}

/// Expand guest quad-list indices (little-endian, `format` sized) into a u32 triangle list.
pub fn expand_quads_indexed_u32(indices: &[u8], format: IndexFormat) -> Vec<u32> {
    let stride = format.size() as usize;
    let read = |i: usize| -> u32 {
        let bytes = &indices[i * stride..(i + 1) * stride];
        match format {
            IndexFormat::U8 => u32::from(bytes[0]),
            IndexFormat::U16 => u32::from(u16::from_le_bytes([bytes[0], bytes[1]])),
            IndexFormat::U32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    };

    let vertex_count = (indices.len() / stride) as u32;
    let quads = vertex_count / QUAD_VERTEX_COUNT;
    let mut out = Vec::with_capacity(quad_index_count(vertex_count) as usize);
    for quad in 0..quads {
        let base = (quad * QUAD_VERTEX_COUNT) as usize;
        out.extend(QUAD_TRIANGLE_ORDER.iter().map(|&i| read(base + i as usize)));
    }
    out
}
