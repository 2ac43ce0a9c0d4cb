//! Compiled graphics pipelines and the cache that owns them.
//!
//! Pipelines are keyed by [`PackedPipelineState`] and live as long as their [`PipelineManager`];
//! callers refer to them through [`PipelineId`]. Two small per-pipeline caches sit in front of the
//! manager's map:
//!
//! - a 4-entry ring of pipelines recently switched to from this one, replaced oldest-first, which
//!   short-circuits the common case of alternating among a few pipelines;
//! - an unbounded memo of binding-shape comparisons against other pipelines, used to decide
//!   whether a descriptor set prepared for one pipeline can be reused for another.

use hashbrown::HashMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::backend::{
    Attachments, CompiledPipeline, GraphicsPipelineDesc, PipelineFactory, ShaderModuleId,
    ShaderTranslator,
};
use crate::descriptor::DescriptorLayout;
use crate::engine::{ShaderStage, SHADER_PROGRAM_COUNT, SHADER_STAGE_COUNT};
use crate::error::InterconnectError;
use crate::packed_state::PackedPipelineState;
use crate::shader::{ShaderBinary, ShaderInfo};

pub const TRANSITION_CACHE_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(pub u32);

impl PipelineId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct PipelineShaderStage {
    pub module: ShaderModuleId,
    pub info: ShaderInfo,
}

fn stage_bindings_equal(a: Option<&PipelineShaderStage>, b: Option<&PipelineShaderStage>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.info.bindings_equal(&b.info),
        _ => false,
    }
}

#[derive(Debug, Clone, Default)]
struct TransitionCache {
    entries: [Option<PipelineId>; TRANSITION_CACHE_SIZE],
    next: usize,
}

impl TransitionCache {
    fn insert(&mut self, id: PipelineId) {
        self.entries[self.next] = Some(id);
        self.next = (self.next + 1) % TRANSITION_CACHE_SIZE;
    }

    fn iter(&self) -> impl Iterator<Item = PipelineId> + '_ {
        self.entries.iter().flatten().copied()
    }
}

#[derive(Debug)]
pub struct Pipeline {
    id: PipelineId,
    source_state: PackedPipelineState,
    stages: [Option<PipelineShaderStage>; SHADER_STAGE_COUNT],
    descriptor_layout: DescriptorLayout,
    compiled: CompiledPipeline,
    transitions: TransitionCache,
    binding_matches: HashMap<PipelineId, bool>,
}

impl Pipeline {
    pub fn id(&self) -> PipelineId {
        self.id
    }

    pub fn source_state(&self) -> &PackedPipelineState {
        &self.source_state
    }

    pub fn stage(&self, stage: ShaderStage) -> Option<&PipelineShaderStage> {
        self.stages[stage.index()].as_ref()
    }

    pub fn compiled(&self) -> &CompiledPipeline {
        &self.compiled
    }

    pub fn descriptor_layout(&self) -> &DescriptorLayout {
        &self.descriptor_layout
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub transition_hits: u64,
}

/// Owns every pipeline of one engine channel. Entries are never evicted.
#[derive(Debug, Default)]
pub struct PipelineManager {
    pipelines: Vec<Pipeline>,
    by_state: HashMap<PackedPipelineState, PipelineId>,
    hits: u64,
    misses: u64,
    transition_hits: u64,
}

impl PipelineManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Panics if `id` was not produced by this manager.
    pub fn get(&self, id: PipelineId) -> &Pipeline {
        &self.pipelines[id.index()]
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Returns the pipeline for `state`, translating shaders and compiling it on first use.
    pub fn find_or_create(
        &mut self,
        shaders: &mut dyn ShaderTranslator,
        factory: &mut dyn PipelineFactory,
        state: &PackedPipelineState,
        programs: &[Option<ShaderBinary>; SHADER_PROGRAM_COUNT],
        attachments: &Attachments,
    ) -> Result<PipelineId, InterconnectError> {
        if let Some(&id) = self.by_state.get(state) {
            self.hits += 1;
            return Ok(id);
        }
        self.misses += 1;

        let mut stages: [Option<PipelineShaderStage>; SHADER_STAGE_COUNT] = Default::default();
        for stage in ShaderStage::ALL {
            let stage_programs = stage.programs();
            let Some(primary) = stage_programs.last() else {
                continue;
            };
            if programs[primary.index()].is_none() {
                continue;
            }

            let binaries: SmallVec<[&ShaderBinary; 2]> = stage_programs
                .iter()
                .filter_map(|program| programs[program.index()].as_ref())
                .collect();
            let translated = shaders
                .translate(stage, &binaries, state)
                .map_err(|source| InterconnectError::ShaderTranslation { stage, source })?;
            stages[stage.index()] = Some(PipelineShaderStage {
                module: translated.module,
                info: translated.info,
            });
        }

        let descriptor_layout = DescriptorLayout::new(&stages);
        let stage_modules: SmallVec<[(ShaderStage, ShaderModuleId); SHADER_STAGE_COUNT]> =
            ShaderStage::ALL
                .iter()
                .filter_map(|&stage| stages[stage.index()].as_ref().map(|s| (stage, s.module)))
                .collect();
        let compiled = factory
            .create_graphics_pipeline(&GraphicsPipelineDesc {
                state,
                stages: &stage_modules,
                layout_bindings: descriptor_layout.bindings(),
                attachments,
            })
            .map_err(InterconnectError::PipelineCreation)?;

        let id = PipelineId(self.pipelines.len() as u32);
        debug!(
            pipeline = id.0,
            state_hash = state.stable_hash(),
            stages = stage_modules.len(),
            bindings = descriptor_layout.bindings().len(),
            "created graphics pipeline"
        );

        self.pipelines.push(Pipeline {
            id,
            source_state: *state,
            stages,
            descriptor_layout,
            compiled,
            transitions: TransitionCache::default(),
            binding_matches: HashMap::new(),
        });
        self.by_state.insert(*state, id);
        Ok(id)
    }

    /// Looks for `state` among the pipelines recently switched to from `from`.
    pub fn lookup_next(
        &mut self,
        from: PipelineId,
        state: &PackedPipelineState,
    ) -> Option<PipelineId> {
        let found = self
            .get(from)
            .transitions
            .iter()
            .find(|&next| self.get(next).source_state == *state);
        if found.is_some() {
            self.transition_hits += 1;
        }
        found
    }

    pub fn add_transition(&mut self, from: PipelineId, next: PipelineId) {
        self.pipelines[from.index()].transitions.insert(next);
    }

    /// Whether a descriptor set laid out for `a` can be bound unchanged for `b`.
    pub fn check_binding_match(&mut self, a: PipelineId, b: PipelineId) -> bool {
        if a == b {
            return true;
        }
        if let Some(&matches) = self.get(a).binding_matches.get(&b) {
            return matches;
        }

        let (pa, pb) = (self.get(a), self.get(b));
        let matches = pa
            .stages
            .iter()
            .zip(pb.stages.iter())
            .all(|(x, y)| stage_bindings_equal(x.as_ref(), y.as_ref()));

        self.pipelines[a.index()].binding_matches.insert(b, matches);
        matches
    }

    pub fn stats(&self) -> PipelineCacheStats {
        PipelineCacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.pipelines.len(),
            transition_hits: self.transition_hits,
        }
    }
}
