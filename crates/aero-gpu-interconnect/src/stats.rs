/// Counters accumulated across every operation of one engine channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterconnectStats {
    pub draws: u64,
    pub clears: u64,
    /// Clears skipped because every requested aspect was masked off or the clear rect was empty.
    pub clears_skipped: u64,
    pub pipeline_switches: u64,
    pub full_descriptor_syncs: u64,
    pub quick_descriptor_syncs: u64,
    /// Quick syncs where no binding of the pipeline read a rebound buffer.
    pub quick_descriptor_syncs_unchanged: u64,
    pub descriptor_sets_allocated: u64,
    pub quad_index_generations: u64,
}

impl InterconnectStats {
    pub(crate) fn bump(counter: &mut u64) {
        *counter = counter.saturating_add(1);
    }
}
