/// Why a table file is being created; filters may opt out per reason.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum TableFileCreationReason {
    Flush,
    Compaction,
    Recovery,
    Misc,
}

#[derive(Clone, Debug)]
pub enum CompactionFilterDecision {
    Keep,
    /// Drop the record; the engine emits a deletion in its place so older
    /// versions beneath other files stay hidden.
    Remove,
    ChangeValue(Vec<u8>),
}

/// User hook to drop or rewrite records while they stream through a flush or
/// compaction. Filters observing snapshots are not supported; the job fails
/// rather than silently produce snapshot-inconsistent output.
pub trait CompactionFilter: Send + Sync {
    fn name(&self) -> &'static str;
    fn ignore_snapshots(&self) -> bool {
        true
    }
    fn filter(&self, level: u32, user_key: &[u8], value: &[u8]) -> CompactionFilterDecision;
}

pub struct CompactionFilterContext {
    pub is_full_compaction: bool,
    pub is_manual_compaction: bool,
    pub column_family_id: u32,
    pub reason: TableFileCreationReason,
}

pub trait CompactionFilterFactory: Send + Sync {
    fn name(&self) -> &'static str;
    fn should_filter_table_file_creation(&self, reason: TableFileCreationReason) -> bool;
    fn create_compaction_filter(&self, ctx: &CompactionFilterContext)
        -> Box<dyn CompactionFilter>;
}
