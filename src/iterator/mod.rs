mod merge_iterator;

pub use merge_iterator::MergingIterator;

/// Cursor over encoded internal keys. Total-order: bloom or prefix
/// short-circuits never apply.
pub trait InternalIterator: Send {
    fn valid(&self) -> bool;
    fn seek(&mut self, key: &[u8]);
    fn seek_to_first(&mut self);
    fn seek_to_last(&mut self);
    fn seek_for_prev(&mut self, key: &[u8]);
    fn next(&mut self);
    fn prev(&mut self);
    fn key(&self) -> &[u8];
    fn value(&self) -> &[u8];
}

