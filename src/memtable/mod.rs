mod memtable;

pub use memtable::Memtable;
