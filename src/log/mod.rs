mod writer;

pub const HEADER_SIZE: usize = 4 + 2 + 1;

#[cfg(test)]
pub const BLOCK_SIZE: usize = 4096;
#[cfg(not(test))]
pub const BLOCK_SIZE: usize = 32768;

#[repr(u8)]
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum RecordType {
    // Zero is reserved for preallocated files
    ZeroType = 0,
    FullType = 1,

    // For fragments
    FirstType = 2,
    MiddleType = 3,
    LastType = 4,
}

pub use writer::LogWriter;
