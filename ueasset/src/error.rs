use thiserror::Error;

#[derive(Error, Debug)]
#[error("at offset {offset}: {error}")]
pub struct ParseError {
    pub offset: usize,
    pub error: Error,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("bad {what} magic {found:#010x}, expected {expected:#010x}")]
    BadMagic {
        what: &'static str,
        expected: u32,
        found: u32,
    },
    #[error("name index {0} out of range")]
    NameIndex(i64),
    #[error("link index {0} out of range")]
    LinkIndex(i32),
    #[error("name {0:?} is not present in the name table")]
    MissingName(String),
    #[error("read of {needed} bytes at offset {offset} overruns range ending at {end}")]
    Overrun {
        offset: usize,
        needed: usize,
        end: usize,
    },
    #[error("{field} value {value} does not fit its encoding")]
    OutOfRange { field: &'static str, value: i64 },
    #[error("category {index} spans [{start}, {end}) outside of payload limit {limit}")]
    CategoryBounds {
        index: usize,
        start: i64,
        end: i64,
        limit: i64,
    },
    #[error("header lists {expected} categories but payload holds {found}")]
    CategoryCount { expected: usize, found: usize },
    #[error("category {index} at offset {offset}: {source}")]
    Category {
        index: usize,
        offset: usize,
        source: Box<Error>,
    },
    #[error("pak entry {name:?}: {source}")]
    Entry { name: String, source: Box<Error> },
    #[error("{0}")]
    Other(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
