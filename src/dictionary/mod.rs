//! The per-block string dictionary.
//!
//! The writer side ([`DictionaryBuilder`]) collects distinct byte strings and
//! serializes them in ascending byte-lexicographic order, assigning each its
//! 1-based blob offset. The reader side ([`DictionaryBlob`]) holds the
//! serialized blob and resolves offsets back to entries. Offset 0 is the
//! reserved origin byte meaning "no value present".

mod blob;
mod builder;

pub use blob::DictionaryBlob;
pub use builder::DictionaryBuilder;
