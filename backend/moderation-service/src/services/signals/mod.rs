//! Rule-based signal extraction.
//!
//! Everything here is pure computation over the inputs it is given; the
//! callers look up whatever history (posting stats, recent image hashes) the
//! rules need.

pub mod behavior;
pub mod image;
pub mod text;

pub use self::behavior::{is_duplicate, BehaviorContext};
pub use self::image::{
    hamming_distance, perceptual_hash, ImageInspector, ImageMetadata, ImagePolicy,
};
pub use self::text::{Lexicon, TextSignalExtractor};
