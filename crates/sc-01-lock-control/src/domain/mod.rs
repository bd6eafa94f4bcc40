//! Lock protocol domain: wire codecs for the two board families.

pub mod codec;
pub mod cu;
pub mod scu;

pub use codec::{checksum, codec_for, FramingOptions, LockCodec, DETECTION_DEVICE_ID};
pub use cu::CuCodec;
pub use scu::ScuCodec;
