//!
//! Compressed skeletal-animation tracks: quantized quaternion and vector
//! key codecs, compact key-time indexes, and interpolated playback through
//! per-joint controllers.
//!
//! Encoded data is read from container-supplied raw buffers via [`Archive`],
//! with transparent endian swapping. Tracks can also be built directly with
//! the `push` APIs and sampled at arbitrary times.
//!

mod archive;
mod base;
mod controller;
mod endian;
mod key_times;
mod rotation;
mod track;
mod vector;

pub use archive::{Archive, ArchiveRead};
pub use base::*;
pub use controller::{Controller, ControllerSample};
pub use endian::{Endian, SwapEndian};
pub use key_times::{BitsetKeys, KeyLookup, KeyTimes, StartStopKeys, TimeUnit, UniformKeys};
pub use rotation::{
    PolarKey, QuatKey, RawQuatKey, RotationKeys, ShortInt3Key, SmallTree48Key, SmallTree64ExtKey,
    SmallTree64Key, SmallTreeDwordKey,
};
pub use track::{RotationTrack, TrackValue, VectorTrack};
pub use vector::{Vec3Key, VectorKeys};
