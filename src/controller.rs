//!
//! Controller: per-joint channel bundle.
//!
//! A controller groups up to three tracks (rotation, position, scale) for
//! one animated joint and evaluates them at a shared time. Channels are
//! independent: a missing track leaves its output unset and its status
//! bit clear.
//!

use glam::{Quat, Vec3};

use crate::base::{TrackError, CHANNEL_POSITION, CHANNEL_ROTATION, CHANNEL_SCALE, CONTROLLER_DYNAMIC};
use crate::track::{RotationTrack, VectorTrack};

/// One evaluated controller pose. `status` has a channel bit set for each
/// `Some` field.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ControllerSample {
    pub rotation: Option<Quat>,
    pub position: Option<Vec3>,
    pub scale: Option<Vec3>,
    pub status: u8,
}

/// Track bundle for a single animated joint.
#[derive(Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Controller {
    controller_id: u32,
    flags: u32,
    rotation: Option<RotationTrack>,
    position: Option<VectorTrack>,
    scale: Option<VectorTrack>,
}

impl Controller {
    /// Creates a controller with no tracks.
    pub fn new(controller_id: u32) -> Controller {
        Controller {
            controller_id,
            ..Default::default()
        }
    }

    /// Stable id binding this controller to a joint, assigned by the
    /// authoring pipeline.
    #[inline]
    pub fn controller_id(&self) -> u32 {
        self.controller_id
    }

    #[inline]
    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn set_flags(&mut self, flags: u32) {
        self.flags = flags;
    }

    /// Whether the controller was built at runtime rather than loaded
    /// from a container.
    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.flags & CONTROLLER_DYNAMIC != 0
    }

    #[inline]
    pub fn rotation_track(&self) -> Option<&RotationTrack> {
        self.rotation.as_ref()
    }

    #[inline]
    pub fn position_track(&self) -> Option<&VectorTrack> {
        self.position.as_ref()
    }

    #[inline]
    pub fn scale_track(&self) -> Option<&VectorTrack> {
        self.scale.as_ref()
    }

    pub fn set_rotation_track(&mut self, track: RotationTrack) {
        self.rotation = Some(track);
    }

    pub fn set_position_track(&mut self, track: VectorTrack) {
        self.position = Some(track);
    }

    pub fn set_scale_track(&mut self, track: VectorTrack) {
        self.scale = Some(track);
    }

    /// The key count of the dominant channel: rotation if present, else
    /// position, else zero. Channels are not required to agree.
    pub fn key_count(&self) -> usize {
        if let Some(rotation) = &self.rotation {
            return rotation.key_count();
        }
        if let Some(position) = &self.position {
            return position.key_count();
        }
        0
    }

    /// Total encoded payload size across all present tracks.
    pub fn raw_byte_size(&self) -> usize {
        let mut size = 0;
        if let Some(rotation) = &self.rotation {
            size += rotation.raw_byte_size();
        }
        if let Some(position) = &self.position {
            size += position.raw_byte_size();
        }
        if let Some(scale) = &self.scale {
            size += scale.raw_byte_size();
        }
        size
    }

    pub fn swap_endian(&mut self) {
        if let Some(rotation) = &mut self.rotation {
            rotation.swap_endian();
        }
        if let Some(position) = &mut self.position {
            position.swap_endian();
        }
        if let Some(scale) = &mut self.scale {
            scale.swap_endian();
        }
    }

    /// Evaluates every present channel at `time`. An empty track fails
    /// the whole evaluation rather than being skipped.
    pub fn sample(&self, time: f32) -> Result<ControllerSample, TrackError> {
        let mut out = ControllerSample::default();
        if let Some(rotation) = &self.rotation {
            out.rotation = Some(rotation.sample(time)?);
            out.status |= CHANNEL_ROTATION;
        }
        if let Some(position) = &self.position {
            out.position = Some(position.sample(time)?);
            out.status |= CHANNEL_POSITION;
        }
        if let Some(scale) = &self.scale {
            out.scale = Some(scale.sample(time)?);
            out.status |= CHANNEL_SCALE;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{KeyTimesFormat, RotationFormat, VectorFormat};

    fn position_track(times: &[f32], values: &[Vec3]) -> VectorTrack {
        let mut track = VectorTrack::new(VectorFormat::Raw, KeyTimesFormat::F32);
        for (&t, &v) in times.iter().zip(values) {
            track.push(t, v);
        }
        track
    }

    #[test]
    fn test_empty_controller() {
        let controller = Controller::new(11);
        assert_eq!(controller.controller_id(), 11);
        assert_eq!(controller.key_count(), 0);
        assert_eq!(controller.raw_byte_size(), 0);
        assert!(!controller.is_dynamic());

        let sample = controller.sample(0.0).unwrap();
        assert_eq!(sample, ControllerSample::default());
        assert_eq!(sample.status, 0);
    }

    #[test]
    fn test_channel_independence() {
        let mut controller = Controller::new(3);
        controller.set_position_track(position_track(
            &[0.0, 2.0],
            &[Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0)],
        ));

        let sample = controller.sample(1.0).unwrap();
        assert_eq!(sample.status, CHANNEL_POSITION);
        assert_eq!(sample.rotation, None);
        assert_eq!(sample.position, Some(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(sample.scale, None);
    }

    #[test]
    fn test_all_channels() {
        let mut rotation = RotationTrack::new(RotationFormat::SmallTree64, KeyTimesFormat::U8);
        rotation.push(0.0, Quat::IDENTITY);
        rotation.push(1.0, Quat::from_xyzw(0.0, 0.70710677, 0.0, 0.70710677));

        let mut controller = Controller::new(7);
        controller.set_rotation_track(rotation);
        controller.set_position_track(position_track(&[0.0, 1.0], &[Vec3::ZERO, Vec3::ONE]));
        controller.set_scale_track(position_track(&[0.0], &[Vec3::splat(2.0)]));

        assert_eq!(controller.key_count(), 2);

        let sample = controller.sample(0.5).unwrap();
        assert_eq!(sample.status, CHANNEL_ROTATION | CHANNEL_POSITION | CHANNEL_SCALE);
        assert_eq!(sample.position, Some(Vec3::splat(0.5)));
        assert_eq!(sample.scale, Some(Vec3::splat(2.0)));
        let q = sample.rotation.unwrap();
        assert!((q.length() - 1.0).abs() <= 1e-5);
        assert!(q.y > 0.3 && q.y < 0.5);
    }

    #[test]
    fn test_empty_channel_fails_sampling() {
        let mut controller = Controller::new(1);
        controller.set_position_track(position_track(&[0.0], &[Vec3::ONE]));
        controller.set_scale_track(VectorTrack::new(VectorFormat::Raw, KeyTimesFormat::F32));
        assert!(controller.sample(0.0).unwrap_err().is_empty_track());
    }

    #[test]
    fn test_dynamic_flag() {
        let mut controller = Controller::new(0);
        controller.set_flags(CONTROLLER_DYNAMIC);
        assert!(controller.is_dynamic());
    }

    #[test]
    fn test_key_count_prefers_rotation() {
        let mut rotation = RotationTrack::new(RotationFormat::Raw, KeyTimesFormat::F32);
        rotation.push(0.0, Quat::IDENTITY);

        let mut controller = Controller::new(2);
        controller.set_position_track(position_track(&[0.0, 1.0, 2.0], &[Vec3::ZERO; 3]));
        assert_eq!(controller.key_count(), 3);
        controller.set_rotation_track(rotation);
        assert_eq!(controller.key_count(), 1);
    }
}
