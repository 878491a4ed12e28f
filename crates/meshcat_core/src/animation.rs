//! Animation clips, keyframes and frame-rate resampling.
//!
//! Keyframe times are in recording frames (the unit the recording's fps
//! refers to), not seconds. [`resample`] converts to target frames.

use std::collections::HashMap;

use meshcat_math::{DQuat, DVec3};

use crate::msgpack::Value;

/// Frame rate assumed when a recording does not state one.
pub const DEFAULT_RECORDING_FPS: f64 = 64.0;

/// Upper bound on the frames [`resample`] produces for one node.
pub const MAX_RESAMPLED_FRAMES: usize = 1 << 20;

/// Which transform channel a track drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackProperty {
    Position,
    Quaternion,
    Scale,
    /// Anything else (`visible`, material properties, ...)
    Other,
}

impl TrackProperty {
    /// Classify a Three.js track name such as `.position` or `obj.quaternion`.
    pub fn from_track_name(name: &str) -> Self {
        match name.rsplit('.').next().unwrap_or("") {
            "position" => TrackProperty::Position,
            "quaternion" => TrackProperty::Quaternion,
            "scale" => TrackProperty::Scale,
            _ => TrackProperty::Other,
        }
    }

    /// Number of values per key, if fixed.
    pub fn width(&self) -> Option<usize> {
        match self {
            TrackProperty::Position | TrackProperty::Scale => Some(3),
            TrackProperty::Quaternion => Some(4),
            TrackProperty::Other => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackKey {
    pub time: f64,
    /// `None` when the key was sent with a nil value
    pub value: Option<Vec<f64>>,
}

/// One property track of a clip, as sent.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub name: String,
    pub property: TrackProperty,
    pub keys: Vec<TrackKey>,
}

impl Track {
    /// Parse either the `keys: [{time, value}]` layout or the flat
    /// `times` + `values` layout.
    pub fn from_value(track: &Value) -> Self {
        let name = track
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let property = TrackProperty::from_track_name(&name);

        let keys: Vec<TrackKey> = match track.get("keys").and_then(Value::as_array) {
            Some(keys) => keys
                .iter()
                .map(|key| TrackKey {
                    time: key.get("time").and_then(Value::as_f64).unwrap_or(0.0),
                    value: key.get_non_nil("value").and_then(Value::to_f64_vec),
                })
                .collect(),
            None => flat_keys(track, property),
        };
        let total = keys.len();
        let keys: Vec<TrackKey> = keys.into_iter().filter(|k| k.time.is_finite()).collect();
        if keys.len() < total {
            log::warn!(
                "track {:?}: dropped {} key(s) with a non-finite time",
                name,
                total - keys.len()
            );
        }

        Self {
            name,
            property,
            keys,
        }
    }
}

fn flat_keys(track: &Value, property: TrackProperty) -> Vec<TrackKey> {
    let times = track
        .get("times")
        .and_then(Value::to_f64_vec)
        .unwrap_or_default();
    let values = track
        .get("values")
        .and_then(Value::to_f64_vec)
        .unwrap_or_default();
    if times.is_empty() {
        return Vec::new();
    }

    let width = match property.width() {
        Some(w) => w,
        None if values.len() % times.len() == 0 => values.len() / times.len(),
        None => 0,
    };
    if width == 0 || values.len() < times.len() * width {
        log::warn!(
            "track has {} time(s) but {} value(s); ignoring values",
            times.len(),
            values.len()
        );
    }

    times
        .iter()
        .enumerate()
        .map(|(i, &time)| TrackKey {
            time,
            value: (width > 0)
                .then(|| values.get(i * width..(i + 1) * width))
                .flatten()
                .map(<[f64]>::to_vec),
        })
        .collect()
}

/// A sample of the transform channels at one time. Channels without a
/// key at exactly this time are `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationKeyframe {
    pub time: f64,
    pub position: Option<DVec3>,
    /// Rotation as sent, (x, y, z, w)
    pub rotation: Option<DQuat>,
    pub scale: Option<DVec3>,
}

impl AnimationKeyframe {
    pub fn at(time: f64) -> Self {
        Self {
            time,
            position: None,
            rotation: None,
            scale: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnimationClip {
    pub name: String,
    pub fps: Option<f64>,
    pub tracks: Vec<Track>,
    /// Channels merged across tracks, ascending by time
    pub keyframes: Vec<AnimationKeyframe>,
}

impl AnimationClip {
    pub fn from_value(clip: &Value) -> Self {
        let name = clip
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("default")
            .to_string();
        let fps = clip.get("fps").and_then(positive);
        let tracks: Vec<Track> = clip
            .get("tracks")
            .and_then(Value::as_array)
            .map(|tracks| tracks.iter().map(Track::from_value).collect())
            .unwrap_or_default();
        let keyframes = merge_tracks(&tracks);

        Self {
            name,
            fps,
            tracks,
            keyframes,
        }
    }

    /// Largest keyframe time, or 0 for an empty clip.
    pub fn max_time(&self) -> f64 {
        self.keyframes
            .iter()
            .map(|kf| kf.time)
            .fold(0.0, f64::max)
    }
}

// -0.0 and 0.0 are the same time
fn time_key(t: f64) -> u64 {
    (t + 0.0).to_bits()
}

/// Build keyframes from the union of all track times.
///
/// A track contributes to a keyframe only if it has a key at exactly that
/// time; nothing is interpolated.
pub fn merge_tracks(tracks: &[Track]) -> Vec<AnimationKeyframe> {
    let mut times: Vec<f64> = tracks
        .iter()
        .flat_map(|t| t.keys.iter().map(|k| k.time + 0.0))
        .collect();
    times.sort_by(f64::total_cmp);
    times.dedup_by(|a, b| time_key(*a) == time_key(*b));

    // later keys at the same time override earlier ones
    let lookups: Vec<(TrackProperty, HashMap<u64, Option<&Vec<f64>>>)> = tracks
        .iter()
        .map(|t| {
            let by_time = t
                .keys
                .iter()
                .map(|k| (time_key(k.time), k.value.as_ref()))
                .collect();
            (t.property, by_time)
        })
        .collect();

    times
        .into_iter()
        .map(|time| {
            let mut kf = AnimationKeyframe::at(time);
            for (property, by_time) in &lookups {
                let Some(Some(value)) = by_time.get(&time_key(time)) else {
                    continue;
                };
                match (property, value.as_slice()) {
                    (TrackProperty::Position, [x, y, z, ..]) => {
                        kf.position = Some(DVec3::new(*x, *y, *z))
                    }
                    (TrackProperty::Scale, [x, y, z, ..]) => kf.scale = Some(DVec3::new(*x, *y, *z)),
                    (TrackProperty::Quaternion, [x, y, z, w, ..]) => {
                        kf.rotation = Some(DQuat::from_xyzw(*x, *y, *z, *w))
                    }
                    _ => {}
                }
            }
            kf
        })
        .collect()
}

fn positive(v: &Value) -> Option<f64> {
    v.as_f64().filter(|f| *f > 0.0)
}

/// Frame rate declared by a `set_animation` payload.
///
/// Checks `options.fps`, then `options.play_fps`, then the first clip's
/// `fps`. Non-positive values count as absent.
pub fn payload_fps(payload: &Value) -> Option<f64> {
    let options = payload.get("options");
    let option = |key: &str| options.and_then(|o| o.get(key)).and_then(positive);
    option("fps").or_else(|| option("play_fps")).or_else(|| {
        payload
            .get("animations")
            .and_then(Value::as_array)
            .and_then(|anims| anims.first())
            .and_then(|anim| anim.get("clip"))
            .and_then(|clip| clip.get("fps"))
            .and_then(positive)
    })
}

/// Downsample keyframes by nearest-neighbour selection.
///
/// Returns the input unchanged when `target_fps >= recording_fps`. Otherwise
/// output frame `f` takes the input keyframe closest to recording time
/// `min + f / target_fps * recording_fps` (the earlier one on a tie) and is
/// re-tagged with time `f`, in target frames.
pub fn resample(
    keyframes: &[AnimationKeyframe],
    recording_fps: f64,
    target_fps: f64,
) -> Vec<AnimationKeyframe> {
    if keyframes.is_empty()
        || target_fps.is_nan()
        || target_fps <= 0.0
        || target_fps >= recording_fps
    {
        return keyframes.to_vec();
    }

    let mut sorted: Vec<&AnimationKeyframe> =
        keyframes.iter().filter(|kf| kf.time.is_finite()).collect();
    if sorted.len() < keyframes.len() {
        log::warn!(
            "resample: ignoring {} keyframe(s) with a non-finite time",
            keyframes.len() - sorted.len()
        );
    }
    if sorted.is_empty() {
        return Vec::new();
    }
    sorted.sort_by(|a, b| a.time.total_cmp(&b.time));
    let mut unique: Vec<&AnimationKeyframe> = Vec::with_capacity(sorted.len());
    for kf in sorted {
        match unique.last_mut() {
            Some(last) if last.time == kf.time => *last = kf,
            _ => unique.push(kf),
        }
    }

    let min_time = unique[0].time;
    let max_time = unique[unique.len() - 1].time;
    let duration = (max_time - min_time) / recording_fps;
    let count = frame_count(duration * target_fps);

    (0..count)
        .map(|frame| {
            let target = min_time + (frame as f64 / target_fps) * recording_fps;
            let nearest = nearest_index(&unique, target);
            AnimationKeyframe {
                time: frame as f64,
                ..unique[nearest].clone()
            }
        })
        .collect()
}

// floor(span) + 1, capped at MAX_RESAMPLED_FRAMES
fn frame_count(span: f64) -> usize {
    let span = span.floor();
    if span.is_finite() && span >= 0.0 && span < MAX_RESAMPLED_FRAMES as f64 {
        span as usize + 1
    } else if span < 0.0 {
        1
    } else {
        log::warn!(
            "resample: {} target frames exceeds the limit of {}; truncating",
            span,
            MAX_RESAMPLED_FRAMES
        );
        MAX_RESAMPLED_FRAMES
    }
}

fn nearest_index(sorted: &[&AnimationKeyframe], target: f64) -> usize {
    let i = sorted.partition_point(|kf| kf.time < target);
    if i == 0 {
        return 0;
    }
    if i == sorted.len() {
        return i - 1;
    }
    if (target - sorted[i - 1].time) <= (sorted[i].time - target) {
        i - 1
    } else {
        i
    }
}

/// Convert a recording-frame time to a target frame number.
///
/// Halves round to even.
pub fn time_to_frame(time: f64, recording_fps: f64, target_fps: f64, start_frame: i64) -> i64 {
    // `as` saturates, so a huge time pins to the end of the range
    start_frame.saturating_add((time / recording_fps * target_fps).round_ties_even() as i64)
}

/// Target frame range covering every keyframe of the given clips.
pub fn animation_range<'a>(
    clips: impl IntoIterator<Item = &'a AnimationClip>,
    recording_fps: f64,
    target_fps: f64,
    start_frame: i64,
) -> (i64, i64) {
    let max_time = clips
        .into_iter()
        .map(AnimationClip::max_time)
        .fold(0.0, f64::max);
    (
        start_frame,
        time_to_frame(max_time, recording_fps, target_fps, start_frame),
    )
}
