use serde::{Deserialize, Serialize};

/// Rational time base in which packet timestamps are expressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    pub const MILLISECONDS: TimeBase = TimeBase { num: 1, den: 1000 };

    pub fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::MILLISECONDS
    }
}

/// An encoded media packet tagged with the index of the stream it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    pub index: usize,
    pub data: Vec<u8>,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    pub time_base: TimeBase,
    pub keyframe: bool,
}

impl Packet {
    pub fn new(index: usize, data: Vec<u8>) -> Self {
        Self {
            index,
            data,
            pts: None,
            dts: None,
            duration: 0,
            time_base: TimeBase::default(),
            keyframe: false,
        }
    }

    pub fn with_pts(mut self, pts: i64, time_base: TimeBase) -> Self {
        self.pts = Some(pts);
        self.dts = Some(pts);
        self.time_base = time_base;
        self
    }

    pub fn with_keyframe(mut self, keyframe: bool) -> Self {
        self.keyframe = keyframe;
        self
    }
}
