//! # VISCA inquiries and block reply decoding
//!
//! An [Inquiry] is a read-only request; the camera answers it with a single
//! completion-class reply carrying the value, and no separate completion.
//!
//! The six [InquiryBlock]s return many bit-packed fields at once, which
//! [CameraProperties::decode_block] spreads into a flat record. Offsets are
//! counted from the start of the VISCA payload, after the 8-byte frame header
//! has been stripped.
use crate::{
    command::{AutoFocusMode, ExposureMode, PictureEffect, WhiteBalanceMode},
    lookup,
    packet::ViscaPacket,
    util::join_nibbles,
};
#[cfg(feature = "clap")]
use clap::ValueEnum;
use modular_bitfield::{
    bitfield,
    specifiers::{B2, B3, B4},
};
use num_traits::FromPrimitive;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Single-value inquiries.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Inquiry {
    Power,
    ZoomPosition,
    DigitalZoomMode,
    FocusMode,
    FocusPosition,
    FocusNearLimit,
    AutoFocusSensitivity,
    AutoFocusMode,
    AutoFocusInterval,
    IrCorrection,
    WhiteBalanceMode,
    RedGain,
    BlueGain,
    ExposureMode,
    SlowShutterMode,
    ShutterPosition,
    IrisPosition,
    GainPosition,
    GainLimit,
    BrightPosition,
    ExposureCompensationMode,
    ExposureCompensationPosition,
    BacklightMode,
    WideDynamicRangeMode,
    Defog,
    Aperture,
    HighResolutionMode,
    NoiseReduction,
    Gamma,
    HighSensitivity,
    PictureEffectMode,
    CameraId,
    Version,
    ChromaSuppress,
    ColorGain,
    ColorHue,
    LowLatency,
    MenuMode,
    InformationDisplay,
    VideoFormat,
    ColorSystem,
    IrReceive,
    IrCondition,
    PanTiltMaxSpeed,
    PanTiltPosition,
    PanTiltMode,
    Block(InquiryBlock),
}

impl Inquiry {
    /// Encodes the inquiry as a VISCA message.
    pub fn to_bytes(&self) -> Vec<u8> {
        use Inquiry::*;
        let body: &[u8] = match self {
            Power => &[0x04, 0x00],
            // The camera reports digital zoom mode through the zoom position.
            ZoomPosition | DigitalZoomMode => &[0x04, 0x47],
            FocusMode => &[0x04, 0x38],
            FocusPosition => &[0x04, 0x48],
            FocusNearLimit => &[0x04, 0x28],
            AutoFocusSensitivity => &[0x04, 0x58],
            AutoFocusMode => &[0x04, 0x57],
            AutoFocusInterval => &[0x04, 0x27],
            IrCorrection => &[0x04, 0x11],
            WhiteBalanceMode => &[0x04, 0x35],
            RedGain => &[0x04, 0x43],
            BlueGain => &[0x04, 0x44],
            ExposureMode => &[0x04, 0x39],
            SlowShutterMode => &[0x04, 0x5a],
            ShutterPosition => &[0x04, 0x4a],
            IrisPosition => &[0x04, 0x4b],
            GainPosition => &[0x04, 0x4c],
            GainLimit => &[0x04, 0x2c],
            BrightPosition => &[0x04, 0x4d],
            ExposureCompensationMode => &[0x04, 0x3e],
            ExposureCompensationPosition => &[0x04, 0x4e],
            BacklightMode => &[0x04, 0x33],
            WideDynamicRangeMode => &[0x7e, 0x04, 0x00],
            Defog => &[0x04, 0x37],
            Aperture => &[0x04, 0x42],
            HighResolutionMode => &[0x04, 0x52],
            NoiseReduction => &[0x04, 0x53],
            Gamma => &[0x04, 0x5b],
            HighSensitivity => &[0x04, 0x5e],
            PictureEffectMode => &[0x04, 0x63],
            CameraId => &[0x04, 0x22],
            Version => &[0x00, 0x02],
            ChromaSuppress => &[0x04, 0x5f],
            ColorGain => &[0x04, 0x49],
            ColorHue => &[0x04, 0x4f],
            LowLatency => &[0x7e, 0x01, 0x5a],
            MenuMode => &[0x06, 0x06],
            InformationDisplay => &[0x7e, 0x01, 0x18],
            VideoFormat => &[0x06, 0x23],
            ColorSystem => &[0x7e, 0x01, 0x03],
            IrReceive => &[0x06, 0x08],
            IrCondition => &[0x06, 0x34],
            PanTiltMaxSpeed => &[0x06, 0x11],
            PanTiltPosition => &[0x06, 0x12],
            PanTiltMode => &[0x06, 0x10],
            Block(block) => return block.to_bytes(),
        };

        let mut o = Vec::with_capacity(body.len() + 3);
        o.extend_from_slice(&[0x81, 0x09]);
        o.extend_from_slice(body);
        o.push(crate::command::TERMINATOR);
        o
    }
}

/// Block inquiries, each returning a group of bit-packed fields.
#[derive(Debug, FromPrimitive, PartialEq, Eq, Clone, Copy, Hash)]
#[cfg_attr(feature = "clap", derive(ValueEnum))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum InquiryBlock {
    Lens = 0x00,
    Control = 0x01,
    Other = 0x02,
    Enlargement1 = 0x03,
    Enlargement2 = 0x04,
    Enlargement3 = 0x05,
}

impl InquiryBlock {
    pub const ALL: [Self; 6] = [
        Self::Lens,
        Self::Control,
        Self::Other,
        Self::Enlargement1,
        Self::Enlargement2,
        Self::Enlargement3,
    ];

    /// `81 09 7E 7E 0n FF`
    pub fn to_bytes(&self) -> Vec<u8> {
        vec![0x81, 0x09, 0x7e, 0x7e, *self as u8, crate::command::TERMINATOR]
    }

    /// Minimum raw reply length (frame header and terminator included)
    /// needed to decode every field of this block.
    ///
    /// A bare completion (`90 50 FF`) is always shorter than this.
    pub const fn min_reply_length(&self) -> usize {
        ViscaPacket::HEADERS_LENGTH
            + match self {
                Self::Lens => 15,
                Self::Control => 14,
                Self::Other => 13,
                Self::Enlargement1 => 15,
                Self::Enlargement2 => 8,
                Self::Enlargement3 => 3,
            }
            + 1
    }
}

/// Lens block byte 13.
#[bitfield(bits = 8)]
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct LensModes {
    auto_focus: bool,
    digital_zoom: bool,
    auto_focus_sensitivity: bool,
    auto_focus_mode: B2,
    #[skip]
    __: B3,
}

/// Lens block byte 14.
#[bitfield(bits = 8)]
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct LensActivity {
    zoom_command: bool,
    focus_command: bool,
    memory_recall: bool,
    low_contrast_detection: bool,
    #[skip]
    __: B4,
}

/// Control block byte 9.
#[bitfield(bits = 8)]
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct ExposureFlags {
    auto_slow_shutter: bool,
    exposure_compensation: bool,
    backlight_compensation: bool,
    #[skip]
    __: bool,
    wide_dynamic_range: bool,
    high_resolution: bool,
    #[skip]
    __: B2,
}

/// Enlargement 1 block byte 13.
#[bitfield(bits = 8)]
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PictureFlags {
    noise_reduction: B3,
    high_sensitivity: bool,
    gamma: B3,
    #[skip]
    __: bool,
}

/// Decodes a raw [Inquiry::VideoFormat] reply (frame header included) into
/// a format code for [lookup::video_format_name].
///
/// The code follows `90 50` as two nibbles.
pub fn decode_video_format(raw: &[u8]) -> Option<u8> {
    let start = ViscaPacket::HEADERS_LENGTH + 2;
    raw.get(start..start + 2).map(|b| join_nibbles(b) as u8)
}

/// Pan-tilt position, as reported by [Inquiry::PanTiltPosition].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PanTiltPosition {
    pub pan: u16,
    pub tilt: u16,
}

impl PanTiltPosition {
    const MIN_REPLY_LENGTH: usize = ViscaPacket::HEADERS_LENGTH + 11;

    /// Decodes a raw pan-tilt position reply (frame header included).
    ///
    /// Returns `None` if the reply is too short.
    pub fn decode(raw: &[u8]) -> Option<Self> {
        if raw.len() < Self::MIN_REPLY_LENGTH {
            return None;
        }
        Some(Self {
            pan: join_nibbles(&raw[10..14]),
            tilt: join_nibbles(&raw[14..18]),
        })
    }
}

/// Decoded camera state, filled in block by block.
///
/// Fields not covered by a decoded block are left as they were, so partial
/// refreshes are safe.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CameraProperties {
    /// From the most recently decoded block.
    pub destination_address: u8,
    pub source_address: u8,
    pub completion: bool,

    // Lens
    pub zoom: u16,
    pub focus_near_limit: u8,
    pub focus: u16,
    pub auto_focus: bool,
    pub digital_zoom: bool,
    pub auto_focus_sensitivity: bool,
    pub auto_focus_mode: u8,
    pub low_contrast_detection: bool,
    /// The camera is executing a memory recall.
    pub memory_recall: bool,
    pub focus_command: bool,
    pub zoom_command: bool,

    // Control
    pub red_gain: u8,
    pub blue_gain: u8,
    pub white_balance_mode: u8,
    pub aperture_gain: u8,
    pub exposure_mode: u8,
    pub high_resolution: bool,
    pub wide_dynamic_range: bool,
    pub auto_slow_shutter: bool,
    pub exposure_compensation_on: bool,
    pub backlight_compensation: bool,
    pub shutter: u8,
    pub iris: u8,
    pub gain: u8,
    pub exposure_compensation: u8,

    // Other
    pub power: bool,
    pub picture_effect: u8,
    pub camera_id: u16,
    pub drop_frame: bool,

    // Enlargement 1
    pub digital_zoom_position: u8,
    pub auto_focus_activation_time: u8,
    pub auto_focus_interval_time: u8,
    pub color_gain: u8,
    pub gamma: u8,
    pub high_sensitivity: bool,
    pub noise_reduction: u8,
    pub gain_limit: u8,
    pub chroma_suppress: u8,

    // Enlargement 2
    pub defog: bool,

    // Enlargement 3
    pub color_hue: u8,

    pub pan_tilt: Option<PanTiltPosition>,
}

impl CameraProperties {
    /// Decodes a raw `block` reply (frame header included) into `self`.
    ///
    /// A missing or short reply is logged and leaves `self` untouched.
    /// Returns `true` if the reply was decoded.
    pub fn decode_block(&mut self, block: InquiryBlock, reply: Option<&[u8]>) -> bool {
        let Some(raw) = reply else {
            warn!("{block:?} block inquiry got no reply");
            return false;
        };
        if raw.len() < block.min_reply_length() {
            warn!(
                "{block:?} block reply too short: {} < {} bytes",
                raw.len(),
                block.min_reply_length()
            );
            return false;
        }

        let r = &raw[ViscaPacket::HEADERS_LENGTH..];
        self.destination_address = (r[0] & 0xf0) >> 4;
        self.source_address = r[0] & 0x0f;
        self.completion = r[1] & 0x80 != 0;

        match block {
            InquiryBlock::Lens => self.decode_lens(r),
            InquiryBlock::Control => self.decode_control(r),
            InquiryBlock::Other => {
                self.power = r[2] & 0x01 != 0;
                self.picture_effect = r[5] & 0x0f;
                self.camera_id = join_nibbles(&r[8..12]);
                self.drop_frame = r[12] & 0x01 != 0;
            }
            InquiryBlock::Enlargement1 => self.decode_enlargement1(r),
            InquiryBlock::Enlargement2 => {
                self.defog = r[7] & 0x01 != 0;
            }
            InquiryBlock::Enlargement3 => {
                self.color_hue = r[2] & 0x07;
            }
        }
        true
    }

    fn decode_lens(&mut self, r: &[u8]) {
        self.zoom = join_nibbles(&r[2..6]);
        self.focus_near_limit = join_nibbles(&r[6..8]) as u8;
        self.focus = join_nibbles(&r[8..12]);

        let modes = LensModes::from(r[13]);
        self.auto_focus = modes.auto_focus();
        self.digital_zoom = modes.digital_zoom();
        self.auto_focus_sensitivity = modes.auto_focus_sensitivity();
        self.auto_focus_mode = modes.auto_focus_mode();

        let activity = LensActivity::from(r[14]);
        self.low_contrast_detection = activity.low_contrast_detection();
        self.memory_recall = activity.memory_recall();
        self.focus_command = activity.focus_command();
        self.zoom_command = activity.zoom_command();
    }

    fn decode_control(&mut self, r: &[u8]) {
        self.red_gain = join_nibbles(&r[2..4]) as u8;
        self.blue_gain = join_nibbles(&r[4..6]) as u8;
        self.white_balance_mode = r[6] & 0x0f;
        self.aperture_gain = r[7] & 0x0f;
        self.exposure_mode = r[8] & 0x0f;

        let flags = ExposureFlags::from(r[9]);
        self.high_resolution = flags.high_resolution();
        self.wide_dynamic_range = flags.wide_dynamic_range();
        self.auto_slow_shutter = flags.auto_slow_shutter();
        self.exposure_compensation_on = flags.exposure_compensation();
        self.backlight_compensation = flags.backlight_compensation();

        self.shutter = r[10] & 0x3f;
        self.iris = r[11] & 0x1f;
        self.gain = r[12] & 0x1f;
        self.exposure_compensation = r[13] & 0x0f;
    }

    fn decode_enlargement1(&mut self, r: &[u8]) {
        self.digital_zoom_position = join_nibbles(&r[2..4]) as u8;
        self.auto_focus_activation_time = join_nibbles(&r[4..6]) as u8;
        self.auto_focus_interval_time = join_nibbles(&r[6..8]) as u8;
        self.color_gain = (r[11] & 0x78) >> 3;

        let flags = PictureFlags::from(r[13]);
        self.gamma = flags.gamma();
        self.high_sensitivity = flags.high_sensitivity();
        self.noise_reduction = flags.noise_reduction();

        self.gain_limit = r[14] & 0x0f;
        self.chroma_suppress = (r[14] & 0x70) >> 4;
    }

    /// Decodes a raw [Inquiry::PanTiltPosition] reply into `self`.
    ///
    /// A missing or short reply is logged and leaves `self` untouched.
    pub fn decode_pan_tilt(&mut self, reply: Option<&[u8]>) -> bool {
        match reply.and_then(PanTiltPosition::decode) {
            Some(pos) => {
                self.pan_tilt = Some(pos);
                true
            }
            None => {
                warn!("pan-tilt position reply missing or too short");
                false
            }
        }
    }

    pub fn white_balance(&self) -> Option<WhiteBalanceMode> {
        WhiteBalanceMode::from_u8(self.white_balance_mode)
    }

    pub fn exposure(&self) -> Option<ExposureMode> {
        ExposureMode::from_u8(self.exposure_mode)
    }

    pub fn auto_focus_trigger(&self) -> Option<AutoFocusMode> {
        AutoFocusMode::from_u8(self.auto_focus_mode)
    }

    pub fn effect(&self) -> Option<PictureEffect> {
        PictureEffect::from_u8(self.picture_effect)
    }

    /// Iris position as an F-number, eg: `F2.8`.
    pub fn iris_name(&self) -> Option<&'static str> {
        lookup::iris_name(self.iris)
    }

    /// Shutter position as an exposure time, eg: `1/60`.
    pub fn shutter_name(&self) -> Option<&'static str> {
        lookup::shutter_name(self.shutter)
    }
}
