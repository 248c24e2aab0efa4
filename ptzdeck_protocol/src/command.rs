//! # VISCA commands
//!
//! Each [CameraCommand] maps onto a fixed byte template, with parameter
//! nibbles patched in. Multi-nibble values are spread one nibble per byte
//! (see [crate::util]).
//!
//! Parameters are **masked, not validated**: a value wider than its slot has
//! its excess bits dropped, matching what the camera firmware tolerates. For
//! example, [`CameraCommand::ZoomTeleVariable(9)`][CameraCommand::ZoomTeleVariable]
//! is sent as speed `1`.
//!
//! ## Message format
//!
//! * `0x81`: address of camera 1
//! * `0x01`: command
//! * category: `0x04` camera, `0x06` pan-tilt, `0x7e` extended
//! * command bytes and parameters
//! * `0xff`: terminator
use crate::util::{split_nibbles_u16, split_nibbles_u8};
#[cfg(feature = "clap")]
use clap::ValueEnum;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub(crate) const TERMINATOR: u8 = 0xff;

const CAMERA: [u8; 3] = [0x81, 0x01, 0x04];
const PAN_TILT: [u8; 3] = [0x81, 0x01, 0x06];
const EXTENDED: [u8; 3] = [0x81, 0x01, 0x7e];

/// Step adjustment for a camera parameter.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "clap", derive(ValueEnum))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum Adjust {
    Reset = 0x00,
    Up = 0x02,
    Down = 0x03,
}

/// Pan-tilt drive direction, sent as a pair of `(pan, tilt)` bytes.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "clap", derive(ValueEnum))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PanTiltDirection {
    Up,
    Down,
    Left,
    Right,
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
    Stop,
}

impl PanTiltDirection {
    const fn bytes(&self) -> [u8; 2] {
        match self {
            Self::Up => [0x03, 0x01],
            Self::Down => [0x03, 0x02],
            Self::Left => [0x01, 0x03],
            Self::Right => [0x02, 0x03],
            Self::UpLeft => [0x01, 0x01],
            Self::UpRight => [0x02, 0x01],
            Self::DownLeft => [0x01, 0x02],
            Self::DownRight => [0x02, 0x02],
            Self::Stop => [0x03, 0x03],
        }
    }

    /// Picks the direction for signed pan and tilt velocities. Positive pan
    /// is right, positive tilt is up.
    pub const fn from_velocity(pan: i32, tilt: i32) -> Self {
        match (pan.signum(), tilt.signum()) {
            (0, 0) => Self::Stop,
            (-1, 0) => Self::Left,
            (1, 0) => Self::Right,
            (0, 1) => Self::Up,
            (0, -1) => Self::Down,
            (-1, 1) => Self::UpLeft,
            (1, 1) => Self::UpRight,
            (-1, -1) => Self::DownLeft,
            _ => Self::DownRight,
        }
    }
}

#[derive(Debug, FromPrimitive, ToPrimitive, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "clap", derive(ValueEnum))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum WhiteBalanceMode {
    Auto = 0x00,
    Indoor = 0x01,
    Outdoor = 0x02,
    OnePush = 0x03,
    Atw = 0x04,
    Manual = 0x05,
}

#[derive(Debug, FromPrimitive, ToPrimitive, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "clap", derive(ValueEnum))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum ExposureMode {
    FullAuto = 0x00,
    Manual = 0x03,
    ShutterPriority = 0x0a,
    IrisPriority = 0x0b,
    Bright = 0x0d,
}

#[derive(Debug, FromPrimitive, ToPrimitive, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "clap", derive(ValueEnum))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum AutoFocusMode {
    Normal = 0x00,
    Interval = 0x01,
    ZoomTrigger = 0x02,
}

#[derive(Debug, FromPrimitive, ToPrimitive, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "clap", derive(ValueEnum))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum PictureEffect {
    Off = 0x00,
    Negative = 0x02,
    BlackAndWhite = 0x04,
}

#[derive(Debug, FromPrimitive, ToPrimitive, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "clap", derive(ValueEnum))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum WideDynamicRange {
    Off = 0x00,
    Low = 0x01,
    Medium = 0x02,
    High = 0x03,
}

/// Corner of the pan-tilt movement limit.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum LimitCorner {
    DownLeft = 0x00,
    UpRight = 0x01,
}

/// A VISCA camera command.
#[derive(Debug, PartialEq, Eq, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CameraCommand {
    PowerOn,
    PowerOff,

    ZoomStop,
    ZoomTele,
    ZoomWide,
    /// Zoom in at speed `0..=7`.
    ZoomTeleVariable(u8),
    /// Zoom out at speed `0..=7`.
    ZoomWideVariable(u8),
    /// Zoom to a position: `0..0x4000` optical, `0x4000..=0x7ac0` digital.
    ZoomDirect(u16),
    DigitalZoom(bool),

    FocusStop,
    FocusFar,
    FocusNear,
    /// Focus far at speed `0..=7`.
    FocusFarVariable(u8),
    /// Focus near at speed `0..=7`.
    FocusNearVariable(u8),
    FocusDirect(u16),
    FocusAuto,
    FocusManual,
    FocusAutoManualToggle,
    FocusOnePush,
    FocusInfinity,
    FocusNearLimit(u16),
    AutoFocusSensitivityLow(bool),
    AutoFocusMode(AutoFocusMode),
    AutoFocusIntervalTime {
        speed: u8,
        time: u8,
    },
    /// `true` selects IR light correction, `false` standard.
    IrCorrection(bool),
    ZoomFocusDirect {
        zoom: u16,
        focus: u16,
    },

    WhiteBalance(WhiteBalanceMode),
    WhiteBalanceOnePushTrigger,
    RedGain(Adjust),
    RedGainDirect(u8),
    BlueGain(Adjust),
    BlueGainDirect(u8),

    Exposure(ExposureMode),
    SlowShutterAuto(bool),
    Shutter(Adjust),
    ShutterDirect(u8),
    Iris(Adjust),
    IrisDirect(u8),
    Gain(Adjust),
    GainDirect(u8),
    /// Auto-exposure gain limit, `4..=0xf`.
    GainLimit(u8),
    Bright(Adjust),
    BrightDirect(u8),
    ExposureCompensation(bool),
    ExposureCompensationAdjust(Adjust),
    ExposureCompensationDirect(u8),
    BacklightCompensation(bool),
    WideDynamicRange(WideDynamicRange),
    Defog(bool),

    Aperture(Adjust),
    ApertureDirect(u8),
    HighResolution(bool),
    /// Noise reduction level, `0` is off.
    NoiseReduction(u8),
    /// Gamma level, `0` is standard.
    Gamma(u8),
    HighSensitivity(bool),
    PictureEffect(PictureEffect),

    MemoryReset(u8),
    MemorySet(u8),
    MemoryRecall(u8),
    IdWrite(u16),
    ChromaSuppress(u8),
    ColorGain {
        channel: u8,
        gain: u8,
    },
    ColorHue {
        channel: u8,
        phase: u8,
    },
    LowLatency(bool),
    MenuOff,
    /// See [crate::lookup::video_format_name].
    VideoFormat(u8),
    /// See [crate::lookup::color_system_name].
    ColorSystem(u8),
    IrReceive(bool),
    IrReceiveToggle,
    IrReceiveReturn(bool),
    InformationDisplay(bool),

    /// Continuous pan-tilt movement. Pan speed is `1..=0x18`, tilt speed is
    /// `1..=0x17`.
    PanTiltDrive {
        direction: PanTiltDirection,
        pan_speed: u8,
        tilt_speed: u8,
    },
    PanTiltAbsolute {
        pan: u16,
        tilt: u16,
        pan_speed: u8,
        tilt_speed: u8,
    },
    PanTiltRelative {
        pan: u16,
        tilt: u16,
        pan_speed: u8,
        tilt_speed: u8,
    },
    PanTiltHome,
    PanTiltReset,
    PanTiltLimitSet {
        corner: LimitCorner,
        pan: u16,
        tilt: u16,
    },
    PanTiltLimitClear {
        corner: LimitCorner,
        pan: u16,
        tilt: u16,
    },
}

/// `prefix`, `args`, terminator.
fn message(prefix: [u8; 3], args: &[u8]) -> Vec<u8> {
    let mut o = Vec::with_capacity(prefix.len() + args.len() + 1);
    o.extend_from_slice(&prefix);
    o.extend_from_slice(args);
    o.push(TERMINATOR);
    o
}

const fn on_off(on: bool) -> u8 {
    if on {
        0x02
    } else {
        0x03
    }
}

/// `81 01 04 cc 0p 0p 0p 0p FF`
fn camera_u16(cmd: u8, value: u16) -> Vec<u8> {
    let [a, b, c, d] = split_nibbles_u16(value);
    message(CAMERA, &[cmd, a, b, c, d])
}

/// `81 01 04 cc 00 00 0p 0p FF`
fn camera_u8(cmd: u8, value: u8) -> Vec<u8> {
    let [a, b] = split_nibbles_u8(value);
    message(CAMERA, &[cmd, 0x00, 0x00, a, b])
}

/// `81 01 06 cc VV WW 0p 0p 0p 0p 0t 0t 0t 0t FF`
fn pan_tilt_position(cmd: u8, pan: u16, tilt: u16, pan_speed: u8, tilt_speed: u8) -> Vec<u8> {
    let mut args = vec![cmd, pan_speed & 0x1f, tilt_speed & 0x1f];
    args.extend_from_slice(&split_nibbles_u16(pan));
    args.extend_from_slice(&split_nibbles_u16(tilt));
    message(PAN_TILT, &args)
}

/// `81 01 06 07 0x 0W 0p 0p 0p 0p 0t 0t 0t 0t FF`
fn pan_tilt_limit(clear: bool, corner: LimitCorner, pan: u16, tilt: u16) -> Vec<u8> {
    let mut args = vec![0x07, u8::from(clear), corner as u8];
    args.extend_from_slice(&split_nibbles_u16(pan));
    args.extend_from_slice(&split_nibbles_u16(tilt));
    message(PAN_TILT, &args)
}

impl CameraCommand {
    /// Encodes the command as a VISCA message.
    pub fn to_bytes(&self) -> Vec<u8> {
        use CameraCommand::*;
        match self {
            PowerOn => message(CAMERA, &[0x00, 0x02]),
            PowerOff => message(CAMERA, &[0x00, 0x03]),

            ZoomStop => message(CAMERA, &[0x07, 0x00]),
            ZoomTele => message(CAMERA, &[0x07, 0x02]),
            ZoomWide => message(CAMERA, &[0x07, 0x03]),
            ZoomTeleVariable(speed) => message(CAMERA, &[0x07, 0x20 | (speed & 0x07)]),
            ZoomWideVariable(speed) => message(CAMERA, &[0x07, 0x30 | (speed & 0x07)]),
            ZoomDirect(pos) => camera_u16(0x47, *pos),
            DigitalZoom(on) => message(CAMERA, &[0x06, on_off(*on)]),

            FocusStop => message(CAMERA, &[0x08, 0x00]),
            FocusFar => message(CAMERA, &[0x08, 0x02]),
            FocusNear => message(CAMERA, &[0x08, 0x03]),
            FocusFarVariable(speed) => message(CAMERA, &[0x08, 0x20 | (speed & 0x07)]),
            FocusNearVariable(speed) => message(CAMERA, &[0x08, 0x30 | (speed & 0x07)]),
            FocusDirect(pos) => camera_u16(0x48, *pos),
            FocusAuto => message(CAMERA, &[0x38, 0x02]),
            FocusManual => message(CAMERA, &[0x38, 0x03]),
            FocusAutoManualToggle => message(CAMERA, &[0x38, 0x10]),
            FocusOnePush => message(CAMERA, &[0x18, 0x01]),
            FocusInfinity => message(CAMERA, &[0x18, 0x02]),
            FocusNearLimit(pos) => camera_u16(0x28, *pos),
            AutoFocusSensitivityLow(low) => message(CAMERA, &[0x58, on_off(!*low)]),
            AutoFocusMode(mode) => message(CAMERA, &[0x57, *mode as u8]),
            AutoFocusIntervalTime { speed, time } => {
                let [s1, s2] = split_nibbles_u8(*speed);
                let [t1, t2] = split_nibbles_u8(*time);
                message(CAMERA, &[0x27, s1, s2, t1, t2])
            }
            IrCorrection(ir_light) => message(CAMERA, &[0x11, u8::from(*ir_light)]),
            ZoomFocusDirect { zoom, focus } => {
                let mut args = vec![0x47];
                args.extend_from_slice(&split_nibbles_u16(*zoom));
                args.extend_from_slice(&split_nibbles_u16(*focus));
                message(CAMERA, &args)
            }

            WhiteBalance(mode) => message(CAMERA, &[0x35, *mode as u8]),
            WhiteBalanceOnePushTrigger => message(CAMERA, &[0x10, 0x05]),
            RedGain(adj) => message(CAMERA, &[0x03, *adj as u8]),
            RedGainDirect(gain) => camera_u8(0x43, *gain),
            BlueGain(adj) => message(CAMERA, &[0x04, *adj as u8]),
            BlueGainDirect(gain) => camera_u8(0x44, *gain),

            Exposure(mode) => message(CAMERA, &[0x39, *mode as u8]),
            SlowShutterAuto(auto) => message(CAMERA, &[0x5a, on_off(*auto)]),
            Shutter(adj) => message(CAMERA, &[0x0a, *adj as u8]),
            ShutterDirect(pos) => camera_u8(0x4a, *pos),
            Iris(adj) => message(CAMERA, &[0x0b, *adj as u8]),
            IrisDirect(pos) => camera_u8(0x4b, *pos),
            Gain(adj) => message(CAMERA, &[0x0c, *adj as u8]),
            GainDirect(pos) => camera_u8(0x4c, *pos),
            GainLimit(gain) => message(CAMERA, &[0x2c, gain & 0x0f]),
            Bright(adj) => message(CAMERA, &[0x0d, *adj as u8]),
            BrightDirect(pos) => camera_u8(0x4d, *pos),
            ExposureCompensation(on) => message(CAMERA, &[0x3e, on_off(*on)]),
            ExposureCompensationAdjust(adj) => message(CAMERA, &[0x0e, *adj as u8]),
            ExposureCompensationDirect(pos) => camera_u8(0x4e, *pos),
            BacklightCompensation(on) => message(CAMERA, &[0x33, on_off(*on)]),
            WideDynamicRange(level) => message(EXTENDED, &[0x04, 0x00, *level as u8]),
            Defog(on) => message(CAMERA, &[0x37, on_off(*on), 0x00]),

            Aperture(adj) => message(CAMERA, &[0x02, *adj as u8]),
            ApertureDirect(gain) => camera_u8(0x42, *gain),
            HighResolution(on) => message(CAMERA, &[0x52, on_off(*on)]),
            NoiseReduction(level) => message(CAMERA, &[0x53, level & 0x07]),
            Gamma(level) => message(CAMERA, &[0x5b, level & 0x07]),
            HighSensitivity(on) => message(CAMERA, &[0x5e, on_off(*on)]),
            PictureEffect(effect) => message(CAMERA, &[0x63, *effect as u8]),

            MemoryReset(preset) => message(CAMERA, &[0x3f, 0x00, *preset]),
            MemorySet(preset) => message(CAMERA, &[0x3f, 0x01, *preset]),
            MemoryRecall(preset) => message(CAMERA, &[0x3f, 0x02, *preset]),
            IdWrite(id) => camera_u16(0x22, *id),
            ChromaSuppress(level) => message(CAMERA, &[0x5f, *level]),
            ColorGain { channel, gain } => {
                message(CAMERA, &[0x49, 0x00, 0x00, channel & 0x07, gain & 0x0f])
            }
            ColorHue { channel, phase } => {
                message(CAMERA, &[0x4f, 0x00, 0x00, channel & 0x07, phase & 0x0f])
            }
            LowLatency(low) => message(EXTENDED, &[0x01, 0x5a, on_off(*low)]),
            MenuOff => message(PAN_TILT, &[0x06, 0x03]),
            VideoFormat(format) => {
                let [a, b] = split_nibbles_u8(*format);
                message(EXTENDED, &[0x01, 0x1e, a, b])
            }
            ColorSystem(system) => message(EXTENDED, &[0x01, 0x03, 0x00, system & 0x03]),
            IrReceive(on) => message(PAN_TILT, &[0x08, on_off(*on)]),
            IrReceiveToggle => message(PAN_TILT, &[0x08, 0x10]),
            IrReceiveReturn(on) => message(
                [0x81, 0x01, 0x7d],
                &[0x01, if *on { 0x03 } else { 0x13 }, 0x00, 0x00],
            ),
            InformationDisplay(on) => message(EXTENDED, &[0x01, 0x18, on_off(*on)]),

            PanTiltDrive {
                direction,
                pan_speed,
                tilt_speed,
            } => {
                let [p, t] = direction.bytes();
                message(PAN_TILT, &[0x01, pan_speed & 0x1f, tilt_speed & 0x1f, p, t])
            }
            PanTiltAbsolute {
                pan,
                tilt,
                pan_speed,
                tilt_speed,
            } => pan_tilt_position(0x02, *pan, *tilt, *pan_speed, *tilt_speed),
            PanTiltRelative {
                pan,
                tilt,
                pan_speed,
                tilt_speed,
            } => pan_tilt_position(0x03, *pan, *tilt, *pan_speed, *tilt_speed),
            PanTiltHome => message(PAN_TILT, &[0x04]),
            PanTiltReset => message(PAN_TILT, &[0x05]),
            PanTiltLimitSet { corner, pan, tilt } => pan_tilt_limit(false, *corner, *pan, *tilt),
            PanTiltLimitClear { corner, pan, tilt } => pan_tilt_limit(true, *corner, *pan, *tilt),
        }
    }

    /// Stops pan-tilt movement.
    pub const fn pan_tilt_stop() -> Self {
        Self::PanTiltDrive {
            direction: PanTiltDirection::Stop,
            pan_speed: 1,
            tilt_speed: 1,
        }
    }
}
