//! Human-readable names for camera setting codes.

/// Video format code used by [CameraCommand::VideoFormat][crate::command::CameraCommand::VideoFormat].
pub const fn video_format_name(code: u8) -> Option<&'static str> {
    Some(match code {
        0x0 => "1080p59",
        0x1 => "1080p29",
        0x2 => "1080i59",
        0x3 => "720p59",
        0x4 => "720p29",
        0x8 => "1080p50",
        0xa => "1080p25",
        0xb => "1080i50",
        0xc => "720p50",
        0xd => "720p25",
        _ => return None,
    })
}

/// Colour system code used by [CameraCommand::ColorSystem][crate::command::CameraCommand::ColorSystem].
pub const fn color_system_name(code: u8) -> Option<&'static str> {
    Some(match code {
        0 => "HDMI-YUV",
        1 => "HDMI-GBR",
        2 => "DVI-GBR",
        3 => "DVI-YUV",
        _ => return None,
    })
}

/// Iris position as an F-number.
pub const fn iris_name(position: u8) -> Option<&'static str> {
    Some(match position {
        0x11 => "F1.8",
        0x10 => "F2.0",
        0x0f => "F2.4",
        0x0e => "F2.8",
        0x0d => "F3.4",
        0x0c => "F4",
        0x0b => "F4.8",
        0x0a => "F5.6",
        0x09 => "F6.8",
        0x08 => "F8",
        0x07 => "F9.6",
        0x06 => "F11",
        0x05 => "F14",
        0x00 => "CLOSE",
        _ => return None,
    })
}

const SHUTTER_SPEEDS: [&str; 28] = [
    "1/1", "2/3", "1/2", "1/3", "1/4", "1/6", "1/8", "1/10", "1/15", "1/20", "1/30", "1/50",
    "1/60", "1/90", "1/100", "1/125", "1/180", "1/250", "1/350", "1/500", "1/725", "1/1000",
    "1/1500", "1/2000", "1/3000", "1/4000", "1/6000", "1/10000",
];

/// Shutter position as an exposure time. Positions start at `6` (1 second).
pub fn shutter_name(position: u8) -> Option<&'static str> {
    SHUTTER_SPEEDS
        .get(usize::from(position).checked_sub(6)?)
        .copied()
}

/// Finds the code for a video format name, eg: `1080p50`.
pub fn video_format_by_name(name: &str) -> Option<u8> {
    (0..=0xf).find(|&c| video_format_name(c).is_some_and(|n| n.eq_ignore_ascii_case(name)))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tables() {
        assert_eq!(Some("720p25"), video_format_name(0xd));
        assert_eq!(None, video_format_name(5));
        assert_eq!(Some(0x8), video_format_by_name("1080P50"));
        assert_eq!(None, video_format_by_name("4k"));
        assert_eq!(Some("DVI-YUV"), color_system_name(3));
        assert_eq!(Some("CLOSE"), iris_name(0));
        assert_eq!(None, iris_name(1));
        assert_eq!(Some("1/1"), shutter_name(6));
        assert_eq!(Some("1/60"), shutter_name(0x12));
        assert_eq!(Some("1/10000"), shutter_name(0x21));
        assert_eq!(None, shutter_name(5));
        assert_eq!(None, shutter_name(0x22));
    }
}
