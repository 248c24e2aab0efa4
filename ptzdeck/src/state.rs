use crate::protocol::{inquiry::InquiryBlock, CameraProperties, PanTiltPosition};

bitflags! {
    /// Which parts of a [CameraState] changed in an update.
    #[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
    pub struct PropertyUpdate: u32 {
        const LENS         = 1;
        const CONTROL      = 1 << 1;
        const OTHER        = 1 << 2;
        const ENLARGEMENT_1 = 1 << 3;
        const ENLARGEMENT_2 = 1 << 4;
        const ENLARGEMENT_3 = 1 << 5;
        const PAN_TILT     = 1 << 6;
        /// [CameraState::connected] changed.
        const CONNECTIVITY = 1 << 7;

        const ALL_BLOCKS = Self::LENS.bits()
            | Self::CONTROL.bits()
            | Self::OTHER.bits()
            | Self::ENLARGEMENT_1.bits()
            | Self::ENLARGEMENT_2.bits()
            | Self::ENLARGEMENT_3.bits();
    }
}

impl From<InquiryBlock> for PropertyUpdate {
    fn from(block: InquiryBlock) -> Self {
        match block {
            InquiryBlock::Lens => Self::LENS,
            InquiryBlock::Control => Self::CONTROL,
            InquiryBlock::Other => Self::OTHER,
            InquiryBlock::Enlargement1 => Self::ENLARGEMENT_1,
            InquiryBlock::Enlargement2 => Self::ENLARGEMENT_2,
            InquiryBlock::Enlargement3 => Self::ENLARGEMENT_3,
        }
    }
}

/// Everything known about a camera, as published to the UI.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CameraState {
    /// The camera answered its most recent command or inquiry.
    pub connected: bool,
    pub properties: CameraProperties,
}

impl CameraState {
    /// Decodes block inquiry replies into [CameraState::properties].
    ///
    /// Missing or short replies leave their fields alone.
    pub fn update_blocks<'a>(
        &mut self,
        replies: impl IntoIterator<Item = (InquiryBlock, Option<&'a [u8]>)>,
    ) -> PropertyUpdate {
        let mut updated = PropertyUpdate::empty();
        for (block, reply) in replies {
            if self.properties.decode_block(block, reply) {
                updated |= block.into();
            }
        }
        updated
    }

    /// Decodes a pan-tilt position reply.
    pub fn update_pan_tilt(&mut self, reply: Option<&[u8]>) -> PropertyUpdate {
        if self.properties.decode_pan_tilt(reply) {
            PropertyUpdate::PAN_TILT
        } else {
            PropertyUpdate::empty()
        }
    }

    pub fn set_connected(&mut self, connected: bool) -> PropertyUpdate {
        if self.connected == connected {
            return PropertyUpdate::empty();
        }
        self.connected = connected;
        PropertyUpdate::CONNECTIVITY
    }

    pub fn pan_tilt(&self) -> Option<PanTiltPosition> {
        self.properties.pan_tilt
    }
}
