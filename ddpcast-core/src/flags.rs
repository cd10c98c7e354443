use bitflags::bitflags;

bitflags! {
    /// Bits of the first DDP header byte.
    ///
    /// The top two bits carry the protocol version; only version 1
    /// (`VER1`) is emitted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DdpFlags: u8 {
        const VER1 = 0x40;
        const TIMECODE = 0x10;
        const STORAGE = 0x08;
        const REPLY = 0x04;
        const QUERY = 0x02;
        const PUSH = 0x01;
    }
}

/// Mask selecting the version bits of the flags byte.
pub const VERSION_MASK: u8 = 0xC0;

impl DdpFlags {
    /// Flags for a data packet; `push` marks the last packet of a frame.
    pub fn data(push: bool) -> Self {
        if push {
            DdpFlags::VER1 | DdpFlags::PUSH
        } else {
            DdpFlags::VER1
        }
    }

    /// Protocol version encoded in the flags byte (1 for DDP v1).
    pub fn version(self) -> u8 {
        (self.bits() & VERSION_MASK) >> 6
    }

    pub fn is_push(self) -> bool {
        self.contains(DdpFlags::PUSH)
    }
}
