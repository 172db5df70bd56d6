//! Load-time error type.

use core::fmt;

/// Error aborting [`Player::load`](crate::Player::load).
///
/// Out-of-range values that can be clamped (finetune, volume, periods,
/// effect parameters) are reported through the observability callbacks
/// instead and playback continues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadError {
    /// The blob is shorter than the fixed MOD header.
    UnexpectedEof,
    /// The format tag is not a supported 4-channel variant.
    UnsupportedFormat { tag: [u8; 4] },
    /// The blob cannot be addressed by this target's pointer width.
    SongTooBig,
    /// A sample's loop points lie outside the song data.
    SampleBoundaries { sample: u8 },
    /// A sample loop is shorter than the minimum serviceable length.
    LoopLength { sample: u8, length: u16, min: u16 },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::UnexpectedEof => write!(f, "song data truncated"),
            LoadError::UnsupportedFormat { tag } => {
                write!(
                    f,
                    "unsupported format tag {:02X} {:02X} {:02X} {:02X}",
                    tag[0], tag[1], tag[2], tag[3]
                )
            }
            LoadError::SongTooBig => write!(f, "song too big for this target"),
            LoadError::SampleBoundaries { sample } => {
                write!(f, "sample {} loop points outside song data", sample)
            }
            LoadError::LoopLength {
                sample,
                length,
                min,
            } => write!(
                f,
                "sample {} loop length {} below minimum {}",
                sample, length, min
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LoadError {}
