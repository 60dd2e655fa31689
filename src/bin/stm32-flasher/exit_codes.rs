use stm32_flasher::api::FlashErrorKind;

pub const EXIT_OK: i32 = 0;
pub const EXIT_CONFIG: i32 = 10;
pub const EXIT_UNKNOWN_DEVICE: i32 = 11;
pub const EXIT_ALIGNMENT: i32 = 12;
pub const EXIT_PARSER: i32 = 13;
pub const EXIT_TRANSPORT: i32 = 14;
pub const EXIT_PROTOCOL: i32 = 15;
pub const EXIT_VERIFY: i32 = 16;
pub const EXIT_CANCELLED: i32 = 17;

pub fn for_kind(kind: FlashErrorKind) -> i32 {
    match kind {
        FlashErrorKind::Configuration => EXIT_CONFIG,
        FlashErrorKind::Alignment => EXIT_ALIGNMENT,
        FlashErrorKind::Parser => EXIT_PARSER,
        FlashErrorKind::Transport => EXIT_TRANSPORT,
        FlashErrorKind::Protocol => EXIT_PROTOCOL,
        FlashErrorKind::VerifyMismatch => EXIT_VERIFY,
        FlashErrorKind::Cancelled => EXIT_CANCELLED,
    }
}
