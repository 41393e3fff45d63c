pub const ACK: u8 = 0x42;
pub const DEVICE_ERROR: u8 = 0x23;

pub const CMD_DOWNLOAD: u8 = b'g';
pub const CMD_UPLOAD: u8 = b's';
pub const CMD_CLEAR: u8 = b'd';

pub const FINISH_MARKER: [u8; 4] = [ACK; 4];

pub const COUNT_LEN: usize = 1;
pub const DURATION_LEN: usize = 1;
pub const FRAME_PIXELS: usize = 64;

pub const MAX_COUNT: usize = u8::MAX as usize;
