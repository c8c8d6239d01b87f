mod gray;
pub use gray::{gray_from_rgb_u8, rgb_from_gray};
