mod error;
mod video;

pub use error::VideoError;
pub use video::{VideoReader, VideoWriter};
