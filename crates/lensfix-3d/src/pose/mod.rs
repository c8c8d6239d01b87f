mod homography;
pub use homography::{homography_dlt, HomographyError};
