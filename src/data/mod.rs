pub mod images;
pub mod noisy_pairs;

pub use images::{decode_image, image_to_array, load_images};
pub use noisy_pairs::NoisyPairs;
