mod alpha_mask;
mod rotate;

pub use alpha_mask::ApplyAlphaMask;
pub use rotate::Rotation;
