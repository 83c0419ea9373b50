pub mod cache;
pub mod playback;
pub mod sessions;
