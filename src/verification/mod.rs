pub(crate) mod catchall;

pub use catchall::CatchAllDetector;
