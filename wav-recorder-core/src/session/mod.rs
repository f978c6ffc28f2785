pub mod fixed;
pub mod recorder;
pub mod timing;
