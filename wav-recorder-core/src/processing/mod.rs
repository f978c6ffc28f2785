pub mod convert;
pub mod levels;
pub mod sample_queue;
pub mod wav_format;
