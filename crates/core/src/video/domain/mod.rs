pub mod audio_remuxer;
pub mod image_writer;
pub mod video_reader;
pub mod video_writer;
