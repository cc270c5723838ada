pub mod audio;
pub mod config;
pub mod encode;
pub mod error;
pub mod notes;
pub mod pipeline;

pub use audio::analysis::{transcribe, Transcription};
pub use audio::decode::{decode_audio, AudioData, ChannelMode};
pub use config::Config;
pub use encode::smf::encode_smf;
pub use error::{Result, TranscribeError};
pub use notes::NoteEvent;
pub use pipeline::{convert, Conversion, ConversionJob, Progress};
