pub mod config;
pub mod conversion;
pub mod error;
pub mod frame;
pub mod ids;
pub mod recorder;
pub mod session;
pub mod sink;
pub mod tracker;

pub mod mock;

pub use config::RecorderConfig;
pub use conversion::{ConversionJob, ConversionOutcome, FfmpegTranscoder, Transcoder};
pub use error::{ConversionError, RecorderError, SinkError, TrackerError};
pub use frame::Frame;
pub use ids::SessionId;
pub use recorder::Recorder;
pub use session::{RecordingSession, SessionReport, SessionState};
pub use sink::FrameSink;
pub use tracker::{CompletionTracker, JobToken, Reservation};
