pub mod command;
pub mod error;
pub mod ffmpeg;
pub mod format;
pub mod ops;
pub mod probe;
pub mod process;
pub mod progress;
pub mod session;
pub mod timecode;

pub use command::{CutSpec, CutStrategy};
pub use error::{CutError, CutResult};
pub use ops::{Engine, OpState};
pub use probe::MediaFile;
pub use progress::{ProgressSink, ProgressUi};
pub use session::{Scene, Session};
