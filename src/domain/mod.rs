pub mod channel;
pub mod job;
pub mod message;
pub mod server;

pub use channel::{Channel, ChannelKind};
pub use job::{Cursor, JobFailure, JobStatus, ScrapeJob, StopMode};
pub use message::{Attachment, Message, ThreadSummary};
pub use server::Server;
