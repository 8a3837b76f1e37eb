pub mod sqlite;

use crate::app::Result;
use crate::domain::{
    Channel, Cursor, JobFailure, JobStatus, Message, ScrapeJob, Server, ThreadSummary,
};

pub use sqlite::SqliteStore;

/// Outcome of one message batch upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

pub trait Store {
    // Server and channel operations
    fn upsert_server(&self, server: &Server) -> Result<()>;
    fn upsert_channel(&self, channel: &Channel) -> Result<()>;
    fn get_server(&self, id: &str) -> Result<Option<Server>>;
    fn get_channel(&self, id: &str) -> Result<Option<Channel>>;
    fn list_servers(&self) -> Result<Vec<Server>>;
    fn list_channels(&self, server_id: Option<&str>) -> Result<Vec<Channel>>;
    fn delete_channel(&self, id: &str) -> Result<()>;

    // Message operations
    fn upsert_messages(&self, messages: &[Message]) -> Result<UpsertStats>;
    fn get_message(&self, channel_id: &str, message_id: &str) -> Result<Option<Message>>;
    fn list_messages(&self, channel_id: &str, limit: Option<usize>) -> Result<Vec<Message>>;
    fn count_messages(&self, channel_id: &str) -> Result<i64>;
    fn list_threads(&self, channel_id: &str) -> Result<Vec<ThreadSummary>>;

    // Job operations
    fn create_job(&self, channel_id: &str, resume_from: Option<&Cursor>) -> Result<ScrapeJob>;
    fn get_job(&self, id: i64) -> Result<Option<ScrapeJob>>;
    fn list_jobs(&self, channel_id: Option<&str>) -> Result<Vec<ScrapeJob>>;
    fn find_active_job(&self, channel_id: &str) -> Result<Option<ScrapeJob>>;
    fn find_paused_job(&self, channel_id: &str) -> Result<Option<ScrapeJob>>;
    fn resume_cursor(&self, channel_id: &str) -> Result<Option<Cursor>>;
    fn transition_job(&self, id: i64, from: JobStatus, to: JobStatus) -> Result<()>;
    fn update_job_cursor(&self, id: i64, cursor: &Cursor) -> Result<bool>;
    fn record_job_progress(
        &self,
        id: i64,
        attempts: u32,
        cycles: u32,
        messages_seen: u64,
    ) -> Result<()>;
    fn finalize_job(
        &self,
        id: i64,
        status: JobStatus,
        failure: Option<&JobFailure>,
    ) -> Result<ScrapeJob>;
}
