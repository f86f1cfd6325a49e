use async_trait::async_trait;

use crate::common::{error::Result, job::JobQueueTask};

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Host the queue was added with; abort jobs are addressed to it.
    fn host(&self) -> &str;
    async fn wait_for_server(&self) -> Result<()>;
    /// Returns the queue's handle for the job.
    async fn submit_job(&self, task: &JobQueueTask, wait_for_completion: bool) -> Result<String>;
    /// Raw lines of the admin `workers` response, terminator excluded.
    async fn workers(&self) -> Result<Vec<String>>;
}
