use crate::core::model::{DebridStatus, JobId};

#[derive(Debug, Clone)]
pub enum EngineEvent {
    AddonQueried { addon_id: String, url: String },
    AddonFinished { addon_id: String, candidates: usize },
    AddonSkipped { addon_id: String, reason: String },
    AddonFailed { addon_id: String, message: String },
    DebridStatusChanged { job_id: JobId, provider: String, status: DebridStatus, attempt: u32 },
    Error { scope: String, message: String },
    Info { scope: String, message: String },
}
