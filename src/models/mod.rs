// Data models: Protege wire formats and the local queue API

pub mod protege;
pub mod queue;
