#[macro_use]
pub(crate) mod feature_cfg;

pub(crate) use cfg_status_report;
