mod run_config;

pub use run_config::{
    load_or_create_config,
    ReportConfig,
    RunConfig,
    SelectionConfig,
};
