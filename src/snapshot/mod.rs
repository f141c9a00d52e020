pub mod app_config;
pub mod archive;
pub mod compress;
pub mod credentials;
pub mod file_ext;
pub mod finish;
pub mod job_config;
pub mod orchestrator;
pub mod progress;
pub mod redacted;
pub mod result_error;
pub mod runner;
pub mod snapshot_id;
pub mod tar;
pub mod upload;
pub mod validate;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
