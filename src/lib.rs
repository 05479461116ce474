// Library exports for ssrpipe
pub mod annotation;
pub mod artifacts;
pub mod binary_paths;
pub mod boulder;
pub mod control;
pub mod error;
pub mod file_state;
pub mod final_table;
pub mod merge;
pub mod pipeline;
pub mod primer3_runner;
pub mod primer3_settings;
pub mod primer_request;
pub mod primer_response;
pub mod progress;
pub mod repeats;
pub mod sequence;
pub mod settings_io;
pub mod trim;
pub mod verify;
