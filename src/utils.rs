pub mod arg_builder;
pub mod console;
pub mod constants;
pub mod descriptor;
pub mod doctor_utils;
pub mod errors;
pub mod prog_utils;
pub mod run_config;
pub mod supervisor;
pub mod worker;
