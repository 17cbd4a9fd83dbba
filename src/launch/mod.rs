//! Launching a daemon from a JSON launch descriptor.

mod descriptor;
mod launcher;
mod logging;
mod process;
mod settings;

pub use descriptor::{ComponentDeclaration, ConfigDescriptor, LaunchDescriptor, SubProcessList};
pub use launcher::{LaunchOptions, Launcher, RunningDaemon, StopReport, launch_daemon};
pub use logging::{LOG_ENV, LogHandle, init_logging, level_from_desc};
pub use process::{
    PROCESS_TYPE_FLAG, PidFile, SUB_PROCESS_DELAY, spawn_sub_process, spawn_sub_processes,
    sub_process_args,
};
pub use settings::{ENV_PREFIX, FrameSettings};
