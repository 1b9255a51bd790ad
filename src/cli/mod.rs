mod command;
mod views;

pub use self::command::{
    Args, Command, DeleteArgs, FakeArgs, LogLevel, OutputFormat, PrefsArgs, RunOptions, ScanArgs,
    SetActiveArgs, ThresholdArgs,
};
pub(crate) use self::views::render_result;
