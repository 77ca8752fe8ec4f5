//! Host power-off command execution
//!
//! Production code uses `CommandExecutor`, which runs `systemctl poweroff -i`
//! under a fixed deadline. Tests inject their own `PowerOff` implementations.

mod executor;

pub use executor::{
    CommandExecutor, PowerOff, ShutdownCommand, ShutdownCommandError, ShutdownCommandResult,
    SHUTDOWN_COMMAND_TIMEOUT,
};

#[cfg(test)]
pub use executor::MockPowerOff;

#[cfg(test)]
#[path = "executor_test.rs"]
mod executor_tests;
