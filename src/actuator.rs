use std::process::{Command, Stdio};
use thiserror::Error;

use crate::gesture::GestureEvent;

#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("target window not found")]
    TargetNotFound,
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Something that turns a recognized gesture into an effect in the outside world.
///
/// Failures are reported, never retried; the listener logs and drops them.
pub trait Actuator {
    fn dispatch(&mut self, event: GestureEvent) -> Result<(), ActuatorError>;
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn dispatch(&mut self, event: GestureEvent) -> Result<(), ActuatorError> {
        (**self).dispatch(event)
    }
}

/// Fallback used when no commands are configured.
pub struct LogActuator;

impl Actuator for LogActuator {
    fn dispatch(&mut self, event: GestureEvent) -> Result<(), ActuatorError> {
        log::info!("Page {}", event);
        Ok(())
    }
}

/// Runs one external command per direction, e.g.
/// `xdotool search --name Kindle windowactivate --sync key Right`.
///
/// Exit status 1 is how window-automation tools report "no matching window".
pub struct CommandActuator {
    forward: Vec<String>,
    backward: Vec<String>,
}

impl CommandActuator {
    /// Returns `None` when neither direction has a command.
    pub fn new(forward: Vec<String>, backward: Vec<String>) -> Option<Self> {
        if forward.is_empty() && backward.is_empty() {
            return None;
        }
        Some(Self { forward, backward })
    }

    fn argv(&self, event: GestureEvent) -> &[String] {
        match event {
            GestureEvent::Forward => &self.forward,
            GestureEvent::Backward => &self.backward,
        }
    }
}

impl Actuator for CommandActuator {
    fn dispatch(&mut self, event: GestureEvent) -> Result<(), ActuatorError> {
        let Some((program, args)) = self.argv(event).split_first() else {
            log::debug!("No command configured for {}", event);
            return Ok(());
        };

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| ActuatorError::Spawn {
                program: program.clone(),
                source,
            })?;

        match output.status.code() {
            Some(0) => {
                log::info!("Page {} via {}", event, program);
                Ok(())
            }
            Some(1) => Err(ActuatorError::TargetNotFound),
            _ => Err(ActuatorError::Exit {
                program: program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}
