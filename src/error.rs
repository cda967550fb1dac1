use bevy::prelude::*;
use thiserror::Error;

/// Fatal set-up problems. The game refuses to run rather than limp along
/// with a craft it cannot fly or a level table it cannot index.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("level table is empty, at least one level is required")]
    NoLevels,
    #[error("level index {index} is out of range for {total} levels")]
    LevelOutOfRange { index: usize, total: usize },
    #[error("no flyable craft was spawned")]
    MissingCraft,
    #[error("craft is missing its {0}")]
    MissingCraftPart(&'static str),
}

/// Reports an error found before the app runs and turns it into a failing exit.
pub fn config_failure(err: ConfigError) -> AppExit {
    error!("fatal configuration error: {err}");
    AppExit::error()
}

/// Terminates a startup check pipeline: logs the error and asks the app to exit.
pub fn exit_on_config_error(In(result): In<Result<(), ConfigError>>, mut exit: EventWriter<AppExit>) {
    if let Err(err) = result {
        exit.send(config_failure(err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_check_exits_with_an_error() {
        let mut app = App::new();
        app.add_systems(
            Update,
            (|| -> Result<(), ConfigError> { Err(ConfigError::NoLevels) }).pipe(exit_on_config_error),
        );

        app.update();

        let exit = app.should_exit();
        assert!(exit.as_ref().is_some_and(AppExit::is_error));
    }

    #[test]
    fn passing_check_keeps_running() {
        let mut app = App::new();
        app.add_systems(Update, (|| -> Result<(), ConfigError> { Ok(()) }).pipe(exit_on_config_error));

        app.update();

        assert!(app.should_exit().is_none());
    }

    #[test]
    fn config_failure_is_never_a_clean_exit() {
        assert!(config_failure(ConfigError::MissingCraft).is_error());
    }
}
