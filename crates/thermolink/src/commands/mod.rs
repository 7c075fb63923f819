//! Command handlers and shared context plumbing.

pub mod devices;
pub mod energy;
pub mod session_cmd;
pub mod settings;

use std::sync::Arc;

use thermolink_config::{
    FileCredentialStore, ResolvedProfile, load_config, load_config_from, resolve_profile,
};
use thermolink_core::Bridge;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Everything a command needs: the resolved profile and a bridge wired
/// to its credential store.
pub(crate) struct Context {
    pub profile: ResolvedProfile,
    pub bridge: Bridge,
}

pub(crate) fn open(global: &GlobalOpts) -> Result<Context, CliError> {
    let config = match &global.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let profile = resolve_profile(&config, global.profile.as_deref())?;
    let store = Arc::new(FileCredentialStore::for_profile(&profile));
    let bridge = Bridge::new(profile.bridge.clone(), store)?;
    Ok(Context { profile, bridge })
}

pub async fn dispatch(command: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match command {
        Command::Login(args) => session_cmd::login(&args, global).await,
        Command::Devices => devices::list(global).await,
        Command::State(args) => devices::state(&args, global).await,
        Command::Set(args) => devices::set(&args, global).await,
        Command::Energy(args) => energy::report(&args, global).await,
        Command::Errors(args) => energy::errors(&args, global).await,
        Command::Frost(args) => settings::frost(&args, global).await,
        Command::Holiday(args) => settings::holiday(&args, global).await,
        // Handled in main before dispatch.
        Command::Completions(_) => Ok(()),
    }
}
