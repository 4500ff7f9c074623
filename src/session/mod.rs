//! Interactive session control.
//!
//! A session owns one engine instance plus the camera and play/step state. Presentation
//! layers talk to it only through `SessionCommand`/`SessionEvent` channels.

mod controller;
mod state;

pub(crate) use controller::{
    run_session, SessionCommand, SessionController, SessionEvent, SessionSettings,
};
pub(crate) use state::SessionState;
