//! fwdmng: command-line front end for the fm-tunnel engine
//!
//! Config editing commands work on the TOML file through the same
//! [`fm_tunnel::Registry`] rules the engine enforces; `run` connects hosts
//! and reports their forwards until interrupted.

pub mod commands;
pub mod output;
