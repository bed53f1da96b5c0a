//! Headless Spotify now-playing broadcast daemon.
//!
//! `nowplayd` polls the Spotify Web API for the account's currently playing
//! track, derives a two-color theme from the album artwork, and pushes one
//! update per detected track change to all connected websocket clients.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod broadcast;
pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod poll;
pub mod protocol;
pub mod server;
pub mod signal;
pub mod theme;
pub mod tokens;
pub mod track;
