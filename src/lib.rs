//! Passline - batch runner for media command-line tools
//!
//! Runs ffmpeg style tools one pass at a time over a batch of files, streams
//! their output as progress events, and keeps an audit log of every command.

pub mod cli;
pub mod command;
pub mod config;
pub mod download;
pub mod error;
pub mod event;
pub mod logfile;
pub mod modes;
pub mod parser;
pub mod probe;
pub mod render;
pub mod runner;
pub mod sequencer;
